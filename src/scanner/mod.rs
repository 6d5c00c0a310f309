//! File scanner for discovering and filtering source files.
//!
//! Walks the audit root with `walkdir`, skipping hidden and excluded
//! directories, and keeps files whose extension and size pass the
//! configured filters. Results are sorted by path so repeated runs
//! produce the same request order.

use crate::config::{default_excludes, default_extensions, ScannerConfig};
use crate::models::{AnalysisRequest, Framework};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Configuration for file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include (e.g., ["rs", "py", "js"])
    pub extensions: Vec<String>,
    /// Directory or file names to exclude (e.g., ["node_modules", "target"])
    pub excludes: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size: usize,
    /// Maximum number of files to scan
    pub max_files: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            excludes: default_excludes(),
            max_file_size: 256 * 1024,
            max_files: None,
        }
    }
}

impl From<&ScannerConfig> for ScanConfig {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excludes: config.excludes.clone(),
            max_file_size: config.max_file_size,
            max_files: Some(config.max_files),
        }
    }
}

/// Scanned file information.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Relative path from the audit root, with `/` separators
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// File extension (without dot)
    pub extension: String,
}

/// A scanned file with its contents loaded.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub language: Option<&'static str>,
    pub content: String,
}

impl SourceFile {
    /// One analysis request per framework for this file.
    pub fn requests(&self, frameworks: &[Framework], context: Option<&str>) -> Vec<AnalysisRequest> {
        frameworks
            .iter()
            .map(|framework| {
                let mut request =
                    AnalysisRequest::new(self.content.clone(), self.path.clone(), *framework);
                if let Some(language) = self.language {
                    request = request.with_language(language);
                }
                if let Some(context) = context {
                    request = request.with_context(context);
                }
                request
            })
            .collect()
    }
}

/// File scanner for discovering source files.
pub struct FileScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl FileScanner {
    /// Create a new file scanner.
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// Scan for all matching files.
    pub fn scan(&self) -> Result<Vec<ScannedFile>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_excluded(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.matches(entry.path()) {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let rel_path = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());

            files.push(ScannedFile {
                path: rel_path.to_string_lossy().replace('\\', "/"),
                size,
                extension: extension_of(entry.path()).to_string(),
            });

            if let Some(max) = self.config.max_files {
                if files.len() >= max {
                    break;
                }
            }
        }

        Ok(files)
    }

    /// Collect matching files with their contents, skipping unreadable ones.
    pub fn collect_sources(&self) -> Result<Vec<SourceFile>> {
        let scanned = self
            .scan()
            .with_context(|| format!("Failed to scan {}", self.root.display()))?;

        let mut sources = Vec::with_capacity(scanned.len());
        for file in scanned {
            let full_path = self.root.join(&file.path);
            match fs::read_to_string(&full_path) {
                Ok(content) if content.trim().is_empty() => {
                    debug!("Skipping empty file {}", file.path);
                }
                Ok(content) => sources.push(SourceFile {
                    language: language_for_extension(&file.extension),
                    path: file.path,
                    content,
                }),
                Err(e) => {
                    warn!("Failed to read {}: {}", file.path, e);
                }
            }
        }

        Ok(sources)
    }

    /// Check if a file matches the extension and size filters.
    pub fn matches(&self, path: &Path) -> bool {
        let ext = extension_of(path);
        if !self.config.extensions.iter().any(|e| e == ext) {
            return false;
        }

        match fs::metadata(path) {
            Ok(metadata) => metadata.len() <= self.config.max_file_size as u64,
            Err(_) => false,
        }
    }

    /// Hidden entries and explicit excludes are skipped.
    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.config.excludes.iter().any(|pattern| name == pattern.as_str())
    }
}

fn extension_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

/// Map a file extension to a language name for prompts.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    let language = match ext {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "java" => "Java",
        "c" | "h" => "C",
        "cpp" | "hpp" => "C++",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        "swift" => "Swift",
        "kt" => "Kotlin",
        "scala" => "Scala",
        "sql" => "SQL",
        "tf" => "Terraform",
        "yaml" | "yml" => "YAML",
        _ => return None,
    };
    Some(language)
}
