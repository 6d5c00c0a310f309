//! Cache-first analysis on top of the request gate.
//!
//! `analyze_one` answers from the cache when it can, otherwise renders a
//! prompt, runs it through the gate, parses the reply and stores it.
//! `analyze_batch` fans requests out in fixed-size chunks, waiting for each
//! chunk to settle before starting the next, and keeps input order.

use crate::engine::cache::ResultCache;
use crate::engine::gate::RequestGate;
use crate::engine::parse::{fallback_verdict, parse_verdict, Verdict};
use crate::error::{AnalysisError, GateError, ProviderError};
use crate::models::{
    AnalysisRequest, AnalysisResponse, BatchFailure, BatchOutcome, BatchSummary, ResponseMetadata,
    Severity, Violation,
};
use crate::prompt::render_prompt;
use crate::provider::ReasoningProvider;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Violation type for batch items that failed terminally.
pub const ANALYSIS_ERROR_KIND: &str = "ANALYSIS_ERROR";

/// Renders the prompt for a request.
pub type PromptBuilder = Arc<dyn Fn(&AnalysisRequest) -> String + Send + Sync>;

/// Façade over the cache, the gate and the reasoning provider.
pub struct AnalysisOrchestrator {
    cache: Option<Arc<ResultCache>>,
    gate: Arc<RequestGate>,
    provider: Arc<dyn ReasoningProvider>,
    build_prompt: PromptBuilder,
    model_version: String,
    cache_fallbacks: bool,
}

impl AnalysisOrchestrator {
    /// Orchestrator without a cache; add one with [`with_cache`](Self::with_cache).
    pub fn new(gate: Arc<RequestGate>, provider: Arc<dyn ReasoningProvider>) -> Self {
        let model_version = provider.model_version().to_string();
        Self {
            cache: None,
            gate,
            provider,
            build_prompt: Arc::new(render_prompt),
            model_version,
            cache_fallbacks: true,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[allow(dead_code)] // Alternate prompt templates; the CLI uses the default
    pub fn with_prompt_builder(mut self, build_prompt: PromptBuilder) -> Self {
        self.build_prompt = build_prompt;
        self
    }

    /// Whether parse-failure fallbacks are cached like real verdicts.
    pub fn with_fallback_caching(mut self, enabled: bool) -> Self {
        self.cache_fallbacks = enabled;
        self
    }

    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }

    /// Analyze a single request.
    ///
    /// Unusable model output never surfaces as an error: it is replaced by a
    /// low-confidence `PARSE_ERROR` response. Errors returned here are
    /// terminal gate failures and name the request's file path.
    pub async fn analyze_one(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResponse, AnalysisError> {
        let started = Instant::now();

        if let Some(cache) = &self.cache {
            if let Some(mut hit) = cache.get(&request.code, request.framework) {
                hit.metadata.duration_ms = elapsed_ms(started);
                debug!("Cache hit for {} ({})", request.file_path, request.framework);
                return Ok(hit);
            }
        }

        let prompt = (self.build_prompt)(request);
        let provider = &self.provider;
        let outcome = self
            .gate
            .execute(|| provider.complete(prompt.clone()))
            .await;

        let (verdict, tokens_used, trusted) = match outcome {
            Ok(completion) => match parse_verdict(&completion.text) {
                Ok(verdict) => (verdict, completion.usage.total(), true),
                Err(e) => {
                    warn!("Unusable analysis for {}: {}", request.file_path, e);
                    (fallback_verdict(&e.to_string()), completion.usage.total(), false)
                }
            },
            Err(GateError::Rejected(ProviderError::Malformed(reason))) => {
                warn!("Provider rejected {} as malformed: {}", request.file_path, reason);
                (fallback_verdict(&reason), 0, false)
            }
            Err(source) => {
                return Err(AnalysisError::Failed {
                    file_path: request.file_path.clone(),
                    source,
                })
            }
        };

        let response = self.stamp(verdict, tokens_used, elapsed_ms(started));

        if let Some(cache) = &self.cache {
            if trusted || self.cache_fallbacks {
                cache.set(&request.code, request.framework, response.clone());
            }
        }

        Ok(response)
    }

    /// Analyze `requests` in chunks of `max_concurrency`.
    pub async fn analyze_batch(
        &self,
        requests: &[AnalysisRequest],
        max_concurrency: usize,
    ) -> Result<BatchOutcome, AnalysisError> {
        self.analyze_batch_with_progress(requests, max_concurrency, |_, _| {})
            .await
    }

    /// Like [`analyze_batch`](Self::analyze_batch), calling `on_progress`
    /// with `(settled, total)` after every chunk.
    ///
    /// A terminal failure for one item does not abort the batch: the item
    /// gets an `ANALYSIS_ERROR` placeholder and an entry in `failures`.
    pub async fn analyze_batch_with_progress<P>(
        &self,
        requests: &[AnalysisRequest],
        max_concurrency: usize,
        mut on_progress: P,
    ) -> Result<BatchOutcome, AnalysisError>
    where
        P: FnMut(usize, usize),
    {
        if max_concurrency == 0 {
            return Err(AnalysisError::InvalidConfig(
                "batch concurrency must be at least 1".to_string(),
            ));
        }

        let started = Instant::now();
        let total = requests.len();
        let chunk_count = total.div_ceil(max_concurrency);
        let mut results = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for (chunk_index, chunk) in requests.chunks(max_concurrency).enumerate() {
            let settled = join_all(chunk.iter().map(|request| self.analyze_one(request))).await;

            for (offset, (request, outcome)) in chunk.iter().zip(settled).enumerate() {
                match outcome {
                    Ok(response) => results.push(response),
                    Err(err) => {
                        warn!("{}", err);
                        failures.push(BatchFailure {
                            index: chunk_index * max_concurrency + offset,
                            file_path: request.file_path.clone(),
                            error: err.to_string(),
                        });
                        results.push(self.failure_placeholder(&err));
                    }
                }
            }

            info!(
                "Batch chunk {}/{} settled ({}/{} items)",
                chunk_index + 1,
                chunk_count,
                results.len(),
                total
            );
            on_progress(results.len(), total);
        }

        let summary = BatchSummary::from_results(&results, failures.len(), elapsed_ms(started));

        Ok(BatchOutcome {
            results,
            failures,
            summary,
        })
    }

    fn stamp(&self, verdict: Verdict, tokens_used: u64, duration_ms: u64) -> AnalysisResponse {
        AnalysisResponse {
            compliant: verdict.compliant,
            score: verdict.score,
            violations: verdict.violations,
            recommendations: verdict.recommendations,
            metadata: ResponseMetadata {
                analyzed_at: Utc::now(),
                duration_ms,
                tokens_used,
                cached: false,
                model_version: self.model_version.clone(),
            },
        }
    }

    fn failure_placeholder(&self, err: &AnalysisError) -> AnalysisResponse {
        let verdict = Verdict {
            compliant: false,
            score: 0.0,
            violations: vec![Violation {
                severity: Severity::Medium,
                kind: ANALYSIS_ERROR_KIND.to_string(),
                description: err.to_string(),
                line_numbers: None,
                code_snippet: None,
                recommendation: "Retry the analysis or review this file manually.".to_string(),
            }],
            recommendations: vec![],
        };
        self.stamp(verdict, 0, 0)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
