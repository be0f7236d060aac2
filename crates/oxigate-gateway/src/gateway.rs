//! The gateway orchestrator.
//!
//! One `handle` call walks the whole pipeline: cache probe, candidate
//! ordering, circuit-breaker gating, budget reservation, adapter
//! invocation, and — when everything else is exhausted — the static
//! fallback. Provider failures never escape: the caller always receives a
//! response, and the usage ledger carries the per-attempt trail.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use oxigate_adapters::{
    AdapterOutput, FallbackAdapter, HttpAdapter, ProviderAdapter,
};
use oxigate_core::config::OxigateConfig;
use oxigate_core::types::{
    AttemptOutcome, GenerateRequest, GenerateResponse, UsageRecord, FALLBACK_PROVIDER,
};
use oxigate_core::RequestError;

use crate::breaker::{Admission, CircuitBreaker};
use crate::budget::BudgetManager;
use crate::cache::{self, CachedResponse, ResponseCache};
use crate::ledger::UsageLedger;
use crate::routing;
use crate::SharedConfig;

/// Long-lived orchestrator owning all shared request-path state.
///
/// Constructed once at service start from configuration; every piece of
/// mutable state (budget book, circuit registry, cache, ledger) lives
/// inside and is touched only through its own atomic operations.
pub struct Gateway {
    config: SharedConfig,
    adapters: RwLock<HashMap<String, Arc<dyn ProviderAdapter>>>,
    fallback: FallbackAdapter,
    breaker: CircuitBreaker,
    budget: BudgetManager,
    cache: ResponseCache,
    ledger: UsageLedger,
}

impl Gateway {
    /// Build a gateway from configuration, creating one HTTP adapter per
    /// configured provider. Must run inside a tokio runtime (the usage
    /// ledger spawns its writer task).
    pub fn new(config: OxigateConfig) -> Self {
        let adapters = config
            .providers
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    Arc::new(HttpAdapter::new(p)) as Arc<dyn ProviderAdapter>,
                )
            })
            .collect();
        Self::assemble(config, adapters)
    }

    /// Build a gateway with explicit adapters (used by tests and by
    /// callers embedding custom providers).
    pub fn with_adapters(config: OxigateConfig, adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|a| (a.name().to_string(), a))
            .collect();
        Self::assemble(config, adapters)
    }

    fn assemble(config: OxigateConfig, adapters: HashMap<String, Arc<dyn ProviderAdapter>>) -> Self {
        let shared: SharedConfig = Arc::new(RwLock::new(config));
        let (ledger, _writer) = UsageLedger::spawn();

        let (breaker, cache) = {
            let config = shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            (
                CircuitBreaker::new(&config.breaker),
                ResponseCache::new(&config.cache),
            )
        };

        Gateway {
            budget: BudgetManager::new(shared.clone()),
            config: shared,
            adapters: RwLock::new(adapters),
            fallback: FallbackAdapter::new(),
            breaker,
            cache,
            ledger,
        }
    }

    /// Handle one request. The only error a caller can see is input
    /// validation; every provider-side problem degrades to the fallback.
    pub async fn handle(&self, request: GenerateRequest) -> Result<GenerateResponse, RequestError> {
        request.validate()?;
        let started = Instant::now();

        let (candidates, deadline, default_timeout) = {
            let config = self.read_config();
            let candidates = routing::order(
                &config.providers,
                &request.context_hints,
                config.experiment.as_ref(),
                &request.user_id,
            );
            (
                candidates,
                Duration::from_secs(config.limits.request_deadline_secs),
                Duration::from_secs(config.limits.adapter_timeout_secs),
            )
        };

        // Cache probe across the candidates' models, priority order.
        // Hits bypass routing, budget, and the ledger entirely.
        let mut probed: Vec<&str> = Vec::new();
        for candidate in &candidates {
            if probed.contains(&candidate.model.as_str()) {
                continue;
            }
            probed.push(candidate.model.as_str());
            let fp = cache::fingerprint(&request.payload, &candidate.model);
            if let Some(hit) = self.cache.get(&fp) {
                debug!(request = %request.id, model = %hit.model, "Cache hit");
                return Ok(GenerateResponse {
                    content: hit.content,
                    provider_used: hit.provider,
                    model: hit.model,
                    tokens_in: hit.tokens_in,
                    tokens_out: hit.tokens_out,
                    cost: 0.0,
                    latency_ms: elapsed_ms(started),
                    served_from_cache: true,
                });
            }
        }

        let estimated_tokens_in = request.payload.estimate_input_tokens();

        for candidate in &candidates {
            if started.elapsed() >= deadline {
                warn!(request = %request.id, "Request deadline exhausted, degrading to fallback");
                break;
            }

            let admission = self.breaker.admit(&candidate.name);
            if admission == Admission::Rejected {
                debug!(request = %request.id, provider = %candidate.name, "Circuit open, skipping");
                self.ledger.record(UsageRecord::skipped(
                    &request.id,
                    &candidate.name,
                    AttemptOutcome::CircuitOpen,
                ));
                continue;
            }

            let estimated = candidate.estimated_cost(estimated_tokens_in, request.max_tokens);
            let token = match self.budget.reserve(candidate, estimated) {
                Ok(token) => token,
                Err(rejection) => {
                    if admission == Admission::Trial {
                        self.breaker.cancel_trial(&candidate.name);
                    }
                    debug!(
                        request = %request.id,
                        provider = %candidate.name,
                        %rejection,
                        "Budget rejected"
                    );
                    self.ledger.record(UsageRecord::skipped(
                        &request.id,
                        &candidate.name,
                        AttemptOutcome::BudgetRejected,
                    ));
                    continue;
                }
            };

            let Some(adapter) = self.adapter(&candidate.name) else {
                self.budget.release(token);
                if admission == Admission::Trial {
                    self.breaker.cancel_trial(&candidate.name);
                }
                warn!(provider = %candidate.name, "No adapter registered for configured provider");
                self.ledger.record(UsageRecord::skipped(
                    &request.id,
                    &candidate.name,
                    AttemptOutcome::Failure,
                ));
                continue;
            };

            let per_call = candidate
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default_timeout);
            let timeout = per_call.min(deadline.saturating_sub(started.elapsed()));
            let attempt_started = Instant::now();

            match adapter
                .invoke(&request.payload, request.max_tokens, timeout)
                .await
            {
                Ok(out) => {
                    let cost = candidate.cost_of(out.tokens_in, out.tokens_out);
                    self.budget.commit(token, cost);
                    self.breaker.record_success(&candidate.name);
                    self.cache.put(
                        cache::fingerprint(&request.payload, &candidate.model),
                        CachedResponse {
                            content: out.content.clone(),
                            provider: candidate.name.clone(),
                            model: candidate.model.clone(),
                            tokens_in: out.tokens_in,
                            tokens_out: out.tokens_out,
                        },
                    );
                    self.ledger.record(UsageRecord {
                        request_id: request.id.clone(),
                        provider: candidate.name.clone(),
                        outcome: AttemptOutcome::Success,
                        latency_ms: out.latency.as_millis() as u64,
                        tokens_in: out.tokens_in,
                        tokens_out: out.tokens_out,
                        cost,
                        timestamp: chrono::Utc::now(),
                    });
                    info!(
                        request = %request.id,
                        provider = %candidate.name,
                        cost,
                        latency_ms = elapsed_ms(started),
                        "Request served"
                    );
                    return Ok(GenerateResponse {
                        content: out.content,
                        provider_used: candidate.name.clone(),
                        model: candidate.model.clone(),
                        tokens_in: out.tokens_in,
                        tokens_out: out.tokens_out,
                        cost,
                        latency_ms: elapsed_ms(started),
                        served_from_cache: false,
                    });
                }
                Err(error) => {
                    self.budget.release(token);
                    self.breaker.record_failure(&candidate.name);
                    warn!(
                        request = %request.id,
                        provider = %candidate.name,
                        error = %error,
                        kind = error.kind(),
                        "Provider attempt failed"
                    );
                    self.ledger.record(UsageRecord {
                        request_id: request.id.clone(),
                        provider: candidate.name.clone(),
                        outcome: AttemptOutcome::Failure,
                        latency_ms: attempt_started.elapsed().as_millis() as u64,
                        tokens_in: 0,
                        tokens_out: 0,
                        cost: 0.0,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        }

        // Terminal option: the static fallback never fails and never
        // costs money.
        let out = self
            .fallback
            .invoke(&request.payload, request.max_tokens, Duration::ZERO)
            .await
            .unwrap_or_else(|_| AdapterOutput {
                content: FallbackAdapter::canned(request.payload.kind()).to_string(),
                tokens_in: 0,
                tokens_out: 0,
                latency: Duration::ZERO,
            });
        self.ledger.record(UsageRecord::skipped(
            &request.id,
            FALLBACK_PROVIDER,
            AttemptOutcome::AllProvidersExhausted,
        ));
        info!(request = %request.id, "Degraded to fallback response");
        Ok(GenerateResponse {
            content: out.content,
            provider_used: FALLBACK_PROVIDER.to_string(),
            model: String::new(),
            tokens_in: 0,
            tokens_out: 0,
            cost: 0.0,
            latency_ms: elapsed_ms(started),
            served_from_cache: false,
        })
    }

    /// The usage ledger (read side: snapshots, summaries).
    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// The budget manager (alert subscription, spend queries).
    pub fn budget(&self) -> &BudgetManager {
        &self.budget
    }

    pub(crate) fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub(crate) fn shared_config(&self) -> &SharedConfig {
        &self.config
    }

    pub(crate) fn register_adapter(&self, adapter: Arc<dyn ProviderAdapter>) {
        let mut adapters = self
            .adapters
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        adapters.insert(adapter.name().to_string(), adapter);
    }

    fn adapter(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    fn read_config(&self) -> std::sync::RwLockReadGuard<'_, OxigateConfig> {
        self.config.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oxigate_adapters::AdapterError;
    use oxigate_core::config::ProviderSettings;
    use oxigate_core::types::TaskPayload;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Test adapter that replays a scripted sequence of results and
    /// counts how often it was actually called.
    struct ScriptedAdapter {
        name: String,
        model: String,
        script: Mutex<VecDeque<Result<AdapterOutput, AdapterError>>>,
        calls: AtomicU32,
    }

    impl ScriptedAdapter {
        fn new(name: &str, script: Vec<Result<AdapterOutput, AdapterError>>) -> Arc<Self> {
            Arc::new(ScriptedAdapter {
                name: name.to_string(),
                model: format!("{name}-large"),
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn ok(content: &str) -> Result<AdapterOutput, AdapterError> {
            Ok(AdapterOutput {
                content: content.to_string(),
                tokens_in: 100,
                tokens_out: 50,
                latency: Duration::from_millis(20),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderAdapter for ScriptedAdapter {
        async fn invoke(
            &self,
            _payload: &TaskPayload,
            _max_tokens: u32,
            _timeout: Duration,
        ) -> Result<AdapterOutput, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            script.pop_front().unwrap_or_else(|| Self::ok("default"))
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn model(&self) -> &str {
            &self.model
        }
    }

    fn provider(name: &str, priority: u32) -> ProviderSettings {
        ProviderSettings {
            name: name.to_string(),
            model: format!("{name}-large"),
            priority,
            input_cost_per_1k: 1.0,
            output_cost_per_1k: 2.0,
            ..ProviderSettings::default()
        }
    }

    fn config(providers: Vec<ProviderSettings>) -> OxigateConfig {
        OxigateConfig {
            providers,
            ..OxigateConfig::default()
        }
    }

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest::new(
            "user-1",
            TaskPayload::Generation {
                prompt: prompt.to_string(),
            },
            200,
        )
    }

    fn outcomes(records: &[UsageRecord]) -> Vec<(String, AttemptOutcome)> {
        records
            .iter()
            .map(|r| (r.provider.clone(), r.outcome))
            .collect()
    }

    #[tokio::test]
    async fn test_invalid_request_is_the_only_error() {
        let gateway = Gateway::with_adapters(config(vec![provider("alpha", 1)]), vec![]);
        let mut bad = request("hello");
        bad.max_tokens = 0;
        assert!(gateway.handle(bad).await.is_err());

        gateway.ledger().flush().await;
        assert!(gateway.ledger().snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_success_path_bills_and_records() {
        let alpha = ScriptedAdapter::new("alpha", vec![ScriptedAdapter::ok("answer")]);
        let gateway =
            Gateway::with_adapters(config(vec![provider("alpha", 1)]), vec![alpha.clone()]);

        let response = gateway.handle(request("hello")).await.unwrap();
        assert_eq!(response.provider_used, "alpha");
        assert_eq!(response.content, "answer");
        assert!(!response.served_from_cache);
        // 100 in * 1.0/1k + 50 out * 2.0/1k = 0.2
        assert!((response.cost - 0.2).abs() < 1e-9);

        gateway.ledger().flush().await;
        let records = gateway.ledger().snapshot();
        assert_eq!(
            outcomes(&records),
            vec![("alpha".to_string(), AttemptOutcome::Success)]
        );
        assert!(
            (gateway.budget().spent(Some("alpha"), oxigate_core::WindowKind::Day) - 0.2).abs()
                < 1e-9
        );
    }

    #[tokio::test]
    async fn test_cache_hit_is_free_and_unrecorded() {
        let alpha = ScriptedAdapter::new("alpha", vec![ScriptedAdapter::ok("answer")]);
        let gateway =
            Gateway::with_adapters(config(vec![provider("alpha", 1)]), vec![alpha.clone()]);

        let first = gateway.handle(request("What is  Rust?")).await.unwrap();
        assert!(!first.served_from_cache);

        // Cosmetically different prompt, same fingerprint.
        let second = gateway.handle(request("what is rust?")).await.unwrap();
        assert!(second.served_from_cache);
        assert_eq!(second.content, "answer");
        assert_eq!(second.cost, 0.0);
        assert_eq!(second.provider_used, "alpha");
        assert_eq!(alpha.calls(), 1);

        gateway.ledger().flush().await;
        // Only the first call wrote a record.
        assert_eq!(gateway.ledger().snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_next_candidate() {
        let alpha = ScriptedAdapter::new(
            "alpha",
            vec![Err(AdapterError::ServerError { status: 503 })],
        );
        let beta = ScriptedAdapter::new("beta", vec![ScriptedAdapter::ok("from beta")]);
        let gateway = Gateway::with_adapters(
            config(vec![provider("alpha", 1), provider("beta", 2)]),
            vec![alpha, beta],
        );

        let response = gateway.handle(request("hello")).await.unwrap();
        assert_eq!(response.provider_used, "beta");

        gateway.ledger().flush().await;
        assert_eq!(
            outcomes(&gateway.ledger().snapshot()),
            vec![
                ("alpha".to_string(), AttemptOutcome::Failure),
                ("beta".to_string(), AttemptOutcome::Success),
            ]
        );
    }

    #[tokio::test]
    async fn test_open_circuit_skips_without_adapter_call() {
        let alpha = ScriptedAdapter::new("alpha", vec![]);
        let beta = ScriptedAdapter::new("beta", vec![ScriptedAdapter::ok("from beta")]);
        let gateway = Gateway::with_adapters(
            config(vec![provider("alpha", 1), provider("beta", 2)]),
            vec![alpha.clone(), beta],
        );

        // Trip alpha's breaker directly.
        for _ in 0..5 {
            gateway.breaker().record_failure("alpha");
        }

        let response = gateway.handle(request("hello")).await.unwrap();
        assert_eq!(response.provider_used, "beta");
        assert_eq!(alpha.calls(), 0);

        gateway.ledger().flush().await;
        assert_eq!(
            outcomes(&gateway.ledger().snapshot()),
            vec![
                ("alpha".to_string(), AttemptOutcome::CircuitOpen),
                ("beta".to_string(), AttemptOutcome::Success),
            ]
        );
    }

    #[tokio::test]
    async fn test_global_ceiling_rejects_every_provider() {
        let mut cfg = config(vec![provider("alpha", 1), provider("beta", 2)]);
        cfg.budget.global.monthly = Some(30.0);
        let alpha = ScriptedAdapter::new("alpha", vec![]);
        let beta = ScriptedAdapter::new("beta", vec![]);
        let gateway = Gateway::with_adapters(cfg, vec![alpha.clone(), beta.clone()]);

        // Pre-spend $29.95 against the global windows.
        let settings = provider("seed", 9);
        let token = gateway.budget().reserve(&settings, 29.95).unwrap();
        gateway.budget().commit(token, 29.95);

        // ~100 estimated input tokens + 200 max output at the test rates
        // estimates well above the remaining $0.05.
        let response = gateway
            .handle(request(&"x".repeat(400)))
            .await
            .unwrap();
        assert_eq!(response.provider_used, FALLBACK_PROVIDER);
        assert_eq!(response.cost, 0.0);
        assert_eq!(alpha.calls(), 0);
        assert_eq!(beta.calls(), 0);

        gateway.ledger().flush().await;
        assert_eq!(
            outcomes(&gateway.ledger().snapshot()),
            vec![
                ("alpha".to_string(), AttemptOutcome::BudgetRejected),
                ("beta".to_string(), AttemptOutcome::BudgetRejected),
                (FALLBACK_PROVIDER.to_string(), AttemptOutcome::AllProvidersExhausted),
            ]
        );
    }

    #[tokio::test]
    async fn test_all_disabled_goes_straight_to_fallback() {
        let mut alpha_settings = provider("alpha", 1);
        alpha_settings.enabled = false;
        let gateway = Gateway::with_adapters(config(vec![alpha_settings]), vec![]);

        let response = gateway.handle(request("hello")).await.unwrap();
        assert_eq!(response.provider_used, FALLBACK_PROVIDER);
        assert_eq!(response.cost, 0.0);
        assert!(!response.content.is_empty());

        gateway.ledger().flush().await;
        assert_eq!(
            outcomes(&gateway.ledger().snapshot()),
            vec![(FALLBACK_PROVIDER.to_string(), AttemptOutcome::AllProvidersExhausted)]
        );
    }

    #[tokio::test]
    async fn test_every_adapter_failing_still_yields_a_response() {
        let alpha = ScriptedAdapter::new("alpha", vec![Err(AdapterError::Timeout)]);
        let beta = ScriptedAdapter::new(
            "beta",
            vec![Err(AdapterError::MalformedResponse("bad json".into()))],
        );
        let gateway = Gateway::with_adapters(
            config(vec![provider("alpha", 1), provider("beta", 2)]),
            vec![alpha, beta],
        );

        let response = gateway.handle(request("hello")).await.unwrap();
        assert_eq!(response.provider_used, FALLBACK_PROVIDER);

        gateway.ledger().flush().await;
        let records = gateway.ledger().snapshot();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].outcome, AttemptOutcome::AllProvidersExhausted);
    }

    #[tokio::test]
    async fn test_failed_attempt_refunds_reservation() {
        let alpha = ScriptedAdapter::new(
            "alpha",
            vec![Err(AdapterError::ServerError { status: 500 })],
        );
        let gateway =
            Gateway::with_adapters(config(vec![provider("alpha", 1)]), vec![alpha]);

        gateway.handle(request("hello")).await.unwrap();
        // Nothing committed, nothing stuck in reservations.
        assert_eq!(
            gateway.budget().spent(Some("alpha"), oxigate_core::WindowKind::Day),
            0.0
        );
    }

    #[tokio::test]
    async fn test_exhausted_deadline_short_circuits_to_fallback() {
        let alpha = ScriptedAdapter::new("alpha", vec![ScriptedAdapter::ok("never seen")]);
        let mut cfg = config(vec![provider("alpha", 1)]);
        cfg.limits.request_deadline_secs = 0;
        let gateway = Gateway::with_adapters(cfg, vec![alpha.clone()]);

        let response = gateway.handle(request("hello")).await.unwrap();
        assert_eq!(response.provider_used, FALLBACK_PROVIDER);
        assert_eq!(alpha.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_entries_do_not_cross_models() {
        let alpha = ScriptedAdapter::new("alpha", vec![ScriptedAdapter::ok("from alpha")]);
        let beta = ScriptedAdapter::new("beta", vec![ScriptedAdapter::ok("from beta")]);
        let gateway = Gateway::with_adapters(
            config(vec![provider("alpha", 1), provider("beta", 2)]),
            vec![alpha, beta.clone()],
        );

        gateway.handle(request("hello")).await.unwrap();

        // Same prompt, but alpha (and its model) is out of the running:
        // the entry cached under alpha's model must not serve beta.
        gateway.set_enabled("alpha", false).unwrap();
        let response = gateway.handle(request("hello")).await.unwrap();
        assert!(!response.served_from_cache);
        assert_eq!(response.provider_used, "beta");
        assert_eq!(beta.calls(), 1);
    }
}
