//! Central runtime — the single source of truth tying config, bus,
//! governance, cache, audit, fabricator, specialists, risk, and ACE
//! together. Grounded on the upstream `AppState` hub-with-version-counter
//! pattern, generalized from "one engine's live market state" to "the
//! wiring for one orchestration core."

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::ace::AceEvaluator;
use crate::audit::{AlphaAuditBusHandler, AlphaAuditStore, AuditLog};
use crate::audit::AuditSink;
use crate::bus::MessageBus;
use crate::cache::TtlCache;
use crate::config::CoreConfig;
use crate::envelope::{AgentEnvelope, Specialist};
use crate::fabricator::{BarsProvider, Fabricator, NewsProvider, PriceProvider};
use crate::governance::GovernanceService;
use crate::llm::SharedLLM;
use crate::market_context::SpecialistTag;
use crate::orchestrator::{Orchestrator, OrchestratorResponse};
use crate::risk::RiskAgent;
use crate::specialists::{
    ForecastingAgent, GoalPlannerAgent, MathGeneratorAgent, PortfolioAgent, PortfolioStore, QuantAgent, ResearchAgent,
    SocialAgent, WhaleAgent,
};

/// Central runtime shared across all request handling via `Arc<CoreRuntime>`.
///
/// Owns every long-lived subsystem: configuration, message bus, governance
/// policy, resilience caches, the two audit sinks, and the assembled
/// `Orchestrator`. A monotonic version counter lets callers detect whether
/// config or portfolio state changed since they last read it.
pub struct CoreRuntime {
    state_version: AtomicU64,

    pub config: Arc<CoreConfig>,
    pub bus: Arc<MessageBus>,
    pub governance: Arc<GovernanceService>,
    pub cache: Arc<TtlCache<serde_json::Value>>,
    pub audit_log: Arc<AuditLog>,
    pub alpha_audit: Arc<AlphaAuditStore>,
    pub portfolio_store: Arc<PortfolioStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl CoreRuntime {
    /// Assembles every subsystem from `config` and the supplied provider
    /// set. Concrete market-data/news backends are injected by the caller;
    /// an empty vector for any provider kind degrades that data source
    /// gracefully rather than failing construction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CoreConfig,
        reasoning_llm: SharedLLM,
        risk_llm: SharedLLM,
        routing_llm: SharedLLM,
        price_providers: Vec<(String, Arc<dyn PriceProvider>)>,
        bars_providers: Vec<(String, Arc<dyn BarsProvider>)>,
        news_providers: Vec<(String, Arc<dyn NewsProvider>)>,
        instrument_catalog: Vec<(String, String)>,
    ) -> Self {
        let config = Arc::new(config);
        let bus = Arc::new(MessageBus::new());
        let governance = Arc::new(GovernanceService::new());
        let cache = Arc::new(TtlCache::new());
        let audit_log = Arc::new(AuditLog::new());
        let alpha_audit = Arc::new(AlphaAuditStore::new());
        let portfolio_store = Arc::new(PortfolioStore::default());

        bus.register("AlphaAuditSink", Arc::new(AlphaAuditBusHandler::new(alpha_audit.clone())));

        let fabricator = Arc::new(Fabricator::new(price_providers, bars_providers, news_providers));
        let envelope = Arc::new(AgentEnvelope::new(cache.clone(), bus.clone(), config.specialists_enabled));

        let mut specialists: HashMap<SpecialistTag, Arc<dyn Specialist>> = HashMap::new();
        specialists.insert(SpecialistTag::Quant, Arc::new(QuantAgent));
        specialists.insert(SpecialistTag::Forecast, Arc::new(ForecastingAgent));
        specialists.insert(SpecialistTag::Research, Arc::new(ResearchAgent));
        specialists.insert(SpecialistTag::Social, Arc::new(SocialAgent));
        specialists.insert(SpecialistTag::Whale, Arc::new(WhaleAgent));
        specialists.insert(SpecialistTag::Goal, Arc::new(GoalPlannerAgent));
        specialists.insert(SpecialistTag::Math, Arc::new(MathGeneratorAgent));
        specialists.insert(SpecialistTag::Portfolio, Arc::new(PortfolioAgent::new(portfolio_store.clone())));

        let risk = Arc::new(RiskAgent::new(risk_llm, config.risk.clone()));
        let ace = Arc::new(AceEvaluator::new(config.ace.clone()));

        let orchestrator = Arc::new(Orchestrator::new(
            (*config).clone(),
            fabricator,
            envelope,
            specialists,
            risk,
            ace,
            reasoning_llm,
            routing_llm,
            bus.clone(),
            instrument_catalog,
        ));

        CoreRuntime {
            state_version: AtomicU64::new(1),
            config,
            bus,
            governance,
            cache,
            audit_log,
            alpha_audit,
            portfolio_store,
            orchestrator,
        }
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    /// Runs a single request end to end, recording the decision audit trail
    /// and (when `config.enable_alpha_audit`) scheduling the forward-return
    /// attribution job roughly 2 seconds later, once a new price print is
    /// expected to exist in `alpha_audit`'s OHLCV table.
    pub async fn handle_request(&self, request: crate::market_context::RequestContext) -> OrchestratorResponse {
        let correlation_id = request.correlation_id.clone();
        let ticker = request.ticker.clone();

        self.audit_log.append(
            "request_received",
            serde_json::json!({"correlation_id": correlation_id, "query": request.query}),
        );

        if let Some(ticker) = &ticker {
            self.alpha_audit.record_context_fabricated(&correlation_id, ticker, chrono::Utc::now());
        }

        let response = self.orchestrator.handle(request).await;

        self.audit_log.append(
            "decision_made",
            serde_json::json!({
                "correlation_id": response.correlation_id,
                "intent": format!("{:?}", response.intent),
                "ticker": response.ticker,
                "robustness_label": response.robustness_label,
                "timed_out": response.timed_out,
            }),
        );

        if self.config.enable_alpha_audit && response.ticker.is_some() {
            let alpha_audit = self.alpha_audit.clone();
            let correlation_id = response.correlation_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                alpha_audit.run_attribution_job(&correlation_id);
                info!(correlation_id = %correlation_id, "alpha audit: attribution job ran");
            });
        }

        self.increment_version();
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLLM;
    use crate::market_context::RequestContext;

    fn runtime() -> CoreRuntime {
        let reasoning_llm: SharedLLM = Arc::new(MockLLM::new("mock-reasoner", "Hold your position for now."));
        let risk_llm: SharedLLM = Arc::new(MockLLM::new(
            "mock-risk",
            r#"{"status":"APPROVED","confidence_score":0.9,"risk_assessment":"ok","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
        ));
        let routing_llm: SharedLLM =
            Arc::new(MockLLM::new("mock-router", "INTENT: market_analysis\nTICKER: NONE\nREASON: test default"));
        CoreRuntime::new(CoreConfig::default(), reasoning_llm, risk_llm, routing_llm, vec![], vec![], vec![], vec![])
    }

    #[tokio::test]
    async fn handle_request_appends_audit_trail() {
        let rt = runtime();
        let request = RequestContext::new("Can you explain what diversification means?");
        rt.handle_request(request).await;
        assert_eq!(rt.audit_log.len(), 2);
        assert!(rt.audit_log.verify().is_ok());
    }

    #[tokio::test]
    async fn version_increments_after_a_request() {
        let rt = runtime();
        let before = rt.current_state_version();
        let request = RequestContext::new("Explain what a stop-loss is.");
        rt.handle_request(request).await;
        assert!(rt.current_state_version() > before);
    }
}
