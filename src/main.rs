// =============================================================================
// Orchestration Core — Demo Entry Point
// =============================================================================
//
// Wires a CoreRuntime with mock LLM backends (no network calls) and runs one
// illustrative query from the command line or a built-in default. A real
// deployment swaps MockLLM for an HTTP-backed LLMProvider and supplies real
// market-data/news providers to CoreRuntime::new.
// =============================================================================

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meridian_core::app_state::CoreRuntime;
use meridian_core::config::CoreConfig;
use meridian_core::llm::{MockLLM, SharedLLM};
use meridian_core::market_context::RequestContext;

const CONFIG_PATH: &str = "core_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("orchestration core starting up");

    let config = CoreConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load core config, using defaults");
        CoreConfig::default()
    });

    let reasoning_llm: SharedLLM = Arc::new(MockLLM::new(
        &config.reasoning_model,
        "Based on the available signals, consider holding your current position and revisiting after the next earnings print.",
    ));
    let risk_llm: SharedLLM = Arc::new(MockLLM::new(
        &config.risk_model,
        r#"{"status":"APPROVED","confidence_score":0.8,"risk_assessment":"No material exposure or compliance concerns identified.","compliance_notes":"","debate_refutation":"","requires_hitl":false}"#,
    ));
    let routing_llm: SharedLLM = Arc::new(MockLLM::new(
        &config.routing_model,
        "INTENT: market_analysis\nTICKER: NONE\nREASON: demo default",
    ));

    let runtime = Arc::new(CoreRuntime::new(config, reasoning_llm, risk_llm, routing_llm, vec![], vec![], vec![], vec![]));

    let query = std::env::args().nth(1).unwrap_or_else(|| "What is the outlook for $AAPL?".to_string());
    let request = RequestContext::new(query);

    let response = runtime.handle_request(request).await;

    info!(
        correlation_id = %response.correlation_id,
        intent = ?response.intent,
        robustness_label = response.robustness_label,
        robustness_score = response.robustness_score,
        "orchestrator response ready"
    );
    println!("{}", response.answer);
    if !response.actions_required.is_empty() {
        println!("actions requiring human approval: {:?}", response.actions_required);
    }

    if let Err(sequence) = runtime.audit_log.verify() {
        warn!(sequence, "audit log hash chain verification failed");
    }

    Ok(())
}
