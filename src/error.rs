use thiserror::Error;

/// Typed error taxonomy shared by every fallible public operation in the core.
///
/// Specialist-internal errors never escape as this type panicking up the
/// stack — the agent envelope always captures them into `AgentResponse.error`
/// first (see `envelope.rs`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    #[error("circuit '{0}' is open")]
    CircuitOpen(String),

    #[error("instrument not found: {0}")]
    NotFound(String),

    #[error("instrument delisted: {0}")]
    Delisted(String),

    #[error("unit mismatch for {0}")]
    UnitMismatch(String),

    #[error("failed to parse model output: {0}")]
    ParseError(String),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("governance denied: {sender} -> {recipient}")]
    GovernanceDenied { sender: String, recipient: String },

    #[error("sandbox denied: {0}")]
    SandboxDenied(String),

    #[error("fatal internal error: {0}")]
    FatalInternal(String),
}

impl CoreError {
    /// Stable string tag matching the error-kind vocabulary in the external
    /// interface (bus payloads, telemetry, logs).
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Timeout(_) => "timeout",
            CoreError::CircuitOpen(_) => "circuit_open",
            CoreError::NotFound(_) => "not_found",
            CoreError::Delisted(_) => "delisted",
            CoreError::UnitMismatch(_) => "unit_mismatch",
            CoreError::ParseError(_) => "parse_error",
            CoreError::ValidationError(_) => "validation_error",
            CoreError::UpstreamUnavailable(_) => "upstream_unavailable",
            CoreError::GovernanceDenied { .. } => "governance_denied",
            CoreError::SandboxDenied(_) => "sandbox_denied",
            CoreError::FatalInternal(_) => "fatal_internal",
        }
    }

    /// Whether the Tier-2 instrument-search recovery ladder applies.
    pub fn is_instrument_miss(&self) -> bool {
        matches!(self, CoreError::NotFound(_) | CoreError::Delisted(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
