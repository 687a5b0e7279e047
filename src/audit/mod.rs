//! Audit subsystem: the hash-chained decision log and the alpha-attribution
//! store. Two independent concerns kept in one module because both are
//! append-only recorders fed by the same orchestrator lifecycle.

mod log;
mod store;

pub use log::{AuditEntry, AuditLog};
pub use store::{
    AlphaAuditBusHandler, AlphaAuditStore, AlphaMetrics, AuditSink, OhlcvRow, PerformanceRow, SpecialistAlpha,
    TelemetryRow,
};
