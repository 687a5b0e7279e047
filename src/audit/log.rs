//! Hash-chained append-only audit log. Each entry's `hash` covers the
//! canonical JSON of its payload plus the previous entry's hash, so any
//! retroactive edit breaks the chain from that point forward (property P9).
//! The teacher already depends on `sha2`/`hex` for exchange request signing;
//! this repurposes the same pair for chain hashing.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub payload: Value,
    pub previous_hash: String,
    pub hash: String,
}

fn compute_hash(sequence: u64, timestamp: &DateTime<Utc>, event: &str, payload: &Value, previous_hash: &str) -> String {
    let canonical = serde_json::json!({
        "sequence": sequence,
        "timestamp": timestamp.to_rfc3339(),
        "event": event,
        "payload": payload,
        "previous_hash": previous_hash,
    });
    let bytes = serde_json::to_vec(&canonical).expect("canonical audit entry always serializes");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

/// Append-only, tamper-evident event log. Every write holds the lock just
/// long enough to compute the next hash and push the entry.
pub struct AuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        AuditLog { entries: RwLock::new(Vec::new()) }
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, event: impl Into<String>, payload: Value) -> AuditEntry {
        let mut entries = self.entries.write();
        let sequence = entries.len() as u64;
        let previous_hash = entries.last().map(|e| e.hash.clone()).unwrap_or_else(|| GENESIS_HASH.to_string());
        let timestamp = Utc::now();
        let event = event.into();
        let hash = compute_hash(sequence, &timestamp, &event, &payload, &previous_hash);
        let entry = AuditEntry { sequence, timestamp, event, payload, previous_hash, hash };
        entries.push(entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    /// Recomputes every entry's hash from its recorded fields and checks it
    /// against both the stored hash and the next entry's `previous_hash`.
    /// Returns the sequence number of the first broken link, if any.
    pub fn verify(&self) -> Result<(), u64> {
        let entries = self.entries.read();
        let mut expected_previous = GENESIS_HASH.to_string();
        for entry in entries.iter() {
            if entry.previous_hash != expected_previous {
                return Err(entry.sequence);
            }
            let recomputed =
                compute_hash(entry.sequence, &entry.timestamp, &entry.event, &entry.payload, &entry.previous_hash);
            if recomputed != entry.hash {
                return Err(entry.sequence);
            }
            expected_previous = entry.hash.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_entry_chains_from_genesis() {
        let log = AuditLog::new();
        let entry = log.append("decision_made", serde_json::json!({"ticker": "AAPL"}));
        assert_eq!(entry.previous_hash, GENESIS_HASH);
        assert_eq!(entry.sequence, 0);
    }

    #[test]
    fn consecutive_entries_chain_correctly() {
        let log = AuditLog::new();
        let e0 = log.append("a", serde_json::json!({}));
        let e1 = log.append("b", serde_json::json!({}));
        assert_eq!(e1.previous_hash, e0.hash);
        assert!(log.verify().is_ok());
    }

    #[test]
    fn tampering_breaks_verification() {
        let log = AuditLog::new();
        log.append("a", serde_json::json!({"x": 1}));
        log.append("b", serde_json::json!({"x": 2}));
        {
            let mut entries = log.entries.write();
            entries[0].payload = serde_json::json!({"x": 999});
        }
        assert_eq!(log.verify(), Err(0));
    }

    #[test]
    fn empty_log_verifies() {
        let log = AuditLog::new();
        assert!(log.verify().is_ok());
    }
}
