//! Request-path shared state: the idempotency cache and the run store.
//!
//! Both are mutex-guarded maps, the only mutable state touched while
//! serving requests; everything else is populated at startup and read-only.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::orchestrator::types::{OperationRequest, OperationResponse};

struct IdempotencyEntry {
    fingerprint: String,
    response: OperationResponse,
}

/// Globally-scoped idempotency cache: the same key with the same payload
/// replays the stored response without re-executing any model call; the
/// same key with a different payload is a conflict.
#[derive(Default)]
pub struct IdempotencyCache {
    entries: Mutex<HashMap<String, IdempotencyEntry>>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical fingerprint of the parts of a request that must match for
    /// a replay. serde_json maps are sorted, so this is deterministic.
    pub fn fingerprint(request: &OperationRequest) -> String {
        serde_json::json!({
            "feature": request.feature,
            "operation": request.operation,
            "data": request.data,
            "model_id": request.model_id,
        })
        .to_string()
    }

    /// Returns a stored response for a matching replay, `None` for an
    /// unseen key, or `IdempotencyConflict` when the key is reused with a
    /// different payload.
    pub fn check(
        &self,
        key: &str,
        fingerprint: &str,
    ) -> Result<Option<OperationResponse>, AppError> {
        let entries = self.entries.lock().expect("idempotency cache poisoned");
        match entries.get(key) {
            None => Ok(None),
            Some(entry) if entry.fingerprint == fingerprint => Ok(Some(entry.response.clone())),
            Some(_) => Err(AppError::idempotency_conflict(format!(
                "idempotency key '{key}' was already used with a different payload"
            ))),
        }
    }

    pub fn store(&self, key: &str, fingerprint: &str, response: &OperationResponse) {
        let mut entries = self.entries.lock().expect("idempotency cache poisoned");
        entries.insert(
            key.to_string(),
            IdempotencyEntry {
                fingerprint: fingerprint.to_string(),
                response: response.clone(),
            },
        );
    }
}

/// A completed run retained for later retrieval.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub response: OperationResponse,
    pub completed_at: DateTime<Utc>,
}

/// Completed responses by run id, so callers holding a `run_id` can fetch
/// the result after the fact.
#[derive(Default)]
pub struct RunStore {
    runs: Mutex<HashMap<Uuid, RunRecord>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, run_id: Uuid, response: &OperationResponse) {
        let mut runs = self.runs.lock().expect("run store poisoned");
        runs.insert(
            run_id,
            RunRecord {
                response: response.clone(),
                completed_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, run_id: Uuid) -> Result<RunRecord, AppError> {
        let runs = self.runs.lock().expect("run store poisoned");
        runs.get(&run_id).cloned().ok_or_else(|| {
            AppError::run_not_found(format!("no completed run with id '{run_id}'"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::types::{ExecutionMetadata, ExecutionMode};
    use serde_json::json;

    fn request(data: serde_json::Value) -> OperationRequest {
        serde_json::from_value(json!({
            "feature": "pillars",
            "operation": "validate",
            "data": data,
            "model_id": "gemini",
            "idempotency_key": "key-1",
        }))
        .unwrap()
    }

    fn response() -> OperationResponse {
        OperationResponse {
            results: json!({"is_valid": true}),
            metadata: ExecutionMetadata {
                execution_time_ms: 12,
                models_used: vec!["gemini-2.5-flash".to_string()],
                execution_mode: ExecutionMode::Monolithic,
                operation_metadata: Default::default(),
            },
        }
    }

    #[test]
    fn test_same_key_same_payload_replays() {
        let cache = IdempotencyCache::new();
        let request = request(json!({"name": "Core Mechanic"}));
        let fingerprint = IdempotencyCache::fingerprint(&request);

        assert!(cache.check("key-1", &fingerprint).unwrap().is_none());
        cache.store("key-1", &fingerprint, &response());

        let replayed = cache.check("key-1", &fingerprint).unwrap().unwrap();
        assert_eq!(replayed.results, json!({"is_valid": true}));
    }

    #[test]
    fn test_same_key_different_payload_conflicts() {
        let cache = IdempotencyCache::new();
        let first = IdempotencyCache::fingerprint(&request(json!({"name": "A"})));
        let second = IdempotencyCache::fingerprint(&request(json!({"name": "B"})));
        cache.store("key-1", &first, &response());

        let error = cache.check("key-1", &second).unwrap_err();
        assert_eq!(error.code(), "idempotency_conflict");
    }

    #[test]
    fn test_fingerprint_ignores_run_id() {
        let mut with_run = request(json!({"name": "A"}));
        with_run.run_id = Some(Uuid::new_v4());
        let without_run = request(json!({"name": "A"}));
        assert_eq!(
            IdempotencyCache::fingerprint(&with_run),
            IdempotencyCache::fingerprint(&without_run)
        );
    }

    #[test]
    fn test_run_store_round_trip_and_miss() {
        let store = RunStore::new();
        let run_id = Uuid::new_v4();
        store.store(run_id, &response());

        let record = store.get(run_id).unwrap();
        assert_eq!(record.response.metadata.execution_time_ms, 12);

        let error = store.get(Uuid::new_v4()).unwrap_err();
        assert_eq!(error.code(), "run_not_found");
    }
}
