//! Bulk orchestration over many assets.
//!
//! Ids are de-duplicated (first occurrence wins) and processed in
//! fixed-size batches. Each batch runs on the rayon pool; because every id
//! is distinct, no asset is ever touched by two workers at once. Progress
//! is reported per asset and per batch over an optional channel, in id
//! order within each batch.

use crate::error::{EngineError, ErrorKind};
use crate::types::AssetId;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::mpsc::Sender;

/// Which per-asset operation a bulk run applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOperation {
    Regenerate,
    Cleanup,
    Convert,
}

impl BulkOperation {
    pub fn label(self) -> &'static str {
        match self {
            Self::Regenerate => "regenerate",
            Self::Cleanup => "cleanup",
            Self::Convert => "convert",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetOutcome {
    Succeeded { detail: String },
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkEvent {
    AssetFinished {
        id: AssetId,
        processed: usize,
        total: usize,
        outcome: AssetOutcome,
    },
    BatchFinished {
        batch: usize,
        batches: usize,
        processed: usize,
        total: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub id: AssetId,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BulkSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<BulkFailure>,
}

/// Distinct ids in first-seen order.
pub fn dedup_ids(ids: &[AssetId]) -> Vec<AssetId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Apply `op` to every distinct id, `batch_size` at a time.
///
/// A failing asset never stops the run; it is counted and reported.
pub fn run_bulk<F>(
    ids: &[AssetId],
    batch_size: usize,
    op: F,
    events: Option<Sender<BulkEvent>>,
) -> BulkSummary
where
    F: Fn(AssetId) -> Result<String, EngineError> + Sync,
{
    let ids = dedup_ids(ids);
    let total = ids.len();
    let batch_size = batch_size.max(1);
    let batches = total.div_ceil(batch_size);
    let emit = |event: BulkEvent| {
        if let Some(tx) = &events {
            // The receiver may already be gone; progress is best-effort
            let _ = tx.send(event);
        }
    };

    let mut summary = BulkSummary {
        total,
        ..BulkSummary::default()
    };
    let mut processed = 0;

    for (index, batch) in ids.chunks(batch_size).enumerate() {
        let results: Vec<(AssetId, Result<String, EngineError>)> =
            batch.par_iter().map(|&id| (id, op(id))).collect();

        for (id, result) in results {
            processed += 1;
            let outcome = match result {
                Ok(detail) => {
                    summary.succeeded += 1;
                    AssetOutcome::Succeeded { detail }
                }
                Err(e) => {
                    tracing::warn!(asset = id, error = %e, "bulk operation failed");
                    let failure = BulkFailure {
                        id,
                        kind: e.kind(),
                        message: e.to_string(),
                    };
                    let outcome = AssetOutcome::Failed {
                        kind: failure.kind,
                        message: failure.message.clone(),
                    };
                    summary.failed.push(failure);
                    outcome
                }
            };
            emit(BulkEvent::AssetFinished {
                id,
                processed,
                total,
                outcome,
            });
        }

        emit(BulkEvent::BatchFinished {
            batch: index + 1,
            batches,
            processed,
            total,
        });
    }

    summary
}
