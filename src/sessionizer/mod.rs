//! Store-bound orchestration of the segmentation engine.

pub mod batch_job;
pub mod gaps;
pub mod online;
pub mod worker;

pub use batch_job::{run_batch, BatchReport};
pub use gaps::{gap_ranges, reconcile_gaps, reconcile_horizon, GapRange, ReconcileReport};
pub use online::OnlineSessionizer;
pub use worker::{ingest_loop, reconcile_loop, IngestSummary};

use crate::db::models::CommitConflict;
use crate::error::EngineError;

pub(crate) fn conflict_error(conflict: CommitConflict) -> EngineError {
    match conflict {
        CommitConflict::AlreadyAssigned {
            expected,
            activity_ids,
        } => EngineError::AssignmentConflict {
            expected,
            already_assigned: activity_ids.len(),
        },
        CommitConflict::SpanOverlap {
            start,
            end,
            existing_id,
        } => EngineError::SpanConflict {
            start,
            end,
            existing_id,
        },
    }
}
