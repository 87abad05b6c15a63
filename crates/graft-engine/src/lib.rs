//! Update engine: classifies upstream changes against recorded per-file
//! state, detects conflicts as values, and applies mutations inside an
//! all-or-nothing file transaction.

pub mod classify;
pub mod orchestrator;
pub mod ownership;
pub mod transaction;

pub use classify::{
    ClassifyContext, ClassifyOptions, Conflict, ConflictReason, Plan, PlannedAction,
    PlannedDeletion, classify,
};
pub use orchestrator::{ApplyOptions, ApplyReport, CheckOutcome, Engine, UpdateCheck};
pub use ownership::{OwnershipConflict, OwnershipIndex};
pub use transaction::FileTransaction;
