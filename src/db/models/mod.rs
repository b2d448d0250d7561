pub mod activity;
pub mod session;

pub use activity::{is_valid_score, Activity, NewActivity, ScoreCorrection, MAX_SCORE, MIN_SCORE};
pub use session::{CommitConflict, CommitOutcome, Session, SessionOrigin};
