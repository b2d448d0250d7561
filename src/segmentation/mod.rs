pub mod batch;
pub mod config;
pub mod ema;
pub mod naming;
pub mod overlap;
pub mod rolling;
pub mod streaming;
pub mod summary;

pub use batch::{classify, partition, ActivityClass, ActivityGroup};
pub use config::{BatchConfig, SegmenterConfig};
pub use ema::SmoothedSignal;
pub use naming::name_session;
pub use overlap::{find_overlaps, verify_sessions, Overlap, OverlapPolicy, SessionSpan};
pub use rolling::{RollingStats, Thresholds};
pub use streaming::{Segmenter, SegmenterEvent, SegmenterState};
pub use summary::{ScoredActivity, SessionDraft};
