//! Pacekeeper - behavioral pacing and adaptive governance for automated UI actions
//!
//! Pacekeeper plans how an automated agent moves, types and scrolls so the
//! input looks like a person's, and decides when and how often it may act:
//! an operating-hours schedule, multi-window rate ceilings with a circuit
//! breaker, and a dedup filter for entities already handled.
//!
//! ## Modules
//!
//! - **Synthesis**: [`motion`], [`keystroke`], [`scroll`], [`attention`], [`timing`]
//! - **Governance**: [`schedule`], [`limiter`], [`bloom`]
//! - **Execution**: [`playback`] drives plans against host-provided input surfaces
//! - **Facade**: [`governor::Governor`] owns one of everything for a run

pub mod attention;
pub mod bloom;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod governor;
pub mod keystroke;
pub mod limiter;
pub mod logging;
pub mod motion;
pub mod playback;
pub mod schedule;
pub mod scroll;
pub mod timing;
pub mod types;

pub use cancel::CancellationToken;
pub use config::GovernorConfig;
pub use error::GovernError;
pub use governor::Governor;

// Component exports
pub use attention::AttentionModel;
pub use bloom::BloomFilter;
pub use keystroke::KeystrokeSynthesizer;
pub use limiter::{ActionKind, AdaptiveRateLimiter, Admission, RejectReason, Rejection};
pub use motion::MotionSynthesizer;
pub use playback::{KeyboardSurface, Player, PointerSurface, ScrollSurface};
pub use schedule::{IdleReason, OperatingSchedule, ScheduleStatus};
pub use scroll::ScrollSynthesizer;
pub use timing::TimingProfile;

/// Pacekeeper version
pub const PACEKEEPER_VERSION: &str = env!("CARGO_PKG_VERSION");
