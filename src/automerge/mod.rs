//! Auto-merge for a single PR
//!
//! Three parts:
//! 1. State - the `AutoMerge` state machine with an audit trail (pure, testable)
//! 2. Watch - diff consecutive PR observations into cancellation events (pure)
//! 3. Execute - drive poll, evaluate and merge until a final state (effectful)

mod execute;
mod state;
mod watch;

pub use execute::{AutoMergeOptions, AutoMergeOutcome, run_auto_merge};
pub use state::{
    AutoMerge, AutoMergeEvent, AutoMergeState, EnableContext, MergeAction, Transition,
    TransitionTrigger,
};
pub use watch::{Observation, detect_events};
