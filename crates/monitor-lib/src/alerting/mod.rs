//! Alert raising and lifecycle
//!
//! This module provides:
//! - Static warning/critical threshold checks
//! - The alert store with de-duplication and state transitions
//! - Fire-and-forget subscriber fan-out

mod fanout;
mod store;
mod threshold;

pub use fanout::{Callback, FanoutReport, SubscriptionId, Subscribers};
pub use store::{AlertCounts, AlertDraft, AlertStore, CreateOutcome, AUTO_RESOLVE_ACTOR};
pub use threshold::{StaticThreshold, ThresholdAlerter, ThresholdBreach};
