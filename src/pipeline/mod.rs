//! Triage pipeline.
//!
//! Every listed message the run's `MessageSelector` keeps flows through:
//! 1. `normalize()`: body part tree → plain text
//! 2. `SummaryEngine::summarize()`: abstractive or extractive summary
//! 3. `EligibilityPolicy::evaluate()`: may this message be auto-replied to?
//! 4. `ReplyComposer` + claim-then-send, unless dry run or auto-reply is off

pub mod compose;
pub mod policy;
pub mod processor;
pub mod select;
pub mod types;

pub use compose::{ReplyComposer, reply_envelope, reply_subject};
pub use policy::{
    AutomationRule, EligibilityPolicy, EligibilityVerdict, IneligibleReason, RuleCheck,
    default_automation_rules,
};
pub use processor::TriageProcessor;
pub use select::{
    ArrivalWindow, DateHeaderMatch, MessageSelector, find_by_arrival, parse_utc_offset,
    select_messages,
};
pub use types::{ReplyAction, TriageReport};
