pub mod escalation;
pub mod pii;
pub mod profanity;
pub mod safety;

pub use escalation::EscalationHeuristic;
pub use pii::PiiLeakScan;
pub use profanity::ProfanityFilter;
pub use safety::PolicySafetyCheck;
