//! `convo-guardrails` — the policy-driven safety chain applied to LLM output:
//! profanity filter, PII leak scan, policy-specific safety checks, and
//! escalation heuristics.

pub mod engine;
pub mod error;
pub mod rules;
pub mod types;

pub use engine::GuardrailEngine;
pub use error::{GuardrailError, Result};
pub use types::{
    GuardrailAction, GuardrailContext, GuardrailDefinition, GuardrailRule, GuardrailVerdict,
};
