use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The context a guardrail rule is asked to judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailContext {
    pub tenant_id: String,
    pub conversation_id: String,
    /// The LLM's draft reply. Mutated in place by `Rewrite` actions so later
    /// rules see the updated text.
    pub content: String,
    /// Policy-provided fallback copy, substituted in on `Rewrite`.
    pub fallback_copy: String,
    /// Confidence signal carried over from the LLM call stage, consulted by
    /// escalation heuristics alongside any explicit escalation request in
    /// the message text.
    pub low_confidence: bool,
}

/// What a single guardrail rule decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum GuardrailAction {
    Accept,
    Rewrite { reason: String },
    Escalate { reason: String },
}

impl GuardrailAction {
    /// Escalate > Rewrite > Accept — later rules can only raise severity.
    fn severity(&self) -> u8 {
        match self {
            GuardrailAction::Accept => 0,
            GuardrailAction::Rewrite { .. } => 1,
            GuardrailAction::Escalate { .. } => 2,
        }
    }

    pub fn combine(self, other: GuardrailAction) -> GuardrailAction {
        if other.severity() >= self.severity() {
            other
        } else {
            self
        }
    }
}

/// Final decision after running the whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailVerdict {
    pub action: GuardrailAction,
    /// Content to actually publish — fallback copy when the action rewrote it.
    pub content: String,
    pub escalated: bool,
}

/// A single guardrail check. Implementations must be cheap and synchronous —
/// the chain runs inline in the request path, not on a background task.
pub trait GuardrailRule: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, ctx: &GuardrailContext) -> GuardrailAction;
}

/// A registered rule plus its priority in the chain.
pub struct GuardrailDefinition {
    pub name: String,
    pub rule: Arc<dyn GuardrailRule>,
    /// Lower value = earlier execution. Ties broken by registration order.
    pub priority: i32,
}

impl GuardrailDefinition {
    pub fn new(name: impl Into<String>, rule: Arc<dyn GuardrailRule>) -> Self {
        Self { name: name.into(), rule, priority: 0 }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
