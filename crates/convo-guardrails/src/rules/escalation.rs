use crate::types::{GuardrailAction, GuardrailContext, GuardrailRule};

const EXPLICIT_REQUEST_MARKERS: &[&str] = &["talk to a human", "speak to a person", "human agent"];

/// Escalation heuristics: low model confidence or an explicit user request
/// for a human hands the conversation off without blocking the reply itself.
pub struct EscalationHeuristic;

impl GuardrailRule for EscalationHeuristic {
    fn name(&self) -> &str {
        "escalation_heuristic"
    }

    fn check(&self, ctx: &GuardrailContext) -> GuardrailAction {
        if ctx.low_confidence {
            return GuardrailAction::Escalate { reason: "low model confidence".into() };
        }
        let lower = ctx.content.to_lowercase();
        if let Some(marker) = EXPLICIT_REQUEST_MARKERS.iter().find(|m| lower.contains(*m)) {
            return GuardrailAction::Escalate { reason: format!("explicit handoff request: '{marker}'") };
        }
        GuardrailAction::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(content: &str, low_confidence: bool) -> GuardrailContext {
        GuardrailContext {
            tenant_id: "t1".into(),
            conversation_id: "c1".into(),
            content: content.into(),
            fallback_copy: "fallback".into(),
            low_confidence,
        }
    }

    #[test]
    fn low_confidence_escalates() {
        assert!(matches!(EscalationHeuristic.check(&ctx("ok", true)), GuardrailAction::Escalate { .. }));
    }

    #[test]
    fn confident_reply_is_accepted() {
        assert_eq!(EscalationHeuristic.check(&ctx("all set", false)), GuardrailAction::Accept);
    }
}
