use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{GuardrailAction, GuardrailContext, GuardrailRule};

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap()
});
static CREDIT_CARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:\d[ -]?){13,16}\b").unwrap());
static SSN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

/// Scans the LLM's draft for patterns that look like leaked personal data.
pub struct PiiLeakScan;

impl GuardrailRule for PiiLeakScan {
    fn name(&self) -> &str {
        "pii_leak_scan"
    }

    fn check(&self, ctx: &GuardrailContext) -> GuardrailAction {
        if EMAIL.is_match(&ctx.content) {
            return GuardrailAction::Rewrite { reason: "response contains an email address".into() };
        }
        if CREDIT_CARD.is_match(&ctx.content) {
            return GuardrailAction::Rewrite { reason: "response contains a card-number-shaped sequence".into() };
        }
        if SSN.is_match(&ctx.content) {
            return GuardrailAction::Rewrite { reason: "response contains an SSN-shaped sequence".into() };
        }
        GuardrailAction::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(content: &str) -> GuardrailContext {
        GuardrailContext {
            tenant_id: "t1".into(),
            conversation_id: "c1".into(),
            content: content.into(),
            fallback_copy: "fallback".into(),
            low_confidence: false,
        }
    }

    #[test]
    fn plain_text_accepted() {
        assert_eq!(PiiLeakScan.check(&ctx("your order ships tomorrow")), GuardrailAction::Accept);
    }

    #[test]
    fn email_triggers_rewrite() {
        assert!(matches!(
            PiiLeakScan.check(&ctx("contact me at jane.doe@example.com")),
            GuardrailAction::Rewrite { .. }
        ));
    }
}
