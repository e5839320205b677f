use crate::types::{GuardrailAction, GuardrailContext, GuardrailRule};

/// Flags a fixed denylist of terms. Real deployments would swap this for a
/// classifier; the chain only needs the `GuardrailRule` contract to hold.
pub struct ProfanityFilter {
    denylist: Vec<String>,
}

impl ProfanityFilter {
    pub fn new(denylist: Vec<String>) -> Self {
        Self { denylist: denylist.into_iter().map(|s| s.to_lowercase()).collect() }
    }
}

impl Default for ProfanityFilter {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl GuardrailRule for ProfanityFilter {
    fn name(&self) -> &str {
        "profanity_filter"
    }

    fn check(&self, ctx: &GuardrailContext) -> GuardrailAction {
        let lower = ctx.content.to_lowercase();
        match self.denylist.iter().find(|term| lower.contains(term.as_str())) {
            Some(term) => GuardrailAction::Rewrite { reason: format!("matched denylist term '{term}'") },
            None => GuardrailAction::Accept,
        }
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
    fn clean_message_accepted() {
        let filter = ProfanityFilter::new(vec!["badword".into()]);
        assert_eq!(filter.check(&ctx("hello there")), GuardrailAction::Accept);
    }

    #[test]
    fn denylisted_message_rewritten() {
        let filter = ProfanityFilter::new(vec!["badword".into()]);
        assert!(matches!(filter.check(&ctx("this has badword in it")), GuardrailAction::Rewrite { .. }));
    }
}
