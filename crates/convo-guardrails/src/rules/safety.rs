use serde_json::Value;

use crate::types::{GuardrailAction, GuardrailContext, GuardrailRule};

/// Policy-specific safety rules: a tenant's published policy carries a list
/// of forbidden topics/phrases under `policy_json.safety.forbidden_phrases`.
pub struct PolicySafetyCheck {
    forbidden_phrases: Vec<String>,
}

impl PolicySafetyCheck {
    pub fn from_policy_json(policy_json: &Value) -> Self {
        let forbidden_phrases = policy_json
            .get("safety")
            .and_then(|s| s.get("forbidden_phrases"))
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_lowercase)).collect())
            .unwrap_or_default();
        Self { forbidden_phrases }
    }
}

impl GuardrailRule for PolicySafetyCheck {
    fn name(&self) -> &str {
        "policy_safety_check"
    }

    fn check(&self, ctx: &GuardrailContext) -> GuardrailAction {
        let lower = ctx.content.to_lowercase();
        match self.forbidden_phrases.iter().find(|p| lower.contains(p.as_str())) {
            Some(phrase) => {
                GuardrailAction::Rewrite { reason: format!("response touched forbidden topic '{phrase}'") }
            }
            None => GuardrailAction::Accept,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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
    fn forbidden_topic_triggers_rewrite() {
        let policy = json!({"safety": {"forbidden_phrases": ["medical advice"]}});
        let rule = PolicySafetyCheck::from_policy_json(&policy);
        assert!(matches!(rule.check(&ctx("here is some medical advice")), GuardrailAction::Rewrite { .. }));
    }
}
