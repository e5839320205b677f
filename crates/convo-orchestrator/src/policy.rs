//! Policy resolution: a tenant's published `PolicyVersion` drives the
//! persona, forbidden-topic list, and fallback copy fed to the guardrail
//! chain. Absent a publish, every tenant still gets a safe answer rather
//! than a raw model default.

use convo_store::PolicyVersion;
use serde_json::json;

/// Used whenever a tenant has never published a policy. Conservative: no
/// persona flourish, a short refusal fallback, no forbidden-phrase list
/// (the profanity/PII rules still run independently of policy content).
pub fn default_policy() -> PolicyVersion {
    PolicyVersion {
        id: Default::default(),
        tenant_id: Default::default(),
        version: 0,
        status: convo_store::PolicyStatus::Published,
        policy_json: json!({
            "persona": "You are a helpful support assistant. Answer only from the \
                        provided context and say you don't know rather than guessing.",
            "fallback_copy": "I'm not able to help with that right now — a team member will follow up shortly.",
            "safety": { "forbidden_phrases": [] },
        }),
        published_at: None,
    }
}

pub fn persona(policy: &PolicyVersion) -> String {
    policy
        .policy_json
        .get("persona")
        .and_then(|v| v.as_str())
        .unwrap_or("You are a helpful assistant.")
        .to_string()
}

pub fn fallback_copy(policy: &PolicyVersion) -> String {
    policy
        .policy_json
        .get("fallback_copy")
        .and_then(|v| v.as_str())
        .unwrap_or("I'm not able to help with that right now.")
        .to_string()
}
