use std::sync::RwLock;
use std::time::Instant;

use tracing::{debug, warn};

use crate::types::{GuardrailAction, GuardrailContext, GuardrailDefinition, GuardrailVerdict};

/// Central registry and runner for the guardrail chain.
///
/// There is no Before/After split — every guardrail rule runs synchronously
/// and in order, since the pipeline must know the final verdict before
/// persisting or publishing.
pub struct GuardrailEngine {
    /// Sorted by priority ascending after every registration.
    rules: RwLock<Vec<GuardrailDefinition>>,
}

impl GuardrailEngine {
    pub fn new() -> Self {
        Self { rules: RwLock::new(Vec::new()) }
    }

    pub fn register(&self, def: GuardrailDefinition) {
        let mut rules = self.rules.write().expect("guardrail registry poisoned");
        rules.push(def);
        rules.sort_by_key(|r| r.priority);
        debug!(name = %rules.last().unwrap().name, "guardrail rule registered");
    }

    pub fn unregister(&self, name: &str) {
        let mut rules = self.rules.write().expect("guardrail registry poisoned");
        rules.retain(|r| r.name != name);
    }

    /// Run every registered rule in priority order, combining their verdicts.
    ///
    /// A rule that rewrites sees its rewrite reflected in `ctx.content` for
    /// the next rule; escalation never demotes to a lower-severity outcome.
    pub fn run(&self, mut ctx: GuardrailContext) -> GuardrailVerdict {
        let rules = self.rules.read().expect("guardrail registry poisoned");
        let mut combined = GuardrailAction::Accept;

        for def in rules.iter() {
            let t = Instant::now();
            let action = def.rule.check(&ctx);
            let elapsed_ms = t.elapsed().as_millis() as u64;

            match &action {
                GuardrailAction::Rewrite { reason } => {
                    warn!(rule = %def.name, reason, duration_ms = elapsed_ms, "guardrail rewrote response");
                    ctx.content = ctx.fallback_copy.clone();
                }
                GuardrailAction::Escalate { reason } => {
                    warn!(rule = %def.name, reason, duration_ms = elapsed_ms, "guardrail escalated conversation");
                }
                GuardrailAction::Accept => {
                    debug!(rule = %def.name, duration_ms = elapsed_ms, "guardrail accepted");
                }
            }

            combined = combined.combine(action);
        }

        GuardrailVerdict {
            escalated: matches!(combined, GuardrailAction::Escalate { .. }),
            action: combined,
            content: ctx.content,
        }
    }
}

impl Default for GuardrailEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct AlwaysAccept;
    impl crate::types::GuardrailRule for AlwaysAccept {
        fn name(&self) -> &str {
            "always_accept"
        }
        fn check(&self, _ctx: &GuardrailContext) -> GuardrailAction {
            GuardrailAction::Accept
        }
    }

    struct AlwaysRewrite;
    impl crate::types::GuardrailRule for AlwaysRewrite {
        fn name(&self) -> &str {
            "always_rewrite"
        }
        fn check(&self, _ctx: &GuardrailContext) -> GuardrailAction {
            GuardrailAction::Rewrite { reason: "test".into() }
        }
    }

    struct AlwaysEscalate;
    impl crate::types::GuardrailRule for AlwaysEscalate {
        fn name(&self) -> &str {
            "always_escalate"
        }
        fn check(&self, _ctx: &GuardrailContext) -> GuardrailAction {
            GuardrailAction::Escalate { reason: "test".into() }
        }
    }

    fn ctx() -> GuardrailContext {
        GuardrailContext {
            tenant_id: "t1".into(),
            conversation_id: "c1".into(),
            content: "draft reply".into(),
            fallback_copy: "fallback".into(),
            low_confidence: false,
        }
    }

    #[test]
    fn accept_passes_through_unchanged() {
        let engine = GuardrailEngine::new();
        engine.register(GuardrailDefinition::new("a", Arc::new(AlwaysAccept)));
        let verdict = engine.run(ctx());
        assert_eq!(verdict.action, GuardrailAction::Accept);
        assert_eq!(verdict.content, "draft reply");
        assert!(!verdict.escalated);
    }

    #[test]
    fn rewrite_substitutes_fallback_copy() {
        let engine = GuardrailEngine::new();
        engine.register(GuardrailDefinition::new("r", Arc::new(AlwaysRewrite)));
        let verdict = engine.run(ctx());
        assert_eq!(verdict.content, "fallback");
        assert!(!verdict.escalated);
    }

    #[test]
    fn escalate_outranks_rewrite_and_still_publishes() {
        let engine = GuardrailEngine::new();
        engine.register(GuardrailDefinition::new("r", Arc::new(AlwaysRewrite)).with_priority(0));
        engine.register(GuardrailDefinition::new("e", Arc::new(AlwaysEscalate)).with_priority(1));
        let verdict = engine.run(ctx());
        assert!(verdict.escalated);
        assert!(matches!(verdict.action, GuardrailAction::Escalate { .. }));
    }
}
