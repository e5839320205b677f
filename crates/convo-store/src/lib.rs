mod automation;
mod conversation;
mod db;
mod ingestion;
mod policy;
mod store;
mod tenant;

pub mod error;
pub mod types;

pub use error::{Result, StoreError};
pub use store::ConvoStore;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use convo_core::types::ChannelType;
    use rusqlite::Connection;
    use std::collections::HashMap;

    fn store() -> ConvoStore {
        ConvoStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn conversation_upsert_reuses_row_for_same_sender() {
        let store = store();
        let tenant = store.create_tenant("acme", "UTC", HashMap::new()).unwrap();
        let brand = store.create_brand(&tenant.id, "acme-brand").unwrap();
        let channel = store
            .create_channel(&tenant.id, &brand.id, ChannelType::Web, "web", "s3cr3t", HashMap::new())
            .unwrap();

        let (c1, _) = store
            .upsert_conversation_and_log(
                &tenant.id, &brand.id, &channel.id, "u-1",
                Direction::In, "hi", HashMap::new(), None,
            )
            .unwrap();
        let (c2, _) = store
            .upsert_conversation_and_log(
                &tenant.id, &brand.id, &channel.id, "u-1",
                Direction::In, "again", HashMap::new(), None,
            )
            .unwrap();

        assert_eq!(c1.id, c2.id);
        let messages = store.recent_messages(&c1.id, 10).unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn publish_policy_keeps_at_most_one_published_version() {
        let store = store();
        let tenant = store.create_tenant("acme", "UTC", HashMap::new()).unwrap();
        let draft1 = store.create_draft_policy(&tenant.id, serde_json::json!({"v": 1})).unwrap();
        store.publish_policy(&draft1.id).unwrap();

        let draft2 = store.create_draft_policy(&tenant.id, serde_json::json!({"v": 2})).unwrap();
        store.publish_policy(&draft2.id).unwrap();

        let published = store.get_published_policy(&tenant.id).unwrap().unwrap();
        assert_eq!(published.id, draft2.id);
        assert_eq!(published.version, 2);
    }

    #[test]
    fn channel_secret_rotation_honors_grace_window() {
        let store = store();
        let tenant = store.create_tenant("acme", "UTC", HashMap::new()).unwrap();
        let brand = store.create_brand(&tenant.id, "b").unwrap();
        let channel = store
            .create_channel(&tenant.id, &brand.id, ChannelType::Web, "web", "old-secret", HashMap::new())
            .unwrap();

        let rotated = store.rotate_channel_secret(&channel.id, "new-secret").unwrap();
        assert!(store.verify_channel_secret(&rotated, "new-secret"));
        assert!(store.verify_channel_secret(&rotated, "old-secret"));
        assert!(!store.verify_channel_secret(&rotated, "wrong"));
    }

    #[test]
    fn reuploading_identical_content_does_not_duplicate_asset() {
        let store = store();
        let tenant = store.create_tenant("acme", "UTC", HashMap::new()).unwrap();
        let brand = store.create_brand(&tenant.id, "b").unwrap();

        let (a1, created1) = store
            .create_or_get_knowledge_asset(&tenant.id, &brand.id, "k1", "faq.md", "private", "sha-abc")
            .unwrap();
        let (a2, created2) = store
            .create_or_get_knowledge_asset(&tenant.id, &brand.id, "k2", "faq.md", "private", "sha-abc")
            .unwrap();

        assert!(created1);
        assert!(!created2);
        assert_eq!(a1.id, a2.id);
    }

    #[test]
    fn automation_throttle_blocks_immediate_refire() {
        let store = store();
        let tenant = store.create_tenant("acme", "UTC", HashMap::new()).unwrap();
        let brand = store.create_brand(&tenant.id, "b").unwrap();
        let rule = store
            .create_automation_rule(
                &tenant.id, &brand.id,
                Trigger::Cron { expression: "* * * * *".into() },
                None, ActionType::Webhook, serde_json::json!({}), 60, 3,
            )
            .unwrap();

        let now = chrono::Utc::now();
        assert!(store.throttle_elapsed(&rule, now));
        store.mark_rule_ran(&rule.id, now).unwrap();

        let refreshed = store.get_automation_rule(&rule.id).unwrap();
        assert!(!store.throttle_elapsed(&refreshed, now + chrono::Duration::seconds(10)));
        assert!(store.throttle_elapsed(&refreshed, now + chrono::Duration::seconds(61)));
    }
}
