//! `convo-core` — shared domain types, configuration, and error taxonomy for
//! every component of the messaging platform.

pub mod backoff;
pub mod config;
pub mod error;
pub mod object_store;
pub mod types;

pub use config::ConvoConfig;
pub use error::{ConvoError, ErrorClass, Result};
pub use object_store::{FsObjectStore, ObjectStore, ObjectStoreError};
pub use types::{
    AdminScope, AutomationJobId, AutomationRuleId, BrandId, ChannelId, ChannelType,
    ConversationId, CorrelationId, DeliveryId, EventId, IngestionJobId, KnowledgeAssetId,
    MessageLogId, PolicyVersionId, TenantId, VectorRecordId,
};
