use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// New time-sortable id (UUIDv7) — convenient for `ORDER BY id` scans.
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

uuid_id!(TenantId, "Tenant identifier. Every row in the system carries one, directly or transitively.");
uuid_id!(BrandId, "Brand identifier, always scoped to a Tenant.");
uuid_id!(ChannelId, "Channel identifier, always scoped to a Brand.");
uuid_id!(ConversationId, "Conversation identifier, unique per (channel_id, external_sender_id).");
uuid_id!(MessageLogId, "MessageLog row identifier.");
uuid_id!(PolicyVersionId, "PolicyVersion row identifier.");
uuid_id!(KnowledgeAssetId, "KnowledgeAsset identifier.");
uuid_id!(IngestionJobId, "IngestionJob identifier.");
uuid_id!(AutomationRuleId, "AutomationRule identifier.");
uuid_id!(AutomationJobId, "AutomationJob identifier.");
uuid_id!(VectorRecordId, "VectorRecord identifier.");

/// Idempotency key for an inbound event, supplied by the originating channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Idempotency key for an outbound delivery, minted by the Orchestrator at publish time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeliveryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Correlation id threaded through a request's entire life, from webhook to outbound delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use the caller-supplied `X-Request-ID` when present, otherwise mint one.
    pub fn from_header_or_new(header: Option<&str>) -> Self {
        match header {
            Some(v) if !v.is_empty() => Self(v.to_string()),
            _ => Self::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The channel types a Brand can expose, per the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Instagram,
    Whatsapp,
    Telegram,
    Web,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Instagram => "instagram",
            ChannelType::Whatsapp => "whatsapp",
            ChannelType::Telegram => "telegram",
            ChannelType::Web => "web",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "instagram" => Ok(ChannelType::Instagram),
            "whatsapp" => Ok(ChannelType::Whatsapp),
            "telegram" => Ok(ChannelType::Telegram),
            "web" => Ok(ChannelType::Web),
            other => Err(format!("unknown channel type: {other}")),
        }
    }
}

/// Admin JWT scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminScope {
    PlatformAdmin,
    TenantOperator,
}

impl AdminScope {
    /// Platform admins bypass tenant scoping; operators are pinned to one tenant.
    pub fn is_platform_admin(&self) -> bool {
        matches!(self, AdminScope::PlatformAdmin)
    }
}

impl std::str::FromStr for AdminScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "platform_admin" => Ok(AdminScope::PlatformAdmin),
            "tenant_operator" => Ok(AdminScope::TenantOperator),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}
