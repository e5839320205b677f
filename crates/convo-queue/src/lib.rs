pub mod error;
pub mod events;
pub mod outbound;
pub mod types;

pub use error::{QueueError, Result};
pub use events::EventLog;
pub use outbound::{OutboundQueue, DELIVERY_BACKOFF};
pub use types::{DomainEvent, OutboundRecord};
