use std::collections::HashMap;

use convo_core::backoff::BackoffPolicy;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{channel::Channel, error::ChannelError, types::ChannelStatus};

/// Reconnect backoff: 5s base, doubling, capped, generous attempt budget —
/// channel reconnects are cheaper to retry than message delivery, so this
/// uses its own policy rather than `BackoffPolicy::WEBHOOK_BUFFER`.
const RECONNECT_POLICY: BackoffPolicy = BackoffPolicy {
    base_ms: 5_000,
    factor: 2.0,
    jitter_fraction: 0.10,
    cap_ms: 300_000,
    max_attempts: 10,
};

/// Manages a collection of channel adapters.
///
/// Channels are stored by their [`Channel::name`] and can be connected,
/// disconnected, or queried as a group. The manager applies exponential
/// backoff with jitter when a channel connection fails.
pub struct ChannelManager {
    channels: HashMap<String, Box<dyn Channel + Send + Sync>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self { channels: HashMap::new() }
    }

    /// Register a channel adapter. Replaces any prior adapter of the same name.
    pub fn register(&mut self, channel: Box<dyn Channel + Send + Sync>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registering channel adapter");
        self.channels.insert(name, channel);
    }

    /// Connect all registered channels, sequentially, with backoff per channel.
    pub async fn connect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "connecting channel");
            if let Err(e) = connect_with_backoff(name, channel.as_mut()).await {
                error!(channel = %name, error = %e, "failed to connect channel after retries");
            }
        }
    }

    /// Disconnect all registered channels. Errors are logged, not propagated.
    pub async fn disconnect_all(&mut self) {
        for (name, channel) in self.channels.iter_mut() {
            info!(channel = %name, "disconnecting channel");
            if let Err(e) = channel.disconnect().await {
                warn!(channel = %name, error = %e, "error while disconnecting channel");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&(dyn Channel + Send + Sync)> {
        self.channels.get(name).map(|b| b.as_ref())
    }

    /// Current status for every registered channel, sorted by name.
    pub fn statuses(&self) -> Vec<(String, ChannelStatus)> {
        let mut result: Vec<(String, ChannelStatus)> =
            self.channels.iter().map(|(name, ch)| (name.clone(), ch.status())).collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn connect_with_backoff(name: &str, channel: &mut dyn Channel) -> Result<(), ChannelError> {
    for attempt in 1..=RECONNECT_POLICY.max_attempts {
        match channel.connect().await {
            Ok(()) => {
                info!(channel = %name, attempt, "channel connected successfully");
                return Ok(());
            }
            Err(e) if attempt == RECONNECT_POLICY.max_attempts => {
                return Err(e);
            }
            Err(e) => {
                let delay = RECONNECT_POLICY.delay_for(attempt);
                warn!(
                    channel = %name,
                    attempt,
                    max = RECONNECT_POLICY.max_attempts,
                    error = %e,
                    retry_after_ms = delay.as_millis() as u64,
                    "channel connect failed, retrying with backoff"
                );
                sleep(delay).await;
            }
        }
    }

    unreachable!("backoff loop exited without returning")
}
