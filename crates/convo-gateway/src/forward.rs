//! Forwards normalized inbound messages to the Orchestrator, with a local
//! durable retry buffer for transient failures.

use std::collections::VecDeque;
use std::sync::Mutex;

use convo_channels::InboundMessage;
use convo_core::backoff::BackoffPolicy;
use convo_core::types::CorrelationId;
use tracing::warn;

use crate::app::AppState;

/// Bound on the local buffer so a sustained Orchestrator outage fails
/// loudly (503) instead of growing memory without limit.
const MAX_BUFFERED: usize = 10_000;

pub enum ForwardError {
    /// Forwarding failed transiently and the event was queued locally for retry.
    Buffered,
    /// The local retry buffer is already full; caller should return 503.
    BufferFull,
}

struct BufferedEvent {
    msg: InboundMessage,
    correlation_id: CorrelationId,
    attempt: u32,
}

/// Local durable retry buffer, keyed implicitly by FIFO order; `event_id` on
/// each buffered message is the idempotency key the Orchestrator dedupes on.
pub struct RetryBuffer {
    queue: Mutex<VecDeque<BufferedEvent>>,
}

impl RetryBuffer {
    pub fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()) }
    }

    fn push(&self, msg: InboundMessage, correlation_id: CorrelationId) -> Result<(), ForwardError> {
        let mut q = self.queue.lock().unwrap();
        if q.len() >= MAX_BUFFERED {
            return Err(ForwardError::BufferFull);
        }
        q.push_back(BufferedEvent { msg, correlation_id, attempt: 0 });
        Ok(())
    }

    fn pop(&self) -> Option<BufferedEvent> {
        self.queue.lock().unwrap().pop_front()
    }

    fn requeue(&self, event: BufferedEvent) {
        self.queue.lock().unwrap().push_back(event);
    }
}

impl Default for RetryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Attempt to forward `msg` to the Orchestrator once. On a transient failure
/// (network error or 5xx), enqueue it in the process-local retry buffer
/// instead of propagating the error to the webhook caller.
pub async fn forward_inbound(
    state: &AppState,
    msg: &InboundMessage,
    correlation_id: &CorrelationId,
) -> Result<(), ForwardError> {
    match try_forward_once(state, msg, correlation_id).await {
        Ok(()) => Ok(()),
        Err(()) => {
            state.retry_buffer.push(msg.clone(), correlation_id.clone())?;
            Err(ForwardError::Buffered)
        }
    }
}

async fn try_forward_once(
    state: &AppState,
    msg: &InboundMessage,
    correlation_id: &CorrelationId,
) -> Result<(), ()> {
    let Some(base_url) = state.config.server.orchestrator_url.as_deref() else {
        warn!("no orchestrator_url configured; buffering webhook locally");
        return Err(());
    };

    let url = format!("{}/v1/messages/inbound", base_url.trim_end_matches('/'));
    let resp = state
        .http
        .post(&url)
        .header("x-request-id", correlation_id.as_str())
        .json(msg)
        .send()
        .await;

    match resp {
        Ok(r) if r.status().is_success() || r.status().as_u16() == 409 => Ok(()),
        Ok(r) => {
            warn!(status = %r.status(), "orchestrator rejected inbound message, buffering");
            Err(())
        }
        Err(e) => {
            warn!(error = %e, "orchestrator unreachable, buffering");
            Err(())
        }
    }
}

/// Background task draining the local retry buffer with the same backoff
/// schedule as the inbound webhook buffer policy.
pub async fn run_retry_drain(state: std::sync::Arc<AppState>) {
    const POLICY: BackoffPolicy = BackoffPolicy::WEBHOOK_BUFFER;
    loop {
        let Some(mut event) = state.retry_buffer.pop() else {
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            continue;
        };

        event.attempt += 1;
        match try_forward_once(&state, &event.msg, &event.correlation_id).await {
            Ok(()) => {}
            Err(()) if event.attempt >= POLICY.max_attempts => {
                warn!(event_id = %event.msg.event_id, attempts = event.attempt, "dropping event after exhausting retries");
            }
            Err(()) => {
                let delay = POLICY.delay_for(event.attempt);
                tokio::time::sleep(delay).await;
                state.retry_buffer.requeue(event);
            }
        }
    }
}
