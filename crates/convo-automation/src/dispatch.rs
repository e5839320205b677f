//! Connector invocation: one function per `ActionType`, each wrapped by
//! [`execute_with_retry`] which applies the rule's retry budget with
//! exponential backoff, mirroring the Channel Gateway's outbound delivery
//! retry shape (`convo-gateway/src/outbound_worker.rs`) rather than
//! re-queueing the whole job on a transient failure.

use std::time::Duration;

use convo_core::backoff::BackoffPolicy;
use convo_core::config::EmailConfig;
use convo_store::ActionType;
use serde_json::Value;
use tracing::warn;

use crate::error::{AutomationError, Result};

const CONNECTOR_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts `action_type` against `payload` up to `max_retries` times with
/// jittered exponential backoff, returning the last error if every attempt
/// fails.
pub async fn execute_with_retry(
    http: &reqwest::Client,
    email: &EmailConfig,
    action_type: ActionType,
    payload: &Value,
    max_retries: u32,
) -> Result<()> {
    let policy = BackoffPolicy { max_attempts: max_retries.max(1), ..BackoffPolicy::WEBHOOK_BUFFER };
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match action_type {
            ActionType::Webhook => dispatch_webhook(http, payload).await,
            ActionType::Crm => dispatch_crm(http, payload).await,
            ActionType::Email => dispatch_email(email, payload).await,
        };
        match outcome {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= policy.max_attempts => return Err(e),
            Err(e) => {
                warn!(attempt, error = %e, action = %action_type, "connector attempt failed, retrying");
                tokio::time::sleep(policy.delay_for(attempt)).await;
            }
        }
    }
}

async fn dispatch_webhook(http: &reqwest::Client, payload: &Value) -> Result<()> {
    let url = payload
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| AutomationError::Config("webhook payload missing url".into()))?;
    let body = payload.get("body").cloned().unwrap_or(Value::Null);

    let resp = http.post(url).timeout(CONNECTOR_TIMEOUT).json(&body).send().await?;
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(AutomationError::BadStatus(resp.status().as_u16()))
    }
}

/// CRM connector: same HTTP-POST shape as the webhook connector, against a
/// CRM-specific endpoint and bearer token carried in the rule payload.
/// No CRM vendor SDK appears anywhere in the retrieval pack, so this speaks
/// the generic HTTP contract rather than fabricating a client crate.
async fn dispatch_crm(http: &reqwest::Client, payload: &Value) -> Result<()> {
    let url = payload
        .get("endpoint")
        .and_then(Value::as_str)
        .ok_or_else(|| AutomationError::Config("crm payload missing endpoint".into()))?;
    let body = payload.get("record").cloned().unwrap_or(Value::Null);

    let mut req = http.post(url).timeout(CONNECTOR_TIMEOUT).json(&body);
    if let Some(token) = payload.get("bearer_token").and_then(Value::as_str) {
        req = req.bearer_auth(token);
    }
    let resp = req.send().await?;
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(AutomationError::BadStatus(resp.status().as_u16()))
    }
}

async fn dispatch_email(config: &EmailConfig, payload: &Value) -> Result<()> {
    use lettre::message::Mailbox;
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

    let relay = config
        .smtp_relay
        .as_deref()
        .ok_or_else(|| AutomationError::Config("no smtp relay configured".into()))?;
    let from = config
        .from
        .as_deref()
        .ok_or_else(|| AutomationError::Config("no from address configured".into()))?;
    let to = payload
        .get("to")
        .and_then(Value::as_str)
        .ok_or_else(|| AutomationError::Config("email payload missing to".into()))?;
    let subject = payload.get("subject").and_then(Value::as_str).unwrap_or("Notification");
    let body = payload.get("body").and_then(Value::as_str).unwrap_or("").to_string();

    let from_mailbox: Mailbox = from.parse().map_err(|e| AutomationError::Email(format!("{e}")))?;
    let to_mailbox: Mailbox = to.parse().map_err(|e| AutomationError::Email(format!("{e}")))?;

    let message = Message::builder()
        .from(from_mailbox)
        .to(to_mailbox)
        .subject(subject)
        .body(body)
        .map_err(|e| AutomationError::Email(e.to_string()))?;

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(relay)
        .map_err(|e| AutomationError::Email(e.to_string()))?;
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }
    let transport = builder.timeout(Some(CONNECTOR_TIMEOUT)).build();

    transport.send(message).await.map_err(|e| AutomationError::Email(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn webhook_missing_url_is_not_retried_as_success() {
        let http = reqwest::Client::new();
        let err = dispatch_webhook(&http, &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, AutomationError::Config(_)));
    }

    #[tokio::test]
    async fn email_without_relay_config_fails_fast() {
        let config = EmailConfig::default();
        let err = dispatch_email(&config, &serde_json::json!({"to": "a@example.com"})).await.unwrap_err();
        assert!(matches!(err, AutomationError::Config(_)));
    }
}
