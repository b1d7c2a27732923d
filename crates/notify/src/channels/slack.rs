//! Slack notification channel.
//!
//! Supports two delivery modes:
//! - Web API (`chat.postMessage`) with a bot token and a channel id
//! - Incoming webhook URL
//!
//! When both are configured the Web API wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Environment variable for the Slack bot token.
const ENV_SLACK_AUTH_TOKEN: &str = "SLACK_AUTH_TOKEN";

/// Environment variable for the target channel id.
const ENV_SLACK_CHANNEL_ID: &str = "SLACK_CHANNEL_ID";

/// Environment variable for Slack webhook URL.
const ENV_SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";

/// Default Slack Web API base URL.
const SLACK_API_BASE: &str = "https://slack.com/api";

const AUTHOR: &str = "Kube Janitor";

/// Where messages are delivered.
#[derive(Debug, Clone)]
enum SlackTarget {
    WebApi {
        api_base: String,
        token: String,
        channel: String,
    },
    Webhook {
        url: String,
    },
}

/// Slack notification channel.
pub struct SlackChannel {
    target: Option<SlackTarget>,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Create a new Slack channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let token = non_empty_env(ENV_SLACK_AUTH_TOKEN);
        let channel = non_empty_env(ENV_SLACK_CHANNEL_ID);
        let webhook_url = non_empty_env(ENV_SLACK_WEBHOOK_URL);

        let target = match (token, channel, webhook_url) {
            (Some(token), Some(channel), _) => {
                debug!("Slack notifications enabled (Web API)");
                Some(SlackTarget::WebApi {
                    api_base: SLACK_API_BASE.to_string(),
                    token,
                    channel,
                })
            }
            (_, _, Some(url)) => {
                debug!("Slack notifications enabled (webhook)");
                Some(SlackTarget::Webhook { url })
            }
            (Some(_), None, None) => {
                warn!("SLACK_AUTH_TOKEN is set but SLACK_CHANNEL_ID is not, Slack disabled");
                None
            }
            _ => {
                debug!("Slack notifications disabled (no token/channel or webhook URL set)");
                None
            }
        };

        Self {
            target,
            client: reqwest::Client::new(),
        }
    }

    /// Create a Slack channel posting through `chat.postMessage`.
    #[must_use]
    pub fn web_api(token: String, channel: String) -> Self {
        Self {
            target: Some(SlackTarget::WebApi {
                api_base: SLACK_API_BASE.to_string(),
                token,
                channel,
            }),
            client: reqwest::Client::new(),
        }
    }

    /// Create a Slack channel with a specific webhook URL.
    #[must_use]
    pub fn webhook(webhook_url: String) -> Self {
        Self {
            target: Some(SlackTarget::Webhook { url: webhook_url }),
            client: reqwest::Client::new(),
        }
    }

    /// Override the Web API base URL (no effect in webhook mode).
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        if let Some(SlackTarget::WebApi { api_base, .. }) = &mut self.target {
            *api_base = base.into();
        }
        self
    }

    /// Format an event as a Slack attachment.
    fn format_attachment(event: &NotifyEvent) -> SlackAttachment {
        let color = match event {
            NotifyEvent::PodCrashLooping { .. } => "#E67E22",    // Orange
            NotifyEvent::PodTerminalFailure { .. } => "#C0392B", // Red
            NotifyEvent::PodDeleteFailed { .. } => "#F1C40F",    // Yellow
            NotifyEvent::PodDeleted { .. } => "#27AE60",         // Green
        };

        let fields = vec![
            SlackField::short("Namespace", event.namespace()),
            SlackField::short("Pod Name", event.pod()),
            SlackField::short("Reason", &event.reason()),
            SlackField::short(
                "Timestamp",
                &event.timestamp().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ),
        ];

        SlackAttachment {
            fallback: event.title().to_string(),
            color: color.to_string(),
            author_name: AUTHOR.to_string(),
            title: event.title().to_string(),
            text: Self::format_description(event),
            fields,
            footer: AUTHOR.to_string(),
            ts: event.timestamp().timestamp(),
        }
    }

    /// Format the message body for an event.
    fn format_description(event: &NotifyEvent) -> String {
        match event {
            NotifyEvent::PodCrashLooping {
                namespace,
                pod,
                restart_count,
                ..
            } => format!(
                "Pod `{pod}` in namespace `{namespace}` is in CrashLoopBackOff state with {restart_count} restarts. Scheduled for cleanup."
            ),

            NotifyEvent::PodTerminalFailure { namespace, pod, .. } => format!(
                "Pod `{pod}` in namespace `{namespace}` has failed or been evicted. Scheduled for cleanup."
            ),

            NotifyEvent::PodDeleteFailed { namespace, pod, error, .. } => format!(
                "Failed to delete pod `{pod}` in namespace `{namespace}`. Manual intervention may be required.\n*Error:* {error}"
            ),

            NotifyEvent::PodDeleted { namespace, pod, .. } => {
                format!("Pod `{pod}` in namespace `{namespace}` has been successfully deleted.")
            }
        }
    }

    async fn post_web_api(
        &self,
        api_base: &str,
        token: &str,
        channel: &str,
        attachment: SlackAttachment,
    ) -> Result<(), ChannelError> {
        let payload = PostMessage {
            channel,
            attachments: vec![attachment],
        };

        let response: PostMessageResponse = self
            .client
            .post(format!("{}/chat.postMessage", api_base.trim_end_matches('/')))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.ok {
            Ok(())
        } else {
            Err(ChannelError::Api {
                service: "Slack",
                message: response.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    async fn post_webhook(&self, url: &str, attachment: SlackAttachment) -> Result<(), ChannelError> {
        let payload = WebhookPayload {
            attachments: vec![attachment],
        };

        let response = self.client.post(url).json(&payload).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            warn!(
                channel = "slack",
                status = %status,
                body = %body,
                "Slack webhook request failed"
            );

            Err(ChannelError::Other(format!(
                "Slack returned {status}: {body}"
            )))
        }
    }
}

#[async_trait]
impl NotifyChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn enabled(&self) -> bool {
        self.target.is_some()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let target = self.target.as_ref().ok_or_else(|| {
            ChannelError::NotConfigured("SLACK_AUTH_TOKEN/SLACK_CHANNEL_ID or SLACK_WEBHOOK_URL".to_string())
        })?;

        let attachment = Self::format_attachment(event);

        debug!(channel = "slack", event_type = event.title(), pod = event.pod(), "Sending notification");

        match target {
            SlackTarget::WebApi {
                api_base,
                token,
                channel,
            } => self.post_web_api(api_base, token, channel, attachment).await?,
            SlackTarget::Webhook { url } => self.post_webhook(url, attachment).await?,
        }

        debug!(channel = "slack", "Notification sent successfully");
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// =============================================================================
// Slack API types
// =============================================================================

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    fallback: String,
    color: String,
    author_name: String,
    title: String,
    text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<SlackField>,
    footer: String,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

impl SlackField {
    fn short(title: &str, value: &str) -> Self {
        Self {
            title: title.to_string(),
            value: value.to_string(),
            short: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn crash_event() -> NotifyEvent {
        NotifyEvent::PodCrashLooping {
            namespace: "payments".to_string(),
            pod: "ledger-5d8f".to_string(),
            container: "ledger".to_string(),
            restart_count: 9,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_attachment_layout() {
        let attachment = SlackChannel::format_attachment(&crash_event());
        assert_eq!(attachment.color, "#E67E22");
        assert_eq!(attachment.author_name, "Kube Janitor");
        assert_eq!(attachment.title, "Pod CrashLoopBackOff Detected");
        assert!(attachment.text.contains("with 9 restarts"));

        let titles: Vec<&str> = attachment.fields.iter().map(|f| f.title.as_str()).collect();
        assert_eq!(titles, ["Namespace", "Pod Name", "Reason", "Timestamp"]);
        assert_eq!(attachment.fields[2].value, "CrashLoopBackOff (9 restarts)");
    }

    #[tokio::test]
    async fn test_web_api_posts_to_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_partial_json(serde_json::json!({ "channel": "C123" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let channel = SlackChannel::web_api("xoxb-test".to_string(), "C123".to_string())
            .with_api_base(server.uri());
        channel.send(&crash_event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_web_api_reports_slack_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "ok": false, "error": "channel_not_found" })),
            )
            .mount(&server)
            .await;

        let channel = SlackChannel::web_api("xoxb-test".to_string(), "C404".to_string())
            .with_api_base(server.uri());
        let err = channel.send(&crash_event()).await.unwrap_err();
        assert!(matches!(err, ChannelError::Api { .. }));
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn test_webhook_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let channel = SlackChannel::webhook(format!("{}/hook", server.uri()));
        let err = channel.send(&crash_event()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
