//! Discord webhook notifications for pipeline runs.

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::models::NamedCollection;

const USERNAME: &str = "Skiatlas";
const SUCCESS_COLOR: u32 = 0x2E86C1;
const FAILURE_COLOR: u32 = 0xC0392B;
/// Discord rejects embeds with more fields than this.
const MAX_FIELDS: usize = 25;

#[derive(Serialize, Debug, Clone, PartialEq)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Serialize, Debug)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
}

#[derive(Serialize, Debug)]
struct DiscordPayload {
    username: String,
    embeds: Vec<DiscordEmbed>,
}

/// One pipeline message: a title, a line of text and optional per-collection counts.
#[derive(Debug, Clone, Default)]
pub struct RunMessage {
    pub title: String,
    pub description: String,
    pub success: bool,
    pub elapsed: Option<Duration>,
    counts: Vec<(String, usize)>,
}

impl RunMessage {
    pub fn new(title: impl Into<String>, description: impl Into<String>, success: bool) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            success,
            ..Default::default()
        }
    }

    /// Completed step with its duration and the size of each collection it produced.
    pub fn step(title: impl Into<String>, elapsed: Duration, collections: &[NamedCollection]) -> Self {
        Self {
            title: title.into(),
            description: format!(
                "{} features in {} collections",
                collections.iter().map(NamedCollection::len).sum::<usize>(),
                collections.len()
            ),
            success: true,
            elapsed: Some(elapsed),
            counts: collections.iter().map(|c| (c.name.clone(), c.len())).collect(),
        }
    }

    fn fields(&self) -> Vec<EmbedField> {
        let mut fields = Vec::new();
        if let Some(elapsed) = self.elapsed {
            fields.push(EmbedField {
                name: "Elapsed".to_string(),
                value: format!("{:.1}s", elapsed.as_secs_f64()),
                inline: false,
            });
        }
        fields.extend(self.counts.iter().map(|(name, count)| EmbedField {
            name: name.clone(),
            value: count.to_string(),
            inline: true,
        }));
        fields.truncate(MAX_FIELDS);
        fields
    }

    fn payload(&self) -> DiscordPayload {
        DiscordPayload {
            username: USERNAME.to_string(),
            embeds: vec![DiscordEmbed {
                title: self.title.clone(),
                description: self.description.clone(),
                color: if self.success { SUCCESS_COLOR } else { FAILURE_COLOR },
                timestamp: chrono::Utc::now().to_rfc3339(),
                fields: self.fields(),
            }],
        }
    }
}

pub struct DiscordWebhook {
    url: String,
    client: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    pub async fn send(&self, message: &RunMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&message.payload())
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            error!("Failed to send Discord notification: {}", error_text);
            anyhow::bail!("Discord notification failed: {}", error_text);
        }

        info!("Sent Discord notification: {}", message.title);
        Ok(())
    }
}

/// Optional webhook; a failed notification never fails the run.
pub struct Notifier {
    webhook: Option<DiscordWebhook>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Self {
        Self {
            webhook: url.filter(|u| !u.trim().is_empty()).map(DiscordWebhook::new),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook.is_some()
    }

    pub async fn notify(&self, message: RunMessage) {
        if let Some(webhook) = &self.webhook {
            if let Err(e) = webhook.send(&message).await {
                warn!("Notification '{}' not delivered: {:#}", message.title, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CollectionRole;

    #[test]
    fn test_step_message_fields() {
        let collections = vec![
            NamedCollection::new("lifts", CollectionRole::Nearby, Vec::new()),
            NamedCollection::new("pistes", CollectionRole::Nearby, Vec::new()),
        ];
        let message = RunMessage::step("Nearby Extraction Complete", Duration::from_millis(2500), &collections);
        let payload = serde_json::to_value(message.payload()).unwrap();

        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "Nearby Extraction Complete");
        assert_eq!(embed["description"], "0 features in 2 collections");
        assert_eq!(embed["color"], SUCCESS_COLOR);
        assert_eq!(embed["fields"][0]["value"], "2.5s");
        assert_eq!(embed["fields"][1]["name"], "lifts");
        assert_eq!(embed["fields"][2]["value"], "0");
        assert_eq!(payload["username"], USERNAME);
    }

    #[test]
    fn test_plain_message_has_no_fields() {
        let message = RunMessage::new("Enrichment Failed", "boundary source not found", false);
        let payload = serde_json::to_value(message.payload()).unwrap();
        assert!(payload["embeds"][0].get("fields").is_none());
        assert_eq!(payload["embeds"][0]["color"], FAILURE_COLOR);
    }

    #[test]
    fn test_blank_webhook_is_disabled() {
        assert!(!Notifier::new(Some("  ".to_string())).is_enabled());
        assert!(!Notifier::new(None).is_enabled());
        assert!(Notifier::new(Some("https://discord.com/api/webhooks/1/x".to_string())).is_enabled());
    }
}
