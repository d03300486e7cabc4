//! Telegram Bot API display surface
//!
//! Each record becomes a photo post in the configured channel; the post's
//! `message_id` is the record's external reference.

use super::{render_caption, DisplayError, DisplayResult, DisplaySurface};
use crate::catalog::{CatalogRecord, ExternalRef};
use crate::config::DisplayConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const PARSE_MODE: &str = "HTML";

/// Envelope every Bot API method answers with
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Serialize)]
struct SendPhoto<'a> {
    chat_id: &'a str,
    photo: &'a str,
    caption: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Serialize)]
struct EditCaption<'a> {
    chat_id: &'a str,
    message_id: i64,
    caption: &'a str,
    parse_mode: &'a str,
}

#[derive(Debug, Serialize)]
struct DeleteMessage<'a> {
    chat_id: &'a str,
    message_id: i64,
}

pub struct TelegramSurface {
    base_url: String,
    token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramSurface {
    pub fn new(base_url: &str, token: &str, chat_id: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &DisplayConfig) -> Self {
        Self::new(&config.api_url, &config.bot_token, &config.channel_id)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> DisplayResult<Option<T>>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;

        // Bot API errors still carry a JSON envelope, whatever the status
        let status = resp.status();
        let envelope: ApiResponse<T> = resp.json().await.map_err(|e| {
            DisplayError::Transport(format!("{} returned {}: {}", method, status, e))
        })?;

        if envelope.ok {
            return Ok(envelope.result);
        }

        let description = envelope
            .description
            .unwrap_or_else(|| format!("{} failed with {}", method, status));
        Err(classify_failure(description))
    }

    fn message_id(external_ref: &ExternalRef) -> DisplayResult<i64> {
        external_ref.as_str().parse().map_err(|_| {
            DisplayError::Rejected(format!("malformed message reference '{}'", external_ref))
        })
    }
}

fn classify_failure(description: String) -> DisplayError {
    let lower = description.to_lowercase();
    if lower.contains("not found") || lower.contains("message can't be deleted") {
        DisplayError::NotFound(description)
    } else {
        DisplayError::Rejected(description)
    }
}

fn is_not_modified(err: &DisplayError) -> bool {
    matches!(err, DisplayError::Rejected(d) if d.to_lowercase().contains("message is not modified"))
}

#[async_trait]
impl DisplaySurface for TelegramSurface {
    async fn publish(&self, record: &CatalogRecord) -> DisplayResult<ExternalRef> {
        let caption = render_caption(record);
        let body = SendPhoto {
            chat_id: &self.chat_id,
            photo: &record.image_url,
            caption: &caption,
            parse_mode: PARSE_MODE,
        };

        let sent: Option<SentMessage> = self.call("sendPhoto", &body).await?;
        let sent = sent.ok_or_else(|| {
            DisplayError::Transport("sendPhoto answered without a message".to_string())
        })?;

        info!(
            "Published character {} as message {}",
            record.id, sent.message_id
        );
        Ok(ExternalRef::new(sent.message_id.to_string()))
    }

    async fn retract(&self, external_ref: &ExternalRef) -> DisplayResult<()> {
        let body = DeleteMessage {
            chat_id: &self.chat_id,
            message_id: Self::message_id(external_ref)?,
        };
        let _: Option<bool> = self.call("deleteMessage", &body).await?;
        debug!("Retracted message {}", external_ref);
        Ok(())
    }

    async fn edit_caption(&self, external_ref: &ExternalRef, caption: &str) -> DisplayResult<()> {
        let body = EditCaption {
            chat_id: &self.chat_id,
            message_id: Self::message_id(external_ref)?,
            caption,
            parse_mode: PARSE_MODE,
        };

        match self.call::<_, serde_json::Value>("editMessageCaption", &body).await {
            Ok(_) => {
                debug!("Edited caption of message {}", external_ref);
                Ok(())
            }
            Err(e) if is_not_modified(&e) => {
                debug!("Caption of message {} already up to date", external_ref);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to edit caption of message {}: {}", external_ref, e);
                Err(e)
            }
        }
    }
}
