//! Telegram channel: long-polls the Bot API for updates.
//!
//! Text messages become text events. Photos, and documents with an image MIME
//! type, are downloaded through `getFile` and delivered as image attachments
//! so they can be reviewed as receipts.

use anyhow::Context;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{Channel, ImageAttachment, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const API_BASE: &str = "https://api.telegram.org";

/// Connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(self.bot_token.expose_secret(), method)
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    /// Splits long messages that exceed Telegram's 4096 char limit.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in &split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, chunk).await?;
        }
        Ok(())
    }

    /// Send a single message chunk (≤4096 chars), Markdown-first with fallback.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| send_failed(e.to_string()))?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(send_failed(format!(
                "sendMessage failed (markdown: {}, plain: {})",
                markdown_status, plain_err
            )));
        }

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let bot_token = self.bot_token.expose_secret().to_string();
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message"]
                });

                let resp = match client
                    .post(api_url(&bot_token, "getUpdates"))
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    let Some(parsed) = update.get("message").and_then(parse_message) else {
                        continue;
                    };

                    let is_allowed = {
                        let mut identities = vec![parsed.username.as_str()];
                        if let Some(ref id) = parsed.user_id {
                            identities.push(id.as_str());
                        }
                        check_user_allowed(&allowed_users, identities.iter().copied())
                    };

                    if !is_allowed {
                        tracing::warn!(
                            "Telegram: ignoring message from unauthorized user: \
                             username={}, user_id={}",
                            parsed.username,
                            parsed.user_id.as_deref().unwrap_or("unknown")
                        );
                        continue;
                    }

                    let mut incoming = IncomingMessage::new(
                        "telegram",
                        parsed.user_id.as_deref().unwrap_or(&parsed.username),
                        &parsed.text,
                    )
                    .with_metadata(serde_json::json!({
                        "chat_id": parsed.chat_id,
                        "username": parsed.username,
                    }))
                    .with_user_name(&parsed.display_name);

                    if let Some(media) = parsed.media {
                        match fetch_file(&client, &bot_token, &media.file_id).await {
                            Ok(data) => {
                                let mut attachment = ImageAttachment::new(media.mime_type, data);
                                if let Some(name) = media.file_name {
                                    attachment = attachment.with_file_name(name);
                                }
                                incoming = incoming.with_attachment(attachment);
                            }
                            Err(e) => {
                                tracing::warn!(
                                    user = %parsed.display_name,
                                    error = %format!("{e:#}"),
                                    "Telegram: could not download image"
                                );
                                incoming = incoming.with_media_error(format!("{e:#}"));
                            }
                        }
                    }

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| send_failed("No chat_id in message metadata".into()))?;

        self.send_message(chat_id, &response.content).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Update parsing ──────────────────────────────────────────────────

/// Image referenced by a Telegram message, not yet downloaded.
#[derive(Debug, PartialEq)]
struct MediaRef {
    file_id: String,
    mime_type: String,
    file_name: Option<String>,
}

/// The parts of a Telegram `message` object the bot uses.
#[derive(Debug)]
struct ParsedMessage {
    chat_id: String,
    username: String,
    user_id: Option<String>,
    display_name: String,
    text: String,
    media: Option<MediaRef>,
}

/// Extract sender, text and image reference from a `message` object.
///
/// Returns `None` for messages with neither text nor an image, and for
/// non-image documents.
fn parse_message(message: &Value) -> Option<ParsedMessage> {
    let from = message.get("from");
    let username = from
        .and_then(|f| f.get("username"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string());
    let display_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| (username != "unknown").then(|| username.clone()))
        .or_else(|| user_id.clone())
        .unwrap_or_else(|| username.clone());

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();

    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let media = if let Some(sizes) = message.get("photo").and_then(Value::as_array) {
        // Sizes are ordered smallest to largest.
        sizes
            .last()
            .and_then(|p| p.get("file_id"))
            .and_then(Value::as_str)
            .map(|file_id| MediaRef {
                file_id: file_id.to_string(),
                mime_type: "image/jpeg".to_string(),
                file_name: None,
            })
    } else if let Some(doc) = message.get("document") {
        let mime_type = doc
            .get("mime_type")
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream");
        if !mime_type.starts_with("image/") {
            return None;
        }
        doc.get("file_id")
            .and_then(Value::as_str)
            .map(|file_id| MediaRef {
                file_id: file_id.to_string(),
                mime_type: mime_type.to_string(),
                file_name: doc
                    .get("file_name")
                    .and_then(Value::as_str)
                    .map(String::from),
            })
    } else {
        None
    };

    if media.is_none() && message.get("text").is_none() {
        return None;
    }

    Some(ParsedMessage {
        chat_id,
        username,
        user_id,
        display_name,
        text,
        media,
    })
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(bot_token: &str, method: &str) -> String {
    format!("{API_BASE}/bot{bot_token}/{method}")
}

fn file_url(bot_token: &str, file_path: &str) -> String {
    format!("{API_BASE}/file/bot{bot_token}/{file_path}")
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason,
    }
}

/// Resolve a `file_id` with `getFile` and download its bytes.
async fn fetch_file(
    client: &reqwest::Client,
    bot_token: &str,
    file_id: &str,
) -> anyhow::Result<Vec<u8>> {
    let info: Value = client
        .post(api_url(bot_token, "getFile"))
        .json(&serde_json::json!({ "file_id": file_id }))
        .send()
        .await
        .context("getFile request failed")?
        .json()
        .await
        .context("getFile returned invalid JSON")?;

    let Some(file_path) = info
        .get("result")
        .and_then(|r| r.get("file_path"))
        .and_then(Value::as_str)
    else {
        anyhow::bail!("getFile returned no file_path for {file_id}");
    };

    let resp = client
        .get(file_url(bot_token, file_path))
        .send()
        .await
        .context("file download failed")?;
    if !resp.status().is_success() {
        anyhow::bail!("file download returned {}", resp.status());
    }

    let bytes = resp.bytes().await.context("reading file body failed")?;
    Ok(bytes.to_vec())
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(boundary);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { boundary } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
