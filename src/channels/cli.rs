//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Plain lines are text messages. `/image <path>` submits a local image file
//! as a receipt.

use std::path::Path;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, ImageAttachment, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

const IMAGE_COMMAND: &str = "/image";

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel {
    user_name: String,
}

impl CliChannel {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new("local-user")
    }
}

/// MIME type for a local file, from its extension.
fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// Turn one input line into a message, loading the image for `/image <path>`.
async fn parse_line(line: &str, user_name: &str) -> Result<IncomingMessage, ChannelError> {
    let msg = IncomingMessage::new("cli", user_name, line).with_user_name(user_name);

    let Some(rest) = line.strip_prefix(IMAGE_COMMAND) else {
        return Ok(msg);
    };
    let path = Path::new(rest.trim());
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| ChannelError::MediaDownload {
            name: "cli".into(),
            reason: format!("{}: {e}", path.display()),
        })?;

    let mut attachment = ImageAttachment::new(mime_for_path(path), data);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        attachment = attachment.with_file_name(name);
    }
    Ok(IncomingMessage {
        content: String::new(),
        ..msg
    }
    .with_attachment(attachment))
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let user_name = self.user_name.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let msg = match parse_line(&line, &user_name).await {
                            Ok(msg) => msg,
                            Err(e) => {
                                eprintln!("{e}");
                                eprint!("> ");
                                continue;
                            }
                        };
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", response.content);
        eprint!("> ");
        Ok(())
    }
}
