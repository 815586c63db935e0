//! Bot event loop: routes each inbound message to the receipt reviewer or
//! the keyword replies.
//!
//! Flow per message:
//! - image attachment → stage to a temp file → `ReceiptProcessor::process()`
//!   → accepted/rejected reply set
//! - non-image attachment → ignored
//! - text → `IntentRouter::route()` → matching reply set
//!
//! Every message is handled on its own task, so a slow OCR run or a paced
//! reply in one conversation never holds up another. Messages from the same
//! sender on the same channel are handled strictly one after another, and
//! `run` waits for every started handler before it returns.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use tempfile::NamedTempFile;
use tokio::sync::oneshot;
use tokio::task::JoinSet;

use crate::channels::{ChannelManager, ChannelSink, ImageAttachment, IncomingMessage, OutgoingResponse};
use crate::error::{ChannelError, Result};
use crate::receipt::{ReceiptProcessor, ValidationResult};
use crate::replies::{
    ACCEPTED_INTENT, Bindings, DispatchReport, IntentRouter, REJECTED_INTENT, ReplyDispatcher,
    TemplateCatalog,
};

/// Sent when handling a message fails unexpectedly.
pub const APOLOGY_MESSAGE: &str = "Lo siento, ocurrió un error. Por favor, intenta nuevamente.";

/// Placeholder filled with the rejection reason.
pub const REASON_PLACEHOLDER: &str = "motivo";

/// Components shared by every message handler.
pub struct BotDeps {
    pub processor: ReceiptProcessor,
    pub catalog: Arc<TemplateCatalog>,
    pub router: IntentRouter,
    pub dispatcher: ReplyDispatcher,
    /// Directory where receipt images are staged while being reviewed.
    pub media_dir: PathBuf,
}

/// What the bot did with one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Handled {
    Receipt {
        result: ValidationResult,
        report: DispatchReport,
    },
    Text {
        intent: String,
        report: DispatchReport,
    },
    Ignored,
}

#[derive(Clone)]
pub struct Bot {
    channels: Arc<ChannelManager>,
    deps: Arc<BotDeps>,
}

impl Bot {
    pub fn new(deps: BotDeps, channels: ChannelManager) -> Self {
        Self {
            channels: Arc::new(channels),
            deps: Arc::new(deps),
        }
    }

    /// Run until Ctrl+C or until every channel stream ends.
    ///
    /// Handlers already started when the loop stops are awaited, so paced
    /// replies and audit entries in flight are never cut short.
    pub async fn run(self) -> Result<()> {
        let mut message_stream = self.channels.start_all().await?;
        let mut in_flight = InFlight::default();

        tracing::info!(channels = ?self.channels.names(), "Receipt bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                Some(joined) = in_flight.tasks.join_next(), if !in_flight.tasks.is_empty() => {
                    log_join(joined);
                    in_flight.prune();
                    continue;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            in_flight.spawn(self.clone(), message);
        }

        if !in_flight.tasks.is_empty() {
            tracing::info!(pending = in_flight.tasks.len(), "Waiting for in-flight messages");
        }
        while let Some(joined) = in_flight.tasks.join_next().await {
            log_join(joined);
        }

        tracing::info!("Receipt bot shutting down...");
        self.channels.shutdown_all().await?;
        Ok(())
    }

    async fn handle_or_apologize(&self, message: IncomingMessage) {
        if let Err(e) = self.handle_message(&message).await {
            tracing::error!(subject = %message.subject(), error = %e, "Error handling message");
            if let Err(e) = self
                .channels
                .respond(&message, OutgoingResponse::text(APOLOGY_MESSAGE))
                .await
            {
                tracing::error!(error = %e, "Error sending apology message");
            }
        }
    }

    /// Handle one inbound message to completion, replies included.
    pub async fn handle_message(&self, message: &IncomingMessage) -> Result<Handled> {
        if let Some(reason) = &message.media_error {
            return Err(ChannelError::MediaDownload {
                name: message.channel.clone(),
                reason: reason.clone(),
            }
            .into());
        }

        match &message.attachment {
            Some(attachment) if attachment.is_image() => {
                self.review_receipt(message, attachment).await
            }
            Some(attachment) => {
                tracing::debug!(
                    subject = %message.subject(),
                    mime = %attachment.mime_type,
                    "Ignoring non-image attachment"
                );
                Ok(Handled::Ignored)
            }
            None => Ok(self.reply_to_text(message).await),
        }
    }

    async fn review_receipt(
        &self,
        message: &IncomingMessage,
        attachment: &ImageAttachment,
    ) -> Result<Handled> {
        let subject = message.subject();
        tracing::info!(
            subject = %subject,
            file = attachment.file_name.as_deref().unwrap_or("-"),
            bytes = attachment.data.len(),
            "Receipt image received"
        );

        let staged = stage_image(&self.deps.media_dir, attachment).await?;
        let result = self.deps.processor.process(staged.path(), subject).await;
        drop(staged);

        let (intent, bindings) = if result.accepted {
            (ACCEPTED_INTENT, Bindings::new())
        } else {
            (
                REJECTED_INTENT,
                Bindings::from([(REASON_PLACEHOLDER.to_string(), result.reason.clone())]),
            )
        };

        let report = self.send_reply_set(message, intent, &bindings).await;
        Ok(Handled::Receipt { result, report })
    }

    async fn reply_to_text(&self, message: &IncomingMessage) -> Handled {
        let intent = self.deps.router.route(&message.content).to_string();
        tracing::debug!(subject = %message.subject(), intent = %intent, "Routed text message");
        let report = self.send_reply_set(message, &intent, &Bindings::new()).await;
        Handled::Text { intent, report }
    }

    async fn send_reply_set(
        &self,
        message: &IncomingMessage,
        intent: &str,
        bindings: &Bindings,
    ) -> DispatchReport {
        let sink = ChannelSink::new(&self.channels, message);
        let templates = self.deps.catalog.templates(intent);
        self.deps.dispatcher.dispatch(&sink, templates, bindings).await
    }
}

/// Messages from one sender on one channel.
type SourceKey = (String, String);

/// Handler tasks started by [`Bot::run`].
///
/// Each task waits for the previous task of the same source to finish
/// before it starts, so replies to one sender never interleave.
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<()>,
    /// Completion signal of the newest task per source.
    tails: HashMap<SourceKey, oneshot::Receiver<()>>,
}

impl InFlight {
    fn spawn(&mut self, bot: Bot, message: IncomingMessage) {
        let key = (message.channel.clone(), message.user_id.clone());
        let (done_tx, done_rx) = oneshot::channel();
        let previous = self.tails.insert(key, done_rx);

        self.tasks.spawn(async move {
            if let Some(previous) = previous {
                // Resolves on completion, and also if that task panicked.
                let _ = previous.await;
            }
            bot.handle_or_apologize(message).await;
            let _ = done_tx.send(());
        });
    }

    /// Forget sources whose newest task has already finished.
    fn prune(&mut self) {
        self.tails
            .retain(|_, done| matches!(done.try_recv(), Err(oneshot::error::TryRecvError::Empty)));
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Message handler task failed");
    }
}

/// Write the attachment to a temp file that is removed when dropped.
async fn stage_image(
    media_dir: &std::path::Path,
    attachment: &ImageAttachment,
) -> Result<NamedTempFile> {
    tokio::fs::create_dir_all(media_dir).await?;
    let file = tempfile::Builder::new()
        .prefix("receipt_")
        .suffix(&format!(".{}", attachment.extension()))
        .tempfile_in(media_dir)?;
    tokio::fs::write(file.path(), &attachment.data).await?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staged_image_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let attachment = ImageAttachment::new("image/jpeg", vec![1, 2, 3]);

        let staged = stage_image(dir.path(), &attachment).await.unwrap();
        let path = staged.path().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(path.extension().unwrap(), "jpg");
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("receipt_"));

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn staging_into_unwritable_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let attachment = ImageAttachment::new("image/png", vec![1]);
        assert!(stage_image(&blocker, &attachment).await.is_err());
    }
}
