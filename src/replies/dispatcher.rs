//! Paced delivery of templated reply sets.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::config::PacingConfig;
use crate::error::ChannelError;

/// `{name}` placeholder, where name has no braces.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern is valid"));

/// Placeholder name to substitution value.
pub type Bindings = HashMap<String, String>;

/// Destination for one conversation's outgoing messages.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), ChannelError>;
}

/// Outcome of one dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Replace every bound `{name}` in `template`. Unbound placeholders stay as-is.
pub fn render(template: &str, bindings: &Bindings) -> String {
    if bindings.is_empty() {
        return template.to_string();
    }
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match bindings.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Sends a template set message by message with pacing delays.
pub struct ReplyDispatcher {
    pacing: PacingConfig,
}

impl ReplyDispatcher {
    pub fn new(pacing: PacingConfig) -> Self {
        Self { pacing }
    }

    /// Render and send every template in order.
    ///
    /// Waits `initial_delay` first and `message_delay` after each message. A
    /// failed send is logged and the remaining templates are still sent.
    pub async fn dispatch(
        &self,
        sink: &dyn ReplySink,
        templates: &[String],
        bindings: &Bindings,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        tokio::time::sleep(self.pacing.initial_delay).await;

        for (index, template) in templates.iter().enumerate() {
            let message = render(template, bindings);
            match sink.send(&message).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(index, error = %e, "Failed to send reply message");
                    report.failed += 1;
                }
            }
            tokio::time::sleep(self.pacing.message_delay).await;
        }

        debug!(
            delivered = report.delivered,
            failed = report.failed,
            "Reply set dispatched"
        );
        report
    }
}
