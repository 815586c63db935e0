//! Keyword router for plain-text messages.

use std::sync::Arc;

use crate::replies::catalog::{DEFAULT_INTENT, TemplateCatalog};

/// Picks the reply set for a text message.
///
/// The message is lower-cased and trimmed, then the catalog keys are tried in
/// catalog order; the first key contained in the message wins. Messages that
/// contain no key get [`DEFAULT_INTENT`].
#[derive(Clone)]
pub struct IntentRouter {
    catalog: Arc<TemplateCatalog>,
}

impl IntentRouter {
    pub fn new(catalog: Arc<TemplateCatalog>) -> Self {
        Self { catalog }
    }

    pub fn route(&self, text: &str) -> &str {
        let normalized = text.trim().to_lowercase();
        self.catalog
            .keys()
            .find(|key| normalized.contains(key))
            .unwrap_or(DEFAULT_INTENT)
    }
}
