//! Reply template catalog, loaded once at startup.
//!
//! The catalog file is a JSON object mapping intent keys to ordered lists of
//! message templates:
//!
//! ```json
//! {
//!   "hola": ["¡Hola!", "Envíanos tu comprobante."],
//!   "comprobante_aceptado": ["Comprobante recibido y validado."],
//!   "comprobante_rechazado": ["No pudimos validar tu comprobante: {motivo}"],
//!   "default": ["Gracias por escribirnos."]
//! }
//! ```
//!
//! Key order in the file is preserved and matters: the intent router picks
//! the first key, in file order, that occurs in an incoming message.

use std::path::Path;

use serde_json::Value;

use crate::error::CatalogError;

/// Fallback intent when no keyword matches.
pub const DEFAULT_INTENT: &str = "default";
/// Reply set sent after an accepted receipt.
pub const ACCEPTED_INTENT: &str = "comprobante_aceptado";
/// Reply set sent after a rejected receipt. Receives the `{motivo}` binding.
pub const REJECTED_INTENT: &str = "comprobante_rechazado";

const REQUIRED_INTENTS: &[&str] = &[DEFAULT_INTENT, ACCEPTED_INTENT, REJECTED_INTENT];

/// Ordered, read-only mapping of intent key to reply templates.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    entries: Vec<(String, Vec<String>)>,
}

impl TemplateCatalog {
    /// Build a catalog from entries in their significant order.
    pub fn from_entries(entries: Vec<(String, Vec<String>)>) -> Result<Self, CatalogError> {
        for required in REQUIRED_INTENTS {
            if !entries.iter().any(|(key, _)| key == required) {
                return Err(CatalogError::MissingIntent {
                    key: (*required).to_string(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// Parse a catalog from its JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let Value::Object(map) = serde_json::from_str::<Value>(json)? else {
            return Err(CatalogError::NotAnObject);
        };

        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            let templates = value
                .as_array()
                .and_then(|items| {
                    items
                        .iter()
                        .map(|item| item.as_str().map(String::from))
                        .collect::<Option<Vec<_>>>()
                })
                .ok_or_else(|| CatalogError::InvalidTemplates { key: key.clone() })?;
            entries.push((key, templates));
        }

        Self::from_entries(entries)
    }

    /// Read and parse the catalog file at `path`.
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CatalogError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_json_str(&json)
    }

    /// Intent keys in catalog order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, templates)| templates.as_slice())
    }

    /// Templates for `key`, falling back to the default set.
    pub fn templates(&self, key: &str) -> &[String] {
        self.get(key)
            .or_else(|| self.get(DEFAULT_INTENT))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
