//! Configuration types.
//!
//! Every value is read once at startup and passed by value (or behind an
//! `Arc`) into the component that needs it.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Bot configuration.
#[derive(Debug, Clone, Default)]
pub struct BotConfig {
    pub validation: ValidationConfig,
    pub pacing: PacingConfig,
    pub storage: StorageConfig,
    pub ocr: OcrConfig,
}

impl BotConfig {
    /// Build the full configuration from `RECEIPT_BOT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            validation: ValidationConfig::from_env()?,
            pacing: PacingConfig::from_env()?,
            storage: StorageConfig::from_env(),
            ocr: OcrConfig::from_env(),
        })
    }
}

/// Parameters of the receipt validation rules.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Name that must appear on the receipt (case-insensitive).
    pub expected_name: String,
    /// Minimum length of the operation reference token.
    pub min_operation_length: usize,
    /// Amount that must not appear on the receipt.
    pub forbidden_amount: String,
    /// Currency symbol that may prefix the forbidden amount.
    pub currency_symbol: String,
    /// Maximum absolute day difference between the receipt date and today.
    pub date_tolerance_days: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            expected_name: "Angel Vilca".to_string(),
            min_operation_length: 5,
            forbidden_amount: "500".to_string(),
            currency_symbol: "S/".to_string(),
            date_tolerance_days: 1,
        }
    }
}

impl ValidationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let min_operation_length =
            env_parse("RECEIPT_BOT_MIN_OPERATION_LENGTH", defaults.min_operation_length)?;
        if min_operation_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RECEIPT_BOT_MIN_OPERATION_LENGTH".into(),
                message: "must be at least 1".into(),
            });
        }

        let date_tolerance_days =
            env_parse("RECEIPT_BOT_DATE_TOLERANCE_DAYS", defaults.date_tolerance_days)?;
        if date_tolerance_days < 0 {
            return Err(ConfigError::InvalidValue {
                key: "RECEIPT_BOT_DATE_TOLERANCE_DAYS".into(),
                message: "must not be negative".into(),
            });
        }

        let forbidden_amount = match std::env::var("RECEIPT_BOT_FORBIDDEN_AMOUNT") {
            Ok(raw) => non_blank("RECEIPT_BOT_FORBIDDEN_AMOUNT", &raw)?,
            Err(_) => defaults.forbidden_amount,
        };

        Ok(Self {
            expected_name: env_string("RECEIPT_BOT_EXPECTED_NAME", defaults.expected_name),
            min_operation_length,
            forbidden_amount,
            currency_symbol: env_string("RECEIPT_BOT_CURRENCY_SYMBOL", defaults.currency_symbol),
            date_tolerance_days,
        })
    }
}

/// Delays inserted around outgoing messages.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    /// Wait before the first message of a reply set.
    pub initial_delay: Duration,
    /// Wait after every message of a reply set.
    pub message_delay: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            message_delay: Duration::from_secs(1),
        }
    }
}

impl PacingConfig {
    /// No pacing at all. Used by tests and the CLI demo.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            message_delay: Duration::ZERO,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let initial_ms: u64 = env_parse(
            "RECEIPT_BOT_INITIAL_DELAY_MS",
            defaults.initial_delay.as_millis() as u64,
        )?;
        let message_ms: u64 = env_parse(
            "RECEIPT_BOT_MESSAGE_DELAY_MS",
            defaults.message_delay.as_millis() as u64,
        )?;
        Ok(Self {
            initial_delay: Duration::from_millis(initial_ms),
            message_delay: Duration::from_millis(message_ms),
        })
    }
}

/// Filesystem locations used by the bot.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory for temporary receipt images.
    pub media_dir: PathBuf,
    /// Directory for the per-day audit logs.
    pub logs_dir: PathBuf,
    /// JSON file with the reply templates.
    pub catalog_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("./data/media"),
            logs_dir: PathBuf::from("./data/logs"),
            catalog_path: PathBuf::from("./mensajes.json"),
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            media_dir: env_path("RECEIPT_BOT_MEDIA_DIR", defaults.media_dir),
            logs_dir: env_path("RECEIPT_BOT_LOGS_DIR", defaults.logs_dir),
            catalog_path: env_path("RECEIPT_BOT_CATALOG", defaults.catalog_path),
        }
    }

    /// Create the media and log directories if they do not exist yet.
    pub async fn ensure_dirs(&self) -> Result<(), ConfigError> {
        tokio::fs::create_dir_all(&self.media_dir).await?;
        tokio::fs::create_dir_all(&self.logs_dir).await?;
        Ok(())
    }
}

/// Settings for the Tesseract text extractor.
#[derive(Debug, Clone)]
pub struct OcrConfig {
    /// Path or name of the `tesseract` executable.
    pub binary: String,
    /// Tesseract language code.
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "spa".to_string(),
        }
    }
}

impl OcrConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            binary: env_string("RECEIPT_BOT_TESSERACT", defaults.binary),
            language: env_string("RECEIPT_BOT_OCR_LANG", defaults.language),
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn non_blank(key: &str, raw: &str) -> Result<String, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must not be empty".into(),
        });
    }
    Ok(value.to_string())
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        })
}
