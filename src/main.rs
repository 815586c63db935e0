use std::sync::Arc;

use secrecy::SecretString;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use receipt_bot::bot::{Bot, BotDeps};
use receipt_bot::channels::{ChannelManager, CliChannel, TelegramChannel};
use receipt_bot::config::BotConfig;
use receipt_bot::receipt::{AuditLogger, ReceiptProcessor, TesseractExtractor, ValidationEngine};
use receipt_bot::replies::{IntentRouter, ReplyDispatcher, TemplateCatalog};

/// Stderr logging, plus a daily-rotated file when `RECEIPT_BOT_OPS_LOG_DIR` is set.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, guard) = match std::env::var("RECEIPT_BOT_OPS_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "receipt-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _log_guard = init_tracing();

    let config = BotConfig::from_env()?;

    eprintln!("🧾 Receipt Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Expected name: {}", config.validation.expected_name);
    eprintln!(
        "   Forbidden amount: {} (currency {})",
        config.validation.forbidden_amount, config.validation.currency_symbol
    );
    eprintln!(
        "   Date tolerance: {} day(s)",
        config.validation.date_tolerance_days
    );

    config.storage.ensure_dirs().await?;
    eprintln!("   Media: {}", config.storage.media_dir.display());
    eprintln!("   Audit logs: {}", config.storage.logs_dir.display());

    let catalog = TemplateCatalog::load(&config.storage.catalog_path)
        .await
        .unwrap_or_else(|e| {
            eprintln!(
                "Error: Failed to load templates from {}: {}",
                config.storage.catalog_path.display(),
                e
            );
            std::process::exit(1);
        });
    let catalog = Arc::new(catalog);
    eprintln!("   Templates: {} intents", catalog.len());

    // ── Receipt review ──────────────────────────────────────────────────
    let engine = ValidationEngine::from_config(&config.validation)?;
    let audit = Arc::new(AuditLogger::new(config.storage.logs_dir.clone()));
    let extractor = Arc::new(TesseractExtractor::new(config.ocr.clone()));
    eprintln!("   OCR: {} (lang {})", config.ocr.binary, config.ocr.language);

    let deps = BotDeps {
        processor: ReceiptProcessor::new(extractor, engine, audit),
        router: IntentRouter::new(Arc::clone(&catalog)),
        catalog,
        dispatcher: ReplyDispatcher::new(config.pacing.clone()),
        media_dir: config.storage.media_dir.clone(),
    };

    // ── Channels ────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    let mut active_channels = vec!["cli"];

    // Always add CLI
    channels.add(Box::new(CliChannel::default()));

    // Conditionally add Telegram if bot token is set
    if let Ok(telegram_token) = std::env::var("TELEGRAM_BOT_TOKEN") {
        let allowed_users: Vec<String> = std::env::var("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if allowed_users.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                allowed_users.join(", ")
            }
        );

        channels.add(Box::new(TelegramChannel::new(
            SecretString::from(telegram_token),
            allowed_users,
        )));
        active_channels.push("telegram");
    }

    eprintln!("   Channels: {}", active_channels.join(", "));
    eprintln!("   Type a message, or /image <path> to submit a receipt.\n");

    Bot::new(deps, channels).run().await?;

    Ok(())
}
