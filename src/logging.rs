//! Tracing subscriber initialisation driven by [`crate::settings::LoggingSettings`].

use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::settings::LoggingSettings;

/// Install the global tracing subscriber. `LOG_FORMAT=json` emits structured
/// JSON lines; anything else emits colourised (or plain, per
/// `LOG_COLOR_ENABLED`) text, mirroring the original's `JsonFormatter`/
/// `StructuredTextFormatter` split.
pub fn init(settings: &LoggingSettings) {
    let filter = EnvFilter::try_new(settings.level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.format.eq_ignore_ascii_case("json") {
        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true).with_target(true));
        let _ = registry.try_init();
    } else {
        let registry = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(settings.color_enabled).with_target(true));
        let _ = registry.try_init();
    }
}

/// Structured fields attached to a poll-iteration log line, mirroring
/// `build_log_extra`. `chain_id` is omitted entirely when it is still
/// `"unknown"`, since at that point it carries no information.
pub struct LogContext<'a> {
    pub blockchain: &'a str,
    pub chain_id_label: Option<&'a str>,
    pub contract: Option<&'a str>,
    pub account_name: Option<&'a str>,
    pub account_address: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    pub fn new(blockchain: &'a str) -> Self {
        Self {
            blockchain,
            chain_id_label: None,
            contract: None,
            account_name: None,
            account_address: None,
        }
    }

    pub fn with_chain_id_label(mut self, chain_id_label: &'a str) -> Self {
        self.chain_id_label = Some(chain_id_label);
        self
    }

    pub fn with_contract(mut self, contract: &'a str) -> Self {
        self.contract = Some(contract);
        self
    }

    pub fn with_account(mut self, name: &'a str, address: &'a str) -> Self {
        self.account_name = Some(name);
        self.account_address = Some(address);
        self
    }

    /// A tracing span carrying this context's fields. Entered by the caller
    /// (`let _guard = ctx.span().entered();`) so nested log lines inherit
    /// the fields without repeating them.
    pub fn span(&self) -> tracing::Span {
        tracing::debug_span!(
            "chain_context",
            blockchain = self.blockchain,
            chain_id = self.chain_id_label.unwrap_or("unknown"),
            contract = self.contract.unwrap_or(""),
            account_name = self.account_name.unwrap_or(""),
            account_address = self.account_address.unwrap_or(""),
        )
    }
}

/// Log `operation`'s wall-clock duration at `tracing::Level::DEBUG` on drop,
/// mirroring `log_duration`'s context-manager pattern.
pub struct DurationLogger {
    operation: &'static str,
    started_at: std::time::Instant,
}

impl DurationLogger {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            started_at: std::time::Instant::now(),
        }
    }
}

impl Drop for DurationLogger {
    fn drop(&mut self) {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        tracing::debug!(operation = self.operation, elapsed_seconds = elapsed, "operation completed");
    }
}
