//! Alert delivery
//!
//! Delivery is best-effort: the orchestrator logs a [`NotifyError`] and moves
//! on. Nothing here retries.

use async_trait::async_trait;
use itertools::Itertools;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::config::NotifierConfig;
use crate::error::NotifyError;
use crate::timeframe::Timeframe;
use crate::types::{Direction, Signal};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

/// Telegram Bot API `sendMessage` sink
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_base_url(TELEGRAM_API_BASE, token, chat_id)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(TELEGRAM_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
                parse_mode: "HTML",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Writes alerts to the log; used when no credentials are configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        info!(target: "alerts", "\n{}", text);
        Ok(())
    }
}

/// Telegram when both credentials are present, the log otherwise.
pub fn from_config(config: &NotifierConfig) -> Result<Box<dyn Notifier>, NotifyError> {
    match (&config.telegram_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
            Ok(Box::new(TelegramNotifier::new(token, chat_id)?))
        }
        _ => {
            info!("Telegram credentials not set, alerts go to the log");
            Ok(Box::new(LogNotifier))
        }
    }
}

/// HTML alert body
pub fn format_alert(signal: &Signal) -> String {
    let (emoji, header) = match signal.direction {
        Direction::Long => ("🟢", "📈 Long entry"),
        Direction::Short => ("🔴", "📉 Short entry"),
    };

    let mut msg = format!("{} <b>{}</b>\n", emoji, header);
    msg += &format!("Symbol: <b>{}</b>\n", signal.symbol);
    msg += &format!("Timeframe: <b>{}</b>\n", signal.timeframe);
    msg += &format!("💰 Price: {}\n", signal.price);
    msg += "--------------------------\n";
    msg += &format!("1️⃣ <b>{} trend</b>:\n", signal.timeframe);
    msg += &format!(
        "   • Channel: ✅ near/unbroken [{:.6}, {:.6}]\n",
        signal.channel_lower, signal.channel_upper
    );
    if !signal.fib_levels.is_empty() {
        msg += &format!(
            "   • Fib confluence: 🔥 <b>{}</b>\n",
            signal.fib_levels.iter().join(", ")
        );
    }
    msg += &format!("   • RSI: {:.2} (extreme)\n", signal.rsi);
    msg += &format!("2️⃣ <b>{} entry</b>:\n", signal.entry_timeframe);
    msg += &format!("   • EMA {}: ✅ confirmed\n", signal.entry_ema_span);

    match signal.structure {
        Some(brk) => {
            let icon = if brk.agrees_with(signal.direction) { "🔥" } else { "⚡" };
            msg += &format!("   • Structure: {} {} break @ {}\n", icon, brk.label(), brk.level());
        }
        None => msg += "   • Structure: no clear structure break\n",
    }

    msg
}

/// Sent once when the continuous scan starts
pub fn format_startup(
    symbols: usize,
    timeframes: &[Timeframe],
    entry_timeframe: Timeframe,
    entry_ema_span: usize,
) -> String {
    format!(
        "🚀 <b>Confluence scanner started</b>\nUniverse: {} symbols\nTimeframes: {}\nEntry: {} EMA{}",
        symbols,
        timeframes.iter().join(", "),
        entry_timeframe,
        entry_ema_span
    )
}
