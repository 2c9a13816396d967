//! Telegram integration: outbound event notifications and inbound lifecycle
//! commands, both adapted from the teacher's in-core messaging adapter
//! rather than split into a separate bot process.
//!
//! Two background tasks are spawned, both gated behind the `telegram`
//! feature; with it disabled the crate still builds, just without either
//! compiled in:
//! - [`run_notifications`] subscribes to the event bus and pushes a message
//!   for every event worth paging an operator about.
//! - [`run_commands`] polls `getUpdates` and dispatches `/start /stop /pause
//!   /resume /reset_drawdown /status /positions /help` from chats on the
//!   allow-list.

pub mod command;

use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};

use crate::app::config::TelegramConfig;
use crate::app::supervisor::{CommandRequest, EngineHandle};
use crate::core::domain::{Event, TriggerKind};
use crate::core::service::bus;
use crate::core::service::snapshot::EngineSnapshot;
use command::{parse_command, CommandParseError, TelegramCommand};

/// Spawns both background tasks. Returns immediately; each task runs until
/// its channel closes or, for the command listener, forever.
pub fn spawn(config: TelegramConfig, events: broadcast::Sender<Event>, handle: EngineHandle) {
    if !config.enabled || config.bot_token.is_empty() {
        info!("telegram integration disabled");
        return;
    }
    tokio::spawn(run_notifications(config.clone(), events));
    tokio::spawn(run_commands(config, handle));
}

#[cfg(feature = "telegram")]
async fn run_notifications(config: TelegramConfig, events: broadcast::Sender<Event>) {
    use teloxide::prelude::*;
    use teloxide::types::ParseMode;

    let bot = Bot::new(&config.bot_token);
    let mut rx = events.subscribe();
    info!(chats = config.allowed_chat_ids.len(), "telegram notifier started");

    while let Some(event) = bus::recv_or_lag("telegram", &mut rx, &events).await {
        let Some(text) = format_event(&event) else {
            continue;
        };
        for chat_id in &config.allowed_chat_ids {
            if let Err(e) = bot
                .send_message(ChatId(*chat_id), &text)
                .parse_mode(ParseMode::MarkdownV2)
                .await
            {
                warn!(error = %e, %chat_id, "telegram send failed");
            }
        }
    }
    info!("telegram notifier stopped, event bus closed");
}

#[cfg(not(feature = "telegram"))]
async fn run_notifications(_config: TelegramConfig, _events: broadcast::Sender<Event>) {
    warn!("telegram notifier requested but the `telegram` feature is not compiled in");
}

#[cfg(feature = "telegram")]
async fn run_commands(config: TelegramConfig, handle: EngineHandle) {
    use teloxide::prelude::*;
    use teloxide::types::ParseMode;

    let bot = Bot::new(&config.bot_token);
    info!("telegram command listener started");

    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let config = config.clone();
        let handle = handle.clone();
        async move {
            let chat_message = ChatMessage::from(&msg);
            if let Some(reply) = command_response_for_message(&config, &handle, &chat_message).await {
                if let Err(e) = bot.send_message(msg.chat.id, reply).parse_mode(ParseMode::MarkdownV2).await {
                    warn!(error = %e, "telegram reply failed");
                }
            }
            respond(())
        }
    })
    .await;
}

#[cfg(not(feature = "telegram"))]
async fn run_commands(_config: TelegramConfig, _handle: EngineHandle) {
    warn!("telegram command listener requested but the `telegram` feature is not compiled in");
}

/// Computes the reply for an inbound chat message, or `None` for chats not
/// on the allow-list or messages that aren't a recognized command.
#[cfg_attr(not(feature = "telegram"), allow(dead_code))]
async fn command_response_for_message(
    config: &TelegramConfig,
    handle: &EngineHandle,
    msg: &ChatMessage,
) -> Option<String> {
    if !is_authorized(config, msg.chat_id) {
        return None;
    }
    let text = msg.text.as_deref()?;
    match parse_command(text) {
        Ok(command) => Some(dispatch_command(handle, command).await),
        Err(CommandParseError::Unknown(word)) => Some(format!(
            "Unknown command: /{}\n{}",
            escape_markdown(&word),
            command::command_help()
        )),
        Err(CommandParseError::Empty | CommandParseError::NotACommand) => None,
    }
}

/// Only chats on the configured allow-list get a response; everything else
/// is silently ignored so an unconfigured bot token doesn't leak control.
#[cfg_attr(not(feature = "telegram"), allow(dead_code))]
fn is_authorized(config: &TelegramConfig, chat_id: i64) -> bool {
    config.allowed_chat_ids.contains(&chat_id)
}

/// A thin, teloxide-independent view of the one field
/// `command_response_for_message` needs from `teloxide::types::Message`, so
/// it's testable without constructing a real `Message`.
#[cfg_attr(not(feature = "telegram"), allow(dead_code))]
struct ChatMessage {
    chat_id: i64,
    text: Option<String>,
}

#[cfg(feature = "telegram")]
impl From<&teloxide::types::Message> for ChatMessage {
    fn from(msg: &teloxide::types::Message) -> Self {
        Self {
            chat_id: msg.chat.id.0,
            text: msg.text().map(str::to_string),
        }
    }
}

#[cfg_attr(not(feature = "telegram"), allow(dead_code))]
async fn dispatch_command(handle: &EngineHandle, command: TelegramCommand) -> String {
    match command {
        TelegramCommand::Status => format_status(handle),
        TelegramCommand::Positions => format_positions(handle),
        TelegramCommand::Help => command::command_help().to_string(),
        lifecycle => {
            let engine_command = lifecycle
                .as_engine_command()
                .expect("lifecycle commands always map to an engine command");
            let (tx, rx) = oneshot::channel();
            let request = CommandRequest { command: engine_command, ack: tx };
            if handle.command_sender().send(request).await.is_err() {
                return "Engine is not accepting commands right now\\.".to_string();
            }
            match rx.await {
                Ok(Ok(())) => format!("OK: {lifecycle:?}"),
                Ok(Err(denial)) => format!("Denied: {}", escape_markdown(&denial.to_string())),
                Err(_) => "Engine did not respond\\.".to_string(),
            }
        }
    }
}

#[cfg_attr(not(feature = "telegram"), allow(dead_code))]
fn format_status(handle: &EngineHandle) -> String {
    match handle.snapshot() {
        Ok(snapshot) => format_snapshot_status(&snapshot),
        Err(e) => format!("Failed to read engine status: {}", escape_markdown(&e.to_string())),
    }
}

#[cfg_attr(not(feature = "telegram"), allow(dead_code))]
fn format_snapshot_status(snapshot: &EngineSnapshot) -> String {
    format!(
        "State: {}\nOpen orders: {}\nDrawdown: {}\nUnrealized PnL: {}\nRealized PnL \\(24h\\): {}",
        snapshot.state,
        snapshot.open_order_count,
        escape_markdown(&snapshot.drawdown_ratio.to_string()),
        escape_markdown(&snapshot.unrealized_pnl.to_string()),
        escape_markdown(&snapshot.realized_pnl_24h.to_string()),
    )
}

#[cfg_attr(not(feature = "telegram"), allow(dead_code))]
fn format_positions(handle: &EngineHandle) -> String {
    match handle.snapshot() {
        Ok(snapshot) if snapshot.open_positions.is_empty() => "No open positions\\.".to_string(),
        Ok(snapshot) => snapshot
            .open_positions
            .iter()
            .map(|p| {
                format!(
                    "{}: {} @ {}",
                    escape_markdown(&p.pair().to_string()),
                    escape_markdown(&p.quantity().to_string()),
                    escape_markdown(&p.entry_price().to_string())
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Err(e) => format!("Failed to read positions: {}", escape_markdown(&e.to_string())),
    }
}

/// Renders an [`Event`] as a MarkdownV2 Telegram message, or `None` for
/// events not worth paging an operator about (raw market ticks, routine
/// state changes). Every interpolated value is escaped since decimals and
/// pairs freely contain MarkdownV2 special characters (`.`, `-`, `/`).
#[cfg_attr(not(feature = "telegram"), allow(dead_code))]
fn format_event(event: &Event) -> Option<String> {
    match event {
        Event::Market(_) => None,
        Event::Rejection { pair, reason } => Some(format!(
            "\u{26a0}\u{fe0f} Rejected {}: {}",
            escape_markdown(&pair.to_string()),
            escape_markdown(&reason.to_string())
        )),
        Event::Trigger { kind, pair, detail } => {
            let label = match kind {
                TriggerKind::StopLoss => "Stop-loss",
                TriggerKind::TakeProfit => "Take-profit",
                TriggerKind::DrawdownHalt => "Drawdown halt",
            };
            Some(format!(
                "\u{1f514} {label} on {}: {}",
                escape_markdown(&pair.to_string()),
                escape_markdown(detail)
            ))
        }
        Event::OrderFilled { order, fill } => Some(format!(
            "\u{2705} Filled {} {} {} @ {}",
            order.side(),
            escape_markdown(&order.quantity().to_string()),
            escape_markdown(&order.pair().to_string()),
            escape_markdown(&fill.executed_price().to_string())
        )),
        Event::OrderFailed { order, reason } => Some(format!(
            "\u{274c} Order failed {}: {}",
            escape_markdown(&order.pair().to_string()),
            escape_markdown(reason)
        )),
        Event::StateChanged { from, to } => Some(format!("Engine {from} \u{2192} {to}")),
        Event::PersistenceDivergence { detail } => Some(format!(
            "\u{1f6a8} PERSISTENCE DIVERGENCE: {}\nTrading halted\\.",
            escape_markdown(detail)
        )),
        Event::OrphanedPosition { pair, quantity } => Some(format!(
            "Orphaned position adopted: {} qty {}",
            escape_markdown(&pair.to_string()),
            escape_markdown(&quantity.to_string())
        )),
        Event::LaggedConsumer { subscriber, skipped } => Some(format!(
            "Subscriber `{subscriber}` lagged, dropped {skipped} events"
        )),
    }
}

/// Escapes MarkdownV2 special characters per the Telegram Bot API.
#[cfg_attr(not(feature = "telegram"), allow(dead_code))]
fn escape_markdown(text: &str) -> String {
    const SPECIAL: [char; 18] = [
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    ];
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{MarketEvent, Pair, RejectionReason};

    #[test]
    fn market_events_are_not_forwarded() {
        let event = Event::Market(MarketEvent::new(
            Pair::from("BTC/USDT"),
            1,
            rust_decimal_macros::dec!(1),
            rust_decimal_macros::dec!(1),
            rust_decimal_macros::dec!(1),
            None,
        ));
        assert!(format_event(&event).is_none());
    }

    #[test]
    fn rejection_event_mentions_reason() {
        let event = Event::Rejection {
            pair: Pair::from("BTC/USDT"),
            reason: RejectionReason::ExposureLimitExceeded,
        };
        let text = format_event(&event).unwrap();
        assert!(text.contains("BTC/USDT"));
    }

    #[test]
    fn escape_markdown_escapes_special_characters() {
        assert_eq!(escape_markdown("BTC/USDT"), "BTC/USDT");
        assert_eq!(escape_markdown("20000.50"), "20000\\.50");
        assert_eq!(escape_markdown("-1.5"), "\\-1\\.5");
    }

    #[test]
    fn unauthorized_chat_is_rejected() {
        let config = TelegramConfig {
            enabled: true,
            bot_token: "x".to_string(),
            allowed_chat_ids: vec![1],
        };
        assert!(!is_authorized(&config, 999));
        assert!(is_authorized(&config, 1));
    }

    #[test]
    fn unknown_command_reply_includes_help() {
        let reply = format!(
            "Unknown command: /{}\n{}",
            escape_markdown("bogus"),
            command::command_help()
        );
        assert!(reply.contains("Unknown command"));
        assert!(reply.contains("/start"));
    }
}
