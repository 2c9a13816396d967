//! Parses inbound Telegram chat commands into [`TelegramCommand`].
//!
//! Mirrors the teacher's own command grammar: a leading `/`, an optional
//! `@botname` suffix (group chats address bots this way), case-sensitive
//! command word, whitespace-separated arguments.

use std::fmt;

use crate::app::supervisor::Command as EngineCommand;

/// Every chat command this adapter understands. The lifecycle commands
/// (`Start` through `ResetDrawdown`) map directly onto
/// [`EngineCommand`](crate::app::supervisor::Command); `Status`, `Positions`,
/// and `Help` are answered locally from a read-only [`EngineSnapshot`](crate::core::service::EngineSnapshot)
/// and never touch the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramCommand {
    Start,
    Stop,
    Pause,
    Resume,
    ResetDrawdown,
    Status,
    Positions,
    Help,
}

impl TelegramCommand {
    /// The [`EngineCommand`] this chat command dispatches, or `None` for the
    /// read-only commands that never reach the supervisor's command channel.
    #[must_use]
    pub fn as_engine_command(self) -> Option<EngineCommand> {
        match self {
            Self::Start => Some(EngineCommand::Start),
            Self::Stop => Some(EngineCommand::Stop),
            Self::Pause => Some(EngineCommand::Pause),
            Self::Resume => Some(EngineCommand::Resume),
            Self::ResetDrawdown => Some(EngineCommand::ResetDrawdown),
            Self::Status | Self::Positions | Self::Help => None,
        }
    }
}

/// Why `parse_command` rejected a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    Empty,
    NotACommand,
    Unknown(String),
}

impl fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty message"),
            Self::NotACommand => write!(f, "not a command"),
            Self::Unknown(word) => write!(f, "unknown command: {word}"),
        }
    }
}

impl std::error::Error for CommandParseError {}

/// Parses a raw chat message into a [`TelegramCommand`].
///
/// Accepts `/command`, `/command@botname`, case-sensitively on the command
/// word. Arguments beyond the command word are ignored; none of our
/// commands currently take one.
pub fn parse_command(text: &str) -> Result<TelegramCommand, CommandParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CommandParseError::Empty);
    }
    let mut words = text.split_whitespace();
    let head = words.next().ok_or(CommandParseError::Empty)?;
    if !head.starts_with('/') {
        return Err(CommandParseError::NotACommand);
    }
    let word = head[1..].split('@').next().unwrap_or_default();
    match word {
        "start" => Ok(TelegramCommand::Start),
        "stop" => Ok(TelegramCommand::Stop),
        "pause" => Ok(TelegramCommand::Pause),
        "resume" => Ok(TelegramCommand::Resume),
        "reset_drawdown" => Ok(TelegramCommand::ResetDrawdown),
        "status" => Ok(TelegramCommand::Status),
        "positions" => Ok(TelegramCommand::Positions),
        "help" => Ok(TelegramCommand::Help),
        other => Err(CommandParseError::Unknown(other.to_string())),
    }
}

/// Static help text for `/help` and the bot's `setMyCommands` description.
#[must_use]
pub const fn command_help() -> &'static str {
    "/start \\- resume trading from a stopped state\n\
     /stop \\- stop trading and close all open positions\n\
     /pause \\- pause signal evaluation, keep positions open\n\
     /resume \\- resume from paused\n\
     /reset\\_drawdown \\- clear the drawdown halt and resume\n\
     /status \\- engine state, drawdown, open orders\n\
     /positions \\- current open positions\n\
     /help \\- this message"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse_command("/start").unwrap(), TelegramCommand::Start);
        assert_eq!(parse_command("/stop").unwrap(), TelegramCommand::Stop);
        assert_eq!(parse_command("/pause").unwrap(), TelegramCommand::Pause);
        assert_eq!(parse_command("/resume").unwrap(), TelegramCommand::Resume);
        assert_eq!(parse_command("/reset_drawdown").unwrap(), TelegramCommand::ResetDrawdown);
        assert_eq!(parse_command("/status").unwrap(), TelegramCommand::Status);
        assert_eq!(parse_command("/positions").unwrap(), TelegramCommand::Positions);
        assert_eq!(parse_command("/help").unwrap(), TelegramCommand::Help);
    }

    #[test]
    fn strips_botname_suffix() {
        assert_eq!(parse_command("/status@my_trading_bot").unwrap(), TelegramCommand::Status);
    }

    #[test]
    fn ignores_trailing_arguments() {
        assert_eq!(parse_command("/status now please").unwrap(), TelegramCommand::Status);
    }

    #[test]
    fn rejects_empty_message() {
        assert_eq!(parse_command("").unwrap_err(), CommandParseError::Empty);
        assert_eq!(parse_command("   ").unwrap_err(), CommandParseError::Empty);
    }

    #[test]
    fn rejects_plain_text() {
        assert_eq!(parse_command("hello there").unwrap_err(), CommandParseError::NotACommand);
    }

    #[test]
    fn rejects_unknown_command() {
        assert_eq!(
            parse_command("/nonsense").unwrap_err(),
            CommandParseError::Unknown("nonsense".to_string())
        );
    }

    #[test]
    fn lifecycle_commands_map_onto_engine_command() {
        assert_eq!(TelegramCommand::Start.as_engine_command(), Some(EngineCommand::Start));
        assert_eq!(TelegramCommand::Status.as_engine_command(), None);
        assert_eq!(TelegramCommand::Positions.as_engine_command(), None);
        assert_eq!(TelegramCommand::Help.as_engine_command(), None);
    }
}
