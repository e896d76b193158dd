//! Chat command parsing.
//!
//! Commands are plain guild messages starting with the configured prefix:
//!
//! * `!echo` joins the voice channel the author is connected to.
//! * `!echo <channel>` joins a channel given by id or by name.
//! * `!delay <ms>` changes how long a speaker must stay silent before
//!   their audio is flushed.
//! * `!leave` disconnects from the guild's voice channel.

use std::time::Duration;

use thiserror::Error;

/// A voice channel given by the user, either an id or a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelQuery(pub String);

impl ChannelQuery {
    /// Returns the query as a channel id if it consists only of ASCII digits.
    pub fn as_id(&self) -> Option<u64> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Join the author's current voice channel
    JoinAuthor,
    /// Join the channel matching the query
    Join(ChannelQuery),
    /// Change the flush delay
    SetDelay(Duration),
    /// Disconnect from voice in this guild
    Leave,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("`{0}` is not a number of milliseconds")]
    InvalidDelay(String),
}

/// Parses a message into a command.
///
/// Returns `Ok(None)` for messages that are not commands.
pub fn parse(prefix: &str, content: &str) -> Result<Option<Command>, CommandError> {
    let Some(body) = content.strip_prefix(prefix) else {
        return Ok(None);
    };

    if body == "echo" {
        return Ok(Some(Command::JoinAuthor));
    }
    if let Some(arg) = body.strip_prefix("echo ") {
        return Ok(Some(Command::Join(ChannelQuery(arg.to_string()))));
    }
    if let Some(arg) = body.strip_prefix("delay ") {
        let arg = arg.trim();
        let millis: u64 = arg
            .parse()
            .map_err(|_| CommandError::InvalidDelay(arg.to_string()))?;
        return Ok(Some(Command::SetDelay(Duration::from_millis(millis))));
    }
    if body.trim_end() == "leave" {
        return Ok(Some(Command::Leave));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_without_argument() {
        assert_eq!(parse("!", "!echo"), Ok(Some(Command::JoinAuthor)));
    }

    #[test]
    fn test_echo_with_argument() {
        assert_eq!(
            parse("!", "!echo General Voice"),
            Ok(Some(Command::Join(ChannelQuery("General Voice".to_string()))))
        );
        assert_eq!(
            parse("!", "!echo 123456789"),
            Ok(Some(Command::Join(ChannelQuery("123456789".to_string()))))
        );
    }

    #[test]
    fn test_delay() {
        assert_eq!(
            parse("!", "!delay 2500"),
            Ok(Some(Command::SetDelay(Duration::from_millis(2500))))
        );
        assert_eq!(
            parse("!", "!delay soon"),
            Err(CommandError::InvalidDelay("soon".to_string()))
        );
        assert_eq!(
            parse("!", "!delay -5"),
            Err(CommandError::InvalidDelay("-5".to_string()))
        );
    }

    #[test]
    fn test_leave() {
        assert_eq!(parse("!", "!leave"), Ok(Some(Command::Leave)));
    }

    #[test]
    fn test_not_a_command() {
        assert_eq!(parse("!", "hello there"), Ok(None));
        assert_eq!(parse("!", "!echoes"), Ok(None));
        assert_eq!(parse("!", "!delay"), Ok(None));
        assert_eq!(parse("!", "echo"), Ok(None));
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(parse("tc ", "tc echo"), Ok(Some(Command::JoinAuthor)));
        assert_eq!(parse("tc ", "!echo"), Ok(None));
    }

    #[test]
    fn test_channel_query_id() {
        assert_eq!(ChannelQuery("42".to_string()).as_id(), Some(42));
        assert_eq!(ChannelQuery("4a2".to_string()).as_id(), None);
        assert_eq!(ChannelQuery("".to_string()).as_id(), None);
        assert_eq!(ChannelQuery("+42".to_string()).as_id(), None);
        // Too large for a snowflake.
        assert_eq!(
            ChannelQuery("99999999999999999999999".to_string()).as_id(),
            None
        );
    }
}
