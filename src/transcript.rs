//! Transcripts of utterances and where they are published.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::capture::Speaker;
use crate::error::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub speaker: Speaker,
    pub started_at: SystemTime,
    pub text: String,
}

impl Transcript {
    /// Whether there is anything worth publishing.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// `[<RFC 3339 UTC>] <name>: <text>`
    pub fn line(&self) -> String {
        let at: DateTime<Utc> = self.started_at.into();
        format!(
            "[{}] {}: {}",
            at.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.speaker.name,
            self.text
        )
    }

    /// Message posted back to the text channel.
    pub fn chat_message(&self) -> String {
        format!("**{}**: {}", self.speaker.name, self.text)
    }

    /// Appends [`Transcript::line`] to `path`, creating it if needed.
    pub fn append(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", self.line())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn transcript(text: &str) -> Transcript {
        Transcript {
            speaker: Speaker {
                id: 3,
                name: "carol".to_string(),
            },
            started_at: SystemTime::UNIX_EPOCH + Duration::from_millis(1_586_000_000_123),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_line() {
        assert_eq!(
            transcript("hello").line(),
            "[2020-04-04T11:33:20.123Z] carol: hello"
        );
        assert_eq!(transcript("hello").chat_message(), "**carol**: hello");
    }

    #[test]
    fn test_is_empty() {
        assert!(transcript("").is_empty());
        assert!(transcript("  \n").is_empty());
        assert!(!transcript("hi").is_empty());
    }

    #[test]
    fn test_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("transcript.log");
        transcript("one").append(&path).unwrap();
        transcript("two").append(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("carol: one"));
        assert!(lines[1].ends_with("carol: two"));
    }
}
