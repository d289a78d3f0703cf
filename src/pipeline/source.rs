//! Newline-delimited chat events from standard input.
//!
//! Each line is either a JSON object `{"author": "..", "text": ".."}` or plain
//! text spoken as-is. A chat connector feeds the pipeline the same way.

use std::io::BufRead;
use std::thread::JoinHandle;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Author used for plain text lines.
pub const STDIN_AUTHOR: &str = "stdin";

/// One inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatEvent {
    #[serde(default = "default_author")]
    pub author: String,
    pub text: String,
}

fn default_author() -> String {
    STDIN_AUTHOR.to_string()
}

impl ChatEvent {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.starts_with('{') {
            match serde_json::from_str::<ChatEvent>(line) {
                Ok(event) => return Some(event),
                Err(e) => debug!("Not a JSON event, reading as text: {}", e),
            }
        }

        Some(Self { author: STDIN_AUTHOR.to_string(), text: line.to_string() })
    }
}

/// Forward events read from `reader` until EOF or until the receiver is gone.
///
/// Blocks the calling thread; never call it from an async task.
pub fn read_events<R: BufRead>(reader: R, tx: &mpsc::Sender<ChatEvent>) -> std::io::Result<()> {
    for line in reader.lines() {
        if let Some(event) = ChatEvent::parse_line(&line?)
            && tx.blocking_send(event).is_err()
        {
            debug!("Event channel closed");
            break;
        }
    }
    Ok(())
}

/// Spawn the stdin event source on a detached thread (stdin reads cannot be cancelled).
///
/// The channel closes when input ends.
pub fn spawn_stdin_source(tx: mpsc::Sender<ChatEvent>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name("stdin-events".into()).spawn(move || {
        if let Err(e) = read_events(std::io::stdin().lock(), &tx) {
            tracing::error!("Failed to read stdin: {}", e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_and_plain_lines() {
        assert_eq!(
            ChatEvent::parse_line(r#"{"author": "alice", "text": "hi there"}"#),
            Some(ChatEvent { author: "alice".into(), text: "hi there".into() })
        );
        assert_eq!(ChatEvent::parse_line(r#"{"text": "no author"}"#).unwrap().author, STDIN_AUTHOR);
        assert_eq!(ChatEvent::parse_line("  just words  "), Some(ChatEvent { author: STDIN_AUTHOR.into(), text: "just words".into() }));
        assert_eq!(ChatEvent::parse_line("{not json").unwrap().text, "{not json");
        assert_eq!(ChatEvent::parse_line("   "), None);
    }

    #[test]
    fn test_read_events_skips_blank_lines() {
        let input: &[u8] = b"first\n\n{\"author\":\"bob\",\"text\":\"second\"}\n";
        let (tx, mut rx) = mpsc::channel(8);

        read_events(input, &tx).unwrap();
        drop(tx);

        assert_eq!(rx.blocking_recv().unwrap().text, "first");
        assert_eq!(rx.blocking_recv().unwrap().author, "bob");
        assert!(rx.blocking_recv().is_none());
    }
}
