use std::io::IsTerminal;
use std::time::Duration;

use clap::Args;

use super::GlobalArgs;
use crate::error::ExitError;
use crate::store::{LookupError, Role, SessionIndex, Transcript, TranscriptStore};

const TRUNCATED: &str = "\n... [truncated]";

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Session id or a unique prefix of one
    pub id: String,
    /// Characters of each Copilot response to print (0 = everything)
    #[arg(long, default_value_t = 2000)]
    pub max_response_chars: usize,
    /// Print verbatim even on a terminal
    #[arg(long)]
    pub raw: bool,
}

impl ShowArgs {
    pub fn execute(&self, globals: &GlobalArgs) -> anyhow::Result<()> {
        let config = globals.load_config()?;
        let store = TranscriptStore::from_config(&config);
        let root = store.root().display().to_string();
        let index = SessionIndex::new(store, Duration::ZERO);

        let transcript = match index.find(&self.id) {
            Ok(transcript) => transcript,
            Err(LookupError::NotFound(id)) => {
                return Err(ExitError::Missing {
                    what: format!("session \"{id}\""),
                    path: root,
                }
                .into());
            }
            Err(e @ LookupError::Ambiguous { .. }) => {
                return Err(ExitError::Other(e.to_string()).into());
            }
        };

        let rendered = render(&transcript, self.max_response_chars);
        if !self.raw && std::io::stdout().is_terminal() {
            termimad::print_text(&rendered);
        } else {
            print!("{rendered}");
        }
        Ok(())
    }
}

/// Markdown view of one conversation, Copilot turns cut at `max_response`.
fn render(transcript: &Transcript, max_response: usize) -> String {
    let session = &transcript.session;
    let mut out = format!(
        "# {}\n\n*Date: {} | Messages: {} | Id: {}*\n\n",
        session.title,
        session.updated_at.format("%Y-%m-%d"),
        session.message_count,
        session.session_id
    );
    for turn in &transcript.turns {
        let (heading, text) = match turn.role {
            Role::User => ("USER", turn.text.clone()),
            Role::Assistant => ("COPILOT", truncate(&turn.text, max_response)),
        };
        out.push_str(&format!("## {heading}\n\n{text}\n\n"));
    }
    out
}

fn truncate(text: &str, max: usize) -> String {
    if max == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{TRUNCATED}", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Session, Turn};
    use chrono::{DateTime, Utc};
    use std::path::PathBuf;

    fn transcript(answer: &str) -> Transcript {
        let at = DateTime::<Utc>::from_timestamp(1_760_000_000, 0).unwrap();
        Transcript {
            session: Session {
                session_id: "abc-123".into(),
                title: "Reconnect loop".into(),
                created_at: at,
                updated_at: at,
                transcript_location: PathBuf::from("/s/abc-123.json"),
                message_count: 2,
            },
            turns: vec![
                Turn {
                    role: Role::User,
                    text: "why does it spin?".into(),
                },
                Turn {
                    role: Role::Assistant,
                    text: answer.into(),
                },
            ],
        }
    }

    #[test]
    fn renders_header_and_turns() {
        let out = render(&transcript("Backoff reset too early."), 2000);
        assert!(out.starts_with("# Reconnect loop\n\n*Date: 2025-10-09 | Messages: 2 | Id: abc-123*"));
        assert!(out.contains("## USER\n\nwhy does it spin?\n\n"));
        assert!(out.contains("## COPILOT\n\nBackoff reset too early.\n\n"));
        assert!(!out.contains("[truncated]"));
    }

    #[test]
    fn long_responses_are_cut() {
        let answer = "é".repeat(30);
        let out = render(&transcript(&answer), 10);
        assert!(out.contains(&format!("{}\n... [truncated]", "é".repeat(10))));
        assert!(!out.contains(&"é".repeat(11)));

        let full = render(&transcript(&answer), 0);
        assert!(full.contains(&answer));
    }

    #[test]
    fn user_turns_are_never_cut() {
        let mut t = transcript("ok");
        t.turns[0].text = "q".repeat(50);
        assert!(render(&t, 5).contains(&"q".repeat(50)));
    }
}
