use std::path::PathBuf;

use serde::Serialize;
use tracing::error;

use super::parser::VERBS;
use super::status::{StatusSnapshot, format_uptime};
use crate::channel::Identity;
use crate::store::{SearchMatch, Session};
use crate::template;

const LIST_TITLE_MAX_CHARS: usize = 40;

/// Leading status symbol of every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Marker {
    Success,
    Failure,
    Info,
}

impl Marker {
    pub fn symbol(self) -> &'static str {
        match self {
            Marker::Success => "✅",
            Marker::Failure => "❌",
            Marker::Info => "🌐",
        }
    }
}

/// Text ready to post, tagged with who sends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub sender: Identity,
    pub marker: Marker,
}

/// Structured result of one handler.
#[derive(Debug, Clone)]
pub enum Outcome {
    Help,
    Sessions { sessions: Vec<Session>, total: usize },
    NoSessions,
    SearchResults { query: String, matches: Vec<SearchMatch> },
    NoResults { query: String },
    Context { name: String, content: String },
    ContextMissing { path: PathBuf },
    Exported { session: Session, document: PathBuf },
    ExportFailed { session_id: String, reason: String },
    Status { snapshot: StatusSnapshot, sessions_indexed: usize },
    Unknown { text: String },
    Failure { message: String },
}

#[derive(Serialize)]
struct VerbRow {
    usage: &'static str,
    summary: &'static str,
}

#[derive(Serialize)]
struct SessionRow {
    num: String,
    title: String,
    date: String,
    messages: usize,
}

#[derive(Serialize)]
struct MatchRow {
    num: String,
    title: String,
    date: String,
    matches: usize,
    snippet: String,
}

/// Renders handler outcomes into chat text. Output depends only on the
/// outcome, so identical results always produce identical replies.
#[derive(Debug, Clone)]
pub struct ReplyFormatter {
    identity: Identity,
    mention: String,
    title: String,
    search_limit: usize,
    max_context_chars: usize,
}

impl ReplyFormatter {
    pub fn new(identity: Identity, mention: &str, search_limit: usize, max_context_chars: usize) -> Self {
        Self {
            identity,
            mention: mention.to_string(),
            title: bridge_title(mention),
            search_limit: search_limit.max(1),
            max_context_chars: max_context_chars.max(1),
        }
    }

    pub fn format(&self, outcome: &Outcome) -> Reply {
        let marker = marker_for(outcome);
        let text = match self.body(outcome, marker) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "reply rendering failed");
                return self.reply(Marker::Failure, format!("{} Error: could not render reply", Marker::Failure.symbol()));
            }
        };
        self.reply(marker, text)
    }

    fn reply(&self, marker: Marker, text: String) -> Reply {
        Reply {
            text,
            sender: self.identity.clone(),
            marker,
        }
    }

    fn body(&self, outcome: &Outcome, marker: Marker) -> anyhow::Result<String> {
        let m = marker.symbol();
        let text = match outcome {
            Outcome::Help => {
                let verbs: Vec<VerbRow> = VERBS
                    .iter()
                    .map(|v| VerbRow {
                        usage: v.usage,
                        summary: v.summary,
                    })
                    .collect();
                template::render(
                    "help.md",
                    minijinja::context! { marker => m, title => self.title, mention => self.mention, verbs },
                )?
            }
            Outcome::Sessions { sessions, total } => {
                let rows: Vec<SessionRow> = sessions
                    .iter()
                    .enumerate()
                    .map(|(i, s)| SessionRow {
                        num: format!("{:>2}", i + 1),
                        title: shorten(&s.title, LIST_TITLE_MAX_CHARS),
                        date: s.updated_at.format("%Y-%m-%d").to_string(),
                        messages: s.message_count,
                    })
                    .collect();
                let more = total.saturating_sub(sessions.len());
                template::render("sessions.md", minijinja::context! { marker => m, rows, more })?
            }
            Outcome::NoSessions => format!("{m} No chat sessions found."),
            Outcome::SearchResults { query, matches } => {
                let rows: Vec<MatchRow> = matches
                    .iter()
                    .take(self.search_limit)
                    .enumerate()
                    .map(|(i, hit)| MatchRow {
                        num: format!("{:>2}", i + 1),
                        title: shorten(&hit.session.title, LIST_TITLE_MAX_CHARS),
                        date: hit.session.updated_at.format("%Y-%m-%d").to_string(),
                        matches: hit.match_count,
                        snippet: hit.snippet.clone(),
                    })
                    .collect();
                let more = matches.len().saturating_sub(rows.len());
                template::render(
                    "search.md",
                    minijinja::context! { marker => m, total => matches.len(), query, rows, more },
                )?
            }
            Outcome::NoResults { query } => format!("{m} No results found for \"{query}\""),
            Outcome::Context { name, content } => self.context_body(m, name, content),
            Outcome::ContextMissing { path } => format!(
                "{m} No context document: {} not found. Create it with `comms-bridge context init`.",
                path.display()
            ),
            Outcome::Exported { session, document } => format!(
                "{m} **Session Exported**\n\nSession \"{}\" has been appended to {}.\n\nTitle: {}\nMessages: {}",
                session.session_id,
                document
                    .file_name()
                    .map_or_else(|| document.display().to_string(), |n| n.to_string_lossy().into_owned()),
                session.title,
                session.message_count
            ),
            Outcome::ExportFailed { session_id, reason } => {
                format!("{m} Failed to export session \"{session_id}\": {reason}")
            }
            Outcome::Status {
                snapshot,
                sessions_indexed,
            } => template::render(
                "status.md",
                minijinja::context! {
                    marker => m,
                    title => self.title,
                    agent_id => snapshot.agent_id,
                    console_name => snapshot.console_name,
                    console_url => snapshot.console_url,
                    connection => snapshot.connection_state.to_string(),
                    connected_since => snapshot
                        .connected_since
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
                    uptime => format_uptime(snapshot.uptime),
                    commands_handled => snapshot.commands_handled,
                    sessions_indexed,
                    last_error => snapshot.last_error,
                },
            )?,
            Outcome::Unknown { text } => format!(
                "{m} Unknown command: \"{text}\"\n\nType `{} help` to see available commands.",
                self.mention
            ),
            Outcome::Failure { message } => format!("{m} Error: {message}"),
        };
        Ok(text.trim_end().to_string())
    }

    /// Long documents are cut at a line break before the limit.
    fn context_body(&self, m: &str, name: &str, content: &str) -> String {
        let total = content.chars().count();
        if total <= self.max_context_chars {
            return format!("{m} **{name}**\n\n{content}");
        }
        let cut: String = content.chars().take(self.max_context_chars).collect();
        let clean = match cut.rfind('\n') {
            Some(idx) if idx > 0 => &cut[..idx],
            _ => cut.as_str(),
        };
        format!("{m} **{name}** (truncated)\n\n{clean}\n\n_...content truncated ({total} chars total)_")
    }
}

fn marker_for(outcome: &Outcome) -> Marker {
    match outcome {
        Outcome::Sessions { .. }
        | Outcome::SearchResults { .. }
        | Outcome::Context { .. }
        | Outcome::Exported { .. }
        | Outcome::Status { .. } => Marker::Success,
        Outcome::ExportFailed { .. } | Outcome::Failure { .. } => Marker::Failure,
        Outcome::Help
        | Outcome::NoSessions
        | Outcome::NoResults { .. }
        | Outcome::ContextMissing { .. }
        | Outcome::Unknown { .. } => Marker::Info,
    }
}

/// `@copilot` → `Copilot Bridge`.
fn bridge_title(mention: &str) -> String {
    let name = mention.trim_start_matches(|c: char| !c.is_alphanumeric());
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("{}{} Bridge", first.to_uppercase(), chars.as_str()),
        None => "Bridge".to_string(),
    }
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
