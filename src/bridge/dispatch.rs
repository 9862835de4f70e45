use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, warn};

use super::format::Outcome;
use super::parser::{Command, CommandKind};
use super::status::BridgeStatus;
use crate::config::CommandsConfig;
use crate::context_doc::ContextDocument;
use crate::store::SessionIndex;

/// Routes a parsed command to its handler.
///
/// Never fails: handler errors and panics both come back as
/// [`Outcome::Failure`], so every addressed command gets a reply.
pub struct Dispatcher {
    index: Arc<SessionIndex>,
    context: ContextDocument,
    status: Arc<BridgeStatus>,
    limits: CommandsConfig,
}

impl Dispatcher {
    pub fn new(
        index: Arc<SessionIndex>,
        context: ContextDocument,
        status: Arc<BridgeStatus>,
        limits: CommandsConfig,
    ) -> Self {
        Self {
            index,
            context,
            status,
            limits,
        }
    }

    pub fn dispatch(&self, command: &Command) -> Outcome {
        self.guarded(command, || self.handle(command))
    }

    /// Failure boundary around one handler run.
    fn guarded(
        &self,
        command: &Command,
        handler: impl FnOnce() -> anyhow::Result<Outcome>,
    ) -> Outcome {
        match panic::catch_unwind(AssertUnwindSafe(handler)) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(verb = %command.verb, error = %format!("{e:#}"), "command failed");
                self.status.record_error(format!("{}: {e}", command.verb));
                Outcome::Failure {
                    message: format!("{e:#}"),
                }
            }
            Err(payload) => {
                let detail = panic_message(payload.as_ref());
                error!(verb = %command.verb, panic = %detail, "command handler panicked");
                self.status
                    .record_error(format!("{} panicked: {detail}", command.verb));
                Outcome::Failure {
                    message: format!("internal error while running `{}`", command.verb),
                }
            }
        }
    }

    fn handle(&self, command: &Command) -> anyhow::Result<Outcome> {
        Ok(match &command.kind {
            CommandKind::Help => Outcome::Help,
            CommandKind::Recent { limit } => {
                self.list_sessions(limit.unwrap_or(self.limits.recent_default))
            }
            CommandKind::All => self.list_sessions(self.limits.all_limit),
            CommandKind::Search { query } => {
                let matches = self.index.search(query);
                if matches.is_empty() {
                    Outcome::NoResults {
                        query: query.clone(),
                    }
                } else {
                    Outcome::SearchResults {
                        query: query.clone(),
                        matches,
                    }
                }
            }
            CommandKind::Context => match self.context.read()? {
                Some(content) => Outcome::Context {
                    name: self.context_name(),
                    content,
                },
                None => Outcome::ContextMissing {
                    path: self.context.path().to_path_buf(),
                },
            },
            CommandKind::Export { session_id } => self.export(session_id)?,
            CommandKind::Status => Outcome::Status {
                snapshot: self.status.snapshot(),
                sessions_indexed: self.index.session_count(),
            },
            CommandKind::Unknown { text } => Outcome::Unknown { text: text.clone() },
        })
    }

    fn list_sessions(&self, limit: usize) -> Outcome {
        let mut sessions = self.index.list_recent(usize::MAX);
        if sessions.is_empty() {
            return Outcome::NoSessions;
        }
        let total = sessions.len();
        sessions.truncate(limit);
        Outcome::Sessions { sessions, total }
    }

    fn export(&self, session_id: &str) -> anyhow::Result<Outcome> {
        if !self.context.exists() {
            return Ok(Outcome::ContextMissing {
                path: self.context.path().to_path_buf(),
            });
        }
        let transcript = match self.index.find(session_id) {
            Ok(transcript) => transcript,
            Err(e) => {
                return Ok(Outcome::ExportFailed {
                    session_id: session_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        self.context.append_raw(&transcript.to_markdown())?;
        Ok(Outcome::Exported {
            session: transcript.session,
            document: self.context.path().to_path_buf(),
        })
    }

    fn context_name(&self) -> String {
        self.context.path().file_name().map_or_else(
            || self.context.path().display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
