use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{Session, StoreError};
use crate::config::Config;

const TITLE_MAX_CHARS: usize = 60;
const TITLE_MIN_WORD_CUT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// A parsed session: metadata plus the conversation itself.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub session: Session,
    pub turns: Vec<Turn>,
}

impl Transcript {
    /// Full searchable text, one turn per paragraph.
    pub fn text(&self) -> String {
        self.turns
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Markdown block suitable for appending to the context document.
    pub fn to_markdown(&self) -> String {
        let mut out = format!(
            "## Session: {}\n**Date:** {}\n\n",
            self.session.title,
            self.session.updated_at.format("%Y-%m-%d")
        );
        for turn in &self.turns {
            let heading = match turn.role {
                Role::User => "User",
                Role::Assistant => "Copilot",
            };
            out.push_str(&format!("### {heading}\n{}\n\n", turn.text));
        }
        out.push_str("---\n\n");
        out
    }
}

/// Title from the first user message: newlines flattened, cut at a word
/// boundary near 60 characters.
pub fn title_from_first_message(first: Option<&str>) -> String {
    let Some(first) = first else {
        return "Empty Conversation".to_string();
    };
    if first.trim().is_empty() {
        return "Untitled Conversation".to_string();
    }
    if first.chars().count() <= TITLE_MAX_CHARS {
        return first.replace('\n', " ").trim().to_string();
    }

    let truncated: String = first.chars().take(TITLE_MAX_CHARS).collect();
    let cut = match truncated.rfind(' ') {
        Some(idx) if truncated[..idx].chars().count() > TITLE_MIN_WORD_CUT => &truncated[..idx],
        _ => truncated.as_str(),
    };
    format!("{}...", cut.replace('\n', " ").trim())
}

#[derive(Debug, Clone, Copy)]
struct FileTimes {
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

/// Reads session transcripts from a directory tree.
///
/// VS Code chat-session JSON (`*.json`) and Markdown transcripts (`*.md`)
/// are recognised. Files that fail to load are skipped with a warning.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    root: PathBuf,
    max_depth: usize,
    max_file_bytes: u64,
}

impl TranscriptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_depth: 4,
            max_file_bytes: 10 * 1024 * 1024,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.store_root(),
            max_depth: config.store.max_depth.max(1),
            max_file_bytes: config.store.max_file_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Candidate transcript files in file-name order. A missing root is an
    /// empty store.
    pub fn discover(&self) -> Vec<PathBuf> {
        if !self.root.is_dir() {
            debug!(root = %self.root.display(), "transcript store root not found");
            return Vec::new();
        }
        WalkDir::new(&self.root)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "skipping unreadable store entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("json" | "md")
                )
            })
            .collect()
    }

    /// Every loadable transcript, in discovery order.
    pub fn load_all(&self) -> Vec<Transcript> {
        self.discover()
            .par_iter()
            .filter_map(|path| match self.load(path) {
                Ok(transcript) => Some(transcript),
                Err(e @ StoreError::NotASession { .. }) => {
                    debug!(error = %e, "ignoring file");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "skipping transcript");
                    None
                }
            })
            .collect()
    }

    pub fn load(&self, path: &Path) -> Result<Transcript, StoreError> {
        let read_err = |source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        };
        let meta = fs::metadata(path).map_err(read_err)?;
        if meta.len() > self.max_file_bytes {
            return Err(StoreError::TooLarge {
                path: path.to_path_buf(),
                size: meta.len(),
                limit: self.max_file_bytes,
            });
        }
        let content = fs::read_to_string(path).map_err(read_err)?;

        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let created = meta.created().map(DateTime::<Utc>::from).unwrap_or(modified);
        let times = FileTimes { created, modified };

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => parse_chat_session(path, &content, times),
            Some("md") => parse_markdown(path, &content, times),
            _ => Err(StoreError::NotASession {
                path: path.to_path_buf(),
            }),
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// --- VS Code chat sessions ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSession {
    session_id: Option<String>,
    custom_title: Option<String>,
    creation_date: Option<i64>,
    last_message_date: Option<i64>,
    requests: Option<Vec<RawRequest>>,
}

#[derive(Deserialize)]
struct RawRequest {
    message: Option<RawMessage>,
    response: Option<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    text: String,
}

fn parse_chat_session(path: &Path, content: &str, times: FileTimes) -> Result<Transcript, StoreError> {
    let raw: RawSession = serde_json::from_str(content).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Some(requests) = raw.requests else {
        return Err(StoreError::NotASession {
            path: path.to_path_buf(),
        });
    };

    let exchanges: Vec<(String, String)> = requests
        .into_iter()
        .filter_map(|r| {
            let message = r.message?;
            Some((message.text, response_text(r.response.as_deref().unwrap_or(&[]))))
        })
        .collect();

    let title = raw
        .custom_title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| title_from_first_message(exchanges.first().map(|(u, _)| u.as_str())));

    let updated_at = raw
        .last_message_date
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(times.modified);
    let created_at = raw
        .creation_date
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(times.created);

    let mut turns = Vec::with_capacity(exchanges.len() * 2);
    for (user, response) in &exchanges {
        if !user.is_empty() {
            turns.push(Turn {
                role: Role::User,
                text: user.clone(),
            });
        }
        if !response.is_empty() {
            turns.push(Turn {
                role: Role::Assistant,
                text: response.clone(),
            });
        }
    }

    Ok(Transcript {
        session: Session {
            session_id: raw
                .session_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| file_stem(path)),
            title,
            created_at,
            updated_at,
            transcript_location: path.to_path_buf(),
            message_count: exchanges.len(),
        },
        turns,
    })
}

/// Readable text of a response: markdown as-is, edits and tool calls
/// summarised, reasoning dropped.
fn response_text(parts: &[serde_json::Value]) -> String {
    let str_at = |part: &serde_json::Value, pointer: &str| {
        part.pointer(pointer)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    parts
        .iter()
        .filter_map(|part| match part.get("kind").and_then(|k| k.as_str()) {
            Some("markdownContent") => str_at(part, "/content/value"),
            Some("textEditGroup") => part
                .get("edits")
                .and_then(|e| e.as_array())
                .filter(|e| !e.is_empty())
                .map(|e| format!("[Code edits: {} changes]", e.len())),
            Some("codeblockUri") => Some(format!(
                "[Code block: {}]",
                part.get("uri")
                    .map(|u| match u.as_str() {
                        Some(s) => s.to_string(),
                        None => u.to_string(),
                    })
                    .unwrap_or_else(|| "unnamed".to_string())
            )),
            Some("toolInvocationSerialized") => {
                str_at(part, "/pastTenseMessage/value").map(|m| format!("[Tool: {m}]"))
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// --- Markdown transcripts ---

fn flush_turn(current: &mut Option<(Role, Vec<&str>)>, turns: &mut Vec<Turn>) {
    if let Some((role, lines)) = current.take() {
        let text = lines.join("\n").trim().trim_end_matches("---").trim().to_string();
        turns.push(Turn { role, text });
    }
}

fn parse_markdown(path: &Path, content: &str, times: FileTimes) -> Result<Transcript, StoreError> {
    let mut heading_title: Option<String> = None;
    let mut turns: Vec<Turn> = Vec::new();
    let mut current: Option<(Role, Vec<&str>)> = None;
    let mut in_fence = false;

    for line in content.lines() {
        // Headings inside fenced code belong to the turn text.
        if let Some((_, lines)) = current.as_mut()
            && (in_fence || line.trim_start().starts_with("```"))
        {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
            }
            lines.push(line);
            continue;
        }
        if let Some(heading) = line.strip_prefix("### ") {
            flush_turn(&mut current, &mut turns);
            let role = if heading.trim().eq_ignore_ascii_case("user") {
                Role::User
            } else {
                Role::Assistant
            };
            current = Some((role, Vec::new()));
        } else if let Some(title) = line.strip_prefix("# ") {
            if heading_title.is_none() {
                heading_title = Some(title.trim().to_string());
            }
        } else if line.starts_with("## ") {
            flush_turn(&mut current, &mut turns);
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    flush_turn(&mut current, &mut turns);

    if turns.is_empty() {
        return Err(StoreError::NotASession {
            path: path.to_path_buf(),
        });
    }

    let title = heading_title.filter(|t| !t.is_empty()).unwrap_or_else(|| {
        title_from_first_message(
            turns
                .iter()
                .find(|t| t.role == Role::User)
                .map(|t| t.text.as_str())
                .or(Some("")),
        )
    });

    Ok(Transcript {
        session: Session {
            session_id: file_stem(path),
            title,
            created_at: times.created,
            updated_at: times.modified,
            transcript_location: path.to_path_buf(),
            message_count: turns.len(),
        },
        turns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times() -> FileTimes {
        let t = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        FileTimes {
            created: t,
            modified: t,
        }
    }

    const SESSION_JSON: &str = r#"{
        "version": 3,
        "sessionId": "abc-123",
        "creationDate": 1704067200000,
        "lastMessageDate": 1704153600000,
        "requests": [
            {
                "message": {"text": "How do I configure the MCP server for shared context?"},
                "response": [
                    {"kind": "thinking", "value": "hmm"},
                    {"kind": "markdownContent", "content": {"value": "Add it to settings.json."}},
                    {"kind": "textEditGroup", "edits": [[], []]},
                    {"kind": "codeblockUri", "uri": "file:///x.rs"},
                    {"kind": "toolInvocationSerialized", "pastTenseMessage": {"value": "Read file"}}
                ]
            },
            {"response": []},
            {"message": {"text": "thanks"}, "response": null}
        ]
    }"#;

    #[test]
    fn parses_vscode_session() {
        let t = parse_chat_session(Path::new("/s/abc.json"), SESSION_JSON, times()).unwrap();
        assert_eq!(t.session.session_id, "abc-123");
        assert_eq!(t.session.message_count, 2);
        assert_eq!(
            t.session.title,
            "How do I configure the MCP server for shared context?"
        );
        assert_eq!(t.session.updated_at.format("%Y-%m-%d").to_string(), "2024-01-02");
        assert_eq!(t.session.created_at.format("%Y-%m-%d").to_string(), "2024-01-01");

        assert_eq!(t.turns.len(), 3);
        assert_eq!(t.turns[0].role, Role::User);
        assert_eq!(
            t.turns[1].text,
            "Add it to settings.json.\n\n[Code edits: 2 changes]\n\n[Code block: file:///x.rs]\n\n[Tool: Read file]"
        );
        assert!(!t.text().contains("hmm"));
    }

    #[test]
    fn custom_title_and_file_stem_fallbacks() {
        let json = r#"{"customTitle": "Named", "requests": []}"#;
        let t = parse_chat_session(Path::new("/s/stem-id.json"), json, times()).unwrap();
        assert_eq!(t.session.title, "Named");
        assert_eq!(t.session.session_id, "stem-id");
        assert_eq!(t.session.updated_at, times().modified);
    }

    #[test]
    fn json_without_requests_is_not_a_session() {
        let err = parse_chat_session(Path::new("/s/workspace.json"), r#"{"folder": "x"}"#, times())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotASession { .. }));
    }

    #[test]
    fn title_rules() {
        assert_eq!(title_from_first_message(None), "Empty Conversation");
        assert_eq!(title_from_first_message(Some("  ")), "Untitled Conversation");
        assert_eq!(title_from_first_message(Some("short\nquestion")), "short question");

        let long = "Explain the difference between borrowing and ownership in the context of closures please";
        let title = title_from_first_message(Some(long));
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= 63);
        assert!(!title.trim_end_matches("...").ends_with(' '));

        let unbroken = "x".repeat(80);
        assert_eq!(title_from_first_message(Some(&unbroken)), format!("{}...", "x".repeat(60)));
    }

    #[test]
    fn parses_markdown_transcript() {
        let md = "# Debugging the reconnect loop\n\n### User\nwhy does it spin?\n\n### Copilot\nBackoff was reset too early.\n\n---\n";
        let t = parse_markdown(Path::new("/s/debug.md"), md, times()).unwrap();
        assert_eq!(t.session.title, "Debugging the reconnect loop");
        assert_eq!(t.session.session_id, "debug");
        assert_eq!(t.session.message_count, 2);
        assert_eq!(t.turns[1].text, "Backoff was reset too early.");
    }

    #[test]
    fn markdown_headings_inside_code_fences_stay_in_the_turn() {
        let md = "# Setup\n\n### User\nhow do I install it?\n\n### Copilot\nRun this:\n```sh\n# install the tool\n## pinned version\ncargo install comms-bridge\n```\ndone\n\n## Session next\n";
        let t = parse_markdown(Path::new("/s/setup.md"), md, times()).unwrap();
        assert_eq!(t.session.title, "Setup");
        assert_eq!(t.turns.len(), 2);
        assert!(t.turns[1].text.contains("# install the tool"));
        assert!(t.turns[1].text.contains("## pinned version"));
        assert!(t.turns[1].text.ends_with("done"));
    }

    #[test]
    fn markdown_without_blocks_is_not_a_session() {
        let err = parse_markdown(Path::new("/s/README.md"), "# Readme\n\nhello\n", times()).unwrap_err();
        assert!(matches!(err, StoreError::NotASession { .. }));
    }

    #[test]
    fn export_markdown_format() {
        let t = parse_chat_session(Path::new("/s/abc.json"), SESSION_JSON, times()).unwrap();
        let md = t.to_markdown();
        assert!(md.starts_with("## Session: How do I configure"));
        assert!(md.contains("**Date:** 2024-01-02\n\n### User\n"));
        assert!(md.contains("### Copilot\nAdd it to settings.json."));
        assert!(md.ends_with("---\n\n"));
    }

    #[test]
    fn load_all_skips_bad_files_and_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = dir.path().join("ws1").join("chatSessions");
        std::fs::create_dir_all(&sessions).unwrap();
        std::fs::write(sessions.join("a.json"), SESSION_JSON).unwrap();
        std::fs::write(sessions.join("b.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("ws1").join("workspace.json"), "{}").unwrap();

        let store = TranscriptStore::new(dir.path());
        let loaded = store.load_all();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].session.session_id, "abc-123");

        assert!(TranscriptStore::new(dir.path().join("nope")).load_all().is_empty());
    }

    #[test]
    fn oversized_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.json");
        std::fs::write(&path, SESSION_JSON).unwrap();
        let store = TranscriptStore {
            root: dir.path().to_path_buf(),
            max_depth: 2,
            max_file_bytes: 10,
        };
        assert!(matches!(store.load(&path), Err(StoreError::TooLarge { .. })));
    }
}
