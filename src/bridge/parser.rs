use regex::Regex;

use crate::channel::ChatMessage;

/// One entry of the command table. Drives parsing aliases and `help`.
#[derive(Debug, Clone, Copy)]
pub struct VerbSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const VERBS: &[VerbSpec] = &[
    VerbSpec {
        name: "recent",
        aliases: &["chats", "chat", "sessions", "session"],
        usage: "recent [N]",
        summary: "List the last N chat sessions",
    },
    VerbSpec {
        name: "all",
        aliases: &[],
        usage: "all",
        summary: "List all available sessions",
    },
    VerbSpec {
        name: "search",
        aliases: &["find"],
        usage: "search <query>",
        summary: "Search sessions for a keyword",
    },
    VerbSpec {
        name: "context",
        aliases: &[],
        usage: "context",
        summary: "Show the shared context document",
    },
    VerbSpec {
        name: "export",
        aliases: &[],
        usage: "export <id>",
        summary: "Append a session to the context document",
    },
    VerbSpec {
        name: "status",
        aliases: &[],
        usage: "status",
        summary: "Show bridge status",
    },
    VerbSpec {
        name: "help",
        aliases: &[],
        usage: "help",
        summary: "Show this help message",
    },
];

/// Canonical verb name for a typed verb or alias.
fn canonical(verb: &str) -> Option<&'static str> {
    VERBS
        .iter()
        .find(|spec| spec.name == verb || spec.aliases.contains(&verb))
        .map(|spec| spec.name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    /// `None` means the configured default.
    Recent { limit: Option<usize> },
    All,
    Search { query: String },
    Context,
    Export { session_id: String },
    Status,
    /// Terminal fallback: carries the full command text.
    Unknown { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    /// Lower-cased first token, empty for a bare mention.
    pub verb: String,
    pub args: Vec<String>,
    /// Text after the mention token, trimmed.
    pub raw_text: String,
    pub source: ChatMessage,
}

/// Finds the mention token and turns what follows into a [`Command`].
#[derive(Debug, Clone)]
pub struct CommandParser {
    mention: Regex,
}

impl CommandParser {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        let token = token.trim();
        anyhow::ensure!(!token.is_empty(), "mention token must not be empty");
        // The token must stand alone: not glued to a preceding word, and
        // followed by whitespace or the end of the text when it ends in a
        // word character (`@copilot-bridge`, `ops@copilot.dev` don't count).
        let tail = if token.chars().next_back().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            r"(?:\s+(.*))?"
        } else {
            "(.*)"
        };
        let pattern = format!(r"(?is)(?:^|\W){}{tail}$", regex::escape(token));
        Ok(Self {
            mention: Regex::new(&pattern)?,
        })
    }

    pub fn parse(&self, message: &ChatMessage) -> Option<Command> {
        let caps = self.mention.captures(&message.text)?;
        let raw_text = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();

        let mut tokens = raw_text.split_whitespace();
        let verb = tokens.next().unwrap_or_default().to_lowercase();
        let args: Vec<String> = tokens.map(str::to_string).collect();
        let kind = classify(&verb, &args, &raw_text);

        Some(Command {
            kind,
            verb,
            args,
            raw_text,
            source: message.clone(),
        })
    }
}

fn classify(verb: &str, args: &[String], raw_text: &str) -> CommandKind {
    let unknown = || CommandKind::Unknown {
        text: raw_text.to_string(),
    };
    if verb.is_empty() {
        return CommandKind::Help;
    }
    let Some(name) = canonical(verb) else {
        return unknown();
    };

    match (name, args) {
        ("help", []) => CommandKind::Help,
        ("context", []) => CommandKind::Context,
        ("status", []) => CommandKind::Status,
        ("recent", []) => CommandKind::Recent { limit: None },
        ("recent", [n]) => match n.parse::<usize>() {
            Ok(limit) if limit > 0 => CommandKind::Recent { limit: Some(limit) },
            _ => unknown(),
        },
        ("all", []) => CommandKind::All,
        ("all", [what]) if canonical(&what.to_lowercase()) == Some("recent") => CommandKind::All,
        ("search", [_, ..]) => CommandKind::Search {
            query: args.join(" "),
        },
        ("export", [_, ..]) => CommandKind::Export {
            session_id: args.join(" "),
        },
        _ => unknown(),
    }
}
