use std::io::IsTerminal;
use std::time::Duration;

use clap::Args;
use serde::Serialize;

use super::GlobalArgs;
use crate::channel::{ConsoleApi, HttpConsole, Identity};
use crate::config::{CONFIG_TOML, Config, find_config};
use crate::context_doc::ContextDocument;
use crate::error::ExitError;
use crate::store::{SessionIndex, TranscriptStore};

#[derive(Debug, Args)]
pub struct DoctorArgs {
    /// Skip the Console reachability and presence checks
    #[arg(long)]
    pub offline: bool,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Text,
    Json,
}

impl OutputFormat {
    /// Explicit choice, else pretty on a terminal and text otherwise.
    pub fn resolve(explicit: Option<Self>) -> Self {
        explicit.unwrap_or_else(|| {
            if std::io::stdout().is_terminal() {
                OutputFormat::Pretty
            } else {
                OutputFormat::Text
            }
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub config: ConfigStatus,
    pub store: StoreStatus,
    pub context: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console: Option<ConsoleStatus>,
    pub issues: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfigStatus {
    /// `None` when running on defaults.
    pub file: Option<String>,
    pub agent_id: String,
    pub mention: String,
    pub console_url: String,
}

#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub path: String,
    pub exists: bool,
    pub sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct FileStatus {
    pub path: String,
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct ConsoleStatus {
    pub reachable: bool,
    pub online_entities: usize,
    /// Whether a running bridge with this agent id is online.
    pub bridge_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DoctorArgs {
    pub fn execute(&self, globals: &GlobalArgs) -> anyhow::Result<()> {
        let config = globals.load_config()?;
        let workspace = globals.workspace()?;
        let config_file = match &globals.config {
            Some(path) => Some(path.clone()),
            None => std::env::current_dir().ok().and_then(|d| find_config(&d)),
        };

        let mut report = DoctorReport {
            config: ConfigStatus {
                file: config_file.map(|p| p.display().to_string()),
                agent_id: config.agent.id.clone(),
                mention: config.agent.mention.clone(),
                console_url: config.console.url.clone(),
            },
            store: check_store(&config),
            context: check_context(&config, &workspace),
            console: None,
            issues: vec![],
        };

        if report.config.file.is_none() {
            report
                .issues
                .push(format!("no {CONFIG_TOML} found, using defaults"));
        }
        if !report.store.exists {
            report
                .issues
                .push(format!("transcript store not found: {}", report.store.path));
        } else if report.store.sessions == 0 {
            report.issues.push("transcript store has no sessions".to_string());
        }
        if !report.context.exists {
            report.issues.push(format!(
                "context document not found: {} (run `comms-bridge context init`)",
                report.context.path
            ));
        }

        if !self.offline {
            let console = check_console(&config);
            if let Some(error) = &console.error {
                report.issues.push(format!("console unreachable: {error}"));
            }
            report.console = Some(console);
        }

        match OutputFormat::resolve(self.format) {
            OutputFormat::Pretty => print_pretty(&report),
            OutputFormat::Text => print_text(&report),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }

        if let Some(ConsoleStatus {
            error: Some(message),
            ..
        }) = &report.console
        {
            return Err(ExitError::ConsoleUnreachable {
                url: config.console.url,
                message: message.clone(),
            }
            .into());
        }
        let issue_count = report.issues.len();
        if issue_count > 0 {
            return Err(ExitError::new(
                u8::try_from(issue_count.min(125)).unwrap_or(125),
                format!("{issue_count} issue(s) found"),
            )
            .into());
        }
        Ok(())
    }
}

fn check_store(config: &Config) -> StoreStatus {
    let store = TranscriptStore::from_config(config);
    let exists = store.root().is_dir();
    let sessions = if exists {
        SessionIndex::new(store.clone(), Duration::ZERO).session_count()
    } else {
        0
    };
    StoreStatus {
        path: store.root().display().to_string(),
        exists,
        sessions,
    }
}

fn check_context(config: &Config, workspace: &std::path::Path) -> FileStatus {
    let doc = ContextDocument::new(config.context_path(workspace));
    FileStatus {
        path: doc.path().display().to_string(),
        exists: doc.exists(),
    }
}

fn check_console(config: &Config) -> ConsoleStatus {
    let identity = Identity {
        id: config.agent.id.clone(),
        name: config.agent.name.clone(),
    };
    let console = HttpConsole::new(&config.console, identity);
    match console.online_entities() {
        Ok(entities) => ConsoleStatus {
            reachable: true,
            online_entities: entities.len(),
            bridge_online: entities
                .iter()
                .any(|e| e.id.eq_ignore_ascii_case(&config.agent.id)),
            error: None,
        },
        Err(e) => ConsoleStatus {
            reachable: false,
            online_entities: 0,
            bridge_online: false,
            error: Some(e.to_string()),
        },
    }
}

fn mark(ok: bool) -> &'static str {
    if ok { "✓" } else { "✗" }
}

fn print_pretty(report: &DoctorReport) {
    println!("=== comms-bridge doctor ===\n");
    println!(
        "Config:  {}",
        report.config.file.as_deref().unwrap_or("(defaults)")
    );
    println!("Agent:   {} ({})", report.config.agent_id, report.config.mention);
    println!("Console: {}", report.config.console_url);
    println!();

    println!(
        "  {} store: {} ({} sessions)",
        mark(report.store.exists),
        report.store.path,
        report.store.sessions
    );
    println!("  {} context: {}", mark(report.context.exists), report.context.path);
    if let Some(console) = &report.console {
        println!(
            "  {} console: {}",
            mark(console.reachable),
            if console.reachable {
                format!("{} online", console.online_entities)
            } else {
                "unreachable".to_string()
            }
        );
        if console.reachable {
            let presence = if console.bridge_online { "online" } else { "not running" };
            println!("  - bridge presence: {presence}");
        }
    }

    if report.issues.is_empty() {
        println!("\n✓ No issues found");
    } else {
        println!("\nIssues ({}):", report.issues.len());
        for issue in &report.issues {
            println!("  • {issue}");
        }
    }
}

fn print_text(report: &DoctorReport) {
    println!(
        "comms-bridge-doctor  config={}  agent={}  console={}",
        report.config.file.as_deref().unwrap_or("-"),
        report.config.agent_id,
        report.config.console_url
    );
    let status = |ok: bool| if ok { "ok" } else { "missing" };
    println!(
        "store  {}  {}  sessions={}",
        report.store.path,
        status(report.store.exists),
        report.store.sessions
    );
    println!("context  {}  {}", report.context.path, status(report.context.exists));
    if let Some(console) = &report.console {
        println!(
            "console  reachable={}  online={}  bridge_online={}",
            console.reachable, console.online_entities, console.bridge_online
        );
    }
    if !report.issues.is_empty() {
        println!("issues  count={}", report.issues.len());
        for issue in &report.issues {
            println!("issue  {issue}");
        }
    }
}
