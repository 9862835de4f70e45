use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ExitError;

/// Config file name.
pub const CONFIG_TOML: &str = ".comms-bridge.toml";

/// Well-known context document name.
pub const CONTEXT_FILE: &str = "context.md";

/// Find the config file in a directory. Returns None if it doesn't exist.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(CONFIG_TOML);
    path.exists().then_some(path)
}

/// Top-level .comms-bridge.toml config.
///
/// Every section is optional; a missing file behaves like an empty one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InboundMode {
    /// Server-initiated event stream.
    #[default]
    Stream,
    /// Periodic recent-messages query.
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConsoleConfig {
    #[serde(default = "default_console_url")]
    pub url: String,
    #[serde(default = "default_console_name")]
    pub name: String,
    #[serde(default)]
    pub mode: InboundMode,
    #[serde(default = "default_stream_path", alias = "streamPath")]
    pub stream_path: String,
    #[serde(default = "default_send_path", alias = "sendPath")]
    pub send_path: String,
    #[serde(default = "default_online_path", alias = "onlinePath")]
    pub online_path: String,
    #[serde(default = "default_messages_path", alias = "messagesPath")]
    pub messages_path: String,
    #[serde(default = "default_poll_interval_ms", alias = "pollIntervalMs")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_secs", alias = "timeoutSecs")]
    pub timeout_secs: u64,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            url: default_console_url(),
            name: default_console_name(),
            mode: InboundMode::default(),
            stream_path: default_stream_path(),
            send_path: default_send_path(),
            online_path: default_online_path(),
            messages_path: default_messages_path(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ConsoleConfig {
    /// Join the base URL with an endpoint path, tolerating stray slashes.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentConfig {
    #[serde(default = "default_agent_id")]
    pub id: String,
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_mention")]
    pub mention: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            name: default_agent_name(),
            mention: default_mention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms", alias = "initialDelayMs")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_secs", alias = "maxDelaySecs")]
    pub max_delay_secs: u64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            jitter: default_jitter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreConfig {
    /// Transcript root. Defaults to the VS Code workspace storage directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_depth", alias = "maxDepth")]
    pub max_depth: usize,
    #[serde(default = "default_max_file_bytes", alias = "maxFileBytes")]
    pub max_file_bytes: u64,
    #[serde(default, alias = "maxStalenessSecs")]
    pub max_staleness_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_depth: default_max_depth(),
            max_file_bytes: default_max_file_bytes(),
            max_staleness_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ContextConfig {
    /// Context document. Defaults to `<workspace>/context.md`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_reply_chars", alias = "maxReplyChars")]
    pub max_reply_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_reply_chars: default_max_reply_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandsConfig {
    #[serde(default = "default_recent", alias = "recentDefault")]
    pub recent_default: usize,
    #[serde(default = "default_all_limit", alias = "allLimit")]
    pub all_limit: usize,
    #[serde(default = "default_search_limit", alias = "searchLimit")]
    pub search_limit: usize,
    #[serde(default = "default_send_attempts", alias = "sendAttempts")]
    pub send_attempts: u32,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            recent_default: default_recent(),
            all_limit: default_all_limit(),
            search_limit: default_search_limit(),
            send_attempts: default_send_attempts(),
        }
    }
}

// Default value functions for serde
fn default_console_url() -> String { "http://star-force-one.local:5052".into() }
fn default_console_name() -> String { "COMMS".into() }
fn default_stream_path() -> String { "/api/stream".into() }
fn default_send_path() -> String { "/api/send".into() }
fn default_online_path() -> String { "/api/online".into() }
fn default_messages_path() -> String { "/api/messages".into() }
fn default_poll_interval_ms() -> u64 { 2000 }
fn default_timeout_secs() -> u64 { 5 }
fn default_agent_id() -> String { "copilot-bridge".into() }
fn default_agent_name() -> String { "🌐 Copilot (SharedContext)".into() }
fn default_mention() -> String { "@copilot".into() }
fn default_initial_delay_ms() -> u64 { 1000 }
fn default_max_delay_secs() -> u64 { 30 }
fn default_jitter() -> f64 { 0.2 }
fn default_max_depth() -> usize { 4 }
fn default_max_file_bytes() -> u64 { 10 * 1024 * 1024 }
fn default_max_reply_chars() -> usize { 1500 }
fn default_recent() -> usize { 30 }
fn default_all_limit() -> usize { 100 }
fn default_search_limit() -> usize { 10 }
fn default_send_attempts() -> u32 { 3 }

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut config = Self::parse_toml(&contents)?;
        if let Some(dir) = path.parent() {
            config.resolve_relative_paths(dir);
        }
        Ok(config)
    }

    /// Load the config named on the command line, else the one in `dir`,
    /// else defaults. Environment overrides are applied last.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> anyhow::Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match find_config(dir) {
                Some(path) => Self::load(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse config from a TOML string.
    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).map_err(|e| {
            ExitError::Config(format!("invalid {CONFIG_TOML}: {e}")).into()
        })
    }

    /// Apply environment overrides. `lookup` is injectable for tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty("COMMS_URL") {
            self.console.url = url;
        }
        if let Some(id) = non_empty("COMMS_BRIDGE_AGENT_ID") {
            self.agent.id = id;
        }
        if let Some(store) = non_empty("COMMS_BRIDGE_STORE") {
            self.store.path = Some(PathBuf::from(store));
        }
        if self.context.path.is_none()
            && let Some(workspace) = non_empty("WORKSPACE")
        {
            self.context.path = Some(PathBuf::from(workspace).join(CONTEXT_FILE));
        }
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        for path in [&mut self.store.path, &mut self.context.path].into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    /// Effective transcript store root.
    pub fn store_root(&self) -> PathBuf {
        self.store.path.clone().unwrap_or_else(default_store_root)
    }

    /// Effective context document path, relative to `workspace` when unset.
    pub fn context_path(&self, workspace: &Path) -> PathBuf {
        self.context
            .path
            .clone()
            .unwrap_or_else(|| workspace.join(CONTEXT_FILE))
    }

    /// Serialize config to a TOML string with helpful comments.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        let raw = toml::to_string_pretty(self).context("serializing config to TOML")?;

        let mut doc: toml_edit::DocumentMut = raw
            .parse()
            .context("parsing generated TOML for comment injection")?;

        doc.decor_mut()
            .set_prefix("# comms-bridge configuration\n# Run `comms-bridge schema` for the full schema.\n\n");

        fn set_table_comment(doc: &mut toml_edit::DocumentMut, key: &str, comment: &str) {
            if let Some(tbl) = doc.get_mut(key).and_then(|item| item.as_table_mut()) {
                tbl.decor_mut().set_prefix(comment);
            }
        }

        set_table_comment(&mut doc, "console", "# Console connection (COMMS_URL overrides url)\n");
        set_table_comment(&mut doc, "agent", "\n# Bridge identity and mention token\n");
        set_table_comment(&mut doc, "reconnect", "\n# Stream reconnect backoff\n");
        set_table_comment(&mut doc, "store", "\n# Session transcript store (COMMS_BRIDGE_STORE overrides path)\n");
        set_table_comment(&mut doc, "context", "\n# Context document returned by `context`\n");
        set_table_comment(&mut doc, "commands", "\n# Command limits\n");

        Ok(doc.to_string())
    }
}

/// VS Code keeps chat sessions under `<config dir>/Code/User/workspaceStorage`.
pub fn default_store_root() -> PathBuf {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_default()
        .join("Code")
        .join("User")
        .join("workspaceStorage")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_toml_config() {
        let toml_str = r#"
[console]
url = "http://comms.lan:5052/"
name = "LAB"
mode = "poll"
poll_interval_ms = 500

[agent]
id = "lab-bridge"
name = "Lab Bridge"
mention = "@lab"

[reconnect]
initial_delay_ms = 250
max_delay_secs = 8
jitter = 0.0

[store]
path = "/data/sessions"
max_staleness_secs = 15

[context]
path = "/data/context.md"
max_reply_chars = 900

[commands]
recent_default = 5
search_limit = 3
"#;

        let config = Config::parse_toml(toml_str).unwrap();
        assert_eq!(config.console.name, "LAB");
        assert_eq!(config.console.mode, InboundMode::Poll);
        assert_eq!(config.console.endpoint("/api/send"), "http://comms.lan:5052/api/send");
        assert_eq!(config.agent.id, "lab-bridge");
        assert_eq!(config.agent.mention, "@lab");
        assert_eq!(config.reconnect.max_delay_secs, 8);
        assert_eq!(config.store_root(), PathBuf::from("/data/sessions"));
        assert_eq!(config.store.max_staleness_secs, 15);
        assert_eq!(config.context.max_reply_chars, 900);
        assert_eq!(config.commands.recent_default, 5);
        assert_eq!(config.commands.all_limit, 100); // default
        assert_eq!(config.commands.search_limit, 3);
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = Config::parse_toml("").unwrap();
        assert_eq!(config.console.url, "http://star-force-one.local:5052");
        assert_eq!(config.console.name, "COMMS");
        assert_eq!(config.console.mode, InboundMode::Stream);
        assert_eq!(config.agent.id, "copilot-bridge");
        assert_eq!(config.agent.mention, "@copilot");
        assert_eq!(config.commands.recent_default, 30);
        assert_eq!(config.commands.send_attempts, 3);
        assert!(config.store.path.is_none());
    }

    #[test]
    fn parse_camel_case_aliases() {
        let toml_str = r#"
[console]
pollIntervalMs = 750

[commands]
recentDefault = 12
"#;
        let config = Config::parse_toml(toml_str).unwrap();
        assert_eq!(config.console.poll_interval_ms, 750);
        assert_eq!(config.commands.recent_default, 12);
    }

    #[test]
    fn parse_malformed_toml() {
        let result = Config::parse_toml("not valid toml [[[");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("invalid .comms-bridge.toml"));
        assert!(err.downcast_ref::<ExitError>().is_some());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::parse_toml(
            r#"
[console]
url = "http://file:1"
"#,
        )
        .unwrap();
        config.apply_env(|key| match key {
            "COMMS_URL" => Some("http://env:2".into()),
            "COMMS_BRIDGE_AGENT_ID" => Some("env-bridge".into()),
            "WORKSPACE" => Some("/ws".into()),
            _ => None,
        });
        assert_eq!(config.console.url, "http://env:2");
        assert_eq!(config.agent.id, "env-bridge");
        assert_eq!(config.context_path(Path::new("/cwd")), PathBuf::from("/ws/context.md"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(|_| Some("  ".into()));
        assert_eq!(config.console.url, "http://star-force-one.local:5052");
        assert!(config.context.path.is_none());
    }

    #[test]
    fn context_path_defaults_to_workspace() {
        let config = Config::default();
        assert_eq!(
            config.context_path(Path::new("/work")),
            PathBuf::from("/work/context.md")
        );
    }

    #[test]
    fn load_resolves_relative_paths_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_TOML);
        std::fs::write(
            &path,
            "[store]\npath = \"sessions\"\n\n[context]\npath = \"notes/context.md\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.store_root(), dir.path().join("sessions"));
        assert_eq!(
            config.context_path(Path::new("/elsewhere")),
            dir.path().join("notes/context.md")
        );
    }

    #[test]
    fn find_config_returns_none_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_config(dir.path()).is_none());
        std::fs::write(dir.path().join(CONFIG_TOML), "").unwrap();
        assert!(find_config(dir.path()).is_some());
    }

    #[test]
    fn roundtrip_toml_with_comments() {
        let mut config = Config::default();
        config.agent.id = "roundtrip".into();
        config.store.path = Some(PathBuf::from("/s"));
        let output = config.to_toml().unwrap();
        assert!(output.contains("# comms-bridge configuration"));
        assert!(output.contains("# Bridge identity and mention token"));

        let parsed = Config::parse_toml(&output).unwrap();
        assert_eq!(parsed.agent.id, "roundtrip");
        assert_eq!(parsed.store.path, Some(PathBuf::from("/s")));
    }

    #[test]
    fn default_store_root_points_at_workspace_storage() {
        let root = default_store_root();
        assert!(root.ends_with("Code/User/workspaceStorage"));
    }
}
