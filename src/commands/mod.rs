pub mod context;
pub mod doctor;
pub mod init;
pub mod query;
pub mod run;
pub mod schema;
pub mod show;

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::config::{CONTEXT_FILE, Config};

/// Options accepted by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Config file (default: ./.comms-bridge.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Workspace holding the context document (default: $WORKSPACE, else cwd)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,
    /// Transcript store root (overrides config and COMMS_BRIDGE_STORE)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
}

impl GlobalArgs {
    /// Config file, then environment, then flags.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let cwd = std::env::current_dir().context("could not determine current directory")?;
        let mut config = Config::discover(self.config.as_deref(), &cwd)?;
        if let Some(store) = &self.store {
            config.store.path = Some(store.clone());
        }
        if let Some(workspace) = &self.workspace {
            config.context.path = Some(workspace.join(CONTEXT_FILE));
        }
        Ok(config)
    }

    pub fn workspace(&self) -> anyhow::Result<PathBuf> {
        if let Some(workspace) = &self.workspace {
            return Ok(workspace.clone());
        }
        match std::env::var_os("WORKSPACE").filter(|w| !w.is_empty()) {
            Some(workspace) => Ok(PathBuf::from(workspace)),
            None => std::env::current_dir().context("could not determine current directory"),
        }
    }
}
