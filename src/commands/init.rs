use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::GlobalArgs;
use crate::config::{CONFIG_TOML, Config, default_store_root};
use crate::context_doc::ContextDocument;
use crate::error::ExitError;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Directory to write the config into (default: current directory)
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// Accept defaults without prompting
    #[arg(long, short)]
    pub yes: bool,
    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
    /// Also create the context document if it is missing
    #[arg(long)]
    pub with_context: bool,
}

impl InitArgs {
    pub fn execute(&self, globals: &GlobalArgs) -> Result<()> {
        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("could not determine current directory")?,
        };
        let path = dir.join(CONFIG_TOML);
        if path.exists() && !self.force {
            return Err(ExitError::Config(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            ))
            .into());
        }

        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok());
        if let Some(store) = &globals.store {
            config.store.path = Some(store.clone());
        }
        let interactive = !self.yes && std::io::stdin().is_terminal();
        if interactive {
            prompt_choices(&mut config)?;
        }

        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        fs::write(&path, config.to_toml()?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {}", path.display());

        if self.with_context {
            let workspace = match &globals.workspace {
                Some(workspace) => workspace.clone(),
                None => dir.clone(),
            };
            let doc = ContextDocument::new(config.context_path(&workspace));
            if doc.exists() {
                println!("{} already exists, left unchanged", doc.path().display());
            } else {
                doc.init()?;
                println!("Created {}", doc.path().display());
            }
        }
        Ok(())
    }
}

fn prompt_choices(config: &mut Config) -> Result<()> {
    config.console.url = prompt_input("Console URL", &config.console.url)?;
    config.agent.id = prompt_input("Agent id", &config.agent.id)?;
    config.agent.mention = prompt_input("Mention token", &config.agent.mention)?;

    let store_default = config
        .store
        .path
        .clone()
        .unwrap_or_else(default_store_root);
    let store = prompt_input(
        "Transcript store directory",
        &store_default.display().to_string(),
    )?;
    // Leave the path unset when it matches the platform default.
    config.store.path = (PathBuf::from(&store) != default_store_root()).then(|| store.into());

    if prompt_confirm("Use polling instead of the event stream?", false)? {
        config.console.mode = crate::config::InboundMode::Poll;
    }
    Ok(())
}

// --- Interactive prompts using dialoguer ---

fn prompt_input(prompt: &str, default: &str) -> Result<String> {
    dialoguer::Input::<String>::new()
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()
        .context("reading user input")
}

fn prompt_confirm(prompt: &str, default: bool) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .context("reading user confirmation")
}
