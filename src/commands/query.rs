use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;

use super::GlobalArgs;
use crate::bridge::{BridgeStatus, CommandPipeline, Marker};
use crate::channel::ChatMessage;
use crate::error::ExitError;

/// Sender id used for locally issued commands.
const LOCAL_SENDER: &str = "local";

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Command text without the mention, e.g. `search tokio` (empty = help)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub text: Vec<String>,
    /// Print the reply verbatim even on a terminal
    #[arg(long)]
    pub raw: bool,
}

impl QueryArgs {
    pub fn execute(&self, globals: &GlobalArgs) -> anyhow::Result<()> {
        let config = globals.load_config()?;
        let workspace = globals.workspace()?;
        let status = Arc::new(BridgeStatus::new(
            &config.agent.id,
            &config.console.name,
            &config.console.url,
        ));
        let pipeline = CommandPipeline::from_config(&config, &workspace, status)?;

        let text = format!("{} {}", config.agent.mention, self.text.join(" "));
        let message = ChatMessage::new(LOCAL_SENDER, LOCAL_SENDER, text.trim_end());
        let reply = pipeline
            .respond(&message)
            .context("command was not recognised as addressed to the bridge")?;

        if !self.raw && std::io::stdout().is_terminal() {
            termimad::print_text(&reply.text);
        } else {
            println!("{}", reply.text);
        }

        if reply.marker == Marker::Failure {
            return Err(ExitError::Other("command failed".into()).into());
        }
        Ok(())
    }
}
