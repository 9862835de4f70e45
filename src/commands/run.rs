use std::sync::{Arc, mpsc};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tracing::info;

use super::GlobalArgs;
use crate::bridge::{Bridge, BridgeStatus, CommandPipeline};
use crate::channel::{BackoffPolicy, BridgeEvent, ChannelClient, ConsoleApi, HttpConsole, Identity};
use crate::config::InboundMode;

/// Pause between outbound post attempts.
const SEND_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Console base URL (overrides config and COMMS_URL)
    #[arg(long)]
    pub url: Option<String>,
    /// Poll the recent-messages endpoint instead of subscribing to the stream
    #[arg(long)]
    pub poll: bool,
}

impl RunArgs {
    pub fn execute(&self, globals: &GlobalArgs) -> anyhow::Result<()> {
        let mut config = globals.load_config()?;
        if let Some(url) = &self.url {
            config.console.url.clone_from(url);
        }
        if self.poll {
            config.console.mode = InboundMode::Poll;
        }
        let workspace = globals.workspace()?;

        let identity = Identity {
            id: config.agent.id.clone(),
            name: config.agent.name.clone(),
        };
        let status = Arc::new(BridgeStatus::new(
            &config.agent.id,
            &config.console.name,
            &config.console.url,
        ));
        let pipeline = Arc::new(CommandPipeline::from_config(
            &config,
            &workspace,
            Arc::clone(&status),
        )?);

        let api: Arc<dyn ConsoleApi> = Arc::new(HttpConsole::new(&config.console, identity.clone()));
        let client = ChannelClient::new(
            api,
            identity,
            &config.agent.mention,
            status,
            BackoffPolicy::from_config(&config.reconnect),
        )
        .with_send_retries(config.commands.send_attempts, SEND_RETRY_DELAY);

        let (events, inbox) = mpsc::channel();
        let signal = events.clone();
        ctrlc::set_handler(move || {
            let _ = signal.send(BridgeEvent::Shutdown);
        })
        .context("installing signal handler")?;

        info!(
            agent = %config.agent.id,
            console = %config.console.url,
            mode = ?config.console.mode,
            store = %config.store_root().display(),
            "starting bridge"
        );
        Bridge::new(pipeline, client).run(events, inbox)
    }
}
