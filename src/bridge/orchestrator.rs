use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, info_span, warn};

use super::dispatch::Dispatcher;
use super::format::{Reply, ReplyFormatter};
use super::parser::{Command, CommandParser};
use super::status::BridgeStatus;
use crate::channel::{BridgeEvent, ChannelClient, ChatMessage, Identity};
use crate::config::Config;
use crate::context_doc::ContextDocument;
use crate::store::{SessionIndex, TranscriptStore};

/// Parse → dispatch → format for one message. Shared by the live bridge
/// and `comms-bridge query`.
pub struct CommandPipeline {
    parser: CommandParser,
    dispatcher: Dispatcher,
    formatter: ReplyFormatter,
    status: Arc<BridgeStatus>,
}

impl CommandPipeline {
    pub fn new(
        parser: CommandParser,
        dispatcher: Dispatcher,
        formatter: ReplyFormatter,
        status: Arc<BridgeStatus>,
    ) -> Self {
        Self {
            parser,
            dispatcher,
            formatter,
            status,
        }
    }

    /// Wire the pipeline from config. `workspace` anchors the default
    /// context document location.
    pub fn from_config(
        config: &Config,
        workspace: &Path,
        status: Arc<BridgeStatus>,
    ) -> anyhow::Result<Self> {
        let identity = Identity {
            id: config.agent.id.clone(),
            name: config.agent.name.clone(),
        };
        let index = Arc::new(SessionIndex::new(
            TranscriptStore::from_config(config),
            Duration::from_secs(config.store.max_staleness_secs),
        ));
        let dispatcher = Dispatcher::new(
            index,
            ContextDocument::new(config.context_path(workspace)),
            status.clone(),
            config.commands.clone(),
        );
        let formatter = ReplyFormatter::new(
            identity,
            &config.agent.mention,
            config.commands.search_limit,
            config.context.max_reply_chars,
        );
        Ok(Self::new(
            CommandParser::new(&config.agent.mention)?,
            dispatcher,
            formatter,
            status,
        ))
    }

    pub fn status(&self) -> &Arc<BridgeStatus> {
        &self.status
    }

    /// `None` for messages not addressed to the bridge, including its own.
    pub fn parse(&self, message: &ChatMessage) -> Option<Command> {
        if message.sender_id.eq_ignore_ascii_case(self.status.agent_id()) {
            return None;
        }
        self.parser.parse(message)
    }

    /// Run one accepted command. Always yields a reply.
    pub fn execute(&self, command: &Command) -> Reply {
        let handled = self.status.record_command();
        debug!(verb = %command.verb, handled, "command accepted");
        let outcome = self.dispatcher.dispatch(command);
        self.formatter.format(&outcome)
    }

    pub fn respond(&self, message: &ChatMessage) -> Option<Reply> {
        self.parse(message).map(|command| self.execute(&command))
    }
}

/// Long-running loop: receives messages from the channel client and runs
/// each addressed command on its own worker thread.
pub struct Bridge {
    pipeline: Arc<CommandPipeline>,
    client: ChannelClient,
}

impl Bridge {
    pub fn new(pipeline: Arc<CommandPipeline>, client: ChannelClient) -> Self {
        Self { pipeline, client }
    }

    /// Connect and process events until [`BridgeEvent::Shutdown`] arrives.
    ///
    /// `events` is the sending half of `inbox`; it is handed to the channel
    /// client, and callers keep a clone to request shutdown.
    pub fn run(
        mut self,
        events: Sender<BridgeEvent>,
        inbox: Receiver<BridgeEvent>,
    ) -> anyhow::Result<()> {
        self.client.on_message(events);
        let _reader = self.client.connect()?;
        info!(agent = %self.pipeline.status().agent_id(), "bridge running");

        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        while let Ok(event) = inbox.recv() {
            let message = match event {
                BridgeEvent::Message(message) => message,
                BridgeEvent::Shutdown => {
                    info!("shutdown requested");
                    break;
                }
            };
            let Some(command) = self.pipeline.parse(&message) else {
                continue;
            };
            workers.retain(|w| !w.is_finished());
            if let Some(worker) = self.spawn_worker(&command) {
                workers.push(worker);
            }
        }

        self.client.request_shutdown();
        for worker in workers {
            if worker.join().is_err() {
                warn!("command worker panicked");
            }
        }
        self.client.disconnect();
        Ok(())
    }

    fn spawn_worker(&self, command: &Command) -> Option<JoinHandle<()>> {
        let pipeline = Arc::clone(&self.pipeline);
        let client = self.client.clone();
        let job = {
            let command = command.clone();
            move || run_command(&pipeline, &client, &command)
        };
        match thread::Builder::new().name("command".into()).spawn(job) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "could not spawn command worker, running inline");
                run_command(&self.pipeline, &self.client, command);
                None
            }
        }
    }
}

fn run_command(pipeline: &CommandPipeline, client: &ChannelClient, command: &Command) {
    let span = info_span!(
        "command",
        verb = %command.verb,
        message_id = %command.source.id
    );
    let _guard = span.enter();
    let reply = pipeline.execute(command);
    if client.send(&reply).is_ok() {
        info!(marker = ?reply.marker, "reply sent");
    }
}
