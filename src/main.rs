use std::process::ExitCode;

use clap::{Parser, Subcommand};

use comms_bridge::commands::context::ContextCommand;
use comms_bridge::commands::doctor::DoctorArgs;
use comms_bridge::commands::init::InitArgs;
use comms_bridge::commands::query::QueryArgs;
use comms_bridge::commands::run::RunArgs;
use comms_bridge::commands::show::ShowArgs;
use comms_bridge::commands::{self, GlobalArgs};
use comms_bridge::{error, telemetry};

#[derive(Debug, Parser)]
#[command(
    name = "comms-bridge",
    version,
    about = "Answer @mentions on a COMMS console from local chat-session transcripts"
)]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Connect to the Console and answer commands until interrupted
    Run(RunArgs),
    /// Run one command locally and print the reply
    Query(QueryArgs),
    /// Print one chat session transcript
    Show(ShowArgs),
    /// Check config, transcript store, context document and Console
    Doctor(DoctorArgs),
    /// Manage the shared context document
    Context {
        #[command(subcommand)]
        command: ContextCommand,
    },
    /// Write a commented .comms-bridge.toml
    Init(InitArgs),
    /// Print the JSON Schema for .comms-bridge.toml
    Schema,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Run(_) => "run",
            Self::Query(_) => "query",
            Self::Show(_) => "show",
            Self::Doctor(_) => "doctor",
            Self::Context { .. } => "context",
            Self::Init(_) => "init",
            Self::Schema => "schema",
        }
    }
}

fn main() -> ExitCode {
    let _telemetry = telemetry::init();

    let cli = Cli::parse();

    let _span = tracing::info_span!("cli", name = cli.command.name()).entered();

    let result = match &cli.command {
        Commands::Run(args) => args.execute(&cli.globals),
        Commands::Query(args) => args.execute(&cli.globals),
        Commands::Show(args) => args.execute(&cli.globals),
        Commands::Doctor(args) => args.execute(&cli.globals),
        Commands::Context { command } => command.execute(&cli.globals),
        Commands::Init(args) => args.execute(&cli.globals),
        Commands::Schema => commands::schema::run_schema(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(exit_err) = e.downcast_ref::<error::ExitError>() {
                eprintln!("error: {exit_err}");
                exit_err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                ExitCode::FAILURE
            }
        }
    }
}
