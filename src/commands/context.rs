use std::io::IsTerminal;

use clap::Subcommand;

use super::GlobalArgs;
use super::doctor::OutputFormat;
use crate::context_doc::{ContextDocument, ContextSummary};
use crate::error::ExitError;

#[derive(Debug, Subcommand)]
pub enum ContextCommand {
    /// Create the context document from the starter template
    Init,
    /// Print the context document
    Read {
        /// Print verbatim even on a terminal
        #[arg(long)]
        raw: bool,
    },
    /// Append a session summary
    Append {
        /// Summary text
        #[arg(required = true)]
        text: Vec<String>,
        /// Entry title (default: current timestamp)
        #[arg(long)]
        title: Option<String>,
    },
    /// Show size and session count
    Summary {
        /// Output format
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
}

impl ContextCommand {
    pub fn execute(&self, globals: &GlobalArgs) -> anyhow::Result<()> {
        let config = globals.load_config()?;
        let doc = ContextDocument::new(config.context_path(&globals.workspace()?));

        match self {
            ContextCommand::Init => {
                doc.init()?;
                println!("Created {}", doc.path().display());
            }
            ContextCommand::Read { raw } => {
                let Some(content) = doc.read()? else {
                    return Err(ExitError::Missing {
                        what: "context document".into(),
                        path: doc.path().display().to_string(),
                    }
                    .into());
                };
                if !raw && std::io::stdout().is_terminal() {
                    termimad::print_text(&content);
                } else {
                    print!("{content}");
                }
            }
            ContextCommand::Append { text, title } => {
                let heading = doc.append(&text.join(" "), title.as_deref())?;
                println!("Appended \"{heading}\" to {}", doc.path().display());
            }
            ContextCommand::Summary { format } => {
                let summary = doc.summary()?;
                match OutputFormat::resolve(*format) {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                    OutputFormat::Text => print_text(&summary),
                    OutputFormat::Pretty => print_pretty(&summary),
                }
            }
        }
        Ok(())
    }
}

fn print_pretty(summary: &ContextSummary) {
    println!("=== Context Document ===\n");
    println!("Path:     {}", summary.path.display());
    println!("Sessions: {}", summary.sessions);
    println!("Lines:    {}", summary.lines);
    println!("Words:    {}", summary.words);
    println!("Size:     {} KB", summary.size_kb());
}

fn print_text(summary: &ContextSummary) {
    println!(
        "context  path={}  sessions={}  lines={}  words={}  bytes={}",
        summary.path.display(),
        summary.sessions,
        summary.lines,
        summary.words,
        summary.bytes
    );
}
