//! ConceptX CLI
//!
//! Command-line interface over the operation engine

use clap::{Parser, Subcommand};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "conceptx")]
#[command(about = "ConceptX - Versioned, permission-checked concept store", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: commands::GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the database and apply migrations
    Init(commands::init::InitArgs),
    /// Submit a batch of operations as one transaction
    Submit(commands::submit::SubmitArgs),
    /// Read concepts, optionally with their contained trees or as of a revision
    Get(commands::get::GetArgs),
    /// List the revision records of one concept
    History(commands::history::HistoryArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(&cli.global, args),
        Commands::Submit(args) => commands::submit::execute(&cli.global, args),
        Commands::Get(args) => commands::get::execute(&cli.global, args),
        Commands::History(args) => commands::history::execute(&cli.global, args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
