use clap::{Parser, Subcommand};

mod demo;
mod stress;

#[derive(Debug, Parser)]
#[command(name = "accounts-cli", about = "Event-sourced accounts over an in-memory event store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open an account, make a few deposits and print the replayed state and history.
    Demo,
    /// Hammer a shared store from several threads and verify the resulting histories.
    Stress(stress::StressArgs),
}

fn main() -> anyhow::Result<()> {
    accounts_observability::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Demo => {
            let output = demo::run()?;
            println!("{output}");
        }
        Command::Stress(args) => {
            let report = stress::run(&args)?;
            println!("{report}");
        }
    }

    Ok(())
}
