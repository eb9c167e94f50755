//! spacetime-panel command line entry point

use clap::Parser;
use spacetime_panel::cli::{cmd_evaluate, cmd_info, cmd_read, cmd_write, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spacetime_panel=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Write { config, events, date_column, metrics, basedir, date, missing_only } => {
            cmd_write(&config, &events, &date_column, &metrics, &basedir, date, missing_only)?;
        }
        Commands::Read { config, basedir, output, left, long } => {
            cmd_read(&config, &basedir, &output, left.as_deref(), long)?;
        }
        Commands::Info { basedir, prefix } => {
            cmd_info(&basedir, &prefix)?;
        }
        Commands::Evaluate { data, label, score, k, extrapolate, json } => {
            cmd_evaluate(&data, &label, &score, &k, extrapolate, json)?;
        }
    }

    Ok(())
}
