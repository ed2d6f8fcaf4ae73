use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use env_logger::Env;
use outreach::{
    configuration::{get_configuration, DEFAULT_CONFIGURATION_FILE},
    services::{CancelFlag, CollectionOutcome, DispatchOutcome},
    startup::{run_collection, run_dispatch},
};

#[derive(Parser)]
#[command(about = "Collect developer contacts and run paced outreach")]
struct Cli {
    #[arg(long, env = "OUTREACH_CONFIG", default_value = DEFAULT_CONFIGURATION_FILE)]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Harvest new contacts into the identity file
    Collect,
    /// Send to every unsent contact in IDENTITY_FILE
    Dispatch { identity_file: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let configuration = get_configuration(&cli.config)?;

    let cancel = CancelFlag::new();
    cancel.cancel_on_ctrl_c();

    match cli.command {
        Command::Collect => {
            let report = run_collection(&configuration, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            Ok(match report.outcome {
                CollectionOutcome::Cancelled => ExitCode::from(130),
                CollectionOutcome::Completed | CollectionOutcome::PassLimit => ExitCode::SUCCESS,
            })
        }
        Command::Dispatch { identity_file } => {
            let report = run_dispatch(&configuration, &identity_file, &cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            Ok(match report.outcome {
                DispatchOutcome::DeliverabilityAlarm => {
                    eprintln!(
                        "[ALERT] Emails are being marked as spam. Dispatch stopped with {} emails unsent. Please rephrase the email content.",
                        report.remaining
                    );
                    ExitCode::from(2)
                }
                DispatchOutcome::Cancelled => ExitCode::from(130),
                DispatchOutcome::Completed | DispatchOutcome::Exhausted => ExitCode::SUCCESS,
            })
        }
    }
}
