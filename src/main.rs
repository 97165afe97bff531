use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use orderflow::config::AppConfig;
use orderflow::interfaces::replay::ReplayReader;
use orderflow::pipeline::Pipeline;
use std::fs::File;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish every message of a JSON-lines replay file and print the final orders
    Run {
        /// Replay file: one `{"subject": ..., "payload": ...}` object per line
        input: PathBuf,
    },
    /// Create, process and redeliver `order-101` end to end
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("orderflow=info".parse().into_diagnostic()?),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();

    let cli = Cli::parse();
    let pipeline = Pipeline::start(&cli.config).await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Run { input } => {
            let file = File::open(input).into_diagnostic()?;
            for record in ReplayReader::new(file).records() {
                let record = match record {
                    Ok(record) => record,
                    Err(e) => {
                        error!(error = %e, "Error reading replay record");
                        continue;
                    }
                };
                let published = match record.payload_bytes() {
                    Ok(payload) => pipeline.publish_and_settle(&record.subject, payload).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = published {
                    error!(subject = %record.subject, error = %e, "Error publishing replay record");
                }
            }
        }
        Command::Demo => {
            let report = pipeline.run_demo().await.into_diagnostic()?;
            info!(
                order_id = %report.processed.id,
                stream = %report.event.stream,
                sequence = report.event.sequence,
                "Demo finished"
            );
            writeln!(
                out,
                "event stream={} sequence={}",
                report.event.stream, report.event.sequence
            )
            .into_diagnostic()?;
        }
    }

    for order in pipeline.orders().await.into_diagnostic()? {
        writeln!(out, "{}", serde_json::to_string(&order).into_diagnostic()?).into_diagnostic()?;
    }
    pipeline.shutdown().await;

    Ok(())
}
