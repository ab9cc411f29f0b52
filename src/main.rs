//! Entry point: parses CLI flags, loads configuration, wires up cloud
//! clients, and runs the pipeline to completion. Grounded in the
//! original source's `main.go`, which does the equivalent of this in
//! terms of the beats `cmd.GenRootCmdWithRunFlag` scaffolding this crate
//! replaces with a plain `clap` parser.

mod active_counter;
mod bucket_lister;
mod channels;
mod config;
mod crawler;
mod errors;
mod event;
mod metrics;
mod object_reader;
mod object_store;
mod queue;
mod queue_consumer;
mod registrar;
mod shutdown;
mod sink;
mod supervisor;
mod tracker;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;

use crate::{
    config::Config, errors::SupervisorError, object_store::S3ObjectStore, sink::StdoutSink, supervisor::Supervisor,
};

#[derive(Debug, Parser)]
#[command(name = "logshipper", about = "Ships cloud access logs from object storage to an event sink")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "logshipper.toml")]
    config: PathBuf,

    /// Run every input's scan exactly once, drain the pipeline, then
    /// exit, instead of running until a termination signal.
    #[arg(long)]
    once: bool,

    /// Leave queue messages in place instead of deleting them once their
    /// objects and events have all been processed; useful for replaying
    /// the same notifications against a different sink.
    #[arg(long)]
    keep_sqs_messages: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("could not load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging.filter);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(filter: &str) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn run(cli: Cli, config: Config) -> Result<(), SupervisorError> {
    let aws_shared_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let s3_client = aws_sdk_s3::Client::new(&aws_shared_config);
    let sqs_client = aws_sdk_sqs::Client::new(&aws_shared_config);

    let object_store = Arc::new(S3ObjectStore::new(s3_client));
    let sink = Arc::new(StdoutSink::new());
    let registrar = registrar::noop();

    let supervisor = Supervisor::start(&config, object_store, &sqs_client, sink, registrar, cli.keep_sqs_messages)?;

    supervisor.run(cli.once).await;

    Ok(())
}
