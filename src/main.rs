//! Brook - durable, partitioned message streaming
//!
//! Runs the broker with its retention reaper until interrupted.

use brook::config::{merge_config_with_args, ConfigFile};
use brook::cursor::{CreateCursorDetails, CursorPosition, GroupBinding};
use brook::storage::PutEntry;
use brook::stream::CreateStreamDetails;
use brook::{Broker, BrokerArgs, BrokerConfig, Result};
use clap::Parser;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PLAYGROUND_STREAM: &str = "playground";
const PLAYGROUND_PARTITIONS: u32 = 2;
const PLAYGROUND_RETENTION_HOURS: u32 = 24;
const PLAYGROUND_GROUP: &str = "playground-group";
const PLAYGROUND_INSTANCE: &str = "playground-instance-1";
const PLAYGROUND_BATCHES: usize = 5;
const PLAYGROUND_BATCH_SIZE: usize = 2;

fn main() -> ExitCode {
    if let Err(e) = run() {
        eprintln!("brook failed to start: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> Result<()> {
    let mut args = BrokerArgs::parse();

    if args.generate_config {
        println!("{}", ConfigFile::generate_example());
        return Ok(());
    }

    let config_file = if let Some(ref path) = args.config {
        match ConfigFile::load(path) {
            Ok(config) => {
                eprintln!("Loaded configuration from {:?}", path);
                Some(config)
            }
            Err(e) => {
                eprintln!("Error loading configuration file: {}", e);
                return Err(e);
            }
        }
    } else {
        ConfigFile::load_default()
    };

    if let Some(ref config) = config_file {
        args = merge_config_with_args(args, config);
    }

    let is_playground = args.playground;

    let log_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(log_filter)
        .init();

    if is_playground && !args.in_memory {
        warn!(
            data_dir = %args.data_dir.display(),
            "Playground mode runs in memory; the data directory is not used"
        );
    }

    let config = match BrokerConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to create configuration");
            return Err(e);
        }
    };
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, is_playground))
}

async fn serve(config: BrokerConfig, is_playground: bool) -> Result<()> {
    if config.cursor.secret.is_none() {
        warn!("No cursor secret configured; issued cursors become invalid on restart");
    }

    let broker = match Broker::open(config) {
        Ok(broker) => broker,
        Err(e) => {
            error!(error = %e, "Failed to open broker");
            return Err(e);
        }
    };
    info!(
        in_memory = broker.config().in_memory,
        endpoint_base = %broker.config().endpoint_base,
        stats = %broker.stats(),
        "brook started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = broker.reaper().spawn(shutdown_rx);

    if is_playground {
        if let Err(e) = run_playground(&broker) {
            error!(error = %e, "Playground run failed");
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");

    let _ = shutdown_tx.send(true);
    if let Err(e) = reaper.await {
        warn!(error = %e, "Retention reaper did not stop cleanly");
    }
    broker.sync()?;
    info!(stats = %broker.stats(), "brook stopped");
    Ok(())
}

/// Create a demo stream, write a few keyed batches and read each
/// partition back through a commit-on-get group cursor
fn run_playground(broker: &Broker) -> Result<()> {
    let admin = broker.admin();
    let client = broker.client();

    let stream = admin.create_stream(
        CreateStreamDetails::new(PLAYGROUND_STREAM, PLAYGROUND_PARTITIONS)
            .with_retention_hours(PLAYGROUND_RETENTION_HOURS),
    )?;
    info!(
        stream = %stream.id,
        endpoint = ?stream.messages_endpoint,
        "Created playground stream"
    );

    for batch in 0..PLAYGROUND_BATCHES {
        let entries = (0..PLAYGROUND_BATCH_SIZE)
            .map(|i| {
                let n = batch * PLAYGROUND_BATCH_SIZE + i;
                PutEntry::keyed(format!("messageKey{}", n), format!("messageValue{}", n))
            })
            .collect();
        let result = client.put_messages(&stream.id, entries)?;
        for entry in &result.entries {
            info!(
                partition = entry.partition,
                offset = entry.offset,
                "Published message"
            );
        }
    }

    for partition in 0..stream.partitions {
        let mut next = client.create_cursor(
            &stream.id,
            CreateCursorDetails::group(
                partition,
                CursorPosition::TrimHorizon,
                GroupBinding::new(PLAYGROUND_GROUP, PLAYGROUND_INSTANCE),
            ),
        )?;

        loop {
            let read = client.get_messages(&next, 3)?;
            if read.messages.is_empty() {
                break;
            }
            for message in &read.messages {
                info!(
                    partition,
                    offset = message.offset,
                    key = %message.key.as_deref().map(String::from_utf8_lossy).unwrap_or_default(),
                    value = %String::from_utf8_lossy(&message.value),
                    "Consumed message"
                );
            }
            next = read.next_cursor;
        }
    }

    info!(stats = %broker.stats(), "Playground run finished");
    Ok(())
}
