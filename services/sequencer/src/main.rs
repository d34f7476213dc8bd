// sequencer: owns one session's event stream, persisting and multicasting
// it via EventPublisher, and serving discovery/rewind requests via Rewinder.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use molbus_core::{bind_event_socket, resolve, LoggingActivator};
use molbus_protocol::{Address, Session};
use molbus_sequencer::{EventPublisher, Rewinder};
use molbus_store::FileMessageStore;
use tokio::time::{interval, Duration};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sequencer", about = "Publishes a sequenced, rewindable event stream")]
struct Args {
    /// inet: address to multicast/unicast event packets to.
    #[arg(long, env = "SEQUENCER_EVENT_ADDRESS")]
    event_address: String,

    /// inet: address to bind the discovery socket on.
    #[arg(long, env = "SEQUENCER_DISCOVERY_ADDRESS")]
    discovery_address: String,

    /// inet: address to bind the rewind socket on.
    #[arg(long, env = "SEQUENCER_REWIND_ADDRESS")]
    rewind_address: String,

    /// Two-character session suffix (the "XX" in YYYYMMDDXX).
    #[arg(long, env = "SEQUENCER_SESSION_SUFFIX", default_value = "AA")]
    session_suffix: String,

    /// Directory the event log and index files are written under.
    #[arg(long, env = "SEQUENCER_STORE_DIR", default_value = "./data")]
    store_dir: PathBuf,

    /// How often to flush buffered messages onto the wire, in milliseconds.
    #[arg(long, env = "SEQUENCER_FLUSH_INTERVAL_MS", default_value_t = 10)]
    flush_interval_ms: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "sequencer starting");

    let args = Args::parse();

    let suffix = args.session_suffix.as_bytes();
    if suffix.len() != 2 {
        eprintln!("FATAL: --session-suffix must be exactly two characters");
        std::process::exit(1);
    }
    let mut suffix_bytes = [0u8; 2];
    suffix_bytes.copy_from_slice(suffix);

    let event_address = parse_address(&args.event_address);
    let discovery_address = parse_address(&args.discovery_address);
    let rewind_address = parse_address(&args.rewind_address);

    std::fs::create_dir_all(&args.store_dir).expect("failed to create store directory");

    let session = Session::new();
    session.create(suffix_bytes).expect("failed to create session");
    info!(session = ?session.name(), "session created");

    let session_name = String::from_utf8_lossy(&session.name().unwrap()).into_owned();
    let store = Arc::new(Mutex::new(
        FileMessageStore::open(&args.store_dir, &session_name).expect("failed to open message store"),
    ));

    let event_socket = bind_event_socket(&event_address).expect("failed to bind event socket");
    let event_dest = resolve(&event_address).expect("failed to resolve event address");
    event_socket.connect(event_dest).await.expect("failed to connect event socket");

    let discovery_socket = bind_event_socket(&discovery_address).expect("failed to bind discovery socket");
    let rewind_socket = bind_event_socket(&rewind_address).expect("failed to bind rewind socket");

    let mut publisher = EventPublisher::new(
        session.clone(),
        Arc::clone(&store),
        event_socket,
        Arc::new(LoggingActivator),
    );
    let rewinder = Rewinder::new(session.clone(), store, discovery_socket, rewind_socket);

    let rewinder_task = tokio::spawn(async move {
        if let Err(err) = rewinder.run().await {
            tracing::error!(%err, "rewinder stopped");
        }
    });

    let mut ticker = interval(Duration::from_millis(args.flush_interval_ms));
    tokio::select! {
        _ = async {
            loop {
                ticker.tick().await;
                if let Err(err) = publisher.send().await {
                    tracing::error!(%err, "event publisher stopped");
                    break;
                }
            }
        } => {}
        _ = shutdown_signal() => {
            info!("shutting down");
        }
    }

    rewinder_task.abort();
}

fn parse_address(s: &str) -> Address {
    Address::parse(s).unwrap_or_else(|err| {
        eprintln!("FATAL: invalid address {s:?}: {err}");
        std::process::exit(1);
    })
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C"); },
        _ = terminate => { info!("received SIGTERM"); },
    }
}
