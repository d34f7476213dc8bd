// receiver: joins an event stream, recovering gaps via discovery/rewind,
// and logs each message delivered in strict sequence order.

use clap::Parser;
use molbus_core::{bind_event_socket, resolve, LoggingActivator, Scheduler};
use molbus_protocol::{Address, Session};
use molbus_receiver::EventReceiver;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "receiver", about = "Joins and follows a sequenced event stream")]
struct Args {
    /// inet: address the event packets are published on.
    #[arg(long, env = "RECEIVER_EVENT_ADDRESS")]
    event_address: String,

    /// inet: address to bind the discovery reply socket on.
    #[arg(long, env = "RECEIVER_DISCOVERY_ADDRESS")]
    discovery_address: String,

    /// inet: address the sequencer's discovery socket listens on.
    #[arg(long, env = "RECEIVER_DISCOVERY_DEST")]
    discovery_dest: String,

    /// inet: address to bind the rewind reply socket on.
    #[arg(long, env = "RECEIVER_REWIND_ADDRESS")]
    rewind_address: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "receiver starting");

    let args = Args::parse();

    let event_address = parse_address(&args.event_address);
    let discovery_address = parse_address(&args.discovery_address);
    let discovery_dest_address = parse_address(&args.discovery_dest);
    let rewind_address = parse_address(&args.rewind_address);

    let event_socket = bind_event_socket(&event_address).expect("failed to bind event socket");
    let discovery_socket = bind_event_socket(&discovery_address).expect("failed to bind discovery socket");
    let discovery_dest = resolve(&discovery_dest_address).expect("failed to resolve discovery destination");
    let rewind_socket = bind_event_socket(&rewind_address).expect("failed to bind rewind socket");

    let receiver = EventReceiver::new(
        Session::new(),
        event_socket,
        discovery_socket,
        discovery_dest,
        rewind_socket,
        Scheduler::new(),
        std::sync::Arc::new(LoggingActivator),
    );

    receiver.dispatcher().add_listener(|body| {
        info!(len = body.len(), "message delivered");
    });

    tokio::select! {
        res = receiver.run() => {
            if let Err(err) = res {
                tracing::error!(%err, "event receiver stopped");
            }
        }
        _ = shutdown_signal() => {
            info!("shutting down");
        }
    }
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
