// publisher: reads commands from stdin, one per line, and commits each as a
// command message, retransmitting until the sequencer's echo confirms it.

use std::sync::Arc;

use clap::Parser;
use molbus_core::{bind_event_socket, resolve, LoggingActivator, Scheduler};
use molbus_protocol::{Address, Session};
use molbus_receiver::EventReceiver;
use molbus_test_utils::{build_application_definition, build_message, DemoSchema};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "publisher", about = "Publishes commands into a bus, confirmed via echo")]
struct Args {
    /// This application's identity, as registered via the applicationDefinition message.
    #[arg(long, env = "PUBLISHER_APP_NAME")]
    app_name: String,

    /// inet: address the event packets are published on (consumed here to learn echoes).
    #[arg(long, env = "PUBLISHER_EVENT_ADDRESS")]
    event_address: String,

    /// inet: address to bind the discovery reply socket on.
    #[arg(long, env = "PUBLISHER_DISCOVERY_ADDRESS")]
    discovery_address: String,

    /// inet: address the sequencer's discovery socket listens on.
    #[arg(long, env = "PUBLISHER_DISCOVERY_DEST")]
    discovery_dest: String,

    /// inet: address to bind the event-rewind reply socket on.
    #[arg(long, env = "PUBLISHER_REWIND_ADDRESS")]
    rewind_address: String,

    /// inet: address to send command packets to.
    #[arg(long, env = "PUBLISHER_COMMAND_ADDRESS")]
    command_address: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "publisher starting");

    let args = Args::parse();

    let event_address = parse_address(&args.event_address);
    let discovery_address = parse_address(&args.discovery_address);
    let discovery_dest_address = parse_address(&args.discovery_dest);
    let rewind_address = parse_address(&args.rewind_address);
    let command_address = parse_address(&args.command_address);

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
        Arc::new(LoggingActivator),
    );

    let client = Arc::new(molbus_bus::BusClient::new(
        Arc::clone(&receiver),
        Arc::new(DemoSchema),
        Scheduler::new(),
        Arc::new(LoggingActivator),
    ));

    let command_socket = bind_event_socket(&command_address).expect("failed to bind command socket");
    let command_dest = resolve(&command_address).expect("failed to resolve command address");
    command_socket.connect(command_dest).await.expect("failed to connect command socket");

    let app_name = args.app_name.as_bytes().to_vec();
    let bootstrap = build_application_definition(&app_name);
    let provider = client.provider(app_name, command_socket, &bootstrap);

    let receiver_task = tokio::spawn(async move {
        if let Err(err) = receiver.run().await {
            tracing::error!(%err, "event receiver stopped");
        }
    });
    let provider_task = tokio::spawn({
        let provider = provider.clone();
        async move { provider.run().await }
    });

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.is_empty() {
            continue;
        }
        let body = build_message(b"COMMAND\0", line.as_bytes());
        match provider.commit(&body) {
            Ok(seq) => info!(app_seq = seq, "command committed"),
            Err(err) => tracing::error!(%err, "command rejected"),
        }
    }

    receiver_task.abort();
    provider_task.abort();
}

fn parse_address(s: &str) -> Address {
    Address::parse(s).unwrap_or_else(|err| {
        eprintln!("FATAL: invalid address {s:?}: {err}");
        std::process::exit(1);
    })
}
