use clap::Parser;
use log::error;
use server::game::{GameCommand, GameState};
use server::hub::{Hub, HubEvent, HUB_QUEUE_CAPACITY};
use server::network::NetworkServer;
use server::tick::run_tick_loop;
use tokio::sync::mpsc;

/// Main-method of the application.
/// Parses command-line arguments, then spawns the hub, the tick loop and
/// the accept loop, and waits for either to fail or for Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "3000")]
        port: u16,
        /// Tick rate (snapshots per second)
        #[clap(short, long, default_value = "30")]
        tick_rate: u32,
        /// Maximum number of concurrent clients
        #[clap(short, long, default_value = "64")]
        max_clients: usize,
    }

    env_logger::init();
    let args = Args::parse();

    // Channel feeding the hub's event loop; bounded so broadcasts from
    // the tick loop never block on a busy hub
    let (hub_tx, hub_rx) = mpsc::channel::<HubEvent>(HUB_QUEUE_CAPACITY);

    // Channel carrying player lifecycle and input commands to the tick loop
    let (game_tx, game_rx) = mpsc::channel::<GameCommand>(1000);

    let hub = Hub::new(args.max_clients, game_tx.clone());
    let hub_handle = tokio::spawn(hub.run(hub_rx));

    let tick_handle = {
        let hub_tx = hub_tx.clone();
        tokio::spawn(run_tick_loop(
            GameState::new(),
            game_rx,
            hub_tx,
            args.tick_rate,
        ))
    };

    let address = format!("{}:{}", args.host, args.port);
    let network = NetworkServer::bind(&address).await?;
    let network_handle = tokio::spawn(async move {
        if let Err(e) = network.run(hub_tx, game_tx).await {
            error!("Accept loop failed: {}", e);
        }
    });

    // Handle shutdown gracefully
    tokio::select! {
        result = hub_handle => {
            if let Err(e) = result {
                eprintln!("Hub task panicked: {}", e);
            }
        }
        result = tick_handle => {
            if let Err(e) = result {
                eprintln!("Tick loop task panicked: {}", e);
            }
        }
        result = network_handle => {
            if let Err(e) = result {
                eprintln!("Network task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
