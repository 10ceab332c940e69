use clap::Parser;
use log::{error, info, warn};
use peer::console::{parse_line, HELP};
use peer::runtime::{Command, Notice, PeerRuntime, RuntimeConfig};
use peer::session::SessionEvent;
use peer::transport::{accept, dial, DirectoryEvent, TransportChannel, TransportEvent};
use shared::{ClientId, GameConfig, HostEvent, Level};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

const DIAL_ATTEMPTS: u32 = 20;
const DIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Our peer id, unique within the session
    #[arg(short, long)]
    id: String,

    /// Address to accept peer links on
    #[arg(short, long, default_value = "127.0.0.1:7000")]
    listen: String,

    /// Another peer as id@address; repeat for each peer
    #[arg(short, long = "peer")]
    peers: Vec<String>,

    /// Initial host id (defaults to the smallest id)
    #[arg(long)]
    host: Option<String>,

    /// Host tick rate (updates per second)
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Level description as JSON (defaults to the built-in arena)
    #[arg(long)]
    level: Option<PathBuf>,

    /// Game constants as JSON (defaults to the built-in values)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Leave empty seats empty instead of filling them with AI players
    #[arg(long)]
    no_ai_fill: bool,

    /// Character name shown to the other players
    #[arg(short, long)]
    name: Option<String>,
}

fn parse_peer(arg: &str) -> Result<(ClientId, String), String> {
    match arg.split_once('@') {
        Some((id, addr)) if !id.is_empty() && !addr.is_empty() => Ok((ClientId::new(id), addr.to_string())),
        _ => Err(format!("invalid peer '{}', expected id@address", arg)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let local = ClientId::new(args.id.clone());
    let peers = args
        .peers
        .iter()
        .map(|arg| parse_peer(arg))
        .collect::<Result<Vec<_>, _>>()?;
    let initial_host = match &args.host {
        Some(host) => ClientId::new(host.clone()),
        None => peers
            .iter()
            .map(|(id, _)| id.clone())
            .chain(std::iter::once(local.clone()))
            .min()
            .unwrap_or_else(|| local.clone()),
    };

    let game = match &args.config {
        Some(path) => GameConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => GameConfig::default(),
    };
    let level = match &args.level {
        Some(path) => Level::from_json(&std::fs::read_to_string(path)?)?,
        None => Level::arena(),
    };

    let mut settings = host::HostSettings::new(game, level);
    settings.tick_rate = args.tick_rate;
    settings.ai_fill = !args.no_ai_fill;

    let mut config = RuntimeConfig::new(local.clone(), initial_host.clone(), settings);
    config.expected_peers = peers.len() + 1;
    if let Some(name) = args.name {
        config.character.name = name;
    }

    info!("Starting peer {} on {}", local, args.listen);
    info!("Initial host: {}, expecting {} peers", initial_host, config.expected_peers);

    let (transport_tx, transport_rx) = mpsc::unbounded_channel::<TransportEvent>();
    let (directory_tx, directory_rx) = mpsc::unbounded_channel::<DirectoryEvent>();

    // Peers with smaller ids dial us; we dial the rest
    let listener = TcpListener::bind(&args.listen).await?;
    {
        let transport_tx = transport_tx.clone();
        let directory_tx = directory_tx.clone();
        tokio::spawn(async move {
            loop {
                let stream = match listener.accept().await {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        error!("Failed to accept a connection: {}", e);
                        continue;
                    }
                };
                match accept(stream, transport_tx.clone()).await {
                    Ok(link) => {
                        let id = link.peer().clone();
                        if directory_tx
                            .send(DirectoryEvent::PeerJoined {
                                id,
                                link: Box::new(link),
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => warn!("Handshake failed: {}", e),
                }
            }
        });
    }

    for (peer, addr) in peers.into_iter().filter(|(peer, _)| *peer > local) {
        let local = local.clone();
        let transport_tx = transport_tx.clone();
        let directory_tx = directory_tx.clone();
        tokio::spawn(async move {
            for attempt in 1..=DIAL_ATTEMPTS {
                match dial(addr.as_str(), &local, peer.clone(), transport_tx.clone()).await {
                    Ok(link) => {
                        let _ = directory_tx.send(DirectoryEvent::PeerJoined {
                            id: peer,
                            link: Box::new(link),
                        });
                        return;
                    }
                    Err(e) => {
                        warn!("Dialing {} at {} failed (attempt {}): {}", peer, addr, attempt, e);
                        sleep(DIAL_BACKOFF).await;
                    }
                }
            }
            error!("Giving up on peer {}", peer);
        });
    }
    drop(transport_tx);

    let (runtime, handle) = PeerRuntime::new(config, transport_rx, directory_rx);
    let commands = handle.commands;
    let mut notices = handle.notices;

    // Console input
    {
        let commands = commands.clone();
        tokio::spawn(async move {
            eprintln!("{}", HELP);
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_line(&line) {
                    Ok(Some(command)) => {
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", e),
                }
            }
        });
    }

    // Report the events a player cares about
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice {
                Notice::Host(HostEvent::InitialData(data)) => {
                    info!("Game started with {} players", data.players.len())
                }
                Notice::Host(HostEvent::Winner { team_name }) => info!("Winner: {}", team_name),
                Notice::Host(HostEvent::Pause) => info!("Game paused"),
                Notice::Host(HostEvent::Resume) => info!("Game resumed"),
                Notice::Session(SessionEvent::HostMigrated { new_host, is_local }) => {
                    info!("{} is now hosting{}", new_host, if is_local { " (us)" } else { "" })
                }
                _ => {}
            }
        }
    });

    {
        let commands = commands.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
                let _ = commands.send(Command::Shutdown);
            }
        });
    }

    runtime.run().await?;
    drop(commands);

    Ok(())
}
