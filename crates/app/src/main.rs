//! WordArena - timed writing rooms
//!
//! Terminal client and reference relay. One binary:
//!
//! ```bash
//! wordarena relay                       # run the relay and auth endpoint
//! wordarena new-room                    # print a fresh room code
//! wordarena join W-7K3P --host          # lobby, then the timed session
//! wordarena play W-7K3P                 # straight to the session view
//! wordarena solo --minutes 5            # local countdown
//! wordarena forget                      # clear saved sessions
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wordarena_core::{
    Identity, MemoryStore, Role, RoomId, SessionStore, SqliteStore, SystemClock,
};
use wordarena_net::{Authorizer, Server};

mod cadence;
mod config;
mod console;
mod error;
mod session;
mod solo;

use config::Config;
use error::Result;
use session::{RoomSession, SessionCommand, SessionEvent};

/// WordArena terminal client and relay
#[derive(Parser, Debug)]
#[command(name = "wordarena")]
#[command(about = "Timed writing rooms with a synchronized countdown")]
#[command(version)]
struct Cli {
    /// Config file (default: <config dir>/wordarena/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the presence relay and channel authorization endpoint
    Relay {
        /// Address to bind (default: relay_addr from config)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },
    /// Print a freshly generated room code
    NewRoom,
    /// Join a room lobby
    Join {
        code: String,
        #[arg(short, long)]
        name: Option<String>,
        /// Publish settings and start the session for everyone
        #[arg(long)]
        host: bool,
        /// Keep session state in memory only
        #[arg(long)]
        ephemeral: bool,
    },
    /// Enter a room's session view, resuming a saved session if any
    Play {
        code: String,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(long)]
        ephemeral: bool,
    },
    /// Local single-player countdown
    Solo {
        #[arg(short, long, default_value_t = 5)]
        minutes: u32,
    },
    /// Clear saved session state for one room, or all of it
    Forget { code: Option<String> },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cli));
    // Stdin readers block a worker thread; don't wait on them
    runtime.shutdown_timeout(Duration::from_millis(100));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Relay { bind } => relay(&config, bind).await,
        Command::NewRoom => {
            let room_id = RoomId::generate();
            println!("{}", room_id);
            tracing::info!(room_id = %room_id, channel = %room_id.channel_name(), "Generated room code");
            Ok(())
        }
        Command::Join {
            code,
            name,
            host,
            ephemeral,
        } => {
            let room_id = RoomId::parse(&code)?;
            let creds = config.client_credentials()?;
            let mut session = open_session(&config, room_id, name, Role::from_host_flag(host), ephemeral)?;
            session.join(&creds).await?;
            println!("Room {}. Type /help for commands.", session.room_id());
            drive(session, None).await
        }
        Command::Play {
            code,
            name,
            ephemeral,
        } => {
            let room_id = RoomId::parse(&code)?;
            let creds = config.client_credentials()?;
            let mut session = open_session(&config, room_id, name, Role::Follower, ephemeral)?;
            let resumed = session.enter_session_view()?;
            // Rejoin even when resuming: presence and any later start-game need it
            session.join(&creds).await?;
            if resumed.is_none() {
                println!("Waiting for the host to start {}...", session.room_id());
            }
            drive(session, resumed).await
        }
        Command::Solo { minutes } => solo::run(&config.data_dir()?, minutes).await,
        Command::Forget { code } => forget(&config, code),
    }
}

async fn relay(config: &Config, bind: Option<SocketAddr>) -> Result<()> {
    let creds = config.relay_credentials()?;
    let bind = match bind {
        Some(addr) => addr,
        None => config.relay_addr()?,
    };

    let server = Server::start(bind, Authorizer::new(creds.app_key, creds.app_secret)).await?;
    println!("Relay listening on {} (Ctrl-C to stop)", server.addr());

    tokio::signal::ctrl_c().await?;
    server.shutdown();
    Ok(())
}

fn open_session(
    config: &Config,
    room_id: RoomId,
    name: Option<String>,
    role: Role,
    ephemeral: bool,
) -> Result<RoomSession> {
    let store: Box<dyn SessionStore> = if ephemeral {
        Box::new(MemoryStore::new())
    } else {
        Box::new(SqliteStore::open(config.store_path()?)?)
    };
    let name = name.unwrap_or_else(|| config.player_name().to_string());
    Ok(RoomSession::new(
        room_id,
        Identity::new(&name, role),
        store,
        Arc::new(SystemClock),
    ))
}

/// Run the session loop with stdin as input and stdout as output
async fn drive(session: RoomSession, first: Option<SessionEvent>) -> Result<()> {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (event_tx, mut event_rx) = mpsc::channel(64);

    let session_task = tokio::spawn(session.run(cmd_rx, event_tx));
    let input_task = tokio::spawn(read_input(cmd_tx));

    if let Some(line) = first.as_ref().and_then(console::render) {
        println!("{}", line);
    }

    let mut last_tick = None;

    while let Some(event) = event_rx.recv().await {
        if let SessionEvent::Tick(state) = &event {
            if last_tick == Some(state.seconds_left) {
                continue;
            }
            last_tick = Some(state.seconds_left);
        }
        if let Some(line) = console::render(&event) {
            println!("{}", line);
        }
    }

    input_task.abort();
    if let Err(e) = session_task.await {
        tracing::warn!(error = %e, "Session task failed");
    }
    Ok(())
}

async fn read_input(commands: mpsc::Sender<SessionCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read input");
                break;
            }
        };
        match console::parse_line(&line) {
            Ok(Some(cmd)) => {
                let leaving = cmd == SessionCommand::Leave;
                if commands.send(cmd).await.is_err() || leaving {
                    break;
                }
            }
            Ok(None) => {}
            Err(message) => println!("{}", message),
        }
    }
    let _ = commands.send(SessionCommand::Leave).await;
}

fn forget(config: &Config, code: Option<String>) -> Result<()> {
    let mut store = SqliteStore::open(config.store_path()?)?;
    match code {
        Some(code) => {
            let room_id = RoomId::parse(&code)?;
            store.clear_room(&room_id)?;
            println!("Forgot room {}", room_id);
        }
        None => {
            store.clear_all()?;
            let solo = solo::draft_path(&config.data_dir()?);
            if solo.exists() {
                std::fs::remove_file(solo)?;
            }
            println!("Forgot all saved sessions");
        }
    }
    Ok(())
}
