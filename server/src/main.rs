use clap::{Parser, Subcommand};
use log::info;
use sourceq_mock::game::GameState;
use sourceq_mock::master::{MasterServer, DEFAULT_PAGE_SIZE};
use sourceq_mock::network::{GameServer, ResponderOptions};
use std::net::SocketAddrV4;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Mock Source game and master servers")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer A2S queries as a game server
    Game {
        /// Address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1:27015")]
        bind: String,
        /// Server name
        #[clap(short, long, default_value = "sourceq mock")]
        name: String,
        /// Map name
        #[clap(short, long, default_value = "cp_dustbowl")]
        map: String,
        /// Number of fake players
        #[clap(short, long, default_value = "4")]
        players: u8,
        /// Require a challenge for info requests too
        #[clap(long)]
        require_challenge: bool,
        /// Delay every reply by this many milliseconds
        #[clap(long, default_value = "0")]
        delay_ms: u64,
        /// Never answer
        #[clap(long)]
        silent: bool,
    },
    /// Serve a fixed server list as a master server
    Master {
        /// Address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1:27011")]
        bind: String,
        /// Page size of each reply
        #[clap(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,
        /// Server addresses to hand out (ip:port)
        servers: Vec<SocketAddrV4>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let server = match args.command {
        Command::Game {
            bind,
            name,
            map,
            players,
            require_challenge,
            delay_ms,
            silent,
        } => {
            let mut state = GameState::sample(&name, &map);
            for i in 0..players {
                state.add_player(
                    &format!("player{}", i + 1),
                    i32::from(i) * 3,
                    60.0 * f32::from(i),
                );
            }
            state.set_rule("mp_timelimit", "30");
            state.set_rule("sv_gravity", "800");

            let options = ResponderOptions {
                require_challenge,
                delay: Duration::from_millis(delay_ms),
                silent,
            };
            GameServer::bind(&bind, state, options).await?.spawn()
        }
        Command::Master {
            bind,
            page_size,
            servers,
        } => MasterServer::bind(&bind, servers, page_size).await?.spawn(),
    };

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                eprintln!("Responder task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
