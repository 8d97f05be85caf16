//! Line-oriented shell: typed words become dispatcher clicks.
//!
//! Plays against an in-process session server by default, or against a
//! remote one with `--connect`.

#![deny(unsafe_code)]

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use maxgammon_board::{Color, GameMode, POINT_COUNT};
use maxgammon_client::dispatcher::{DONE, NAVIGATE_HOME, REDO, RESTART, ROLL, UNDO};
use maxgammon_client::{
    ClientConfig, CommandDispatcher, ConfigError, Cue, Lobby, Outcome, SessionChannel,
    TurnController,
};
use maxgammon_server::{LoopbackTransport, ServerConfig, SessionServer, SharedServer};
use maxgammon_wire::{TcpTransport, Transport};
use tracing_subscriber::EnvFilter;

/// Read timeout per `recv` on a TCP connection.
const TCP_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(name = "maxgammon")]
#[command(about = "Maxgammon - backgammon against a local or remote session server", long_about = None)]
struct Cli {
    /// Game mode
    #[arg(short, long, value_enum, default_value = "ai")]
    mode: ModeArg,

    /// Your player name
    #[arg(short, long, default_value = "Max")]
    name: String,

    /// Second player for local and online games
    #[arg(short, long, default_value = "Guest")]
    opponent: String,

    /// Dice seed for the in-process server
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Play against a remote session server at ADDR instead
    #[arg(long, value_name = "ADDR")]
    connect: Option<String>,

    /// Client config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Ai,
    Local,
    Online,
}

impl From<ModeArg> for GameMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Ai => GameMode::Ai,
            ModeArg::Local => GameMode::Local,
            ModeArg::Online => GameMode::Online,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let channel_config = config.clone();
    match cli.connect.as_deref() {
        Some(addr) => {
            tracing::info!(addr, "connecting to remote session server");
            let seats = open_seats(&cli, config, tcp_connector(addr, &channel_config))?;
            play(seats)
        }
        None => {
            let server = SessionServer::shared(ServerConfig {
                seed: cli.seed,
                ai_identity: config.ai_identity.clone(),
                ..Default::default()
            });
            let seats = open_seats(&cli, config, loopback_connector(&server, &channel_config))?;
            play(seats)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let mut config = match path {
        Some(path) => ClientConfig::load_from_file(path)?,
        None => ClientConfig::default(),
    };
    config.merge_with_env()?;
    Ok(config)
}

fn loopback_connector<'a>(
    server: &'a SharedServer,
    config: &'a ClientConfig,
) -> impl FnMut() -> anyhow::Result<SessionChannel<LoopbackTransport>> + 'a {
    move || Ok(SessionChannel::new(LoopbackTransport::connect(server), config))
}

fn tcp_connector<'a>(
    addr: &'a str,
    config: &'a ClientConfig,
) -> impl FnMut() -> anyhow::Result<SessionChannel<TcpTransport>> + 'a {
    move || {
        let transport = TcpTransport::connect(addr, TCP_POLL_INTERVAL)?;
        Ok(SessionChannel::new(transport, config))
    }
}

/// One dispatcher per seat this terminal plays. Each seat gets its own
/// connection from `connect`.
fn open_seats<T, F>(cli: &Cli, config: ClientConfig, mut connect: F) -> anyhow::Result<Vec<CommandDispatcher<T>>>
where
    T: Transport,
    F: FnMut() -> anyhow::Result<SessionChannel<T>>,
{
    let mode = GameMode::from(cli.mode);
    let seats = match mode {
        GameMode::Ai => {
            vec![TurnController::create(connect()?, config, mode, &[cli.name.as_str()])?]
        }
        GameMode::Local => {
            let names = [cli.name.as_str(), cli.opponent.as_str()];
            vec![TurnController::create(connect()?, config, mode, &names)?]
        }
        GameMode::Online => {
            let deadline = Instant::now() + config.response_timeout();
            let mut host = Lobby::create(connect()?, config.clone(), cli.name.as_str())?;
            let code = host.session_id().unwrap_or_default().to_string();
            println!("lobby {code} open, seating {}", cli.opponent);
            let mut guest = Lobby::join(connect()?, config, code, cli.opponent.as_str())?;
            while host.poll_ready()?.is_none() || guest.poll_ready()?.is_none() {
                if Instant::now() >= deadline {
                    anyhow::bail!("lobby never reported ready");
                }
                std::thread::sleep(TCP_POLL_INTERVAL);
            }
            vec![host.into_controller()?, guest.into_controller()?]
        }
    };
    Ok(seats.into_iter().map(CommandDispatcher::new).collect())
}

/// Feed stdin words to whichever seat is on turn until "home" or EOF.
fn play<T: Transport>(mut seats: Vec<CommandDispatcher<T>>) -> anyhow::Result<()> {
    println!("words: roll, undo, redo, done, restart, home, or a point 0-27");
    render(&mut seats[0]);

    for line in io::stdin().lock().lines() {
        let line = line?;
        for word in line.split_whitespace() {
            let Some(value) = click_value(word) else {
                println!("unknown input {word:?}");
                continue;
            };
            let active = active_seat(&seats);

            match seats[active].click(value) {
                Ok(Outcome::NavigateHome) => {
                    for seat in &mut seats {
                        seat.controller_mut().close()?;
                    }
                    return Ok(());
                }
                Ok(Outcome::Ignored(reason)) => println!("ignored: {reason:?}"),
                Ok(Outcome::Applied) => {}
                Err(err) if err.is_fatal() => return Err(err.into()),
                Err(err) => println!("{err}"),
            }
            for (index, seat) in seats.iter_mut().enumerate() {
                if index != active {
                    seat.controller_mut().pump()?;
                }
            }
        }

        let active = active_seat(&seats);
        render(&mut seats[active]);
    }
    Ok(())
}

fn active_seat<T: Transport>(seats: &[CommandDispatcher<T>]) -> usize {
    seats
        .iter()
        .position(|s| s.controller().is_local_turn())
        .unwrap_or(0)
}

fn click_value(word: &str) -> Option<i32> {
    match word {
        "roll" | "r" => Some(ROLL),
        "undo" | "u" => Some(UNDO),
        "redo" => Some(REDO),
        "done" | "d" => Some(DONE),
        "restart" => Some(RESTART),
        "home" | "quit" | "q" => Some(NAVIGATE_HOME),
        _ => word.parse().ok(),
    }
}

fn render<T: Transport>(seat: &mut CommandDispatcher<T>) {
    let controller = seat.controller_mut();
    let state = controller.state();

    let mut board = String::new();
    for point in 0..POINT_COUNT {
        for color in Color::ALL {
            let count = state.checkers.count_at(point, color);
            if count > 0 {
                board.push_str(&format!(" {point}:{}{count}", &color.as_str()[..1]));
            }
        }
    }
    println!("board:{board}");
    println!(
        "bar: light {} dark {} | home: light {} dark {}",
        state.checkers.bar_count(Color::Light),
        state.checkers.bar_count(Color::Dark),
        state.checkers.home_count(Color::Light),
        state.checkers.home_count(Color::Dark),
    );
    println!(
        "turn: {} | dice: {:?} | {:?}",
        state.current_turn,
        state.dice.values(),
        controller.phase()
    );
    if let Some(origin) = controller.view().previous_position() {
        println!("from {origin}: {:?}", controller.view().valid_moves());
    }
    if let Some(winner) = controller.winner() {
        println!("{winner} wins; type restart or home");
    }

    for cue in controller.take_cues() {
        match cue {
            Cue::RollPrompt => println!("roll the dice"),
            Cue::DonePrompt => println!("no dice left; type done"),
            Cue::NoDestinations => println!("no legal move from there"),
            Cue::Rejected => println!("not a legal move"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use maxgammon_board::CHECKERS_PER_COLOR;
    use maxgammon_client::Phase;
    use maxgammon_wire::{ClientFrame, FrameDecoder, encode_frame};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one TCP connection from a fresh session server until it closes.
    fn spawn_tcp_server() -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut server = SessionServer::new(ServerConfig::default());
            let conn = server.connect();
            let mut decoder = FrameDecoder::<ClientFrame>::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                decoder.extend(&chunk[..n]);
                while let Some(frame) = decoder.next_frame().unwrap() {
                    server.handle_frame(conn, frame);
                }
                for reply in server.drain(conn) {
                    stream.write_all(&encode_frame(&reply)).unwrap();
                }
            }
        });
        (addr, handle)
    }

    #[test]
    fn test_click_words() {
        assert_eq!(click_value("roll"), Some(ROLL));
        assert_eq!(click_value("d"), Some(DONE));
        assert_eq!(click_value("q"), Some(NAVIGATE_HOME));
        assert_eq!(click_value("17"), Some(17));
        assert_eq!(click_value("-3"), Some(-3));
        assert_eq!(click_value("bear"), None);
    }

    /// An AI seat opened with `--connect` plays over a real socket.
    #[test]
    fn test_ai_seat_over_tcp() {
        let (addr, server) = spawn_tcp_server();
        let cli = Cli::parse_from(["maxgammon", "--connect", addr.as_str()]);
        let config = ClientConfig::default();

        let mut seats = open_seats(&cli, config.clone(), tcp_connector(&addr, &config)).unwrap();
        assert_eq!(seats.len(), 1);
        let seat = &mut seats[0];
        assert_eq!(seat.controller().state().current_turn, "Max");
        assert_eq!(seat.controller().phase(), Phase::AwaitingRoll);

        assert_eq!(seat.click(ROLL).unwrap(), Outcome::Applied);
        let state = seat.controller().state();
        assert!(state.revision > 0);
        for color in Color::ALL {
            assert_eq!(state.checkers.total(color), CHECKERS_PER_COLOR);
        }

        assert_eq!(seat.click(NAVIGATE_HOME).unwrap(), Outcome::NavigateHome);
        server.join().unwrap();
    }
}
