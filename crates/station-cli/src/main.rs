//! `weatherstation` – runs the weather station until the operator stops it.
//!
//! 1. Loads `~/.weatherstation/config.toml`, then applies `WEATHERSTATION_*`
//!    environment overrides, then command-line flags.
//! 2. Connects to the brick daemon gateway, or starts the simulated kit with
//!    `--simulate`. A connection failure exits with status 1.
//! 3. Starts the station and waits for Return or Ctrl-C.
//! 4. Runs the orderly shutdown: backlight off, every subscription released.
//!
//! `weatherstation get-temp --uid <uid>` instead reads the Temperature
//! Bricklet once over the same backend and prints the value.

mod config;
mod temperature;

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use station_bus::{BusClient, GatewayClient, SimBus};
use station_runtime::{Station, StationContext, init_tracing};
use station_types::Uid;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Backend, Config};

/// Tick of the simulated sensors; each sensor still reports at its own period.
const SIM_TICK: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "weatherstation")]
#[command(about = "Shows bricklet weather readings on an LCD 20x4", long_about = None)]
struct Cli {
    /// Gateway address, `host:port` or a `ws://` URL.
    #[arg(long)]
    addr: Option<String>,

    /// Echo every displayed line on stdout.
    #[arg(long)]
    console: bool,

    /// Run against the built-in simulated kit instead of a gateway.
    #[arg(long)]
    simulate: bool,

    /// Sensor callback period in milliseconds.
    #[arg(long)]
    period_ms: Option<u32>,

    /// Save the effective configuration to the config file and exit.
    #[arg(long)]
    write_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read the Temperature Bricklet once and print the value.
    GetTemp {
        /// Base58 UID of the Temperature Bricklet.
        #[arg(long)]
        uid: Uid,
    },
}

impl Cli {
    fn apply(&self, cfg: &mut Config) {
        if let Some(addr) = &self.addr {
            cfg.addr = addr.clone();
        }
        if self.console {
            cfg.console_echo = true;
        }
        if self.simulate {
            cfg.backend = Backend::Simulate;
        }
        if let Some(ms) = self.period_ms {
            cfg.callback_period_ms = ms;
        }
    }
}

fn main() {
    // Tracing first: the OTLP exporter must not need a running runtime.
    let guard = init_tracing("weatherstation");
    let cli = Cli::parse();

    let mut cfg = match config::load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) => Config::default(),
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            eprintln!("  Using default configuration.");
            Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    cli.apply(&mut cfg);

    if cli.write_config {
        match config::save(&cfg) {
            Ok(()) => println!(
                "{} Config saved to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            ),
            Err(e) => eprintln!("{}: {e}", "Error saving config".red()),
        }
        return;
    }

    let code = match tokio::runtime::Runtime::new() {
        Ok(runtime) => match cli.command {
            Some(Command::GetTemp { uid }) => runtime.block_on(get_temp(cfg, uid)),
            None => runtime.block_on(run(cfg)),
        },
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start the async runtime".red().bold());
            1
        }
    };
    drop(guard);
    std::process::exit(code);
}

/// The configured backend; `None` after reporting a failed connection.
async fn connect(cfg: &Config, live_sensors: bool) -> Option<Arc<dyn BusClient>> {
    match cfg.backend {
        Backend::Simulate => {
            let sim = Arc::new(SimBus::weather_station_kit());
            if live_sensors {
                tokio::spawn(sim.clone().run_sensors(SIM_TICK));
            }
            Some(sim)
        }
        Backend::Gateway => match GatewayClient::connect(&cfg.addr, cfg.request_timeout()).await {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                eprintln!("{}: {e}", "Could not connect".red().bold());
                None
            }
        },
    }
}

async fn get_temp(cfg: Config, uid: Uid) -> i32 {
    let Some(bus) = connect(&cfg, false).await else {
        return 1;
    };
    match temperature::read_temperature(bus.as_ref(), uid).await {
        Ok(celsius) => {
            println!("{}", temperature::format_temperature(celsius));
            0
        }
        Err(e) => {
            eprintln!("{}: {e}", "Could not read the temperature".red().bold());
            1
        }
    }
}

async fn run(cfg: Config) -> i32 {
    info!(backend = %cfg.backend, addr = %cfg.addr, "starting weather station");

    let Some(bus) = connect(&cfg, true).await else {
        return 1;
    };

    let (ctx, readings) = StationContext::channel(bus, cfg.station_config());
    let station = match Station::start(ctx, readings).await {
        Ok(station) => station,
        Err(e) => {
            eprintln!("{}: {e}", "Could not start the station".red().bold());
            return 1;
        }
    };

    println!("Press return for stop.");
    let reason = wait_for_stop().await;
    info!(reason, "stopping");

    station.shutdown().await;
    0
}

/// Resolve once the operator presses Return (or closes stdin) or Ctrl-C.
async fn wait_for_stop() -> &'static str {
    let (tx, mut rx) = mpsc::channel(2);

    let on_signal = tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = on_signal.try_send("interrupt");
    }) {
        warn!(error = %e, "Ctrl-C handler unavailable; stop with Return");
    }

    // A plain thread: a blocked stdin read must not hold up runtime shutdown.
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        let _ = tx.blocking_send("return");
    });

    rx.recv().await.unwrap_or("return")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "weatherstation",
            "--addr",
            "rpi:4223",
            "--console",
            "--simulate",
            "--period-ms",
            "250",
        ]);
        let mut cfg = Config::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.addr, "rpi:4223");
        assert!(cfg.console_echo);
        assert_eq!(cfg.backend, Backend::Simulate);
        assert_eq!(cfg.callback_period_ms, 250);
    }

    #[test]
    fn absent_flags_keep_config() {
        let cli = Cli::parse_from(["weatherstation"]);
        let mut cfg = Config {
            console_echo: true,
            ..Config::default()
        };
        cli.apply(&mut cfg);
        assert!(cfg.console_echo);
        assert_eq!(cfg.addr, "localhost:4223");
        assert!(!cli.write_config);
        assert!(cli.command.is_none());
    }

    #[test]
    fn get_temp_parses_base58_uid() {
        let cli = Cli::parse_from(["weatherstation", "--simulate", "get-temp", "--uid", "dXj"]);
        let Some(Command::GetTemp { uid }) = cli.command else {
            panic!("expected get-temp, got {:?}", cli.command);
        };
        assert_eq!(uid, "dXj".parse::<Uid>().unwrap());
        assert!(cli.simulate);
    }

    #[test]
    fn get_temp_rejects_bad_uid() {
        let result = Cli::try_parse_from(["weatherstation", "get-temp", "--uid", "0OIl"]);
        assert!(result.is_err());
    }
}
