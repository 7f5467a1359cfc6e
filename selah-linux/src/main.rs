// Selah Linux: relay/discovery service and headless study participant.

mod assistant;
mod config;
mod content;
mod devices;
mod participant;
mod relay;
mod speech;
mod transport;

use chrono::Local;
use selah_core::Role;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "usage: selah-linux relay | host | join <room-id> | --version";

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("selah-linux {}", VERSION);
        return Ok(());
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let cfg = config::load();
    let rt = tokio::runtime::Runtime::new()?;
    match args.first().map(String::as_str) {
        Some("relay") => rt.block_on(async {
            let port = cfg.relay_port;
            tokio::select! {
                res = relay::run_relay(port) => res?,
                stop = stop_requested() => log::info!("relay: closing ({:?})", stop?),
            }
            Ok::<(), anyhow::Error>(())
        }),
        Some("host") => rt.block_on(participant::run(cfg, Role::Host, None)),
        Some("join") => match args.get(1) {
            Some(room) => rt.block_on(participant::run(cfg, Role::Joiner, Some(room.clone()))),
            None => anyhow::bail!("{USAGE}"),
        },
        _ => anyhow::bail!("{USAGE}"),
    }
}

/// What ended a relay or participant session from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopRequest {
    Interrupted,
    Terminated,
}

/// Resolves on the first Ctrl+C, or SIGTERM where the platform delivers one.
pub(crate) async fn stop_requested() -> anyhow::Result<StopRequest> {
    #[cfg(unix)]
    let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let terminated = async {
        term.recv().await;
    };
    #[cfg(not(unix))]
    let terminated = std::future::pending::<()>();

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            Ok(StopRequest::Interrupted)
        }
        () = terminated => Ok(StopRequest::Terminated),
    }
}
