use clap::Parser;
use equihash_coordinator::config::{Args, Config};
use equihash_coordinator::coordinator::Coordinator;
use equihash_coordinator::solver::Supervisor;
use equihash_coordinator::stratum::client;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 if !args.debug => log::LevelFilter::Info,
        0 => log::LevelFilter::Debug,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if args.list {
        exec_list();
    }

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            log::error!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    log::info!(
        "connecting to {}:{} as {}",
        config.host,
        config.port,
        config.user
    );

    let (client_events_tx, client_events_rx) = tokio::sync::mpsc::unbounded_channel();
    let (client_commands_tx, client_commands_rx) = tokio::sync::mpsc::unbounded_channel();
    let (solver_events_tx, solver_events_rx) = tokio::sync::mpsc::unbounded_channel();

    let client_config = config.clone();
    tokio::spawn(async move {
        client::run(client_config, client_commands_rx, client_events_tx).await;
    });

    let supervisor = Supervisor::new(solver_events_tx);
    let coordinator = Coordinator::new(config, supervisor, client_commands_tx);
    coordinator.run(client_events_rx, solver_events_rx).await;
}

/// `--list` execs into `sa-solver --list` and never returns, per the CLI
/// surface contract: device enumeration is entirely the solver's job.
#[cfg(unix)]
fn exec_list() -> ! {
    use std::os::unix::process::CommandExt;
    let err = std::process::Command::new("sa-solver").arg("--list").exec();
    log::error!("failed to exec sa-solver --list: {err}");
    std::process::exit(1);
}

#[cfg(not(unix))]
fn exec_list() -> ! {
    let status = std::process::Command::new("sa-solver")
        .arg("--list")
        .status();
    match status {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(err) => {
            log::error!("failed to run sa-solver --list: {err}");
            std::process::exit(1);
        }
    }
}
