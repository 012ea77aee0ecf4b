use std::path::PathBuf;
use std::process::ExitCode;

use clap_serde_derive::ClapSerde;
use color_eyre::eyre::{eyre, Result as EyreResult};
use gpg_agent_shim::agent::{AgentServer, SelfDeletingSocket};
use gpg_agent_shim::CommandCapability;
use tokio::select;
use tokio::signal::{self, unix::SignalKind};
use tokio::sync::oneshot;

mod cli;
mod commands;
mod logging;
mod systemd;

const BUILD_VERSION: &str = env!("GPG_AGENT_SHIM_BUILD_VERSION");
const GIT_DESCRIBE: &str = env!("GPG_AGENT_SHIM_GIT_DESCRIBE");

#[cfg(debug_assertions)]
fn install_eyre_hook() -> EyreResult<()> {
    color_eyre::config::HookBuilder::default()
        .display_env_section(true)
        .install()
}

#[cfg(not(debug_assertions))]
fn install_eyre_hook() -> EyreResult<()> {
    color_eyre::config::HookBuilder::default()
        .display_env_section(false)
        .install()
}

fn main() -> ExitCode {
    if let Err(e) = install_eyre_hook() {
        eprintln!("Failed to install error hook: {}", e);
        return ExitCode::FAILURE;
    }

    let args = cli::Args::parse();

    match args.command {
        cli::Command::Serve {
            config_path,
            config,
        } => match run_daemon(config_path, config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {:?}", e);
                ExitCode::FAILURE
            }
        },
        cli::Command::Sign(ref sign_args) => commands::run_sign(sign_args),
        cli::Command::Keygrip { ref user_id } => commands::run_keygrip(user_id),
    }
}

// The agent serves one client at a time on a blocking thread; the runtime only
// waits for that thread or a termination signal, so one thread is plenty
#[tokio::main(flavor = "current_thread")]
async fn run_daemon(
    config_path: PathBuf,
    config_opt: <cli::Config as ClapSerde>::Opt,
) -> EyreResult<()> {
    let config = cli::Config::from_serve_args(config_path, config_opt)?;

    // LoggerHandle must be held until program termination so file logging takes place
    let _logger = logging::setup_logger(config.log_level.into(), config.log_file.as_deref())?;
    log::info!(
        "Starting gpg-agent-shim version {}; commit {}",
        BUILD_VERSION,
        GIT_DESCRIBE
    );

    let program = config.signer_program.clone().ok_or_else(|| {
        eyre!("No signing helper configured; set signer_program or pass --signer-program")
    })?;
    let capability = CommandCapability::new(program, config.signer_args.clone());

    let mut sigterm = signal::unix::signal(SignalKind::terminate())?;

    let mut server = AgentServer::bind(&config.listen_path, config.server_config(), capability)?;
    let _socket_cleanup = SelfDeletingSocket::new(config.listen_path.clone());

    let (done_tx, done_rx) = oneshot::channel();
    std::thread::spawn(move || {
        let _ = done_tx.send(server.run());
    });

    systemd::notify_ready();
    systemd::notify_status("Serving");

    select! {
        res = done_rx => {
            let res = res.map_err(|_| eyre!("Agent server thread exited without a result"))?;
            res?;
        },
        // Cleanly exit on interrupt and SIGTERM, removing the socket on the way out
        _ = signal::ctrl_c() => log::info!("Exiting on SIGINT"),
        Some(_) = sigterm.recv() => log::info!("Exiting on SIGTERM"),
    }

    systemd::notify_stopping();
    Ok(())
}
