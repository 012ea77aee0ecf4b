use std::{env, fs::File, io::Read, path::PathBuf};

use clap_serde_derive::{
    clap::{self, Parser, Subcommand, ValueEnum},
    serde::{self, Deserialize, Serialize},
    ClapSerde,
};
use color_eyre::eyre::Result as EyreResult;
use expand_tilde::ExpandTilde;
use gpg_agent_shim::agent::transport::DEFAULT_MAX_LINE_LEN;
use gpg_agent_shim::agent::ServerConfig;
use gpg_agent_shim::gpg::DEFAULT_AGENT_SOCKET;
use gpg_agent_shim::Curve;
use log::LevelFilter;

const APP_VERSION: &str = env!("GPG_AGENT_SHIM_BUILD_VERSION");

fn default_config_path() -> PathBuf {
    let config_dir = env::var_os("XDG_CONFIG_HOME")
        .or_else(|| Some("~/.config".into()))
        .map(PathBuf::from)
        .and_then(|p| p.expand_tilde_owned().ok())
        .unwrap_or_else(|| PathBuf::from(".config"));

    config_dir
        .join(env!("CARGO_PKG_NAME"))
        .join(concat!(env!("CARGO_PKG_NAME"), ".toml"))
}

fn default_listen_path() -> PathBuf {
    PathBuf::from(DEFAULT_AGENT_SOCKET)
}

#[derive(Parser)]
#[command(author, version = APP_VERSION, about)]
pub struct Args {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Command {
    /// Impersonate gpg-agent on a socket, signing through an external helper
    Serve {
        /// Config file
        #[arg(short, long = "config", default_value_os_t = default_config_path())]
        config_path: PathBuf,

        /// Config from file or args
        #[command(flatten)]
        config: <Config as ClapSerde>::Opt,
    },

    /// Ask a running gpg-agent to sign a SHA-256 digest
    Sign(SignArgs),

    /// Print the keygrip of a user's primary key
    Keygrip {
        /// User ID as understood by gpg
        user_id: String,
    },
}

#[derive(clap::Args)]
pub struct SignArgs {
    /// Keygrip of the signing key
    #[arg(long, required_unless_present = "user_id", conflicts_with = "user_id")]
    pub keygrip: Option<String>,

    /// Look up the keygrip of this user's primary key
    #[arg(long)]
    pub user_id: Option<String>,

    /// Hex-encoded SHA-256 digest to sign
    #[arg(long, required_unless_present = "input", conflicts_with = "input")]
    pub digest: Option<String>,

    /// File whose SHA-256 digest is signed
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Agent socket
    #[arg(long, default_value_os_t = default_listen_path())]
    pub socket: PathBuf,

    /// Terminal for passphrase entry (defaults to the output of `tty`)
    #[arg(long)]
    pub tty: Option<String>,

    /// Don't run gpg-connect-agent before connecting
    #[arg(long)]
    pub no_launch: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapSerde, Clone, Serialize)]
pub struct Config {
    /// Listen path
    #[default(default_listen_path())]
    #[arg(short, long = "listen")]
    pub listen_path: PathBuf,

    /// Log level for agent
    #[default(LogLevel::Warn)]
    #[arg(long, value_enum)]
    pub log_level: LogLevel,

    /// Optional log file for agent (logs to standard error, otherwise)
    #[arg(long, num_args = 1)]
    pub log_file: Option<PathBuf>,

    /// Version reported to `GETINFO version`
    #[default("2.1.11".to_string())]
    #[arg(long)]
    pub agent_version: String,

    /// Identifier reported to `AGENT_ID`
    #[default("TREZOR-GPG".to_string())]
    #[arg(long)]
    pub agent_id: String,

    /// Curve the signing helper operates on
    #[default(Curve::Nist256p1)]
    #[arg(long)]
    pub curve: Curve,

    /// Longest protocol line accepted from a client
    #[default(DEFAULT_MAX_LINE_LEN)]
    #[arg(long)]
    pub max_line_len: usize,

    /// Program producing curve points for PKDECRYPT
    #[arg(long)]
    pub signer_program: Option<PathBuf>,

    /// Extra argument for the signing helper (repeatable)
    #[arg(long = "signer-arg", allow_hyphen_values = true)]
    pub signer_args: Vec<String>,

    // Following are part of command line args, but
    // not in configuration file
    /// Config file path (not an arg; copied from the serve command)
    #[arg(skip)]
    #[serde(skip_deserializing, skip_serializing)]
    pub config_path: PathBuf,
}

impl Config {
    pub fn from_serve_args(
        config_path: PathBuf,
        mut config_opt: <Config as ClapSerde>::Opt,
    ) -> EyreResult<Self> {
        let mut config = if let Ok(mut f) = File::open(&config_path) {
            log::info!("Read configuration from {}", config_path.display());
            let mut config_text = String::new();
            f.read_to_string(&mut config_text)?;
            let file_config = toml::from_str::<<Config as ClapSerde>::Opt>(&config_text)?;
            Config::from(file_config).merge(&mut config_opt)
        } else {
            Config::from(&mut config_opt)
        };

        config.config_path = config_path;
        config.listen_path = config.listen_path.expand_tilde_owned()?;
        config.log_file = config
            .log_file
            .map(|p| p.expand_tilde_owned())
            .transpose()?;
        config.signer_program = config
            .signer_program
            .map(|p| p.expand_tilde_owned())
            .transpose()?;

        Ok(config)
    }

    /// Identity and limits handed to the agent server
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            version: self.agent_version.clone(),
            agent_id: self.agent_id.clone(),
            curve: self.curve,
            max_line_len: self.max_line_len,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    #[value(hide = true)]
    Trace = 5,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl Args {
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }
}

impl SignArgs {
    /// Agent socket with `~` expanded
    pub fn socket_path(&self) -> PathBuf {
        self.socket
            .expand_tilde_owned()
            .unwrap_or_else(|_| self.socket.clone())
    }
}
