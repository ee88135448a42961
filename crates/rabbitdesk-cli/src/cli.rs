use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rabbitdesk_client::ResourceKind;

#[derive(Parser)]
#[command(name = "rabbitdesk")]
#[command(about = "RabbitDesk CLI: inspect and manage broker clusters through a RabbitDesk server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Server base URL (overrides config and RABBITDESK_URL env var)
    #[arg(short, long, global = true, env = "RABBITDESK_URL")]
    pub server: Option<String>,

    /// Config profile name
    #[arg(short, long, global = true, env = "RABBITDESK_PROFILE", default_value = "default")]
    pub profile: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,

    /// Client configuration file (defaults to ./rabbitdesk.toml when present)
    #[arg(short, long, global = true, env = "RABBITDESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `rabbitdesk_client=trace`
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Login to a RabbitDesk server
    Login(LoginArgs),
    /// Logout (remove stored credentials)
    Logout,
    /// Show the stored credential and its lifetime
    Whoami,
    /// Check availability of broker clusters
    Status(StatusArgs),
    /// List resources of a cluster
    List(ListArgs),
    /// Create or update a queue or exchange
    Create(CreateArgs),
    /// Delete a queue or exchange
    Delete(DeleteArgs),
    /// Manage CLI configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct LoginArgs {
    /// Username (password grant)
    #[arg(short, long, conflicts_with = "token")]
    pub username: Option<String>,
    /// Password (password grant)
    #[arg(long, env = "RABBITDESK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Store an already issued access token instead of logging in
    #[arg(long)]
    pub token: Option<String>,
    /// Refresh token to store alongside --token
    #[arg(long, requires = "token")]
    pub refresh_token: Option<String>,
    /// OAuth client ID sent to the token endpoint
    #[arg(long)]
    pub client_id: Option<String>,
}

#[derive(clap::Args)]
pub struct StatusArgs {
    /// Cluster IDs to check (all clusters known to the server if omitted)
    pub targets: Vec<String>,
}

#[derive(clap::Args)]
pub struct ListArgs {
    /// Resource kind (overview, queues, exchanges, bindings, connections, channels)
    #[arg(value_parser = parse_kind)]
    pub kind: ResourceKind,
    /// Cluster ID
    #[arg(short, long)]
    pub target: String,
    /// Query parameters as key=value pairs (e.g. vhost=/ page=2)
    #[arg(value_parser = parse_param)]
    pub params: Vec<(String, String)>,
    /// Bypass the cache and fetch again
    #[arg(long)]
    pub refresh: bool,
}

/// Resource kinds the CLI can write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WritableKind {
    Queue,
    Exchange,
}

impl From<WritableKind> for ResourceKind {
    fn from(kind: WritableKind) -> Self {
        match kind {
            WritableKind::Queue => ResourceKind::Queues,
            WritableKind::Exchange => ResourceKind::Exchanges,
        }
    }
}

#[derive(clap::Args)]
pub struct CreateArgs {
    /// What to create
    pub kind: WritableKind,
    /// Name of the queue or exchange
    pub name: String,
    /// Cluster ID
    #[arg(short, long)]
    pub target: String,
    /// Path to JSON definition (reads from stdin if omitted)
    #[arg(long, conflicts_with = "body")]
    pub file: Option<String>,
    /// Inline JSON definition
    #[arg(long)]
    pub body: Option<String>,
}

#[derive(clap::Args)]
pub struct DeleteArgs {
    /// What to delete
    pub kind: WritableKind,
    /// Name of the queue or exchange
    pub name: String,
    /// Cluster ID
    #[arg(short, long)]
    pub target: String,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current config
    Show,
    /// Set config value
    Set(ConfigSetArgs),
}

#[derive(clap::Args)]
pub struct ConfigSetArgs {
    /// Key to set (server, format)
    pub key: String,
    /// Value
    pub value: String,
}

fn parse_kind(s: &str) -> Result<ResourceKind, String> {
    s.parse()
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}
