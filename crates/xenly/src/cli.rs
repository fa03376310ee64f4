//! Clap derive structures for the `xenly` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// xenly -- manage XAPI hypervisor pools from the command line
#[derive(Debug, Parser)]
#[command(
    name = "xenly",
    version,
    about = "Manage XAPI hypervisor pools from the command line",
    long_about = "Talks to XCP-ng / XenServer pools over JSON-RPC, falling back to\n\
        XML-RPC on hosts that only speak the legacy encoding.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Host profile to use
    #[arg(long, short = 'p', env = "XENLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Pool master or host URL (overrides profile)
    #[arg(long, short = 'u', env = "XENLY_URL", global = true)]
    pub url: Option<String>,

    /// Login user (overrides profile)
    #[arg(long, env = "XENLY_USERNAME", global = true)]
    pub username: Option<String>,

    /// Login password
    #[arg(long, env = "XENLY_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "XENLY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "XENLY_INSECURE", global = true)]
    pub insecure: bool,

    /// Call timeout in seconds (overrides profile)
    #[arg(long, env = "XENLY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Call any API method with the session prepended
    Call(CallArgs),

    /// List cached objects of one class
    #[command(alias = "ls")]
    Objects(ObjectsArgs),

    /// Show one object by reference or UUID
    Object(ObjectArgs),

    /// Stream cache changes until interrupted
    Watch(WatchArgs),

    /// Inspect interfaces and create networks
    #[command(alias = "net")]
    Network(NetworkArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Call ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Method name, e.g. "VM.get_all_records"
    pub method: String,

    /// Arguments after the session; parsed as JSON, otherwise taken as strings
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}

// ── Objects ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ObjectsArgs {
    /// Object class (e.g. VM, host, PIF)
    pub object_type: String,

    /// Include templates, snapshots and control domains when listing VMs
    #[arg(long, short = 'a')]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct ObjectArgs {
    /// Object class (e.g. VM, host, PIF)
    pub object_type: String,

    /// OpaqueRef or UUID
    pub id: String,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Classes to watch (repeatable); all known classes by default
    #[arg(long = "type", short = 't')]
    pub types: Vec<String>,
}

// ── Network ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct NetworkArgs {
    #[command(subcommand)]
    pub command: NetworkCommand,
}

#[derive(Debug, Subcommand)]
pub enum NetworkCommand {
    /// List physical interfaces on the pool master usable for new networks
    Pifs,

    /// Create a network, optionally on a VLAN or bond
    Create(NetworkCreateArgs),
}

#[derive(Debug, Args)]
pub struct NetworkCreateArgs {
    /// Network name
    #[arg(long)]
    pub name: String,

    /// Network description
    #[arg(long, default_value = "")]
    pub description: String,

    /// MTU (68-9216)
    #[arg(long, default_value_t = xenly_core::command::requests::DEFAULT_MTU)]
    pub mtu: u32,

    /// VLAN tag (0-4094); requires exactly one --pif
    #[arg(long)]
    pub vlan: Option<u16>,

    /// Bond the given interfaces
    #[arg(long, requires = "bond_mode")]
    pub bonded: bool,

    /// Bond mode: balance-slb, active-backup or lacp
    #[arg(long)]
    pub bond_mode: Option<String>,

    /// Interface by OpaqueRef or device name (repeatable)
    #[arg(long = "pif")]
    pub pifs: Vec<String>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration (passwords redacted)
    Show,

    /// Print the config file path
    Path,

    /// List configured profiles
    Profiles,

    /// Store a profile's password in the system keyring (read from stdin)
    SetPassword {
        /// Profile name (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_network_create() {
        let cli = Cli::try_parse_from([
            "xenly", "network", "create", "--name", "storage", "--bonded", "--bond-mode", "lacp",
            "--pif", "eth0", "--pif", "eth1",
        ])
        .map_err(|e| e.to_string());
        let Ok(Cli {
            command: Command::Network(NetworkArgs {
                command: NetworkCommand::Create(args),
            }),
            ..
        }) = cli
        else {
            panic!("unexpected parse result: {cli:?}");
        };
        assert!(args.bonded);
        assert_eq!(args.pifs, vec!["eth0", "eth1"]);
        assert_eq!(args.mtu, 1500);
    }

    #[test]
    fn bonded_requires_mode() {
        assert!(
            Cli::try_parse_from(["xenly", "network", "create", "--name", "x", "--bonded"]).is_err()
        );
    }

    #[test]
    fn call_accepts_negative_numbers() {
        let cli = Cli::try_parse_from(["xenly", "call", "VM.set_VCPUs_max", "OpaqueRef:v", "-1"])
            .map_err(|e| e.to_string());
        assert!(matches!(
            cli,
            Ok(Cli { command: Command::Call(ref args), .. }) if args.args == ["OpaqueRef:v", "-1"]
        ));
    }
}
