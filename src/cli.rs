use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "clusteraddr", about = "Manage cluster addresses on the shared volume")]
pub struct Cli {
    /// Path to configuration YAML; defaults plus CLUSTERADDR_* overrides when omitted
    #[arg(long, env = "CLUSTERADDR_CONFIG")]
    pub config: Option<PathBuf>,

    /// env_logger-style filter string (e.g. "info,clusteraddr=debug"); overrides RUST_LOG/defaults
    #[arg(long)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Private node addresses
    #[command(subcommand)]
    Private(PrivateCommand),
    /// Public floating addresses
    #[command(subcommand)]
    Public(PublicCommand),
    /// Shared volume lifecycle
    #[command(subcommand)]
    Volume(VolumeCommand),
    /// Authoritative source and mutation gate decisions
    Health,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PrivateCommand {
    List,
    Create { ip: IpAddr },
    Delete { ip: IpAddr },
}

#[derive(Subcommand, Debug, Clone)]
pub enum PublicCommand {
    List(PublicFilterArgs),
    Get { ip: IpAddr },
    Create {
        ip: String,
        netmask: u32,
        interface: String,
    },
    Delete { ip: IpAddr },
}

#[derive(Args, Debug, Clone, Default)]
pub struct PublicFilterArgs {
    #[arg(long)]
    pub ip: Option<IpAddr>,
    #[arg(long)]
    pub interface: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum VolumeCommand {
    Status,
    Create,
    Mount,
    Unmount,
    Delete,
}

pub const DEFAULT_LOG_FILTER: &str = "warn,clusteraddr=info";

pub fn init_logging(cli_filter: Option<&str>) {
    let env = Env::default().default_filter_or(DEFAULT_LOG_FILTER);
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(filter) = cli_filter {
        builder.parse_filters(filter);
    }
    builder.format_timestamp_secs();
    builder.format(|buf, record| {
        let ts = buf.timestamp();
        writeln!(
            buf,
            "[{} {:<5} {}] {}",
            ts,
            record.level(),
            record.target(),
            record.args()
        )
    });
    // Logs go to stderr so JSON on stdout stays parseable.
    builder.target(env_logger::Target::Stderr);
    builder.init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_public_create() {
        let cli = Cli::try_parse_from([
            "clusteraddr",
            "public",
            "create",
            "10.0.0.5",
            "24",
            "eno1",
        ])
        .unwrap();
        match cli.command {
            Command::Public(PublicCommand::Create {
                ip,
                netmask,
                interface,
            }) => {
                assert_eq!(ip, "10.0.0.5");
                assert_eq!(netmask, 24);
                assert_eq!(interface, "eno1");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn oversized_netmask_reaches_validation() {
        let cli = Cli::try_parse_from([
            "clusteraddr",
            "public",
            "create",
            "10.0.0.5",
            "300",
            "eno1",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Public(PublicCommand::Create { netmask: 300, .. })
        ));
    }

    #[test]
    fn public_list_filters_are_optional() {
        let cli = Cli::try_parse_from(["clusteraddr", "public", "list", "--interface", "eno1"])
            .unwrap();
        match cli.command {
            Command::Public(PublicCommand::List(filter)) => {
                assert!(filter.ip.is_none());
                assert_eq!(filter.interface.as_deref(), Some("eno1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn malformed_private_ip_is_rejected() {
        assert!(Cli::try_parse_from(["clusteraddr", "private", "create", "10.0.0.300"]).is_err());
    }
}
