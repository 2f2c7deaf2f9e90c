mod cli;

use crate::cli::{init_logging, Cli, Command, PrivateCommand, PublicCommand, VolumeCommand};
use anyhow::{Context, Result};
use clap::Parser;
use clusteraddr::{
    AddressClass, AddressFilter, AuthoritativeSource, ClusterConfig, ClusterServices,
    MutationDecision, PrivateAddress, PublicAddress,
};
use log::info;
use serde::Serialize;

#[derive(Serialize)]
struct HealthReport {
    source: AuthoritativeSource,
    shared_volume_mounted: bool,
    private: MutationDecision,
    public: MutationDecision,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref());
    let config = match &cli.config {
        Some(path) => ClusterConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClusterConfig::from_env().context("invalid environment configuration")?,
    };
    info!(
        "event=config_loaded mount={} private_store={} public_store={}",
        config.shared_mount.display(),
        config.private_store.display(),
        config.public_store.display()
    );
    let services = ClusterServices::system(config);
    run(&services, cli.command).await
}

async fn run(services: &ClusterServices, command: Command) -> Result<()> {
    match command {
        Command::Private(cmd) => match cmd {
            PrivateCommand::List => print(&services.private.list().await?),
            PrivateCommand::Create { ip } => print(
                &services
                    .private
                    .create(PrivateAddress::new(ip))
                    .await
                    .with_context(|| format!("failed to add private address {ip}"))?,
            ),
            PrivateCommand::Delete { ip } => print(
                &services
                    .private
                    .delete(ip)
                    .await
                    .with_context(|| format!("failed to remove private address {ip}"))?,
            ),
        },
        Command::Public(cmd) => match cmd {
            PublicCommand::List(filter) => {
                let filter = AddressFilter {
                    ip: filter.ip,
                    interface: filter.interface,
                };
                print(&services.public.list(&filter).await?)
            }
            PublicCommand::Get { ip } => print(&services.public.get(ip).await?),
            PublicCommand::Create {
                ip,
                netmask,
                interface,
            } => {
                let candidate = PublicAddress::parse_wide(&ip, netmask, &interface)?;
                print(
                    &services
                        .public
                        .create(candidate)
                        .await
                        .with_context(|| format!("failed to add public address {ip}"))?,
                )
            }
            PublicCommand::Delete { ip } => print(
                &services
                    .public
                    .delete(ip)
                    .await
                    .with_context(|| format!("failed to remove public address {ip}"))?,
            ),
        },
        Command::Volume(cmd) => match cmd {
            VolumeCommand::Status => print(&services.volume.status().await?),
            VolumeCommand::Create => print(&services.volume.create().await?),
            VolumeCommand::Mount => print(&services.volume.mount().await?),
            VolumeCommand::Unmount => print(&services.volume.unmount().await?),
            VolumeCommand::Delete => print(&services.volume.delete().await?),
        },
        Command::Health => {
            let health = services.health();
            let report = HealthReport {
                source: health.authoritative_source().await?,
                shared_volume_mounted: health.shared_volume_mounted(),
                private: health.mutation_decision(AddressClass::Private).await?,
                public: health.mutation_decision(AddressClass::Public).await?,
            };
            print(&report)
        }
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
