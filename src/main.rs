//! Router binary: loads startup configuration, wires the subsystems
//! together, spawns the ARP/NAT reaper threads, and runs the
//! forwarding pipeline. The actual frame transport (tap device, pcap,
//! a VNS-style tunnel) is left to whatever harness drives this binary
//! — it ships [`router::link::LoggingLink`] as a stand-in so the whole
//! pipeline can run and be exercised without one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use vrouter::config;
use vrouter::router::arp_cache::{ArpCache, DEFAULT_ENTRY_TTL};
use vrouter::router::link::{LinkLayer, LoggingLink};
use vrouter::router::nat::NatTable;
use vrouter::router::pipeline::Pipeline;

/// Software IPv4 router with ARP resolution and stateful NAT.
#[derive(Parser, Debug)]
#[command(name = "vrouter", about = "Software IPv4 router with ARP resolution and stateful NAT")]
struct Cli {
    /// Path to the `name mac ipv4 mask` interfaces file.
    #[arg(long)]
    interfaces: PathBuf,

    /// Path to the `dst_ipv4 gateway_ipv4 mask iface_name` routing table.
    #[arg(long = "routing-table")]
    routing_table: PathBuf,

    /// Enable stateful NAT at the interface named by `--nat-external`.
    #[arg(long)]
    nat: bool,

    /// The NAT-facing external interface (required when `--nat` is set).
    #[arg(long = "nat-external")]
    nat_external: Option<String>,

    /// ICMP mapping idle timeout in seconds (default 60).
    #[arg(long = "icmp-idle")]
    icmp_idle: Option<u64>,

    /// Established TCP mapping idle timeout in seconds (default 7440).
    #[arg(long = "tcp-established-idle")]
    tcp_established_idle: Option<u64>,

    /// Transitory TCP mapping idle timeout in seconds (default 300).
    #[arg(long = "tcp-transitory-idle")]
    tcp_transitory_idle: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let interfaces = Arc::new(
        config::load_interfaces(&cli.interfaces).with_context(|| format!("loading interfaces file {:?}", cli.interfaces))?,
    );
    let routing_table = Arc::new(
        config::load_routing_table(&cli.routing_table, &interfaces)
            .with_context(|| format!("loading routing table {:?}", cli.routing_table))?,
    );
    tracing::info!(interfaces = interfaces.len(), routes = routing_table.iter().count(), "configuration loaded");

    let nat = if cli.nat {
        let external = cli.nat_external.context("--nat requires --nat-external <iface>")?;
        let nat_config = config::nat_config(
            external,
            cli.icmp_idle,
            cli.tcp_established_idle,
            cli.tcp_transitory_idle,
            &interfaces,
        )
        .context("building nat configuration")?;
        tracing::info!(external = %nat_config.external_iface, "nat enabled");
        Some(Arc::new(NatTable::new(nat_config)))
    } else {
        None
    };

    let arp_cache = Arc::new(ArpCache::new(DEFAULT_ENTRY_TTL));
    let link: Arc<dyn LinkLayer> = Arc::new(LoggingLink);

    let _arp_reaper = arp_cache.spawn_reaper(interfaces.clone(), routing_table.clone(), link.clone());
    let _nat_reaper = nat.as_ref().map(|nat| nat.spawn_reaper(interfaces.clone(), link.clone()));

    // Wired up so config/interface/NAT mistakes surface at startup; the
    // transport that would actually call `_pipeline.handle(..)` per frame
    // is supplied by whatever embeds this binary.
    let _pipeline = Pipeline::new(interfaces.clone(), routing_table.clone(), arp_cache.clone(), nat.clone(), link.clone());

    tracing::info!("router running; awaiting frames from the link layer");
    // The real receive loop lives with whatever transport gets wired in;
    // this binary just keeps the reapers alive so `--help`/config-validation
    // runs can be driven end-to-end without one.
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
