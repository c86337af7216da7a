use std::net::SocketAddr;

use anyhow::Context;
use clap::builder::RangedU64ValueParser;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zonemux::config::{parse_zone_spec, ZoneSpec};
use zonemux::responder::DEFAULT_TTL;
use zonemux::server::DEFAULT_WORKERS;
use zonemux::{AddressMode, AnswerOptions, DnsServer, ZoneKind, ZoneRouter};

#[derive(Parser, Debug)]
#[command(name = "zonemux")]
struct Args {
    /// Address to listen on for UDP queries
    #[arg(long, default_value = "127.0.0.1:2053")]
    listen: SocketAddr,

    /// Zone and its A records as ZONE=NAME:IP[,NAME:IP...]; use "." for the fallback zone
    #[arg(long = "zone", value_parser = parse_zone_spec)]
    zones: Vec<ZoneSpec>,

    /// TTL of every answer, in seconds
    #[arg(long, default_value_t = DEFAULT_TTL)]
    ttl: u32,

    /// How configured addresses are placed in answers
    #[arg(long, value_enum, default_value_t = AddressMode::Verbatim)]
    address_mode: AddressMode,

    /// Number of worker threads answering queries
    #[arg(
        long,
        default_value_t = DEFAULT_WORKERS,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    threads: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let mut router = ZoneRouter::new(AnswerOptions {
        ttl: args.ttl,
        address_mode: args.address_mode,
    });
    for spec in args.zones {
        router.add_zone(&spec.zone, spec.records, None, ZoneKind::Forward);
    }
    if router.is_empty() {
        warn!("no zones configured, every query will be dropped");
    }

    let server = DnsServer::new(args.listen, router, args.threads)
        .with_context(|| format!("failed to bind to {}", args.listen))?;
    info!(
        addr = %server.local_addr()?,
        workers = server.workers(),
        "listening for DNS queries"
    );

    server.run().context("DNS server stopped")?;
    Ok(())
}
