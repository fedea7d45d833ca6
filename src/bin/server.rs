use std::{net::SocketAddrV4, time::Duration};

use anyhow::Result;
use clap::Parser;
use multicast_conn::{MULTICAST_ADDRESS, MulticastConfig, Network, SERVER_PORT};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Announces a message on every multicast interface")]
struct Args {
    #[arg(default_value = "hi")]
    message: String,

    /// Milliseconds between announcements
    #[arg(short, long, default_value_t = 1000)]
    interval: u64,

    /// Also deliver to listeners on this host
    #[arg(long)]
    loopback: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let group = SocketAddrV4::new(MULTICAST_ADDRESS, SERVER_PORT).into();
    let mut config = MulticastConfig::new(Network::Udp4, group);
    config.reuse_addr = true;
    config.reuse_port = true;
    config.loopback = Some(args.loopback);

    let (conn, warning) = config.listen()?;
    if let Some(warning) = warning {
        warn!("{warning}");
    }
    if conn.egress_is_stateful() {
        info!("Outbound interface is set per send; keep this connection to one sender");
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval));
    loop {
        ticker.tick().await;
        match conn.write_to_multicast(args.message.as_bytes(), group) {
            Ok(()) => info!("Sent on {} interfaces", conn.interfaces().len()),
            Err(e) => warn!("{e}"),
        }
    }
}
