use std::net::SocketAddrV4;

use anyhow::Result;
use multicast_conn::{MULTICAST_ADDRESS, MulticastConfig, Network, SERVER_PORT};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Prints every datagram sent to the group, whichever interface it arrives on.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let group = SocketAddrV4::new(MULTICAST_ADDRESS, SERVER_PORT).into();
    let mut config = MulticastConfig::new(Network::Udp4, group);
    config.reuse_addr = true;
    config.reuse_port = true;

    let (conn, warning) = config.listen()?;
    if let Some(warning) = warning {
        warn!("{warning}");
    }
    let names: Vec<_> = conn.interfaces().iter().map(|i| i.name.as_str()).collect();
    info!("Listening on {group} via {names:?}");

    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut buf = vec![0; 1024];
        loop {
            let (n, from) = conn.recv_from(&mut buf)?;
            let text = String::from_utf8_lossy(&buf[..n]);
            println!("Received {text:?} from {from}");
        }
    })
    .await?
}
