//! Sends one mDNS query out of every multicast interface and logs what comes back.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use hickory_proto::{
    op::{Message, Query},
    rr::{Name, RecordType},
    serialize::binary::BinEncodable,
};
use multicast_conn::{MulticastConfig, MulticastConn, Network, mdns_group};
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

const MDNS_TTL: u32 = 255;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Name to query, e.g. `printer.local.`
    name: String,

    /// udp4 or udp6
    #[arg(short, long, default_value = "udp4")]
    network: Network,

    /// Interfaces to query on (repeatable). Every multicast interface by default.
    #[arg(short, long = "interface")]
    interfaces: Vec<String>,

    /// Seconds to wait for answers
    #[arg(short, long, default_value_t = 3)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let group = mdns_group(args.network);

    let mut config = MulticastConfig::new(args.network, group);
    config.ttl = Some(MDNS_TTL);
    config.reuse_addr = true;
    config.reuse_port = true;
    if !args.interfaces.is_empty() {
        config.interfaces = Some(args.interfaces.clone());
    }

    let (conn, warning) = config.listen().context("Failed to create connection")?;
    if let Some(warning) = warning {
        warn!("{warning}");
    }
    info!("Listening on {}", conn.local_addr()?);

    let record_type = match args.network {
        Network::Udp4 => RecordType::A,
        Network::Udp6 => RecordType::AAAA,
    };
    let query = build_query(&args.name, record_type)?;
    if let Err(e) = conn.write_to_multicast(&query, group) {
        warn!("Error sending query: {e}");
    } else {
        info!("Query sent on {} interfaces", conn.interfaces().len());
    }

    let conn = Arc::new(conn);
    let reader = Arc::clone(&conn);
    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    let reading = tokio::task::spawn_blocking(move || read_until(&reader, deadline));
    let received = reading.await??;
    info!("{received} datagrams received");

    let mut conn = Arc::into_inner(conn)
        .ok_or_else(|| anyhow!("connection still shared"))?;
    conn.close()?;

    Ok(())
}

fn read_until(conn: &MulticastConn, deadline: Instant) -> Result<usize> {
    let span = info_span!("mDNS responses");
    let _enter = span.enter();

    let mut buf = vec![0; 65536];
    let mut received = 0;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        if left.is_zero() {
            break;
        }
        conn.set_read_timeout(Some(left))?;
        let (len, from) = match conn.recv_from(&mut buf) {
            Ok(datagram) => datagram,
            Err(multicast_conn::Error::Io(e)) if is_timeout(&e) => break,
            Err(e) => {
                warn!("Error reading: {e}");
                break;
            }
        };

        received += 1;
        match Message::from_vec(&buf[..len]) {
            Ok(response) => log_answers(&response, from),
            Err(e) => warn!("Undecodable datagram of {len} bytes from {from}: {e}"),
        }
    }
    Ok(received)
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

fn log_answers(response: &Message, from: SocketAddr) {
    if response.answers().is_empty() {
        info!("{from} sent a message without answers");
    }
    for answer in response.answers() {
        info!("{from}: {answer}");
    }
}

/// A standard query with one question and recursion not desired.
fn build_query(name: &str, record_type: RecordType) -> Result<Vec<u8>> {
    let name = Name::from_ascii(name)
        .with_context(|| format!("Invalid name {name:?}"))?;
    let mut message = Message::new();
    message
        .set_recursion_desired(false)
        .add_query(Query::query(name, record_type));
    Ok(message.to_bytes()?)
}
