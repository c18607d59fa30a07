//! Browse the network for UPnP devices and print what answers as JSON lines
//!
//! Usage: cargo run -p upnp-ssdp-engine --example ssdp_browse -- --target root --duration 5

use std::time::{Duration, Instant};

use clap::Parser;
use serde::Serialize;
use ssdp_engine::{DiscoveryEvent, EngineConfig, SsdpEngine};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ssdp_browse", about = "Discover UPnP devices with SSDP")]
struct Args {
    /// What to search for: all, root, uuid:<id>, device:<type> or service:<type>
    #[arg(long, default_value = "all")]
    target: String,

    /// Maximum answer delay requested from responders (seconds)
    #[arg(long, default_value_t = 2)]
    mx: u32,

    /// How long to listen for answers and announcements (seconds)
    #[arg(long, default_value_t = 5)]
    duration: u64,

    /// SSDP port
    #[arg(long, default_value_t = ssdp_engine::SSDP_PORT)]
    port: u16,

    /// Also report M-SEARCH requests seen from other control points
    #[arg(long)]
    show_queries: bool,
}

#[derive(Serialize)]
struct Line<'a> {
    elapsed_ms: u128,
    event: &'a DiscoveryEvent,
}

fn send_search(engine: &SsdpEngine, target: &str, mx: u32) -> Result<bool, String> {
    let sent = match target.split_once(':') {
        None if target == "all" => engine.search_all_upnp_device(mx),
        None if target == "root" => engine.search_all_root_device(mx),
        Some(("uuid", uuid)) => engine.search_by_device_uuid(uuid, mx),
        Some(("device", device_type)) => engine.search_by_device_type(device_type, mx),
        Some(("service", service_type)) => engine.search_by_service_type(service_type, mx),
        _ => return Err(format!("unrecognized target '{}'", target)),
    };
    Ok(sent)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut engine = SsdpEngine::new(EngineConfig::control_point().with_port(args.port))?;
    let events = engine.subscribe();
    let sockets = engine.initialize()?;
    tracing::info!("Opened {} sockets", sockets);

    if !send_search(&engine, &args.target, args.mx)? {
        tracing::warn!("Search was not transmitted on any interface");
    }

    let start = Instant::now();
    let deadline = start + Duration::from_secs(args.duration);
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        let Some(event) = events.recv_timeout(remaining) else {
            break;
        };
        if matches!(event, DiscoveryEvent::NewSearchQuery(_)) && !args.show_queries {
            continue;
        }
        let line = Line {
            elapsed_ms: start.elapsed().as_millis(),
            event: &event,
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    engine.shutdown();
    Ok(())
}
