//! Runnable hub node
//!
//! Usage:
//!   hub [--relay ADDR] [--ingest ADDR] [--viewer ADDR]
//!       [--max-slots N] [--uplink ADDR]
//!
//! Addresses accept IP:PORT, bare IP (default port kept), or "localhost".
//! Point a leaf at the relay port, a camera producer at the ingest port,
//! and a browser at http://<viewer addr>/ for the live stream.

use std::net::SocketAddr;

use meshcam::{Hub, HubConfig};

fn parse_addr(arg: &str, default_port: u16) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    Err(format!(
        "Invalid address: '{}'. Expected IP:PORT, IP, or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: hub [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --relay ADDR      Relay (peer) listener       (default: 0.0.0.0:8000)");
    eprintln!("  --ingest ADDR     Frame ingestion listener    (default: 0.0.0.0:8001)");
    eprintln!("  --viewer ADDR     Viewer HTTP listener        (default: 0.0.0.0:8080)");
    eprintln!("  --max-slots N     Relay slot table capacity   (default: 6)");
    eprintln!("  --uplink ADDR     Forward relayed bytes to an upstream aggregator");
    eprintln!("  -h, --help        Show this help");
}

fn parse_config(args: &[String]) -> Result<HubConfig, String> {
    let mut config = HubConfig::default();

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = || -> Result<&String, String> {
            args.get(i + 1)
                .ok_or_else(|| format!("{} requires a value", flag))
        };

        match flag {
            "--relay" => config.relay_addr = parse_addr(value()?, 8000)?,
            "--ingest" => config.ingest_addr = parse_addr(value()?, 8001)?,
            "--viewer" => config.viewer_addr = parse_addr(value()?, 8080)?,
            "--uplink" => config.uplink_addr = Some(parse_addr(value()?, 9000)?),
            "--max-slots" => {
                config.max_slots = value()?
                    .parse::<usize>()
                    .map_err(|_| "--max-slots requires a positive integer".to_string())?;
            }
            other => return Err(format!("Unknown option: {}", other)),
        }
        i += 2;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("meshcam=info".parse()?),
        )
        .init();

    let config = match parse_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    let hub = Hub::bind(config).await?;

    println!("Relay port:   {}", hub.relay_addr());
    println!("Ingest port:  {}", hub.ingest_addr());
    println!("Viewer page:  http://{}/", hub.viewer_addr());

    tokio::select! {
        result = hub.run() => {
            if let Err(e) = result {
                eprintln!("Hub error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}
