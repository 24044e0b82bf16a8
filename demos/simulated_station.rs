//! Simulated station walkthrough.
//!
//! Loads the sample interlock table and IO document from `resources/`, runs
//! the background refresh loop and drives a few routes through the service
//! facade, printing every response as JSON.
//!
//! # Usage
//!
//! ```sh
//! cargo run --example simulated_station
//! cargo run --example simulated_station -- path/to/config.json
//! RUST_LOG=rs_interlock=debug cargo run --example simulated_station
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rs_interlock::services::{
    spawn_refresh_loop, CancelRouteRequest, CreateRouteRequest, StationService,
};
use rs_interlock::{Config, DeviceClass, SectionState, StationManager};
use tracing_subscriber::EnvFilter;

fn load_config() -> anyhow::Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => Config::load(&path),
        None if std::path::Path::new("./resources/config.json").exists() => {
            Config::load("./resources/config.json")
        }
        None => Ok(Config::default()),
    }
}

fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.station.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = tokio::runtime::Runtime::new().context("creating tokio runtime")?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    println!("=================================");
    println!("  rs-interlock: {}", config.station.name);
    println!("=================================");

    let station = Arc::new(StationManager::simulated(config.clone())?);
    let poller = spawn_refresh_loop(Arc::clone(&station), config.events.refresh_interval());
    let service = StationService::new(Arc::clone(&station));

    let mut updates = service.refresh_station();
    let printer = tokio::spawn(async move {
        while let Some(update) = updates.next().await {
            println!("  ~ {} {} -> {}", update.class, update.id, update.state);
        }
    });

    println!("\n-- initial snapshot");
    println!("{}", service.init_station().to_json());

    println!("\n-- set X-3G (XLA, S3LA)");
    println!("{}", service.create_route(CreateRouteRequest::new(["XLA", "S3LA"])).await.to_json());

    println!("\n-- set its enemy S3-X (S3LA, XLA)");
    println!("{}", service.create_route(CreateRouteRequest::new(["S3LA", "XLA"])).await.to_json());

    println!("\n-- train enters 3G");
    station.controller().set_section("3G", SectionState::Occupied);
    tokio::time::sleep(config.events.refresh_interval() + Duration::from_millis(100)).await;

    println!("\n-- cancel X-3G while 3G is occupied");
    println!("{}", service.cancel_route(CancelRouteRequest::new("X-3G")).await.to_json());

    println!("\n-- train leaves, interlocking relocks 3G");
    station.controller().set_section("3G", SectionState::Locked);
    tokio::time::sleep(config.events.refresh_interval() + Duration::from_millis(100)).await;
    println!("{}", service.cancel_route(CancelRouteRequest::new("X-3G")).await.to_json());

    println!("\n-- turnout 7 jams while setting D1-D3");
    station.controller().stick(DeviceClass::Turnout, "7");
    println!("{}", service.create_route(CreateRouteRequest::new(["D1A", "D3A"])).await.to_json());

    println!("\n-- fitter frees turnout 7, repair");
    station.controller().unstick(DeviceClass::Turnout, "7");
    println!("{}", service.repair_device(DeviceClass::Turnout, "7").to_json());

    println!("\n-- final snapshot");
    println!("{}", service.init_station().to_json());

    poller.abort();
    printer.abort();
    Ok(())
}
