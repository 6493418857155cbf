use std::env;
use std::time::Duration;

use tuya_cloud_ac::hap::{Characteristic, HapValue, ServiceKind};
use tuya_cloud_ac::{config, Accessory};

#[tokio::main]
async fn main() -> tuya_cloud_ac::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let path = args
        .get(1)
        .expect("usage: status <config.toml> [--watch] [--set <characteristic>=<value>]");
    let watch = args.iter().any(|a| a == "--watch");
    let assignment = args
        .iter()
        .position(|a| a == "--set")
        .and_then(|i| args.get(i + 1))
        .cloned();

    let cfg = config::load(path)?;
    println!("Device {} ({:?}, {:?})", cfg.device_id, cfg.region, cfg.variant);

    let mut accessory = Accessory::from_config(&cfg)?;
    if let Some(sync) = accessory.take_startup_sync() {
        let _ = sync.await;
    }

    if let Some(assignment) = assignment {
        apply(&accessory, &assignment).await;
    }

    loop {
        for service in accessory.services() {
            println!("== {} ({:?})", service.name(), service.kind());
            for characteristic in service.characteristics().collect::<Vec<_>>() {
                match service.get(characteristic).await {
                    Some(value) => println!("  {characteristic}: {value}"),
                    None => println!("  {characteristic}: -"),
                }
            }
        }
        if !watch {
            break;
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
    }

    Ok(())
}

/// `--set Active=1`, `--set RotationSpeed=66`, ... applied to the climate service.
async fn apply(accessory: &Accessory, assignment: &str) {
    let Some((name, raw)) = assignment.split_once('=') else {
        eprintln!("expected <characteristic>=<value>, got {assignment}");
        return;
    };
    let Some(service) = accessory.service(ServiceKind::HeaterCooler) else {
        return;
    };
    let Some(characteristic) = service.characteristics().find(|c| c.name() == name) else {
        eprintln!("unknown characteristic {name}");
        return;
    };
    let value = match raw.parse::<f64>() {
        Ok(n) => HapValue::Float(n),
        Err(_) => HapValue::Bool(raw == "true"),
    };
    println!("Setting {characteristic} = {value}");
    service.set(characteristic, value).await;
}
