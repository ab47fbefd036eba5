//! `devices` subcommand — list connected blink(1) devices.

use super::{DeviceJson, DevicesOutput, DiscoveredDevice, Result, Revision, device};

fn revision_of(dev: &DiscoveredDevice) -> Option<Revision> {
    dev.serial.as_deref().map(Revision::from_serial)
}

fn device_json(dev: &DiscoveredDevice) -> DeviceJson {
    let revision = revision_of(dev);
    DeviceJson {
        path: dev.path.clone(),
        serial: dev.serial.clone(),
        revision,
        leds: revision.map(Revision::led_count),
    }
}

pub(super) fn cmd_devices(json: bool) -> Result<()> {
    let devices = device::enumerate_devices();

    if json {
        let output = DevicesOutput {
            count: devices.len(),
            devices: devices.iter().map(device_json).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
        return Ok(());
    }

    if devices.is_empty() {
        println!("No blink(1) devices found.");
        return Ok(());
    }

    println!(
        "Found {} blink(1) device{}:",
        devices.len(),
        if devices.len() == 1 { "" } else { "s" }
    );
    println!();

    for (i, dev) in devices.iter().enumerate() {
        println!("  [{}] {}", i + 1, dev.path);
        match (&dev.serial, revision_of(dev)) {
            (Some(serial), Some(rev)) => {
                let leds = rev.led_count();
                println!(
                    "      Serial: {serial} ({rev}, {leds} LED{})",
                    if leds == 1 { "" } else { "s" }
                );
            }
            _ => println!("      Serial: (unreadable)"),
        }
    }

    Ok(())
}
