// Pulsar battery diagnostic tool
//
// Lists every interface that matches a known mouse family, prints the report
// sizes each one declares, then runs one full battery read with protocol
// debug logging switched on. Set RUST_LOG to override the default filter.

use tracing_subscriber::EnvFilter;

use pulsar_battery::hid::{HidApiTransport, HidTransport};
use pulsar_battery::pulsar::{variant, VariantDriver};
use pulsar_battery::{BatteryReader, StatusReader};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pulsar_battery=debug")),
        )
        .init();

    println!("=== Pulsar Battery Diagnostic Tool ===\n");

    println!("[STEP 1] Enumerating candidate interfaces...");
    let transport = HidApiTransport::new()?;
    let mut found = 0;

    for variant in variant::all() {
        let driver = VariantDriver::new(variant);
        let devices = driver.discover(&transport);
        println!(
            "\n  {} (VID 0x{:04X}): {} interface(s)",
            driver.model(),
            driver.variant().vendor_id,
            devices.len()
        );

        for device in &devices {
            found += 1;
            println!(
                "    PID 0x{:04X}  interface {}  {}",
                device.product_id,
                device.interface_number,
                device.product.as_deref().unwrap_or("<no product string>")
            );
            println!("      path: {:?}", device.path);

            match transport.open(device) {
                Some(channel) => println!(
                    "      input report: {} bytes, feature report: {} bytes",
                    channel.max_input_report_len(),
                    channel.max_feature_report_len()
                ),
                None => println!("      [ERROR] cannot open (permissions?)"),
            }
        }
    }

    if found == 0 {
        println!("\n[ERROR] No supported mouse found. Is the receiver plugged in?");
        return Ok(());
    }

    println!("\n[STEP 2] Reading battery status...");
    // Separate hidapi context; the listing above holds no open handles now
    drop(transport);
    let reader = BatteryReader::new()?;

    match reader.read_battery_status() {
        Some(status) => {
            println!("\n[SUCCESS] {}", status.model);
            println!("  Battery: {}%", status.percentage);
            println!("  Charging: {}", if status.is_charging { "yes" } else { "no" });
        }
        None => {
            println!("\n[FAIL] No status response.");
            println!("  Move the mouse to wake it and run again.");
        }
    }

    println!("\n=== Diagnostic Complete ===");
    Ok(())
}
