//! Stream poses from the first enumerated device to stdout.
//!
//! Usage: cargo run --example stream
//! Press Ctrl+C to stop.

use std::time::{Duration, Instant};
use vrhal::{FloatProperty, OpenOptions, Registry};

fn main() {
    env_logger::init();

    let mut registry = Registry::new();
    registry.register_defaults();

    let descriptors = registry.enumerate();
    let Some(first) = descriptors.first() else {
        eprintln!("No devices found");
        std::process::exit(1);
    };
    println!("Opening [{}] {} {}", first.id, first.vendor, first.product);

    let mut device = match registry.open(first.id, &OpenOptions::default()) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to open device: {}", e);
            std::process::exit(1);
        }
    };

    println!("Streaming poses (Ctrl+C to stop)...");

    let start = Instant::now();
    loop {
        let pos = device.get_float(FloatProperty::PositionVector).unwrap();
        let quat = device.get_float(FloatProperty::RotationQuat).unwrap();
        println!(
            "t={:>6.2}s  pos=[{:+.4}, {:+.4}, {:+.4}]  quat=[{:+.3}, {:+.3}, {:+.3}, {:+.3}]",
            start.elapsed().as_secs_f64(),
            pos[0], pos[1], pos[2],
            quat[0], quat[1], quat[2], quat[3],
        );
        std::thread::sleep(Duration::from_millis(100));
    }
}
