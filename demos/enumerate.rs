//! List every tracked device known to the registered drivers.

fn main() {
    env_logger::init();

    let mut registry = vrhal::Registry::new();
    registry.register_defaults();

    let descriptors = registry.enumerate();
    println!("Found {} device(s):", descriptors.len());
    for d in &descriptors {
        println!(
            "  [{}] driver={}  vendor={}  product={}  class={:?}  flags={:?}  path={}",
            d.id, d.driver, d.vendor, d.product, d.class, d.flags, d.path
        );
    }
}
