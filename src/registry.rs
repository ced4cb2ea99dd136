//! Driver registry: enumeration of connectable devices and opening a
//! descriptor into a live device instance.

use crate::device::TrackedDevice;
use crate::error::VrHalError;
use crate::types::{DeviceClass, DeviceFlags};
use crate::Result;
use std::collections::HashMap;

/// Enumeration-time description of one connectable device.
///
/// Immutable once produced; an open call consumes it to produce a live
/// device bound to the originating driver.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// Registry-assigned ordinal, stable within one process lifetime for an
    /// unchanged device set.
    pub id: u32,
    /// Name of the driver that produced this descriptor.
    pub driver: String,
    pub vendor: String,
    pub product: String,
    pub revision: u32,
    /// Driver-specific open path or handle.
    pub path: String,
    pub class: DeviceClass,
    pub flags: DeviceFlags,
    /// Driver-local index (e.g. HMD 0, controllers 1 and 2).
    pub device_index: u32,
}

/// Options recognized by [`Registry::open`].
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// When true (the default) the acquisition engine polls the tracking
    /// subsystem from its own background thread. When false the consumer
    /// must call [`TrackedDevice::update`] at 10 Hz or more.
    pub auto_update: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions { auto_update: true }
    }
}

/// One driver implementation: enumerates descriptors without opening
/// hardware, and opens a descriptor into a device instance.
pub trait Driver: Send {
    fn name(&self) -> &str;

    /// List connectable devices. Must not open any of them and must be safe
    /// to call repeatedly.
    fn enumerate(&mut self) -> Vec<DeviceDescriptor>;

    fn open(
        &mut self,
        desc: &DeviceDescriptor,
        options: &OpenOptions,
    ) -> Result<Box<dyn TrackedDevice>>;
}

/// Entry point tying drivers, enumeration, and the open life cycle together.
pub struct Registry {
    drivers: Vec<Box<dyn Driver>>,
    descriptors: HashMap<u32, (usize, DeviceDescriptor)>,
    assigned_ids: HashMap<(String, String, u32), u32>,
    next_id: u32,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            drivers: Vec::new(),
            descriptors: HashMap::new(),
            assigned_ids: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn register(&mut self, driver: Box<dyn Driver>) {
        log::info!("registered driver {:?}", driver.name());
        self.drivers.push(driver);
    }

    /// Register the driver set that needs no external collaborators: the
    /// simulator.
    pub fn register_defaults(&mut self) {
        self.register(Box::new(crate::drivers::simulator::SimulatorDriver::new()));
    }

    /// Enumerate all drivers' connectable devices.
    ///
    /// Ordinals are assigned per (driver, path, index) identity, so repeated
    /// enumeration of an unchanged device set yields the same ids.
    pub fn enumerate(&mut self) -> Vec<DeviceDescriptor> {
        self.descriptors.clear();
        let mut out = Vec::new();

        for (driver_idx, driver) in self.drivers.iter_mut().enumerate() {
            for mut desc in driver.enumerate() {
                let key = (desc.driver.clone(), desc.path.clone(), desc.device_index);
                let id = *self.assigned_ids.entry(key).or_insert_with(|| {
                    let id = self.next_id;
                    self.next_id += 1;
                    id
                });
                desc.id = id;
                self.descriptors.insert(id, (driver_idx, desc.clone()));
                out.push(desc);
            }
        }

        out.sort_by_key(|d| d.id);
        out
    }

    /// Open an enumerated device by its ordinal id.
    pub fn open(&mut self, id: u32, options: &OpenOptions) -> Result<Box<dyn TrackedDevice>> {
        let (driver_idx, desc) = self
            .descriptors
            .get(&id)
            .cloned()
            .ok_or_else(|| {
                VrHalError::DeviceUnavailable(format!("no enumerated device with id {}", id))
            })?;

        log::info!(
            "opening {:?} (id {}, driver {:?})",
            desc.product,
            id,
            desc.driver
        );
        self.drivers[driver_idx].open(&desc, options)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{FloatProperty, IntProperty};

    #[test]
    fn test_enumerate_ids_stable_across_calls() {
        let mut registry = Registry::new();
        registry.register_defaults();

        let first = registry.enumerate();
        let second = registry.enumerate();
        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), 3);
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.product, b.product);
        }
    }

    #[test]
    fn test_open_unknown_id_is_unavailable() {
        let mut registry = Registry::new();
        registry.register_defaults();
        registry.enumerate();

        let err = registry.open(99, &OpenOptions::default()).err().unwrap();
        assert!(matches!(err, VrHalError::DeviceUnavailable(_)));
    }

    #[test]
    fn test_open_yields_live_device() {
        let mut registry = Registry::new();
        registry.register_defaults();
        let descriptors = registry.enumerate();

        let hmd_id = descriptors
            .iter()
            .find(|d| d.class == DeviceClass::Hmd)
            .unwrap()
            .id;
        let mut device = registry.open(hmd_id, &OpenOptions::default()).unwrap();

        let res = device.get_int(IntProperty::ScreenHorizontalResolution).unwrap();
        assert_eq!(res, vec![1280]);
        let quat = device.get_float(FloatProperty::RotationQuat).unwrap();
        assert_eq!(quat.len(), 4);
        device.close().unwrap();
    }
}
