//! Synthetic driver: an HMD and two controllers that move on their own.
//!
//! No hardware, no background thread. Poses are derived from elapsed time at
//! read, so the devices animate without anyone pumping them. Useful for
//! developing against the device contract without a headset plugged in.

use crate::device::{
    get_common_float, get_common_int, set_common_float, FloatProperty, IntProperty, StringProperty,
    TrackedDevice,
};
use crate::error::VrHalError;
use crate::math;
use crate::registry::{DeviceDescriptor, Driver, OpenOptions};
use crate::types::{Control, ControlHint, ControlType, DeviceClass, DeviceFlags, DeviceProperties, Pose};
use crate::Result;
use std::time::Instant;

const DRIVER_NAME: &str = "Simulator";

pub struct SimulatorDriver;

impl SimulatorDriver {
    pub fn new() -> SimulatorDriver {
        SimulatorDriver
    }

    fn descriptor(index: u32) -> DeviceDescriptor {
        let (product, class, flags) = match index {
            0 => (
                "Simulated HMD",
                DeviceClass::Hmd,
                DeviceFlags::NULL_DEVICE | DeviceFlags::ROTATIONAL_TRACKING,
            ),
            1 => (
                "Simulated Left Controller",
                DeviceClass::Controller,
                DeviceFlags::NULL_DEVICE
                    | DeviceFlags::POSITIONAL_TRACKING
                    | DeviceFlags::ROTATIONAL_TRACKING
                    | DeviceFlags::LEFT_CONTROLLER,
            ),
            _ => (
                "Simulated Right Controller",
                DeviceClass::Controller,
                DeviceFlags::NULL_DEVICE
                    | DeviceFlags::POSITIONAL_TRACKING
                    | DeviceFlags::ROTATIONAL_TRACKING
                    | DeviceFlags::RIGHT_CONTROLLER,
            ),
        };
        DeviceDescriptor {
            id: 0,
            driver: DRIVER_NAME.to_string(),
            vendor: "vrhal".to_string(),
            product: product.to_string(),
            revision: 0,
            path: "(none)".to_string(),
            class,
            flags,
            device_index: index,
        }
    }
}

impl Default for SimulatorDriver {
    fn default() -> Self {
        SimulatorDriver::new()
    }
}

impl Driver for SimulatorDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn enumerate(&mut self) -> Vec<DeviceDescriptor> {
        (0..3).map(Self::descriptor).collect()
    }

    fn open(
        &mut self,
        desc: &DeviceDescriptor,
        _options: &OpenOptions,
    ) -> Result<Box<dyn TrackedDevice>> {
        log::info!("opening simulated device {:?}", desc.product);

        let mut props = DeviceProperties::default();
        props.controls = vec![
            Control {
                hint: ControlHint::ButtonA,
                kind: ControlType::Analog,
            },
            Control {
                hint: ControlHint::Menu,
                kind: ControlType::Digital,
            },
        ];

        Ok(Box::new(SimulatorDevice {
            props,
            class: desc.class,
            flags: desc.flags,
            vendor: desc.vendor.clone(),
            product: desc.product.clone(),
            epoch: Instant::now(),
            closed: false,
        }))
    }
}

struct SimulatorDevice {
    props: DeviceProperties,
    class: DeviceClass,
    flags: DeviceFlags,
    vendor: String,
    product: String,
    epoch: Instant,
    closed: bool,
}

impl SimulatorDevice {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(VrHalError::AlreadyClosed);
        }
        Ok(())
    }

    fn current_pose(&self) -> Pose {
        let t = self.epoch.elapsed().as_secs_f32();
        match self.class {
            DeviceClass::Hmd => Pose {
                position: [0.0, 0.0, (t / 4.0).sin() / 1.5],
                orientation: math::quat_from_axis_angle([0.0, 1.0, 0.0], (t / 2.0).sin() * 10.0),
            },
            DeviceClass::Controller if self.flags.contains(DeviceFlags::LEFT_CONTROLLER) => Pose {
                position: [(t / 2.0).sin() / 2.0 - 0.25, 0.0, -0.5],
                orientation: math::QUAT_IDENTITY,
            },
            DeviceClass::Controller => Pose {
                position: [0.25, (t / 2.0).sin() / 2.0, -0.5],
                orientation: math::QUAT_IDENTITY,
            },
        }
    }
}

impl TrackedDevice for SimulatorDevice {
    fn get_float(&self, prop: FloatProperty) -> Result<Vec<f32>> {
        self.ensure_open()?;
        match prop {
            // A pressed-ish analog button A and an active menu toggle.
            FloatProperty::ControlsState => Ok(vec![0.1, 1.0]),
            other => get_common_float(&self.props, self.current_pose(), other),
        }
    }

    fn set_float(&mut self, prop: FloatProperty, value: &[f32]) -> Result<()> {
        self.ensure_open()?;
        if set_common_float(&mut self.props, prop, value)? {
            self.props.calc_default_proj_matrices();
        }
        Ok(())
    }

    fn get_int(&self, prop: IntProperty) -> Result<Vec<i32>> {
        self.ensure_open()?;
        get_common_int(&self.props, self.class, prop)
    }

    fn set_int(&mut self, prop: IntProperty, _value: &[i32]) -> Result<()> {
        self.ensure_open()?;
        Err(VrHalError::invalid_param(format!(
            "read-only int property {:?}",
            prop
        )))
    }

    fn get_string(&self, prop: StringProperty) -> Result<String> {
        self.ensure_open()?;
        match prop {
            StringProperty::Vendor => Ok(self.vendor.clone()),
            StringProperty::Product => Ok(self.product.clone()),
            other => Err(VrHalError::invalid_param(format!(
                "unsupported string property {:?}",
                other
            ))),
        }
    }

    fn update(&mut self) -> Result<()> {
        self.ensure_open()
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        log::debug!("closing simulated device {:?}", self.product);
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_device(index: u32) -> Box<dyn TrackedDevice> {
        let mut driver = SimulatorDriver::new();
        let descs = driver.enumerate();
        driver.open(&descs[index as usize], &OpenOptions::default()).unwrap()
    }

    #[test]
    fn test_enumeration_shape() {
        let mut driver = SimulatorDriver::new();
        let descs = driver.enumerate();
        assert_eq!(descs.len(), 3);
        assert_eq!(descs[0].class, DeviceClass::Hmd);
        assert!(descs[0].flags.contains(DeviceFlags::NULL_DEVICE));
        assert!(descs[1].flags.contains(DeviceFlags::LEFT_CONTROLLER));
        assert!(descs[2].flags.contains(DeviceFlags::RIGHT_CONTROLLER));
    }

    #[test]
    fn test_controller_base_positions() {
        let left = open_device(1);
        let pos = left.get_float(FloatProperty::PositionVector).unwrap();
        assert!(pos[0] <= 0.25 && pos[0] >= -0.75);
        assert_eq!(pos[2], -0.5);

        let right = open_device(2);
        let pos = right.get_float(FloatProperty::PositionVector).unwrap();
        assert_eq!(pos[0], 0.25);
        assert_eq!(pos[2], -0.5);
    }

    #[test]
    fn test_hmd_orientation_is_unit() {
        let hmd = open_device(0);
        let q = hmd.get_float(FloatProperty::RotationQuat).unwrap();
        let mag2: f32 = q.iter().map(|c| c * c).sum();
        assert!((mag2 - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_controls_protocol() {
        let hmd = open_device(0);
        assert_eq!(hmd.get_float(FloatProperty::ControlsState).unwrap(), vec![0.1, 1.0]);
        assert_eq!(hmd.get_int(IntProperty::ControlCount).unwrap(), vec![2]);
    }

    #[test]
    fn test_strings() {
        let hmd = open_device(0);
        assert_eq!(hmd.get_string(StringProperty::Product).unwrap(), "Simulated HMD");
        assert_eq!(hmd.get_string(StringProperty::Vendor).unwrap(), "vrhal");
    }

    #[test]
    fn test_ipd_write_feeds_modelview() {
        let mut hmd = open_device(0);
        hmd.set_float(FloatProperty::EyeIpd, &[0.07]).unwrap();
        assert_eq!(hmd.get_float(FloatProperty::EyeIpd).unwrap(), vec![0.07]);
        let mv = hmd.get_float(FloatProperty::LeftEyeGlModelview).unwrap();
        assert_eq!(mv.len(), 16);
    }

    #[test]
    fn test_set_int_rejected() {
        let mut hmd = open_device(0);
        let err = hmd
            .set_int(IntProperty::ScreenHorizontalResolution, &[640])
            .unwrap_err();
        assert!(matches!(err, VrHalError::InvalidParameter(_)));
        // State unchanged.
        assert_eq!(
            hmd.get_int(IntProperty::ScreenHorizontalResolution).unwrap(),
            vec![1280]
        );
    }

    #[test]
    fn test_operations_after_close() {
        let mut hmd = open_device(0);
        hmd.close().unwrap();
        assert!(matches!(hmd.close().unwrap_err(), VrHalError::AlreadyClosed));
        assert!(matches!(
            hmd.get_float(FloatProperty::RotationQuat).unwrap_err(),
            VrHalError::AlreadyClosed
        ));
        assert!(matches!(hmd.update().unwrap_err(), VrHalError::AlreadyClosed));
    }
}
