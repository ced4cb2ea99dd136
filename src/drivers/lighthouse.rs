//! Lighthouse-tracked headset driver (HTC Vive and compatibles).
//!
//! Enumeration finds the headset's HID interface by vendor/product id; the
//! actual 6DOF poses come from an injected [`TrackingSubsystem`] — an
//! external tracking engine whose wire protocol this crate treats as opaque.
//! One subsystem serves the HMD and both controllers, so all three logical
//! devices attach to a single shared [`AcquisitionContext`].

use crate::acquisition::{
    AcquisitionContext, EngineState, FrameCorrection, PoseCell, TrackingSubsystem,
};
use crate::device::{
    get_common_float, get_common_int, set_common_float, FloatProperty, IntProperty, StringProperty,
    TrackedDevice,
};
use crate::error::VrHalError;
use crate::hid::{self, HidTransport};
use crate::math;
use crate::registry::{DeviceDescriptor, Driver, OpenOptions};
use crate::types::{DeviceClass, DeviceFlags, DeviceProperties};
use crate::Result;
use std::sync::{Arc, Weak};

const DRIVER_NAME: &str = "Lighthouse";

/// Subsystem object tags, in descriptor-index order.
const HMD_TAG: &str = "HMD";
const LEFT_CONTROLLER_TAG: &str = "WM0";
const RIGHT_CONTROLLER_TAG: &str = "WM1";

/// Distance from the eye to the display surface, in meters.
const EYE_TO_SCREEN: f32 = 0.023_226_876;

/// Constructs a fresh tracking-subsystem handle. Called once per shared
/// context, i.e. once per headset power cycle, not once per logical device.
pub type SubsystemFactory = Box<dyn FnMut() -> Box<dyn TrackingSubsystem> + Send>;

pub struct LighthouseDriver {
    factory: SubsystemFactory,
    shared: Weak<AcquisitionContext>,
}

impl LighthouseDriver {
    pub fn new(factory: SubsystemFactory) -> LighthouseDriver {
        LighthouseDriver {
            factory,
            shared: Weak::new(),
        }
    }

    /// The subsystem reports right-handed poses with the headset's mounting
    /// rotated a quarter turn around X relative to its tracking reference:
    /// flip X and Z, negate the matching quaternion components, and compose
    /// the constant corrective rotation.
    fn frame_correction() -> FrameCorrection {
        FrameCorrection {
            position_sign: [-1.0, 1.0, -1.0],
            orientation_sign: [-1.0, 1.0, -1.0, 1.0],
            mount_rotation: [-std::f32::consts::FRAC_1_SQRT_2, 0.0, 0.0, std::f32::consts::FRAC_1_SQRT_2],
        }
    }

    fn descriptor(index: u32, path: &str) -> DeviceDescriptor {
        let (product, class, flags) = match index {
            0 => (
                "Vive HMD".to_string(),
                DeviceClass::Hmd,
                DeviceFlags::POSITIONAL_TRACKING | DeviceFlags::ROTATIONAL_TRACKING,
            ),
            1 => (
                "Vive Controller (left)".to_string(),
                DeviceClass::Controller,
                DeviceFlags::POSITIONAL_TRACKING
                    | DeviceFlags::ROTATIONAL_TRACKING
                    | DeviceFlags::LEFT_CONTROLLER,
            ),
            _ => (
                "Vive Controller (right)".to_string(),
                DeviceClass::Controller,
                DeviceFlags::POSITIONAL_TRACKING
                    | DeviceFlags::ROTATIONAL_TRACKING
                    | DeviceFlags::RIGHT_CONTROLLER,
            ),
        };
        DeviceDescriptor {
            id: 0,
            driver: DRIVER_NAME.to_string(),
            vendor: "HTC/Valve".to_string(),
            product,
            revision: 0,
            path: path.to_string(),
            class,
            flags,
            device_index: index,
        }
    }

    fn tag_for(index: u32) -> Result<&'static str> {
        match index {
            0 => Ok(HMD_TAG),
            1 => Ok(LEFT_CONTROLLER_TAG),
            2 => Ok(RIGHT_CONTROLLER_TAG),
            other => Err(VrHalError::invalid_param(format!(
                "lighthouse device index {} out of range",
                other
            ))),
        }
    }

    /// Measured screen and lens constants plus the universal distortion and
    /// aberration coefficients, with per-eye frusta derived from the lens
    /// geometry.
    fn hmd_properties() -> DeviceProperties {
        let mut props = DeviceProperties {
            hsize: 0.122_822,
            vsize: 0.068_234,
            hres: 2160,
            vres: 1200,
            lens_sep: 0.056,
            lens_vpos: 0.032,
            fov: 0.0,
            ratio: (2160.0 / 1200.0) / 2.0,
            ipd: 0.061,
            universal_distortion_k: [1.318_397, -1.490_242, 0.663_824, 0.508_021],
            universal_aberration_k: [1.000_101_5, 1.0, 1.000_196_1],
            proj_left: math::MAT4_IDENTITY,
            proj_right: math::MAT4_IDENTITY,
            controls: Vec::new(),
        };
        props.calc_proj_matrices_from_lens(EYE_TO_SCREEN);
        props
    }

    /// Best-effort HID link to the headset for the power-on/off reports.
    /// Tracking does not depend on this link, so failures only log.
    fn open_hid(path: &str) -> Option<HidTransport> {
        let api = match hid::create_hid_api() {
            Ok(api) => api,
            Err(e) => {
                log::warn!("HID API unavailable: {}", e);
                return None;
            }
        };
        let cpath = match std::ffi::CString::new(path) {
            Ok(p) => p,
            Err(_) => return None,
        };
        match api.open_path(&cpath) {
            Ok(device) => Some(HidTransport::new(device)),
            Err(e) => {
                log::warn!("could not open headset HID at {:?}: {}", path, e);
                None
            }
        }
    }

    fn acquire_context(&mut self, options: &OpenOptions) -> Arc<AcquisitionContext> {
        match self.shared.upgrade() {
            Some(ctx) if ctx.state() != EngineState::Stopping && ctx.state() != EngineState::Stopped => ctx,
            _ => {
                log::info!("starting shared lighthouse acquisition");
                let ctx = AcquisitionContext::start(
                    (self.factory)(),
                    Self::frame_correction(),
                    &[HMD_TAG, LEFT_CONTROLLER_TAG, RIGHT_CONTROLLER_TAG],
                    options.auto_update,
                );
                self.shared = Arc::downgrade(&ctx);
                ctx
            }
        }
    }
}

impl Driver for LighthouseDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn enumerate(&mut self) -> Vec<DeviceDescriptor> {
        let api = match hid::create_hid_api() {
            Ok(api) => api,
            Err(e) => {
                log::warn!("HID enumeration unavailable: {}", e);
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for info in api.device_list().filter(|d| hid::is_lighthouse_hmd(d)) {
            let path = info.path().to_str().unwrap_or("").to_string();
            // One physical headset fans out to three logical devices.
            for index in 0..3 {
                out.push(Self::descriptor(index, &path));
            }
        }
        out
    }

    fn open(
        &mut self,
        desc: &DeviceDescriptor,
        options: &OpenOptions,
    ) -> Result<Box<dyn TrackedDevice>> {
        let tag = Self::tag_for(desc.device_index)?;
        let ctx = self.acquire_context(options);
        let cell = ctx.cell(tag).ok_or_else(|| {
            VrHalError::DeviceUnavailable(format!("no pose cell for tag {:?}", tag))
        })?;
        ctx.bind();

        // Only the HMD owns the power-control HID link.
        let hid = if desc.device_index == 0 {
            let transport = Self::open_hid(&desc.path);
            if let Some(t) = &transport {
                if let Err(e) = t.power_on() {
                    log::warn!("headset power-on report failed: {}", e);
                }
                if let Err(e) = t.enable_lighthouse() {
                    log::warn!("lighthouse-enable report failed: {}", e);
                }
            }
            transport
        } else {
            None
        };

        let props = match desc.class {
            DeviceClass::Hmd => Self::hmd_properties(),
            DeviceClass::Controller => DeviceProperties::default(),
        };

        Ok(Box::new(LighthouseDevice {
            ctx,
            cell,
            props,
            class: desc.class,
            vendor: desc.vendor.clone(),
            product: desc.product.clone(),
            hid,
            closed: false,
        }))
    }
}

struct LighthouseDevice {
    ctx: Arc<AcquisitionContext>,
    cell: Arc<PoseCell>,
    props: DeviceProperties,
    class: DeviceClass,
    vendor: String,
    product: String,
    hid: Option<HidTransport>,
    closed: bool,
}

impl LighthouseDevice {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(VrHalError::AlreadyClosed);
        }
        Ok(())
    }
}

impl TrackedDevice for LighthouseDevice {
    fn get_float(&self, prop: FloatProperty) -> Result<Vec<f32>> {
        self.ensure_open()?;
        get_common_float(&self.props, self.cell.read(), prop)
    }

    fn set_float(&mut self, prop: FloatProperty, value: &[f32]) -> Result<()> {
        self.ensure_open()?;
        if set_common_float(&mut self.props, prop, value)? {
            self.props.calc_proj_matrices_from_lens(EYE_TO_SCREEN);
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
        self.ensure_open()?;
        self.ctx.pump()
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;

        if let Some(hid) = &self.hid {
            if let Err(e) = hid.power_off() {
                log::warn!("headset power-off report failed: {}", e);
            }
        }

        // Last device out joins the polling thread before returning.
        self.ctx.release();
        Ok(())
    }
}
