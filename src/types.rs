use crate::math;

/// Position plus orientation of one tracked object at one instant.
///
/// Orientation is a unit quaternion in `[x, y, z, w]` order. The default pose
/// is the origin with the identity orientation, which is also what bound
/// devices report while their tracking subsystem is still coming up (or has
/// failed to come up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Position in meters.
    pub position: [f32; 3],
    /// Orientation quaternion `[x, y, z, w]`.
    pub orientation: [f32; 4],
}

impl Default for Pose {
    fn default() -> Self {
        Pose {
            position: [0.0; 3],
            orientation: math::QUAT_IDENTITY,
        }
    }
}

/// Category of a logical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Hmd,
    Controller,
}

bitflags::bitflags! {
    /// Capability and identity flags carried by a device descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFlags: u32 {
        const POSITIONAL_TRACKING = 1 << 0;
        const ROTATIONAL_TRACKING = 1 << 1;
        const LEFT_CONTROLLER     = 1 << 2;
        const RIGHT_CONTROLLER    = 1 << 3;
        /// Synthetic device with no hardware behind it.
        const NULL_DEVICE         = 1 << 4;
    }
}

/// Semantic hint for one input control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlHint {
    Generic,
    Trigger,
    Squeeze,
    Menu,
    Home,
    AnalogX,
    AnalogY,
    ButtonA,
    ButtonB,
}

/// Whether a control reports a continuous value or an on/off state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlType {
    Digital,
    Analog,
}

/// One entry of a device's control/input descriptor.
#[derive(Debug, Clone, Copy)]
pub struct Control {
    pub hint: ControlHint,
    pub kind: ControlType,
}

/// Static per-device display, optics, and input geometry.
///
/// Set once when a device is opened; the only consumer-writable values are
/// `ipd` and `lens_sep` (calibration nudges through the property protocol).
#[derive(Debug, Clone)]
pub struct DeviceProperties {
    /// Horizontal screen size in meters.
    pub hsize: f32,
    /// Vertical screen size in meters.
    pub vsize: f32,
    /// Horizontal resolution in pixels.
    pub hres: i32,
    /// Vertical resolution in pixels.
    pub vres: i32,
    /// Horizontal lens separation in meters.
    pub lens_sep: f32,
    /// Vertical lens position in meters, from the bottom screen edge.
    pub lens_vpos: f32,
    /// Field of view in radians.
    pub fov: f32,
    /// Per-eye aspect ratio.
    pub ratio: f32,
    /// Interpupillary distance in meters.
    pub ipd: f32,
    /// Universal radial distortion coefficients (PanoTools model).
    pub universal_distortion_k: [f32; 4],
    /// Per-channel chromatic aberration scale.
    pub universal_aberration_k: [f32; 3],
    /// Left-eye projection matrix, column-major.
    pub proj_left: [f32; 16],
    /// Right-eye projection matrix, column-major.
    pub proj_right: [f32; 16],
    /// Input control descriptor.
    pub controls: Vec<Control>,
}

const DEFAULT_NEAR: f32 = 0.1;
const DEFAULT_FAR: f32 = 1000.0;

impl Default for DeviceProperties {
    /// Rift DK1-like defaults, matching what the simulator driver reports.
    fn default() -> Self {
        let mut props = DeviceProperties {
            hsize: 0.149_760,
            vsize: 0.093_600,
            hres: 1280,
            vres: 800,
            lens_sep: 0.063_500,
            lens_vpos: 0.046_800,
            fov: 125.5144f32.to_radians(),
            ratio: (1280.0 / 800.0) / 2.0,
            ipd: 0.061,
            universal_distortion_k: [0.0, 0.0, 0.0, 1.0],
            universal_aberration_k: [1.0, 1.0, 1.0],
            proj_left: math::MAT4_IDENTITY,
            proj_right: math::MAT4_IDENTITY,
            controls: Vec::new(),
        };
        props.calc_default_proj_matrices();
        props
    }
}

impl DeviceProperties {
    /// Symmetric per-eye projections derived from `fov` and `ratio`.
    pub fn calc_default_proj_matrices(&mut self) {
        let proj = math::mat4_perspective(self.fov, self.ratio, DEFAULT_NEAR, DEFAULT_FAR);
        self.proj_left = proj;
        self.proj_right = proj;
    }

    /// Off-center per-eye frusta derived from the physical lens geometry.
    ///
    /// Eye separation is handled by the IPD term of the modelview matrices,
    /// so each frustum spans from its screen half's outer edge to the lens
    /// separation midline.
    pub fn calc_proj_matrices_from_lens(&mut self, eye_to_screen: f32) {
        let n = eye_to_screen;
        let f = n * 10e6;
        let t = self.vsize - self.lens_vpos;
        let b = -self.lens_vpos;

        let outer = self.hsize / 2.0 - self.lens_sep / 2.0;
        let inner = self.lens_sep / 2.0;
        self.proj_left = math::mat4_frustum(-outer, inner, b, t, n, f);
        self.proj_right = math::mat4_frustum(-inner, outer, b, t, n, f);

        self.fov = 2.0 * outer.atan2(eye_to_screen);
    }
}
