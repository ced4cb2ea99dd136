//! Polymorphic device contract and the typed property protocol.
//!
//! Every device variant (hardware-backed, library-backed, or synthetic)
//! implements [`TrackedDevice`]. Property keys are open enumerations; a key a
//! device does not support yields [`VrHalError::InvalidParameter`], never a
//! panic.

use crate::error::VrHalError;
use crate::math;
use crate::types::{ControlHint, ControlType, DeviceClass, DeviceProperties, Pose};
use crate::Result;

/// Float-vector valued property keys.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatProperty {
    /// Orientation quaternion `[x, y, z, w]`.
    RotationQuat,
    /// Position vector `[x, y, z]` in meters.
    PositionVector,
    /// Legacy 6-value device distortion coefficients.
    DistortionK,
    /// Universal radial distortion coefficients (4 values).
    UniversalDistortionK,
    /// Universal chromatic aberration scale (3 values).
    UniversalAberrationK,
    ScreenHorizontalSize,
    ScreenVerticalSize,
    LensHorizontalSeparation,
    LensVerticalPosition,
    /// Column-major 4x4, GL convention.
    LeftEyeGlProjection,
    RightEyeGlProjection,
    LeftEyeGlModelview,
    RightEyeGlModelview,
    EyeIpd,
    /// Current state of all controls, one value per control.
    ControlsState,
}

/// Integer-vector valued property keys.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntProperty {
    ScreenHorizontalResolution,
    ScreenVerticalResolution,
    DeviceClass,
    ControlCount,
    /// Semantic hint per control, as stable integer codes.
    ControlsHints,
    /// Analog/digital type per control.
    ControlsTypes,
}

/// String valued property keys.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringProperty {
    Vendor,
    Product,
}

/// The per-device operation set.
///
/// Safe to call from the consumer thread at arbitrary times; pose reads
/// coordinate with the acquisition engine only through the pose cell lock.
/// After [`close`](TrackedDevice::close) succeeds, every operation returns
/// [`VrHalError::AlreadyClosed`].
pub trait TrackedDevice: Send {
    fn get_float(&self, prop: FloatProperty) -> Result<Vec<f32>>;

    /// Calibration adjustments. Only `EyeIpd` and `LensHorizontalSeparation`
    /// are writable; read-only keys are rejected with `InvalidParameter`.
    fn set_float(&mut self, prop: FloatProperty, value: &[f32]) -> Result<()>;

    fn get_int(&self, prop: IntProperty) -> Result<Vec<i32>>;

    fn set_int(&mut self, prop: IntProperty, value: &[i32]) -> Result<()>;

    fn get_string(&self, prop: StringProperty) -> Result<String>;

    /// Per-frame maintenance hook. A no-op for self-polling drivers; with
    /// `auto_update` disabled the consumer must call this at 10 Hz or more to
    /// pump the tracking subsystem.
    fn update(&mut self) -> Result<()>;

    /// Stop and detach from any background acquisition, tearing it down if
    /// this was the last bound device. A second close returns
    /// `AlreadyClosed`.
    fn close(&mut self) -> Result<()>;
}

fn hint_code(hint: ControlHint) -> i32 {
    match hint {
        ControlHint::Generic => 0,
        ControlHint::Trigger => 1,
        ControlHint::Squeeze => 2,
        ControlHint::Menu => 3,
        ControlHint::Home => 4,
        ControlHint::AnalogX => 5,
        ControlHint::AnalogY => 6,
        ControlHint::ButtonA => 7,
        ControlHint::ButtonB => 8,
    }
}

/// Properties every device answers the same way, given its static geometry
/// and its latest pose. Driver implementations delegate here after handling
/// their specific keys.
pub(crate) fn get_common_float(
    props: &DeviceProperties,
    pose: Pose,
    prop: FloatProperty,
) -> Result<Vec<f32>> {
    match prop {
        FloatProperty::RotationQuat => Ok(pose.orientation.to_vec()),
        FloatProperty::PositionVector => Ok(pose.position.to_vec()),
        // No legacy per-device coefficients; report the no-distortion value.
        FloatProperty::DistortionK => Ok(vec![0.0; 6]),
        FloatProperty::UniversalDistortionK => Ok(props.universal_distortion_k.to_vec()),
        FloatProperty::UniversalAberrationK => Ok(props.universal_aberration_k.to_vec()),
        FloatProperty::ScreenHorizontalSize => Ok(vec![props.hsize]),
        FloatProperty::ScreenVerticalSize => Ok(vec![props.vsize]),
        FloatProperty::LensHorizontalSeparation => Ok(vec![props.lens_sep]),
        FloatProperty::LensVerticalPosition => Ok(vec![props.lens_vpos]),
        FloatProperty::EyeIpd => Ok(vec![props.ipd]),
        FloatProperty::LeftEyeGlProjection => Ok(props.proj_left.to_vec()),
        FloatProperty::RightEyeGlProjection => Ok(props.proj_right.to_vec()),
        FloatProperty::LeftEyeGlModelview => Ok(eye_view(props, pose, 1.0).to_vec()),
        FloatProperty::RightEyeGlModelview => Ok(eye_view(props, pose, -1.0).to_vec()),
        other => Err(VrHalError::invalid_param(format!(
            "unsupported float property {:?}",
            other
        ))),
    }
}

fn eye_view(props: &DeviceProperties, pose: Pose, side: f32) -> [f32; 16] {
    let center = math::view_matrix(pose.position, pose.orientation);
    math::mat4_mul(math::mat4_translation([side * props.ipd / 2.0, 0.0, 0.0]), center)
}

/// Writable calibration keys. Returns `true` when the lens separation changed
/// so the caller can re-derive its projection matrices.
pub(crate) fn set_common_float(
    props: &mut DeviceProperties,
    prop: FloatProperty,
    value: &[f32],
) -> Result<bool> {
    match prop {
        FloatProperty::EyeIpd => {
            let [ipd] = expect_arity::<1>(prop, value)?;
            props.ipd = ipd;
            Ok(false)
        }
        FloatProperty::LensHorizontalSeparation => {
            let [sep] = expect_arity::<1>(prop, value)?;
            props.lens_sep = sep;
            Ok(true)
        }
        other => Err(VrHalError::invalid_param(format!(
            "read-only or unsupported float property {:?}",
            other
        ))),
    }
}

fn expect_arity<const N: usize>(prop: FloatProperty, value: &[f32]) -> Result<[f32; N]> {
    value.try_into().map_err(|_| {
        VrHalError::invalid_param(format!(
            "property {:?} takes {} value(s), got {}",
            prop,
            N,
            value.len()
        ))
    })
}

pub(crate) fn get_common_int(
    props: &DeviceProperties,
    class: DeviceClass,
    prop: IntProperty,
) -> Result<Vec<i32>> {
    match prop {
        IntProperty::ScreenHorizontalResolution => Ok(vec![props.hres]),
        IntProperty::ScreenVerticalResolution => Ok(vec![props.vres]),
        IntProperty::DeviceClass => Ok(vec![match class {
            DeviceClass::Hmd => 0,
            DeviceClass::Controller => 1,
        }]),
        IntProperty::ControlCount => Ok(vec![props.controls.len() as i32]),
        IntProperty::ControlsHints => {
            Ok(props.controls.iter().map(|c| hint_code(c.hint)).collect())
        }
        IntProperty::ControlsTypes => Ok(props
            .controls
            .iter()
            .map(|c| match c.kind {
                ControlType::Digital => 0,
                ControlType::Analog => 1,
            })
            .collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Control;

    #[test]
    fn test_common_float_pose_keys() {
        let props = DeviceProperties::default();
        let pose = Pose {
            position: [1.0, 2.0, 3.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
        };
        assert_eq!(
            get_common_float(&props, pose, FloatProperty::PositionVector).unwrap(),
            vec![1.0, 2.0, 3.0]
        );
        assert_eq!(
            get_common_float(&props, pose, FloatProperty::RotationQuat).unwrap(),
            vec![0.0, 0.0, 0.0, 1.0]
        );
        assert_eq!(
            get_common_float(&props, pose, FloatProperty::DistortionK).unwrap().len(),
            6
        );
    }

    #[test]
    fn test_controls_state_is_driver_specific() {
        let props = DeviceProperties::default();
        let err = get_common_float(&props, Pose::default(), FloatProperty::ControlsState)
            .unwrap_err();
        assert!(matches!(err, VrHalError::InvalidParameter(_)));
    }

    #[test]
    fn test_set_float_rejects_read_only_keys() {
        let mut props = DeviceProperties::default();
        let before = props.clone();
        let err = set_common_float(&mut props, FloatProperty::RotationQuat, &[0.0; 4]).unwrap_err();
        assert!(matches!(err, VrHalError::InvalidParameter(_)));
        assert_eq!(props.ipd, before.ipd);
        assert_eq!(props.lens_sep, before.lens_sep);
    }

    #[test]
    fn test_set_float_arity_checked() {
        let mut props = DeviceProperties::default();
        assert!(set_common_float(&mut props, FloatProperty::EyeIpd, &[]).is_err());
        assert!(set_common_float(&mut props, FloatProperty::EyeIpd, &[0.064]).is_ok());
        assert_eq!(props.ipd, 0.064);
    }

    #[test]
    fn test_lens_separation_write_requests_recalc() {
        let mut props = DeviceProperties::default();
        let recalc = set_common_float(&mut props, FloatProperty::LensHorizontalSeparation, &[0.058])
            .unwrap();
        assert!(recalc);
        assert_eq!(props.lens_sep, 0.058);
    }

    #[test]
    fn test_common_int_controls() {
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
        assert_eq!(
            get_common_int(&props, DeviceClass::Controller, IntProperty::ControlCount).unwrap(),
            vec![2]
        );
        assert_eq!(
            get_common_int(&props, DeviceClass::Controller, IntProperty::ControlsTypes).unwrap(),
            vec![1, 0]
        );
        assert_eq!(
            get_common_int(&props, DeviceClass::Hmd, IntProperty::DeviceClass).unwrap(),
            vec![0]
        );
    }
}
