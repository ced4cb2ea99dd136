//! Lens-distortion correction model.
//!
//! Pure functions mapping output-pixel UV coordinates to per-color-channel
//! source sample coordinates, using the PanoTools-style radial polynomial and
//! a per-channel chromatic aberration scale. Stateless and callable from any
//! thread.
//!
//! All distances are in physical display units (meters). `warp_scale`
//! normalizes radial distance so the largest circle inscribed around the lens
//! center has radius 1.

/// Distortion coefficients that collapse the radial polynomial to 1.
pub const DISTORTION_OFF_K: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Aberration scales that disable chromatic correction.
pub const ABERRATION_OFF_K: [f32; 3] = [1.0, 1.0, 1.0];

/// Per-channel source sample coordinates for one output pixel.
///
/// Values are raw and unclamped: a coordinate outside `[0,1]x[0,1]` means the
/// presentation layer must render black for that pixel rather than clamp or
/// wrap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelUv {
    pub red: [f32; 2],
    pub green: [f32; 2],
    pub blue: [f32; 2],
}

impl ChannelUv {
    /// True when every channel samples inside the source texture.
    pub fn in_bounds(&self) -> bool {
        [self.red, self.green, self.blue]
            .iter()
            .all(|uv| (0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1]))
    }
}

/// Per-eye lens placement derived from the display geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensGeometry {
    pub left_lens_center: [f32; 2],
    pub right_lens_center: [f32; 2],
    pub warp_scale: f32,
}

impl LensGeometry {
    /// Derive lens centers and warp scale from the viewport half-width (one
    /// eye's share of the screen), the lens separation, and the vertical lens
    /// position.
    ///
    /// Calibration is assumed referenced to whichever screen edge is farther
    /// from its lens center, hence the max() for the warp scale.
    pub fn derive(viewport_half_width: f32, lens_separation: f32, lens_vpos: f32) -> LensGeometry {
        let left = [viewport_half_width - lens_separation / 2.0, lens_vpos];
        let right = [lens_separation / 2.0, lens_vpos];
        LensGeometry {
            left_lens_center: left,
            right_lens_center: right,
            warp_scale: left[0].max(right[0]),
        }
    }
}

/// Independent switches for the two correction stages.
///
/// The radial polynomial and the chromatic aberration scale are separate
/// corrections; turning one off must not silently drag the other along. A
/// true identity remap requires both off.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionToggles {
    pub distortion: bool,
    pub aberration: bool,
}

impl Default for CorrectionToggles {
    fn default() -> Self {
        CorrectionToggles {
            distortion: true,
            aberration: true,
        }
    }
}

impl CorrectionToggles {
    /// Effective coefficients given the device's calibrated values.
    pub fn effective(
        &self,
        distortion_k: [f32; 4],
        aberration_k: [f32; 3],
    ) -> ([f32; 4], [f32; 3]) {
        (
            if self.distortion { distortion_k } else { DISTORTION_OFF_K },
            if self.aberration { aberration_k } else { ABERRATION_OFF_K },
        )
    }
}

/// Map one output-pixel UV to the per-channel source sample coordinates.
///
/// `u`/`v` are in `[0,1]` over one eye's viewport, `viewport_scale` is that
/// viewport's physical size, `lens_center` the eye's lens center, and
/// `distortion_k` the radial polynomial coefficients in legacy order
/// (`k3 + k2*r + k1*r^2 + k0*r^3`).
pub fn compute_sample(
    u: f32,
    v: f32,
    viewport_scale: [f32; 2],
    lens_center: [f32; 2],
    warp_scale: f32,
    distortion_k: [f32; 4],
    aberration_k: [f32; 3],
) -> ChannelUv {
    // Fragment location in lens-centered coordinates at world scale,
    // normalized so the inscribed circle has radius 1.
    let r = [
        (u * viewport_scale[0] - lens_center[0]) / warp_scale,
        (v * viewport_scale[1] - lens_center[1]) / warp_scale,
    ];

    let r_mag = (r[0] * r[0] + r[1] * r[1]).sqrt();
    let poly = distortion_k[3]
        + distortion_k[2] * r_mag
        + distortion_k[1] * r_mag * r_mag
        + distortion_k[0] * r_mag * r_mag * r_mag;

    // Displaced source offset, back at world scale.
    let r_displaced = [r[0] * poly * warp_scale, r[1] * poly * warp_scale];

    let channel = |scale: f32| {
        [
            (lens_center[0] + scale * r_displaced[0]) / viewport_scale[0],
            (lens_center[1] + scale * r_displaced[1]) / viewport_scale[1],
        ]
    };

    ChannelUv {
        red: channel(aberration_k[0]),
        green: channel(aberration_k[1]),
        blue: channel(aberration_k[2]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIVE_K: [f32; 4] = [1.318_397, -1.490_242, 0.663_824, 0.508_021];
    const VIVE_AB: [f32; 3] = [1.000_101_5, 1.0, 1.000_196_1];

    #[test]
    fn test_deterministic() {
        let a = compute_sample(0.37, 0.81, [0.0624, 0.0702], [0.0304, 0.0468], 0.032, VIVE_K, VIVE_AB);
        let b = compute_sample(0.37, 0.81, [0.0624, 0.0702], [0.0304, 0.0468], 0.032, VIVE_K, VIVE_AB);
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_remap_with_corrections_off() {
        // Calibration constructed so the lens-center/viewport transform is
        // itself the identity: unit viewport, lens center at the origin,
        // warp scale 1. With both corrections off every channel must return
        // (u, v) exactly.
        for &(u, v) in &[(0.0, 0.0), (0.25, 0.75), (0.5, 0.5), (1.0, 1.0)] {
            let out = compute_sample(u, v, [1.0, 1.0], [0.0, 0.0], 1.0, DISTORTION_OFF_K, ABERRATION_OFF_K);
            assert_eq!(out.red, [u, v]);
            assert_eq!(out.green, [u, v]);
            assert_eq!(out.blue, [u, v]);
        }
    }

    #[test]
    fn test_lens_geometry_reference_values() {
        let geom = LensGeometry::derive(0.1248 / 2.0, 0.064, 0.0468);
        assert!((geom.left_lens_center[0] - 0.0304).abs() < 1e-6);
        assert!((geom.left_lens_center[1] - 0.0468).abs() < 1e-6);
        assert!((geom.right_lens_center[0] - 0.032).abs() < 1e-6);
        assert!((geom.right_lens_center[1] - 0.0468).abs() < 1e-6);
        assert!((geom.warp_scale - 0.032).abs() < 1e-6);
    }

    #[test]
    fn test_warp_scale_is_max_lens_center_x() {
        let half_width = 0.0624;
        for sep in [0.01f32, 0.03, 0.055, 0.0623] {
            let geom = LensGeometry::derive(half_width, sep, 0.04);
            let expected = geom.left_lens_center[0].max(geom.right_lens_center[0]);
            assert_eq!(geom.warp_scale, expected);
            assert!(geom.warp_scale > 0.0);
        }
    }

    #[test]
    fn test_out_of_range_is_observable() {
        // Strong pincushion coefficients push corner samples outside the
        // source texture; the raw values must come back unclamped.
        let geom = LensGeometry::derive(0.0624, 0.064, 0.0468);
        let out = compute_sample(
            1.0,
            1.0,
            [0.0624, 0.0702],
            geom.left_lens_center,
            geom.warp_scale,
            VIVE_K,
            VIVE_AB,
        );
        assert!(!out.in_bounds());
        assert!(out.green[0] > 1.0 || out.green[1] > 1.0);
    }

    #[test]
    fn test_aberration_spreads_channels() {
        let out = compute_sample(
            0.9,
            0.1,
            [0.0624, 0.0702],
            [0.0304, 0.0468],
            0.032,
            DISTORTION_OFF_K,
            [0.98, 1.0, 1.02],
        );
        assert_ne!(out.red, out.green);
        assert_ne!(out.green, out.blue);
    }

    #[test]
    fn test_toggles_select_coefficients() {
        let toggles = CorrectionToggles {
            distortion: false,
            aberration: true,
        };
        let (k, ab) = toggles.effective(VIVE_K, VIVE_AB);
        assert_eq!(k, DISTORTION_OFF_K);
        assert_eq!(ab, VIVE_AB);

        let both_off = CorrectionToggles {
            distortion: false,
            aberration: false,
        };
        let (k, ab) = both_off.effective(VIVE_K, VIVE_AB);
        assert_eq!(k, DISTORTION_OFF_K);
        assert_eq!(ab, ABERRATION_OFF_K);
    }
}
