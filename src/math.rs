//! Quaternion and 4x4-matrix helpers on plain arrays.
//!
//! Quaternions are `[x, y, z, w]`. Matrices are `[f32; 16]` column-major,
//! matching the OpenGL convention the projection/modelview properties use.

pub const QUAT_IDENTITY: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

pub const MAT4_IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Hamilton product `a * b` in xyzw order.
pub fn quat_mul(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    [
        a[3] * b[0] + a[0] * b[3] + a[1] * b[2] - a[2] * b[1],
        a[3] * b[1] - a[0] * b[2] + a[1] * b[3] + a[2] * b[0],
        a[3] * b[2] + a[0] * b[1] - a[1] * b[0] + a[2] * b[3],
        a[3] * b[3] - a[0] * b[0] - a[1] * b[1] - a[2] * b[2],
    ]
}

pub fn quat_conjugate(q: [f32; 4]) -> [f32; 4] {
    [-q[0], -q[1], -q[2], q[3]]
}

pub fn quat_normalize(q: [f32; 4]) -> [f32; 4] {
    let mag = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if mag <= f32::EPSILON {
        return QUAT_IDENTITY;
    }
    [q[0] / mag, q[1] / mag, q[2] / mag, q[3] / mag]
}

/// Rotate vector `v` by unit quaternion `q` (v' = q v q*).
pub fn quat_rotate(q: [f32; 4], v: [f32; 3]) -> [f32; 3] {
    // t = 2 * (q.xyz x v); v' = v + q.w * t + q.xyz x t
    let t = [
        2.0 * (q[1] * v[2] - q[2] * v[1]),
        2.0 * (q[2] * v[0] - q[0] * v[2]),
        2.0 * (q[0] * v[1] - q[1] * v[0]),
    ];
    [
        v[0] + q[3] * t[0] + q[1] * t[2] - q[2] * t[1],
        v[1] + q[3] * t[1] + q[2] * t[0] - q[0] * t[2],
        v[2] + q[3] * t[2] + q[0] * t[1] - q[1] * t[0],
    ]
}

/// Build a unit quaternion from an axis and an angle in degrees.
pub fn quat_from_axis_angle(axis: [f32; 3], degrees: f32) -> [f32; 4] {
    let mag = (axis[0] * axis[0] + axis[1] * axis[1] + axis[2] * axis[2]).sqrt();
    if mag <= f32::EPSILON {
        return QUAT_IDENTITY;
    }
    let half = degrees.to_radians() / 2.0;
    let s = half.sin() / mag;
    [axis[0] * s, axis[1] * s, axis[2] * s, half.cos()]
}

/// Rotation matrix from a unit quaternion, column-major.
pub fn quat_to_mat4(q: [f32; 4]) -> [f32; 16] {
    let (x, y, z, w) = (q[0], q[1], q[2], q[3]);
    [
        1.0 - 2.0 * (y * y + z * z),
        2.0 * (x * y + z * w),
        2.0 * (x * z - y * w),
        0.0,
        2.0 * (x * y - z * w),
        1.0 - 2.0 * (x * x + z * z),
        2.0 * (y * z + x * w),
        0.0,
        2.0 * (x * z + y * w),
        2.0 * (y * z - x * w),
        1.0 - 2.0 * (x * x + y * y),
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
    ]
}

pub fn mat4_mul(a: [f32; 16], b: [f32; 16]) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            let mut acc = 0.0;
            for k in 0..4 {
                acc += a[k * 4 + row] * b[col * 4 + k];
            }
            out[col * 4 + row] = acc;
        }
    }
    out
}

pub fn mat4_translation(v: [f32; 3]) -> [f32; 16] {
    let mut m = MAT4_IDENTITY;
    m[12] = v[0];
    m[13] = v[1];
    m[14] = v[2];
    m
}

/// Off-center perspective frustum, column-major (glFrustum semantics).
pub fn mat4_frustum(l: f32, r: f32, b: f32, t: f32, n: f32, f: f32) -> [f32; 16] {
    [
        2.0 * n / (r - l),
        0.0,
        0.0,
        0.0,
        0.0,
        2.0 * n / (t - b),
        0.0,
        0.0,
        (r + l) / (r - l),
        (t + b) / (t - b),
        -(f + n) / (f - n),
        -1.0,
        0.0,
        0.0,
        -2.0 * f * n / (f - n),
        0.0,
    ]
}

/// Symmetric perspective projection, column-major.
pub fn mat4_perspective(fovy_rad: f32, aspect: f32, near: f32, far: f32) -> [f32; 16] {
    let half_h = near * (fovy_rad / 2.0).tan();
    let half_w = half_h * aspect;
    mat4_frustum(-half_w, half_w, -half_h, half_h, near, far)
}

/// World-to-view matrix for a tracked pose (inverse rotation, then inverse
/// translation).
pub fn view_matrix(position: [f32; 3], orientation: [f32; 4]) -> [f32; 16] {
    let rot = quat_to_mat4(quat_conjugate(orientation));
    let trans = mat4_translation([-position[0], -position[1], -position[2]]);
    mat4_mul(rot, trans)
}
