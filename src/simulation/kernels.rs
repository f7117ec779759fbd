//! 2D SPH smoothing kernels.
//!
//! All kernels take the distance `dst` and the radius `radius` and vanish for `dst >= radius`.

use std::f32::consts::PI;

/// Distances below this are clamped before dividing by them.
pub const MIN_DISTANCE: f32 = 1.0e-4;

/// Interaction radius of a particle pair: the mean of both influence radii.
#[inline]
pub fn pair_radius(radius_a: f32, radius_b: f32) -> f32 {
    0.5 * (radius_a + radius_b)
}

/// Spiky kernel used for density: `6 / (pi r^4) * (r - d)^2`.
#[inline]
pub fn smooth_liquid(dst: f32, radius: f32) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let diff = radius - dst;
    6.0 / (PI * radius.powi(4)) * diff * diff
}

/// Sharper kernel used for near density: `10 / (pi r^5) * (r - d)^3`.
#[inline]
pub fn smooth_liquid_near(dst: f32, radius: f32) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let diff = radius - dst;
    10.0 / (PI * radius.powi(5)) * diff * diff * diff
}

/// Derivative of [`smooth_liquid`] with respect to the distance (non-positive).
#[inline]
pub fn smooth_liquid_derivative(dst: f32, radius: f32) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    -12.0 / (PI * radius.powi(4)) * (radius - dst)
}

/// Derivative of [`smooth_liquid_near`] with respect to the distance (non-positive).
#[inline]
pub fn smooth_liquid_near_derivative(dst: f32, radius: f32) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let diff = radius - dst;
    -30.0 / (PI * radius.powi(5)) * diff * diff
}

/// Viscosity kernel: `4 / (pi r^8) * (r^2 - d^2)^3`.
#[inline]
pub fn smooth_viscosity_laplacian(dst: f32, radius: f32) -> f32 {
    if dst >= radius {
        return 0.0;
    }
    let diff = radius * radius - dst * dst;
    4.0 / (PI * radius.powi(8)) * diff * diff * diff
}
