pub mod bbox;
pub mod vec;

pub use bbox::*;
pub use vec::*;

/// Brings an angle in degrees into [0, 360).
pub fn normalize_yaw(degrees: f32) -> f32 {
    let yaw = degrees.rem_euclid(360.);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if yaw >= 360. {
        0.
    } else {
        yaw
    }
}
