#![deny(clippy::unwrap_used)]
//! Encoding, decoding and playback of drone show trajectories.
//!
//! A trajectory is a compact byte string of per-axis Bezier segments. The
//! [`TrajectoryBuilder`] writes it, a [`TrajectoryPlayer`] evaluates positions,
//! velocities and accelerations at arbitrary times, and the [`stats`] pass
//! derives bounding boxes as well as takeoff and landing times.

pub mod error;
pub mod math;
pub mod poly;
pub mod stats;
pub mod trajectory;

pub use error::{Result, TrajectoryError};
pub use stats::{StatsCalculator, StatsComponents, StatsConfig, TrajectoryStats};
pub use trajectory::{
    builder::{TrajectoryBuilder, MAX_SEGMENT_DURATION_MSEC},
    player::{PlayerState, TrajectoryPlayer},
    segment::{AxisFormat, Segment},
    Trajectory, TrajectoryBuffer,
};
