//! Statistics of a trajectory, computed in a single pass over its segments.

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::{Result, TrajectoryError},
    math::{BoundingBox, Vec4},
    trajectory::{player::PlayerState, segment::Segment, Trajectory},
};

/// Which statistics a [`StatsCalculator`] computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsComponents(u8);

impl StatsComponents {
    pub const NONE: Self = Self(0);
    pub const DURATION: Self = Self(1);
    pub const BOUNDING_BOX: Self = Self(2);
    pub const TAKEOFF_TIME: Self = Self(4);
    pub const LANDING_TIME: Self = Self(8);
    pub const START_END_DISTANCE: Self = Self(16);
    pub const ALL: Self = Self(31);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for StatsComponents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for StatsComponents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Default for StatsComponents {
    fn default() -> Self {
        Self::ALL
    }
}

/// Parameters of the takeoff and landing proposals. Distances are in
/// trajectory units, times in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// vertical speed of the takeoff manoeuvre
    pub takeoff_speed: f32,
    /// vertical acceleration of the takeoff manoeuvre, `None` for infinite
    pub acceleration: Option<f32>,
    /// altitude the trajectory must gain before it counts as airborne
    pub min_ascent: f32,
    /// final descent left to the automatic landing
    pub preferred_descent: f32,
    /// horizontal drift under which a descending segment is still vertical
    pub max_vertical_xy_deviation: f32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            takeoff_speed: 1000.,
            acceleration: None,
            min_ascent: 2500.,
            preferred_descent: 2500.,
            max_vertical_xy_deviation: 20.,
        }
    }
}

impl StatsConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.takeoff_speed.is_finite() && self.takeoff_speed > 0.) {
            return Err(TrajectoryError::InvalidArgument(
                "takeoff speed must be positive and finite",
            ));
        }
        if let Some(acceleration) = self.acceleration {
            // infinity is accepted and means the same as None
            if acceleration.is_nan() || acceleration <= 0. {
                return Err(TrajectoryError::InvalidArgument(
                    "acceleration must be positive",
                ));
            }
        }
        for value in [
            self.min_ascent,
            self.preferred_descent,
            self.max_vertical_xy_deviation,
        ] {
            if !(value.is_finite() && value >= 0.) {
                return Err(TrajectoryError::InvalidArgument(
                    "distances must be finite and non-negative",
                ));
            }
        }
        Ok(())
    }

    /// Time needed to climb `distance` with a trapezoidal speed profile that
    /// starts and ends at rest: accelerate to `takeoff_speed`, cruise, then
    /// brake at the same rate. Short climbs never reach full speed.
    pub fn travel_time_sec(&self, distance: f32) -> f32 {
        let speed = self.takeoff_speed;
        match self.acceleration {
            Some(acceleration) if acceleration.is_finite() => {
                let acc_time = speed / acceleration;
                let acc_distance = speed * acc_time / 2.;
                if 2. * acc_distance > distance {
                    // never reaches full speed
                    2. * (distance / acceleration).sqrt()
                } else {
                    2. * acc_time + (distance - 2. * acc_distance) / speed
                }
            }
            _ => distance / speed,
        }
    }
}

/// Result of a statistics pass. Fields whose component was not requested
/// keep their default value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryStats {
    pub components: StatsComponents,
    pub duration_msec: u32,
    pub duration_sec: f32,
    pub bounding_box: BoundingBox,
    /// infinite when the trajectory never climbs the minimum ascent
    pub takeoff_time_sec: f32,
    pub landing_time_sec: f32,
    pub position_at_landing: Vec4,
    pub start_to_end_distance_xy: f32,
}

impl TrajectoryStats {
    fn new(components: StatsComponents) -> Self {
        Self {
            components,
            duration_msec: 0,
            duration_sec: 0.,
            bounding_box: BoundingBox::empty(),
            takeoff_time_sec: f32::INFINITY,
            landing_time_sec: 0.,
            position_at_landing: Vec4::zero(),
            start_to_end_distance_xy: 0.,
        }
    }
}

fn is_vertical(segment: &Segment, max_xy_deviation: f32) -> bool {
    let delta = segment.end() - segment.start();
    delta.x.abs() <= max_xy_deviation && delta.y.abs() <= max_xy_deviation && delta.z <= 0.
}

#[derive(Debug, Clone, Default)]
pub struct StatsCalculator {
    pub components: StatsComponents,
    pub config: StatsConfig,
}

impl StatsCalculator {
    pub fn new(components: StatsComponents, config: StatsConfig) -> Self {
        Self { components, config }
    }

    pub fn with_components(components: StatsComponents) -> Self {
        Self::new(components, StatsConfig::default())
    }

    pub fn run(&self, trajectory: &Trajectory) -> Result<TrajectoryStats> {
        self.config.validate()?;

        let components = self.components;
        let wants_bbox = components.contains(StatsComponents::BOUNDING_BOX);
        let wants_takeoff = components.contains(StatsComponents::TAKEOFF_TIME);
        let wants_landing = components.contains(StatsComponents::LANDING_TIME);

        let mut stats = TrajectoryStats::new(components);
        let start = trajectory.get_start_position();
        if wants_bbox {
            stats.bounding_box = BoundingBox::from_point(start);
        }

        let takeoff_altitude = start.z + self.config.min_ascent;
        let mut takeoff_time = None;
        // cursor at the first segment of the trailing vertical run
        let mut vertical_run: Option<PlayerState> = None;

        let mut state = PlayerState::new(trajectory)?;
        while !state.segment().is_terminal() {
            let segment = state.segment_mut();

            if wants_bbox {
                let poly = segment.get_poly()?;
                let bbox = &mut stats.bounding_box;
                bbox.x.union(&poly.x.get_extrema()?);
                bbox.y.union(&poly.y.get_extrema()?);
                bbox.z.union(&poly.z.get_extrema()?);
            }

            if wants_takeoff && takeoff_time.is_none() {
                if let Some(rel_t) = segment.get_poly()?.z.touches(takeoff_altitude)? {
                    takeoff_time = Some(segment.start_time_sec() + rel_t * segment.duration_sec());
                }
            }

            if wants_landing {
                if !is_vertical(segment, self.config.max_vertical_xy_deviation) {
                    vertical_run = None;
                } else if vertical_run.is_none() {
                    vertical_run = Some(state);
                }
            }

            state.build_next_segment(trajectory)?;
        }

        let end = state.segment().start();
        stats.duration_msec = state.segment().start_time_msec();
        stats.duration_sec = stats.duration_msec as f32 / 1000.;

        if let Some(time) = takeoff_time {
            stats.takeoff_time_sec = time - self.config.travel_time_sec(self.config.min_ascent);
        }

        if wants_landing {
            stats.landing_time_sec =
                self.landing_time_sec(trajectory, vertical_run, end.z, stats.duration_sec)?;
            let rel_t = state.seek_to_time(trajectory, stats.landing_time_sec)?;
            stats.position_at_landing = state.segment_mut().get_poly()?.eval(rel_t);
        }

        if components.contains(StatsComponents::START_END_DISTANCE) {
            stats.start_to_end_distance_xy = start.distance_xy(&end);
        }

        debug!(
            "stats pass done: {} ms, takeoff at {} s, landing at {} s",
            stats.duration_msec, stats.takeoff_time_sec, stats.landing_time_sec
        );
        Ok(stats)
    }

    /// Replays the trailing vertical run and returns the moment at which
    /// only `preferred_descent` of it is left.
    fn landing_time_sec(
        &self,
        trajectory: &Trajectory,
        vertical_run: Option<PlayerState>,
        end_altitude: f32,
        duration_sec: f32,
    ) -> Result<f32> {
        let Some(mut state) = vertical_run else {
            return Ok(duration_sec);
        };
        let target = end_altitude + self.config.preferred_descent;
        let run_start_sec = state.segment().start_time_sec();

        // last segment of the run still starting above the target
        let mut crossing: Option<Segment> = None;
        while !state.segment().is_terminal() {
            if state.segment().start().z >= target {
                crossing = Some(*state.segment());
            }
            state.build_next_segment(trajectory)?;
        }

        let Some(mut segment) = crossing else {
            return Ok(run_start_sec);
        };
        let rel_t = segment.get_poly()?.z.touches(target)?.unwrap_or(0.);
        Ok(segment.start_time_sec() + rel_t * segment.duration_sec())
    }
}
