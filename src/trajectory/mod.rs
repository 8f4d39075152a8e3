//! Encoded trajectories.
//!
//! A trajectory is a 9-byte header followed by a sequence of segments (see
//! [`segment`]). Header layout:
//!
//! | byte | content |
//! |---|---|
//! | 0 | bit 7: yaw enabled, bits 0-6: scale |
//! | 1-2, 3-4, 5-6 | start x, y, z as little-endian i16, times scale |
//! | 7-8 | start yaw, little-endian i16 tenths of a degree |
//!
//! There is no end marker: the trajectory holds its last point forever once
//! the bytes run out.

pub mod builder;
pub mod player;
pub mod segment;

use tracing::debug;

use self::{
    builder::TrajectoryBuilder,
    player::PlayerState,
    segment::{
        bezier_subdivide_left, decode_value, encode_value, read_i16, write_i16, write_u16,
        AxisFormat, NUM_AXES,
    },
};
use crate::{
    error::{Result, TrajectoryError},
    math::{BoundingBox, Vec4},
    stats::{StatsCalculator, StatsComponents, StatsConfig, TrajectoryStats},
};

pub const HEADER_LENGTH: usize = 9;
pub const MAX_SCALE: u8 = 127;
const YAW_ENABLED_BIT: u8 = 0x80;

pub(crate) fn encode_header(scale: u8, use_yaw: bool, start: Vec4) -> Result<[u8; HEADER_LENGTH]> {
    let mut header = [0u8; HEADER_LENGTH];
    header[0] = (scale & !YAW_ENABLED_BIT) | if use_yaw { YAW_ENABLED_BIT } else { 0 };
    for axis in 0..NUM_AXES {
        write_i16(&mut header, 1 + 2 * axis, encode_value(axis, start[axis], scale)?);
    }
    Ok(header)
}

/// Parses a header into (scale, yaw enabled, start position).
fn decode_header(bytes: &[u8]) -> Result<(u8, bool, Vec4)> {
    if bytes.len() < HEADER_LENGTH {
        return Err(TrajectoryError::Parse("trajectory header is truncated"));
    }
    let scale = bytes[0] & !YAW_ENABLED_BIT;
    if scale == 0 {
        return Err(TrajectoryError::Parse("trajectory scale is zero"));
    }
    let mut start = Vec4::zero();
    for axis in 0..NUM_AXES {
        start[axis] = decode_value(axis, read_i16(bytes, 1 + 2 * axis)?, scale);
    }
    Ok((scale, bytes[0] & YAW_ENABLED_BIT != 0, start))
}

/// Bytes of a trajectory, either borrowed from the caller or owned.
#[derive(Debug, Clone)]
pub enum TrajectoryBuffer<'a> {
    View(&'a [u8]),
    Owned(Vec<u8>),
}

impl<'a> TrajectoryBuffer<'a> {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::View(bytes) => bytes,
            Self::Owned(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }

    /// Copies a borrowed view into an owned allocation. No-op when already
    /// owned.
    pub fn make_owned(&mut self) -> Result<()> {
        if let Self::View(bytes) = self {
            let mut owned = Vec::new();
            owned.try_reserve(bytes.len())?;
            owned.extend_from_slice(bytes);
            *self = Self::Owned(owned);
        }
        Ok(())
    }

    /// # Panics
    ///
    /// Panics on a view; promote it with [`Self::make_owned`] first.
    fn owned_mut(&mut self) -> &mut Vec<u8> {
        match self {
            Self::Owned(bytes) => bytes,
            Self::View(_) => {
                panic!("cannot mutate a borrowed trajectory buffer, call make_owned() first")
            }
        }
    }

    pub fn into_vec(self) -> Vec<u8> {
        match self {
            Self::View(bytes) => bytes.to_vec(),
            Self::Owned(bytes) => bytes,
        }
    }
}

/// An encoded trajectory together with its parsed header.
///
/// Trajectories are shared between players through `Arc<Trajectory>`; the
/// buffer is freed when the last handle drops.
#[derive(Debug, Clone)]
pub struct Trajectory<'a> {
    buffer: TrajectoryBuffer<'a>,
    scale: u8,
    use_yaw: bool,
    start: Vec4,
    header_length: usize,
}

impl Default for Trajectory<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a> Trajectory<'a> {
    /// A trajectory without header or segments that stays at the origin.
    pub fn empty() -> Self {
        Self {
            buffer: TrajectoryBuffer::Owned(Vec::new()),
            scale: 1,
            use_yaw: false,
            start: Vec4::zero(),
            header_length: 0,
        }
    }

    fn from_buffer(buffer: TrajectoryBuffer<'a>) -> Result<Self> {
        if buffer.is_empty() {
            return Ok(Self {
                buffer,
                ..Self::empty()
            });
        }
        let (scale, use_yaw, start) = decode_header(buffer.as_slice())?;
        Ok(Self {
            buffer,
            scale,
            use_yaw,
            start,
            header_length: HEADER_LENGTH,
        })
    }

    /// Reads a trajectory in place, without copying `bytes`.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        Self::from_buffer(TrajectoryBuffer::View(bytes))
    }

    pub fn from_vec(bytes: Vec<u8>) -> Result<Trajectory<'static>> {
        Trajectory::from_buffer(TrajectoryBuffer::Owned(bytes))
    }

    /// Copies the bytes of a borrowed trajectory so it can be modified.
    pub fn make_owned(&mut self) -> Result<()> {
        self.buffer.make_owned()
    }

    pub fn is_owned(&self) -> bool {
        self.buffer.is_owned()
    }

    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.into_vec()
    }

    pub fn get_scale(&self) -> u8 {
        self.scale
    }

    pub fn is_yaw_enabled(&self) -> bool {
        self.use_yaw
    }

    pub fn get_header_length(&self) -> usize {
        self.header_length
    }

    pub fn get_start_position(&self) -> Vec4 {
        self.start
    }

    /// cursor on the terminal hold
    fn end_state(&self) -> Result<PlayerState> {
        let mut state = PlayerState::new(self)?;
        while !state.segment().is_terminal() {
            state.build_next_segment(self)?;
        }
        Ok(state)
    }

    pub fn get_end_position(&self) -> Result<Vec4> {
        Ok(self.end_state()?.segment().start())
    }

    pub fn get_total_duration_msec(&self) -> Result<u32> {
        Ok(self.end_state()?.segment().start_time_msec())
    }

    pub fn get_total_duration_sec(&self) -> Result<f32> {
        Ok(self.get_total_duration_msec()? as f32 / 1000.)
    }

    /// Smallest box containing every point the trajectory passes through.
    pub fn get_axis_aligned_bounding_box(&self) -> Result<BoundingBox> {
        let stats = StatsCalculator::with_components(StatsComponents::BOUNDING_BOX).run(self)?;
        Ok(stats.bounding_box)
    }

    /// Time at which a takeoff command should be issued so that a drone
    /// climbing `min_ascent` at `speed` (with the given acceleration, `None`
    /// meaning instantaneous) joins the trajectory when it first reaches that
    /// altitude. Infinite when the trajectory never climbs that high.
    pub fn propose_takeoff_time_sec(
        &self,
        min_ascent: f32,
        speed: f32,
        acceleration: Option<f32>,
    ) -> Result<f32> {
        let config = StatsConfig {
            min_ascent,
            takeoff_speed: speed,
            acceleration,
            ..StatsConfig::default()
        };
        let stats =
            StatsCalculator::new(StatsComponents::TAKEOFF_TIME, config).run(self)?;
        Ok(stats.takeoff_time_sec)
    }

    /// Time at which an automatic landing should take over: at most
    /// `preferred_descent` above the end of the final vertical descent.
    pub fn propose_landing_time_sec(
        &self,
        preferred_descent: f32,
        max_xy_deviation: f32,
    ) -> Result<f32> {
        let config = StatsConfig {
            preferred_descent,
            max_vertical_xy_deviation: max_xy_deviation,
            ..StatsConfig::default()
        };
        let stats =
            StatsCalculator::new(StatsComponents::LANDING_TIME, config).run(self)?;
        Ok(stats.landing_time_sec)
    }

    /// Truncates the trajectory at `t` seconds. A segment containing `t` is
    /// shortened in place so that the trajectory keeps following the same
    /// curve up to `t` and then holds. Times past the end leave it untouched.
    ///
    /// # Panics
    ///
    /// Panics if the trajectory borrows its bytes; see [`Self::make_owned`].
    pub fn cut_at(&mut self, t: f32) -> Result<()> {
        if t.is_nan() {
            return Err(TrajectoryError::InvalidArgument("cut time must not be NaN"));
        }
        assert!(
            self.buffer.is_owned(),
            "cannot cut a borrowed trajectory, call make_owned() first"
        );

        let t_msec = (t.max(0.) * 1000.).round();
        let mut state = PlayerState::new(self)?;
        loop {
            let segment = state.segment();
            if segment.is_terminal() {
                return Ok(());
            }
            if t_msec <= segment.start_time_msec() as f32 {
                let offset = segment.offset();
                self.buffer.owned_mut().truncate(offset);
                return Ok(());
            }
            if t_msec < segment.end_time_msec() as f32 {
                break;
            }
            state.build_next_segment(self)?;
        }

        let segment = *state.segment();
        // strictly inside the segment, so it fits the u16 duration
        let new_duration_msec = t_msec as u32 - segment.start_time_msec();
        let rel_t = new_duration_msec as f32 / segment.duration_msec() as f32;
        let scale = self.scale;
        let bytes = self.buffer.owned_mut();
        for axis in 0..NUM_AXES {
            if segment.format(axis) == AxisFormat::Constant {
                continue;
            }
            let control_points = segment.control_points(axis);
            let mut points = [0f32; 8];
            let points = &mut points[..control_points.len()];
            points.copy_from_slice(control_points);
            bezier_subdivide_left(points, rel_t);

            let mut cursor = segment.stored_points_offset(axis);
            for &point in &points[1..] {
                write_i16(bytes, cursor, encode_value(axis, point, scale)?);
                cursor += 2;
            }
        }
        write_u16(bytes, segment.offset() + 1, new_duration_msec as u16);
        bytes.truncate(segment.offset() + segment.len());
        debug!(
            "cut segment at offset {} from {} ms to {} ms",
            segment.offset(),
            segment.duration_msec(),
            new_duration_msec
        );
        Ok(())
    }

    /// Replaces everything after the proposed landing time of `stats` with a
    /// vertical descent to the starting altitude at `landing_velocity`
    /// (distance units per second).
    ///
    /// # Panics
    ///
    /// Panics if the trajectory borrows its bytes, like [`Self::cut_at`].
    pub fn replace_end_to_land(
        &mut self,
        stats: &TrajectoryStats,
        landing_velocity: f32,
    ) -> Result<()> {
        if self.is_empty() {
            return Err(TrajectoryError::NotFound);
        }
        if !stats.components.contains(StatsComponents::LANDING_TIME) {
            return Err(TrajectoryError::InvalidArgument(
                "statistics do not include the landing time",
            ));
        }
        if !(landing_velocity > 0. && landing_velocity.is_finite()) {
            return Err(TrajectoryError::InvalidArgument(
                "landing velocity must be positive and finite",
            ));
        }

        self.cut_at(stats.landing_time_sec)?;

        let mut builder = TrajectoryBuilder::from_trajectory(self)?;
        let from = builder.get_last_position();
        let descent = from.z - self.start.z;
        if descent > 0. {
            let duration_msec = (descent / landing_velocity * 1000.).round();
            if duration_msec > u32::MAX as f32 {
                return Err(TrajectoryError::Overflow("landing takes too long"));
            }
            let target = Vec4 {
                z: self.start.z,
                ..from
            };
            builder.append_line(target, duration_msec as u32)?;
        }
        self.update_from_builder(&mut builder)
    }

    /// Takes over the segments encoded by `builder`, leaving it empty.
    pub fn update_from_builder(&mut self, builder: &mut TrajectoryBuilder) -> Result<()> {
        *self = Trajectory::from_vec(builder.take_buffer()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::player::TrajectoryPlayer;
    use std::sync::Arc;

    fn assert_vec_close(a: Vec4, b: Vec4, eps: f32) {
        let diff = a - b;
        assert!(
            diff.x.abs() < eps && diff.y.abs() < eps && diff.z.abs() < eps && diff.yaw.abs() < eps,
            "{a:?} != {b:?} (eps = {eps})"
        );
    }

    fn curve_trajectory() -> Trajectory<'static> {
        let mut builder = TrajectoryBuilder::new(1, true).expect("valid scale");
        builder
            .append_line(Vec4::new(0., 0., 3000., 0.), 3000)
            .expect("line fits");
        builder
            .append_cubic_bezier(
                Vec4::new(2000., 0., 3000., 0.),
                Vec4::new(4000., 2000., 3000., 45.),
                Vec4::new(4000., 4000., 3000., 90.),
                4000,
            )
            .expect("curve fits");
        builder.hold_position_for(1000).expect("hold fits");
        builder.finalize().expect("finalize")
    }

    #[test]
    fn parses_header() {
        let bytes = [0x85, 2, 0, 0xfe, 0xff, 10, 0, 0x84, 0x03];
        let trajectory = Trajectory::from_bytes(&bytes).expect("valid header");
        assert_eq!(trajectory.get_scale(), 5);
        assert!(trajectory.is_yaw_enabled());
        assert!(!trajectory.is_owned());
        assert_eq!(trajectory.get_header_length(), HEADER_LENGTH);
        assert_eq!(trajectory.get_start_position(), Vec4::new(10., -10., 50., 90.));
        assert_eq!(trajectory.get_total_duration_msec().expect("duration"), 0);
        assert_eq!(
            trajectory.get_end_position().expect("end"),
            trajectory.get_start_position()
        );
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(
            Trajectory::from_bytes(&[1, 0, 0]),
            Err(TrajectoryError::Parse(_))
        ));
        assert!(matches!(
            Trajectory::from_bytes(&[0x80, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(TrajectoryError::Parse(_))
        ));
        let empty = Trajectory::from_bytes(&[]).expect("empty is fine");
        assert!(empty.is_empty());
        assert_eq!(empty.get_header_length(), 0);
    }

    #[test]
    fn view_promotion() {
        let owned = curve_trajectory();
        let bytes = owned.as_bytes().to_vec();
        let mut view = Trajectory::from_bytes(&bytes).expect("valid trajectory");
        assert!(!view.is_owned());
        view.make_owned().expect("enough memory");
        assert!(view.is_owned());
        view.cut_at(1.).expect("cut");
        assert_eq!(view.get_total_duration_msec().expect("duration"), 1000);
        assert_eq!(bytes, owned.as_bytes());
    }

    #[test]
    #[should_panic(expected = "make_owned")]
    fn cutting_a_view_panics() {
        let bytes = curve_trajectory().into_bytes();
        let mut view = Trajectory::from_bytes(&bytes).expect("valid trajectory");
        let _ = view.cut_at(1.);
    }

    #[test]
    #[should_panic(expected = "make_owned")]
    fn landing_on_a_view_panics() {
        let bytes = curve_trajectory().into_bytes();
        let mut view = Trajectory::from_bytes(&bytes).expect("valid trajectory");
        let stats = StatsCalculator::default().run(&view).expect("stats");
        let _ = view.replace_end_to_land(&stats, 500.);
    }

    #[test]
    fn cut_on_boundary_truncates() {
        let mut trajectory = curve_trajectory();
        let original_len = trajectory.as_bytes().len();
        trajectory.cut_at(3.).expect("cut");
        assert_eq!(trajectory.get_total_duration_msec().expect("duration"), 3000);
        assert_eq!(trajectory.as_bytes().len(), HEADER_LENGTH + 5);
        assert!(trajectory.as_bytes().len() < original_len);
        assert_eq!(
            trajectory.get_end_position().expect("end"),
            Vec4::new(0., 0., 3000., 0.)
        );
    }

    #[test]
    fn cut_inside_a_curve_follows_it() {
        let reference = Arc::new(curve_trajectory());
        let mut player = TrajectoryPlayer::new(Arc::clone(&reference)).expect("player");
        let expected = player.get_position_at(5.).expect("position");

        let mut trajectory = curve_trajectory();
        trajectory.cut_at(5.).expect("cut");
        assert_eq!(trajectory.get_total_duration_msec().expect("duration"), 5000);
        assert_vec_close(trajectory.get_end_position().expect("end"), expected, 1.);

        let mut cut_player = TrajectoryPlayer::new(Arc::new(trajectory)).expect("player");
        for t in [3.5, 4., 4.5] {
            assert_vec_close(
                cut_player.get_position_at(t).expect("position"),
                player.get_position_at(t).expect("position"),
                1.,
            );
        }
    }

    #[test]
    fn cut_clamps_time() {
        let mut trajectory = curve_trajectory();
        trajectory.cut_at(100.).expect("cut");
        assert_eq!(trajectory.get_total_duration_msec().expect("duration"), 8000);
        trajectory.cut_at(-2.).expect("cut");
        assert_eq!(trajectory.get_total_duration_msec().expect("duration"), 0);
        assert_eq!(trajectory.as_bytes().len(), HEADER_LENGTH);
        assert!(matches!(
            trajectory.cut_at(f32::NAN),
            Err(TrajectoryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn clear_empties() {
        let mut trajectory = curve_trajectory();
        trajectory.clear();
        assert!(trajectory.is_empty());
        assert_eq!(trajectory.get_total_duration_msec().expect("duration"), 0);
        assert_eq!(trajectory.get_end_position().expect("end"), Vec4::zero());
    }

    #[test]
    fn bounding_box_covers_curve() {
        let bbox = curve_trajectory()
            .get_axis_aligned_bounding_box()
            .expect("bounding box");
        assert_eq!(bbox.x.min, 0.);
        assert!((bbox.x.max - 4000.).abs() < 1e-2);
        assert!((bbox.y.max - 4000.).abs() < 1e-2);
        assert_eq!(bbox.z.min, 0.);
        assert_eq!(bbox.z.max, 3000.);
    }

    #[test]
    fn replace_end_to_land_descends_vertically() {
        let mut builder = TrajectoryBuilder::new(1, false).expect("valid scale");
        builder
            .append_line(Vec4::new(0., 0., 10000., 0.), 10000)
            .expect("line fits");
        builder
            .append_line(Vec4::new(5000., 0., 10000., 0.), 5000)
            .expect("line fits");
        builder
            .append_line(Vec4::new(5000., 0., 2000., 0.), 8000)
            .expect("line fits");
        let mut trajectory = builder.finalize().expect("finalize");

        let stats = StatsCalculator::with_components(StatsComponents::LANDING_TIME)
            .run(&trajectory)
            .expect("stats");
        // descent of 8000 at 1000/s, the last 2500 are left to the landing
        assert!((stats.landing_time_sec - 20.5).abs() < 1e-3);

        trajectory
            .replace_end_to_land(&stats, 500.)
            .expect("replace end");
        assert_eq!(
            trajectory.get_end_position().expect("end"),
            Vec4::new(5000., 0., 0., 0.)
        );
        // 20.5 s, then 4500 down at 500/s
        assert_eq!(trajectory.get_total_duration_msec().expect("duration"), 29500);
    }

    #[test]
    fn replace_end_needs_landing_time() {
        let mut trajectory = curve_trajectory();
        let stats = StatsCalculator::with_components(StatsComponents::DURATION)
            .run(&trajectory)
            .expect("stats");
        assert!(matches!(
            trajectory.replace_end_to_land(&stats, 500.),
            Err(TrajectoryError::InvalidArgument(_))
        ));
        assert!(matches!(
            Trajectory::empty().replace_end_to_land(&stats, 500.),
            Err(TrajectoryError::NotFound)
        ));
    }
}
