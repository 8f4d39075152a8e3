//! Incremental trajectory encoder.
//!
//! The builder always holds a well-formed trajectory: a header followed by
//! complete segments. Each append encodes one or more segments starting at
//! the last appended point.
//!
//! ```
//! use showtraj::{math::Vec4, TrajectoryBuilder};
//!
//! let mut builder = TrajectoryBuilder::new(10, true).unwrap();
//! builder.append_line(Vec4::new(0., 0., 5000., 0.), 5000).unwrap();
//! builder.hold_position_for(2000).unwrap();
//! builder
//!     .append_cubic_bezier(
//!         Vec4::new(1000., 0., 5000., 0.),
//!         Vec4::new(2000., 1000., 5000., 0.),
//!         Vec4::new(2000., 2000., 5000., 90.),
//!         4000,
//!     )
//!     .unwrap();
//!
//! let trajectory = builder.finalize().unwrap();
//! assert_eq!(trajectory.get_total_duration_msec().unwrap(), 11000);
//! ```

use tracing::debug;

use super::{
    encode_header,
    segment::{
        decode_value, encode_value, formats_to_byte, AxisFormat, NUM_AXES, SEGMENT_PREFIX_LENGTH,
        YAW_AXIS,
    },
    Trajectory, HEADER_LENGTH, MAX_SCALE,
};
use crate::{
    error::{Result, TrajectoryError},
    math::Vec4,
    poly::MAX_POLY_DEGREE,
};

/// Longest segment the builder writes. Longer lines are split.
pub const MAX_SEGMENT_DURATION_MSEC: u32 = 60_000;

pub struct TrajectoryBuilder {
    buffer: Vec<u8>,
    scale: u8,
    use_yaw: bool,
    last_position: Vec4,
    /// encoded form of `last_position`, what compaction compares against
    last_encoded: [i16; NUM_AXES],
}

impl TrajectoryBuilder {
    /// An empty builder starting at the origin. `scale` is the number of
    /// distance units per encoded integer and must be in 1..=127.
    pub fn new(scale: u8, use_yaw: bool) -> Result<Self> {
        if scale == 0 || scale > MAX_SCALE {
            return Err(TrajectoryError::InvalidArgument(
                "scale must be between 1 and 127",
            ));
        }
        let mut builder = Self {
            buffer: Vec::new(),
            scale,
            use_yaw,
            last_position: Vec4::zero(),
            last_encoded: [0; NUM_AXES],
        };
        builder.reset(Vec4::zero())?;
        Ok(builder)
    }

    /// Continues an existing trajectory: its segments are copied and its end
    /// point becomes the starting point of the next append.
    pub fn from_trajectory(trajectory: &Trajectory) -> Result<Self> {
        if trajectory.is_empty() {
            return Err(TrajectoryError::NotFound);
        }
        let bytes = trajectory.as_bytes();
        let mut buffer = Vec::new();
        buffer.try_reserve(bytes.len())?;
        buffer.extend_from_slice(bytes);

        let mut builder = Self {
            buffer,
            scale: trajectory.get_scale(),
            use_yaw: trajectory.is_yaw_enabled(),
            last_position: Vec4::zero(),
            last_encoded: [0; NUM_AXES],
        };
        builder.set_last_position(trajectory.get_end_position()?)?;
        Ok(builder)
    }

    pub fn get_scale(&self) -> u8 {
        self.scale
    }

    pub fn is_yaw_enabled(&self) -> bool {
        self.use_yaw
    }

    pub fn get_last_position(&self) -> Vec4 {
        self.last_position
    }

    pub fn has_segments(&self) -> bool {
        self.buffer.len() > HEADER_LENGTH
    }

    /// Moves the start of the trajectory. Only allowed before the first
    /// segment is appended.
    pub fn set_start_position(&mut self, start: Vec4) -> Result<()> {
        if self.has_segments() {
            return Err(TrajectoryError::InvalidArgument(
                "start position cannot change once segments were appended",
            ));
        }
        self.reset(start)
    }

    /// Straight line from the last position to `target`.
    pub fn append_line(&mut self, target: Vec4, duration_msec: u32) -> Result<()> {
        // fail before any split half is written
        self.encode_point(target)?;
        self.append_line_split(target, duration_msec)
    }

    fn append_line_split(&mut self, target: Vec4, duration_msec: u32) -> Result<()> {
        if duration_msec <= MAX_SEGMENT_DURATION_MSEC {
            return self.append_segment(&[target], duration_msec);
        }

        let first_half = duration_msec / 2;
        let midpoint = self.last_position.midpoint(&target);
        debug!(
            "splitting {} ms line at {:?} ({} ms + {} ms)",
            duration_msec,
            midpoint,
            first_half,
            duration_msec - first_half
        );
        self.append_line_split(midpoint, first_half)?;
        self.append_line_split(target, duration_msec - first_half)
    }

    /// Cubic Bezier curve from the last position through control points `c1`
    /// and `c2` to `target`. Unlike lines, curves longer than
    /// [`MAX_SEGMENT_DURATION_MSEC`] are not split but rejected.
    pub fn append_cubic_bezier(
        &mut self,
        c1: Vec4,
        c2: Vec4,
        target: Vec4,
        duration_msec: u32,
    ) -> Result<()> {
        self.append_segment(&[c1, c2, target], duration_msec)
    }

    /// Appends a single segment whose Bezier control points, the last position
    /// excluded, are `points`: one point for a line, three for a cubic curve
    /// or seven for a 7th-degree curve.
    pub fn append_segment(&mut self, points: &[Vec4], duration_msec: u32) -> Result<()> {
        let format = AxisFormat::for_stored_points(points.len()).ok_or(
            TrajectoryError::InvalidArgument("a segment needs 1, 3 or 7 control points"),
        )?;
        if duration_msec > MAX_SEGMENT_DURATION_MSEC {
            return Err(TrajectoryError::Overflow(
                "segment duration exceeds the 60 s limit",
            ));
        }

        let n = points.len();
        let mut encoded = [[0i16; MAX_POLY_DEGREE]; NUM_AXES];
        let mut formats = [AxisFormat::Constant; NUM_AXES];
        for axis in 0..NUM_AXES {
            if axis == YAW_AXIS && !self.use_yaw {
                continue;
            }
            for (k, point) in points.iter().enumerate() {
                encoded[axis][k] = encode_value(axis, point[axis], self.scale)?;
            }
            if encoded[axis][..n]
                .iter()
                .any(|&value| value != self.last_encoded[axis])
            {
                formats[axis] = format;
            }
        }

        let num_values: usize = formats.iter().map(|f| f.num_stored_points()).sum();
        self.buffer.try_reserve(SEGMENT_PREFIX_LENGTH + 2 * num_values)?;
        self.buffer.push(formats_to_byte(&formats));
        // duration_msec <= 60000 fits a u16
        self.buffer
            .extend_from_slice(&(duration_msec as u16).to_le_bytes());
        for (axis, format) in formats.iter().enumerate() {
            let count = format.num_stored_points();
            for value in &encoded[axis][..count] {
                self.buffer.extend_from_slice(&value.to_le_bytes());
            }
            if count > 0 {
                self.last_encoded[axis] = encoded[axis][count - 1];
                self.last_position[axis] =
                    decode_value(axis, self.last_encoded[axis], self.scale);
            }
        }
        Ok(())
    }

    /// Stays at the last position for `duration_msec`, in chunks of at most
    /// [`MAX_SEGMENT_DURATION_MSEC`].
    pub fn hold_position_for(&mut self, duration_msec: u32) -> Result<()> {
        let mut remaining = duration_msec;
        while remaining > 0 {
            let chunk = remaining.min(MAX_SEGMENT_DURATION_MSEC);
            self.append_segment(&[self.last_position], chunk)?;
            remaining -= chunk;
        }
        Ok(())
    }

    /// Hands the encoded trajectory over and leaves the builder empty,
    /// starting from the former last position.
    pub fn finalize(&mut self) -> Result<Trajectory<'static>> {
        let buffer = self.take_buffer()?;
        Trajectory::from_vec(buffer)
    }

    pub(crate) fn take_buffer(&mut self) -> Result<Vec<u8>> {
        let buffer = std::mem::take(&mut self.buffer);
        self.reset(self.last_position)?;
        Ok(buffer)
    }

    fn reset(&mut self, start: Vec4) -> Result<()> {
        let header = encode_header(self.scale, self.use_yaw, start)?;
        self.buffer.clear();
        self.buffer.try_reserve(HEADER_LENGTH)?;
        self.buffer.extend_from_slice(&header);
        self.set_last_position(start)
    }

    fn set_last_position(&mut self, position: Vec4) -> Result<()> {
        self.last_encoded = self.encode_point(position)?;
        for axis in 0..NUM_AXES {
            self.last_position[axis] = decode_value(axis, self.last_encoded[axis], self.scale);
        }
        Ok(())
    }

    fn encode_point(&self, point: Vec4) -> Result<[i16; NUM_AXES]> {
        let mut encoded = [0; NUM_AXES];
        for (axis, value) in encoded.iter_mut().enumerate() {
            *value = encode_value(axis, point[axis], self.scale)?;
        }
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::segment::{formats_from_byte, read_u16};

    #[test]
    fn rejects_invalid_scales() {
        assert!(matches!(
            TrajectoryBuilder::new(0, false),
            Err(TrajectoryError::InvalidArgument(_))
        ));
        assert!(matches!(
            TrajectoryBuilder::new(128, false),
            Err(TrajectoryError::InvalidArgument(_))
        ));
        assert!(TrajectoryBuilder::new(127, false).is_ok());
    }

    #[test]
    fn header_only_when_fresh() {
        let mut builder = TrajectoryBuilder::new(2, true).expect("valid scale");
        builder
            .set_start_position(Vec4::new(100., -200., 300., 45.))
            .expect("no segments yet");
        let trajectory = builder.finalize().expect("finalize");
        assert_eq!(
            trajectory.as_bytes(),
            &[0x82, 50, 0, 0x9c, 0xff, 150, 0, 0xc2, 0x01]
        );
    }

    #[test]
    fn compacts_unchanged_axes() {
        let mut builder = TrajectoryBuilder::new(1, true).expect("valid scale");
        builder
            .append_line(Vec4::new(0., 0., 0., 90.), 1000)
            .expect("line fits");
        let bytes = builder.finalize().expect("finalize").into_bytes();
        let segment = &bytes[HEADER_LENGTH..];
        assert_eq!(segment.len(), SEGMENT_PREFIX_LENGTH + 2);
        assert_eq!(
            formats_from_byte(segment[0]),
            [
                AxisFormat::Constant,
                AxisFormat::Constant,
                AxisFormat::Constant,
                AxisFormat::Linear
            ]
        );
        assert_eq!(read_u16(segment, 1).expect("duration"), 1000);
        assert_eq!(&segment[3..], &900i16.to_le_bytes());
    }

    #[test]
    fn yaw_is_ignored_when_disabled() {
        let mut builder = TrajectoryBuilder::new(1, false).expect("valid scale");
        builder
            .append_line(Vec4::new(10., 0., 0., 90.), 1000)
            .expect("line fits");
        assert_eq!(builder.get_last_position(), Vec4::new(10., 0., 0., 0.));
        let bytes = builder.finalize().expect("finalize").into_bytes();
        assert_eq!(formats_from_byte(bytes[HEADER_LENGTH])[YAW_AXIS], AxisFormat::Constant);
    }

    #[test]
    fn long_lines_are_split() {
        let mut builder = TrajectoryBuilder::new(1, false).expect("valid scale");
        builder
            .append_line(Vec4::new(15000., 0., 0., 0.), 150_000)
            .expect("line fits");
        let trajectory = builder.finalize().expect("finalize");
        assert_eq!(trajectory.get_total_duration_msec().expect("duration"), 150_000);
        // 150 s -> 75 + 75 -> 37.5 * 4
        let expected_segments = 4;
        assert_eq!(
            trajectory.as_bytes().len(),
            HEADER_LENGTH + expected_segments * (SEGMENT_PREFIX_LENGTH + 2)
        );
        assert_eq!(
            trajectory.get_end_position().expect("end"),
            Vec4::new(15000., 0., 0., 0.)
        );
    }

    #[test]
    fn long_curves_are_rejected() {
        let mut builder = TrajectoryBuilder::new(1, false).expect("valid scale");
        let result = builder.append_cubic_bezier(
            Vec4::new(1., 0., 0., 0.),
            Vec4::new(2., 0., 0., 0.),
            Vec4::new(3., 0., 0., 0.),
            60_001,
        );
        assert!(matches!(result, Err(TrajectoryError::Overflow(_))));
        assert!(!builder.has_segments());
    }

    #[test]
    fn out_of_range_target_leaves_builder_untouched() {
        let mut builder = TrajectoryBuilder::new(1, false).expect("valid scale");
        let result = builder.append_line(Vec4::new(1e6, 0., 0., 0.), 200_000);
        assert!(matches!(result, Err(TrajectoryError::Overflow(_))));
        assert!(!builder.has_segments());
        assert!(matches!(
            builder.append_line(Vec4::new(f32::NAN, 0., 0., 0.), 1000),
            Err(TrajectoryError::InvalidArgument(_))
        ));
    }

    #[test]
    fn hold_is_chunked() {
        let mut builder = TrajectoryBuilder::new(1, false).expect("valid scale");
        builder.hold_position_for(130_000).expect("hold fits");
        builder.hold_position_for(0).expect("empty hold");
        let trajectory = builder.finalize().expect("finalize");
        assert_eq!(trajectory.get_total_duration_msec().expect("duration"), 130_000);
        assert_eq!(
            trajectory.as_bytes().len(),
            HEADER_LENGTH + 3 * SEGMENT_PREFIX_LENGTH
        );
    }

    #[test]
    fn seventh_degree_segment() {
        let mut builder = TrajectoryBuilder::new(1, false).expect("valid scale");
        let points: Vec<Vec4> = (1..=7)
            .map(|i| Vec4::new(i as f32 * 10., 0., 0., 0.))
            .collect();
        builder.append_segment(&points, 7000).expect("segment fits");
        assert!(matches!(
            builder.append_segment(&points[..2], 1000),
            Err(TrajectoryError::InvalidArgument(_))
        ));
        let trajectory = builder.finalize().expect("finalize");
        assert_eq!(
            trajectory.as_bytes().len(),
            HEADER_LENGTH + SEGMENT_PREFIX_LENGTH + 2 * 7
        );
        assert_eq!(
            trajectory.get_end_position().expect("end"),
            Vec4::new(70., 0., 0., 0.)
        );
    }

    #[test]
    fn finalize_resets_to_last_position() {
        let mut builder = TrajectoryBuilder::new(1, true).expect("valid scale");
        builder
            .append_line(Vec4::new(10., 20., 30., 40.), 1000)
            .expect("line fits");
        let first = builder.finalize().expect("finalize");
        assert!(!builder.has_segments());
        let second = builder.finalize().expect("finalize");
        assert_eq!(second.get_start_position(), Vec4::new(10., 20., 30., 40.));
        assert_eq!(first.get_end_position().expect("end"), second.get_start_position());
    }

    #[test]
    fn continues_an_existing_trajectory() {
        let mut builder = TrajectoryBuilder::new(1, false).expect("valid scale");
        builder
            .append_line(Vec4::new(100., 0., 0., 0.), 1000)
            .expect("line fits");
        let trajectory = builder.finalize().expect("finalize");

        let mut builder = TrajectoryBuilder::from_trajectory(&trajectory).expect("non-empty");
        assert_eq!(builder.get_last_position(), Vec4::new(100., 0., 0., 0.));
        builder
            .append_line(Vec4::new(100., 100., 0., 0.), 1000)
            .expect("line fits");
        let extended = builder.finalize().expect("finalize");
        assert_eq!(extended.get_total_duration_msec().expect("duration"), 2000);

        assert!(matches!(
            TrajectoryBuilder::from_trajectory(&Trajectory::empty()),
            Err(TrajectoryError::NotFound)
        ));
    }
}
