//! Binary codec for a single trajectory segment.
//!
//! A segment starts with a format byte holding 2 bits per axis (x at bits 0-1,
//! y at 2-3, z at 4-5, yaw at 6-7), followed by the duration in milliseconds
//! as a little-endian u16 and then, for every axis in order, the stored
//! control points as little-endian i16 values. The first control point of each
//! axis is the end point of the previous segment and is never stored.

use crate::{
    error::{Result, TrajectoryError},
    math::{normalize_yaw, Vec4},
    poly::{Poly, Poly4D, MAX_POLY_DEGREE},
};

pub const NUM_AXES: usize = 4;
pub const YAW_AXIS: usize = 3;
const MAX_POINTS: usize = MAX_POLY_DEGREE + 1;

/// format byte + u16 duration
pub(crate) const SEGMENT_PREFIX_LENGTH: usize = 3;

/// Curve kind of a single axis within a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisFormat {
    #[default]
    Constant = 0,
    Linear = 1,
    CubicBezier = 2,
    SeventhDegreeBezier = 3,
}

impl AxisFormat {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Constant,
            1 => Self::Linear,
            2 => Self::CubicBezier,
            _ => Self::SeventhDegreeBezier,
        }
    }

    /// control points stored in the buffer, i.e. excluding the implicit start
    pub fn num_stored_points(self) -> usize {
        match self {
            Self::Constant => 0,
            Self::Linear => 1,
            Self::CubicBezier => 3,
            Self::SeventhDegreeBezier => 7,
        }
    }

    pub(crate) fn for_stored_points(count: usize) -> Option<Self> {
        match count {
            0 => Some(Self::Constant),
            1 => Some(Self::Linear),
            3 => Some(Self::CubicBezier),
            7 => Some(Self::SeventhDegreeBezier),
            _ => None,
        }
    }
}

pub(crate) fn formats_from_byte(byte: u8) -> [AxisFormat; NUM_AXES] {
    [0, 2, 4, 6].map(|shift| AxisFormat::from_bits(byte >> shift))
}

pub(crate) fn formats_to_byte(formats: &[AxisFormat; NUM_AXES]) -> u8 {
    formats
        .iter()
        .enumerate()
        .fold(0, |acc, (axis, format)| acc | ((*format as u8) << (2 * axis)))
}

pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    match bytes.get(offset..offset + 2) {
        Some(&[lo, hi]) => Ok(u16::from_le_bytes([lo, hi])),
        _ => Err(TrajectoryError::Parse("unexpected end of trajectory data")),
    }
}

pub(crate) fn read_i16(bytes: &[u8], offset: usize) -> Result<i16> {
    read_u16(bytes, offset).map(|v| v as i16)
}

pub(crate) fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_i16(bytes: &mut [u8], offset: usize, value: i16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn decode_coordinate(raw: i16, scale: u8) -> f32 {
    raw as f32 * scale as f32
}

pub(crate) fn decode_yaw(raw: i16) -> f32 {
    normalize_yaw((raw as i32).rem_euclid(3600) as f32 / 10.)
}

pub(crate) fn decode_value(axis: usize, raw: i16, scale: u8) -> f32 {
    if axis == YAW_AXIS {
        decode_yaw(raw)
    } else {
        decode_coordinate(raw, scale)
    }
}

pub(crate) fn encode_coordinate(value: f32, scale: u8) -> Result<i16> {
    if !value.is_finite() {
        return Err(TrajectoryError::InvalidArgument("coordinates must be finite"));
    }
    let quantized = (value / scale as f32).round();
    if quantized < i16::MIN as f32 || quantized > i16::MAX as f32 {
        return Err(TrajectoryError::Overflow(
            "coordinate does not fit the trajectory scale",
        ));
    }
    Ok(quantized as i16)
}

pub(crate) fn encode_yaw(value: f32) -> Result<i16> {
    if !value.is_finite() {
        return Err(TrajectoryError::InvalidArgument("yaw must be finite"));
    }
    Ok(((value * 10.).round() as i64).rem_euclid(3600) as i16)
}

pub(crate) fn encode_value(axis: usize, value: f32, scale: u8) -> Result<i16> {
    if axis == YAW_AXIS {
        encode_yaw(value)
    } else {
        encode_coordinate(value, scale)
    }
}

/// Replaces `points` with the control points of the same Bezier curve
/// restricted to [0, t] (de Casteljau subdivision, left half).
pub fn bezier_subdivide_left(points: &mut [f32], t: f32) {
    let n = points.len();
    for level in 1..n {
        for i in (level..n).rev() {
            points[i] = (1. - t) * points[i - 1] + t * points[i];
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Cached<T> {
    #[default]
    Uncomputed,
    Computed(T),
}

impl<T: Copy> Cached<T> {
    fn get_or_try_compute(&mut self, compute: impl FnOnce() -> Result<T>) -> Result<T> {
        match *self {
            Cached::Computed(value) => Ok(value),
            Cached::Uncomputed => {
                let value = compute()?;
                *self = Cached::Computed(value);
                Ok(value)
            }
        }
    }
}

/// One decoded segment of a trajectory, with lazily built polynomials.
///
/// Polynomials are parametrized over the unit interval: t = 0 is the start of
/// the segment and t = 1 its end. The velocity and acceleration polynomials
/// are rescaled to be per second.
#[derive(Debug, Clone, Copy, Default)]
pub struct Segment {
    offset: usize,
    length: usize,
    formats: [AxisFormat; NUM_AXES],
    start_time_msec: u32,
    duration_msec: u32,
    start_time_sec: f32,
    duration_sec: f32,
    end_time_sec: f32,
    start: Vec4,
    end: Vec4,
    points: [[f32; MAX_POINTS]; NUM_AXES],
    poly: Cached<Poly4D>,
    dpoly: Cached<Poly4D>,
    ddpoly: Cached<Poly4D>,
}

impl Segment {
    /// Decodes the segment at `offset`. Past the end of `bytes`, returns a
    /// constant segment that holds `start` until the end of time.
    pub(crate) fn decode(
        bytes: &[u8],
        offset: usize,
        start_time_msec: u32,
        start: Vec4,
        scale: u8,
    ) -> Result<Self> {
        if offset >= bytes.len() {
            return Ok(Self::infinite_hold(offset, start_time_msec, start));
        }

        let formats = formats_from_byte(bytes[offset]);
        let duration_msec = read_u16(bytes, offset + 1)? as u32;
        start_time_msec
            .checked_add(duration_msec)
            .ok_or(TrajectoryError::Overflow("segment ends after the end of time"))?;

        let mut points = [[0f32; MAX_POINTS]; NUM_AXES];
        let mut end = start;
        let mut cursor = offset + SEGMENT_PREFIX_LENGTH;
        for (axis, format) in formats.iter().enumerate() {
            points[axis][0] = start[axis];
            let n = format.num_stored_points();
            for k in 1..=n {
                points[axis][k] = decode_value(axis, read_i16(bytes, cursor)?, scale);
                cursor += 2;
            }
            end[axis] = points[axis][n];
        }

        Ok(Self::with_timing(
            offset,
            cursor - offset,
            formats,
            start_time_msec,
            duration_msec,
            start,
            end,
            points,
        ))
    }

    fn infinite_hold(offset: usize, start_time_msec: u32, start: Vec4) -> Self {
        let mut points = [[0f32; MAX_POINTS]; NUM_AXES];
        for (axis, axis_points) in points.iter_mut().enumerate() {
            axis_points[0] = start[axis];
        }
        Self::with_timing(
            offset,
            0,
            [AxisFormat::Constant; NUM_AXES],
            start_time_msec,
            u32::MAX - start_time_msec,
            start,
            start,
            points,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn with_timing(
        offset: usize,
        length: usize,
        formats: [AxisFormat; NUM_AXES],
        start_time_msec: u32,
        duration_msec: u32,
        start: Vec4,
        end: Vec4,
        points: [[f32; MAX_POINTS]; NUM_AXES],
    ) -> Self {
        let start_time_sec = start_time_msec as f32 / 1000.;
        let end_time_sec = (start_time_msec as u64 + duration_msec as u64) as f32 / 1000.;
        Self {
            offset,
            length,
            formats,
            start_time_msec,
            duration_msec,
            start_time_sec,
            duration_sec: duration_msec as f32 / 1000.,
            end_time_sec,
            start,
            end,
            points,
            poly: Cached::Uncomputed,
            dpoly: Cached::Uncomputed,
            ddpoly: Cached::Uncomputed,
        }
    }

    /// byte offset of the segment in the trajectory buffer
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// encoded length in bytes, zero for the final infinite hold
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether this is the synthesized hold that follows the last encoded
    /// segment.
    pub fn is_terminal(&self) -> bool {
        self.length == 0
    }

    pub fn format(&self, axis: usize) -> AxisFormat {
        self.formats[axis]
    }

    pub fn start_time_msec(&self) -> u32 {
        self.start_time_msec
    }

    pub fn end_time_msec(&self) -> u32 {
        self.start_time_msec.saturating_add(self.duration_msec)
    }

    pub fn duration_msec(&self) -> u32 {
        self.duration_msec
    }

    pub fn start_time_sec(&self) -> f32 {
        self.start_time_sec
    }

    pub fn end_time_sec(&self) -> f32 {
        self.end_time_sec
    }

    pub fn duration_sec(&self) -> f32 {
        self.duration_sec
    }

    pub fn start(&self) -> Vec4 {
        self.start
    }

    pub fn end(&self) -> Vec4 {
        self.end
    }

    /// Bezier control points of one axis, the implicit start point included.
    pub fn control_points(&self, axis: usize) -> &[f32] {
        &self.points[axis][..=self.formats[axis].num_stored_points()]
    }

    /// Byte offset of the first stored control point of `axis`.
    pub(crate) fn stored_points_offset(&self, axis: usize) -> usize {
        let preceding: usize = self.formats[..axis]
            .iter()
            .map(|f| f.num_stored_points())
            .sum();
        self.offset + SEGMENT_PREFIX_LENGTH + 2 * preceding
    }

    fn build_poly(&self) -> Result<Poly4D> {
        let mut result = Poly4D::default();
        for (axis, poly) in result.axes_mut().into_iter().enumerate() {
            let points = self.control_points(axis);
            *poly = match points.len() {
                1 => Poly::constant(points[0]),
                2 => Poly::linear(1., points[0], points[1]),
                _ => Poly::bezier(1., points)?,
            };
        }
        Ok(result)
    }

    /// derivative of `poly` over the unit interval, rescaled to seconds
    fn rescaled_derivative(&self, mut poly: Poly4D) -> Poly4D {
        if self.duration_msec == 0 {
            return Poly4D::default();
        }
        poly.deriv();
        poly.scale(1. / self.duration_sec);
        poly
    }

    pub fn get_poly(&mut self) -> Result<Poly4D> {
        let segment = *self;
        self.poly.get_or_try_compute(|| segment.build_poly())
    }

    pub fn get_dpoly(&mut self) -> Result<Poly4D> {
        let poly = self.get_poly()?;
        let segment = *self;
        self.dpoly
            .get_or_try_compute(|| Ok(segment.rescaled_derivative(poly)))
    }

    pub fn get_ddpoly(&mut self) -> Result<Poly4D> {
        let dpoly = self.get_dpoly()?;
        let segment = *self;
        self.ddpoly
            .get_or_try_compute(|| Ok(segment.rescaled_derivative(dpoly)))
    }
}
