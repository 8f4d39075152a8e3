use serde::{Deserialize, Serialize};

use super::Vec4;

/// A closed interval of real numbers. An empty interval has `min > max`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    pub fn new(a: f32, b: f32) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn empty() -> Self {
        Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn include(&mut self, value: f32) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn union(&mut self, other: &Interval) {
        if !other.is_empty() {
            self.include(other.min);
            self.include(other.max);
        }
    }

    pub fn contains(&self, value: f32) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn size(&self) -> f32 {
        if self.is_empty() {
            0.
        } else {
            self.max - self.min
        }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::empty()
    }
}

/// Axis-aligned bounding box in 3D (yaw is not part of it).
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

impl BoundingBox {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_point(p: Vec4) -> Self {
        Self {
            x: Interval::new(p.x, p.x),
            y: Interval::new(p.y, p.y),
            z: Interval::new(p.z, p.z),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty() || self.z.is_empty()
    }

    pub fn include_point(&mut self, p: Vec4) {
        self.x.include(p.x);
        self.y.include(p.y);
        self.z.include(p.z);
    }

    pub fn contains(&self, p: Vec4) -> bool {
        self.x.contains(p.x) && self.y.contains(p.y) && self.z.contains(p.z)
    }

    /// Grows the box by `margin` on every side.
    pub fn expand(&mut self, margin: f32) {
        for interval in [&mut self.x, &mut self.y, &mut self.z] {
            if !interval.is_empty() {
                interval.min -= margin;
                interval.max += margin;
            }
        }
    }
}
