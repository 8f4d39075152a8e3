use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Index, IndexMut, Sub};

/// A 3D position (or velocity, acceleration) together with a yaw angle in degrees.
#[derive(Deserialize, Serialize, PartialEq, Clone, Copy, Debug, Default)]
pub struct Vec4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub yaw: f32,
}

impl Vec4 {
    pub fn new(x: f32, y: f32, z: f32, yaw: f32) -> Self {
        Self { x, y, z, yaw }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// horizontal distance, ignoring altitude and yaw
    pub fn distance_xy(&self, rhs: &Self) -> f32 {
        (self.x - rhs.x).hypot(self.y - rhs.y)
    }

    /// midpoint of the segment between `self` and `rhs`, on every axis
    pub fn midpoint(&self, rhs: &Self) -> Self {
        (*self + *rhs) / 2.
    }
}

impl Index<usize> for Vec4 {
    type Output = f32;

    fn index(&self, axis: usize) -> &Self::Output {
        match axis {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            3 => &self.yaw,
            _ => panic!("axis index out of range: {axis}"),
        }
    }
}

impl IndexMut<usize> for Vec4 {
    fn index_mut(&mut self, axis: usize) -> &mut Self::Output {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            3 => &mut self.yaw,
            _ => panic!("axis index out of range: {axis}"),
        }
    }
}

impl Add for Vec4 {
    type Output = Vec4;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
            yaw: self.yaw + rhs.yaw,
        }
    }
}

impl Sub for Vec4 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
            yaw: self.yaw - rhs.yaw,
        }
    }
}

impl Div<f32> for Vec4 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self::Output {
        Self {
            x: self.x / rhs,
            y: self.y / rhs,
            z: self.z / rhs,
            yaw: self.yaw / rhs,
        }
    }
}
