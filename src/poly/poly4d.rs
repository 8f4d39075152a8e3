use super::Poly;
use crate::math::Vec4;

/// Four independent polynomials, one per axis of a segment (x, y, z, yaw).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Poly4D {
    pub x: Poly,
    pub y: Poly,
    pub z: Poly,
    pub yaw: Poly,
}

impl Poly4D {
    pub fn constant(p: Vec4) -> Self {
        Self {
            x: Poly::constant(p.x),
            y: Poly::constant(p.y),
            z: Poly::constant(p.z),
            yaw: Poly::constant(p.yaw),
        }
    }

    pub fn axis(&self, index: usize) -> &Poly {
        match index {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => &self.yaw,
        }
    }

    pub fn axes_mut(&mut self) -> [&mut Poly; 4] {
        [&mut self.x, &mut self.y, &mut self.z, &mut self.yaw]
    }

    pub fn eval(&self, t: f32) -> Vec4 {
        Vec4::new(
            self.x.eval(t),
            self.y.eval(t),
            self.z.eval(t),
            self.yaw.eval(t),
        )
    }

    pub fn deriv(&mut self) {
        for poly in self.axes_mut() {
            poly.deriv();
        }
    }

    pub fn scale(&mut self, factor: f32) {
        for poly in self.axes_mut() {
            poly.scale(factor);
        }
    }
}
