//! World-space primitives

use serde::{Deserialize, Serialize};

/// World-space coordinates. One unit is one pixel at default zoom.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` (radians)
    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn distance(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Angle of the vector from `self` to `other`
    pub fn angle_to(self, other: Self) -> f32 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

impl std::ops::Add for Vector2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vector2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::AddAssign for Vector2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

/// Hard rectangular world boundary. Positions are clamped, never wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
}

impl WorldBounds {
    /// The arena used by every game mode: `[-2000, 2000]²`
    pub const ARENA: Self = Self {
        min_x: -2000.0,
        max_x: 2000.0,
        min_y: -2000.0,
        max_y: 2000.0,
    };

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, point: Vector2) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    pub fn contains_x(&self, x: f32) -> bool {
        x >= self.min_x && x <= self.max_x
    }

    pub fn contains_y(&self, y: f32) -> bool {
        y >= self.min_y && y <= self.max_y
    }

    pub fn clamp(&self, point: Vector2) -> Vector2 {
        Vector2::new(
            point.x.clamp(self.min_x, self.max_x),
            point.y.clamp(self.min_y, self.max_y),
        )
    }

    /// True when `point` is within `margin` of any edge
    pub fn near_edge(&self, point: Vector2, margin: f32) -> bool {
        point.x <= self.min_x + margin
            || point.x >= self.max_x - margin
            || point.y <= self.min_y + margin
            || point.y >= self.max_y - margin
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::ARENA
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_pins_to_edges() {
        let bounds = WorldBounds::ARENA;
        assert_eq!(
            bounds.clamp(Vector2::new(2500.0, -3000.0)),
            Vector2::new(2000.0, -2000.0)
        );
        assert_eq!(bounds.clamp(Vector2::new(5.0, 6.0)), Vector2::new(5.0, 6.0));
        assert_eq!(bounds.width(), 4000.0);
    }

    #[test]
    fn near_edge_uses_margin() {
        let bounds = WorldBounds::ARENA;
        assert!(bounds.near_edge(Vector2::new(1950.0, 0.0), 100.0));
        assert!(!bounds.near_edge(Vector2::new(0.0, 0.0), 100.0));
    }

    #[test]
    fn angle_and_distance() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(3.0, 4.0);
        assert_eq!(a.distance(b), 5.0);
        assert!((a.angle_to(Vector2::new(0.0, 1.0)) - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }
}
