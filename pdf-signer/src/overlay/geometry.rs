//! Container-space geometry for overlay placement.
//!
//! Coordinates have their origin at the top-left of a page container, with y
//! growing downwards, in container units (CSS-pixel equivalents).

/// Tolerance for containment checks after floating-point clamping
pub const GEOMETRY_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// A container is measurable once it has a positive, finite area
    pub fn is_measurable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Axis-aligned rectangle anchored at its top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// True when the rectangle lies entirely inside a container of `bounds`
    pub fn is_within(&self, bounds: Size) -> bool {
        self.is_finite()
            && self.width > 0.0
            && self.height > 0.0
            && self.x >= -GEOMETRY_EPSILON
            && self.y >= -GEOMETRY_EPSILON
            && self.right() <= bounds.width + GEOMETRY_EPSILON
            && self.bottom() <= bounds.height + GEOMETRY_EPSILON
    }

    /// Move the rectangle the least distance needed to fit inside `bounds`.
    ///
    /// The size is left untouched; callers guarantee it already fits.
    pub fn clamp_position(&self, bounds: Size) -> Rect {
        let max_x = (bounds.width - self.width).max(0.0);
        let max_y = (bounds.height - self.height).max(0.0);
        Rect {
            x: self.x.clamp(0.0, max_x),
            y: self.y.clamp(0.0, max_y),
            ..*self
        }
    }
}

/// Largest `(width, height)` with the given aspect (width / height) that fits
/// inside `max_width` x `max_height`, not exceeding `width`.
pub fn fit_width(width: f64, max_width: f64, max_height: f64, aspect_ratio: f64) -> (f64, f64) {
    let width = width.min(max_width).min(max_height * aspect_ratio);
    (width, width / aspect_ratio)
}
