use serde::Serialize;

/// Axis-aligned bounds of the over-threshold pixels seen in one cycle.
///
/// The empty box is reported as the reset sentinel: `x_min = y_min = width`
/// and `x_max = y_max = 0`. A non-empty box always has `x_max < width`, so a
/// box is empty exactly when `x_min > x_max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MotionBox {
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl MotionBox {
    /// The sentinel box for a frame of the given width.
    pub fn empty(width: u32) -> Self {
        Self {
            x_min: width,
            x_max: 0,
            y_min: width,
            y_max: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x_min > self.x_max
    }

    /// Inclusive width in pixels, 0 when empty.
    pub fn width(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.x_max - self.x_min + 1
        }
    }

    /// Inclusive height in pixels, 0 when empty.
    pub fn height(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.y_max - self.y_min + 1
        }
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        !self.is_empty() && (self.x_min..=self.x_max).contains(&x) && (self.y_min..=self.y_max).contains(&y)
    }
}

/// Accumulates min/max pixel coordinates during one difference pass.
///
/// Holds no frame data. The engine resets it between cycles. Bounds start
/// from the first observed pixel, so rows below `width` on tall frames are
/// tracked exactly.
#[derive(Debug, Clone)]
pub struct MotionBoxTracker {
    width: u32,
    bounds: Option<MotionBox>,
}

impl MotionBoxTracker {
    pub fn new(width: u32) -> Self {
        Self { width, bounds: None }
    }

    /// Back to the sentinel state for a frame of `width`.
    pub fn reset(&mut self, width: u32) {
        self.width = width;
        self.bounds = None;
    }

    pub fn observe(&mut self, x: u32, y: u32) {
        match &mut self.bounds {
            Some(b) => {
                b.x_min = b.x_min.min(x);
                b.y_min = b.y_min.min(y);
                b.x_max = b.x_max.max(x);
                b.y_max = b.y_max.max(y);
            }
            None => {
                self.bounds = Some(MotionBox {
                    x_min: x,
                    x_max: x,
                    y_min: y,
                    y_max: y,
                })
            }
        }
    }

    /// Observe a row-major linear pixel index.
    pub fn observe_index(&mut self, index: usize) {
        let (x, y) = index_to_xy(index, self.width);
        self.observe(x, y);
    }

    /// Fold another partial tracker for the same frame into this one.
    pub fn merge(&mut self, other: &MotionBoxTracker) {
        if let Some(b) = other.bounds {
            self.observe(b.x_min, b.y_min);
            self.observe(b.x_max, b.y_max);
        }
    }

    /// The accumulated box, or the sentinel when nothing was observed.
    pub fn current(&self) -> MotionBox {
        self.bounds.unwrap_or_else(|| MotionBox::empty(self.width))
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}

/// Split a row-major index into `(x, y)` for a frame of `width`.
pub fn index_to_xy(index: usize, width: u32) -> (u32, u32) {
    let w = width as usize;
    ((index % w) as u32, (index / w) as u32)
}
