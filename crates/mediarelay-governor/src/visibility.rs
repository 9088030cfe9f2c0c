//! Lazy admission by viewport proximity.
//!
//! An element only asks the governor for its asset once it comes within
//! `margin_px` of the viewport. Admission is sticky: scrolling away again does
//! not withdraw a request that was already made.

/// Margin for thumbnails and covers in grids.
pub const THUMBNAIL_MARGIN_PX: f64 = 100.0;

/// Margin for comic pages, which are tall and read sequentially.
pub const PAGE_MARGIN_PX: f64 = 300.0;

/// Axis-aligned rectangle in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
        }
    }

    fn expand(&self, margin: f64) -> Self {
        Self {
            left: self.left - margin,
            top: self.top - margin,
            right: self.right + margin,
            bottom: self.bottom + margin,
        }
    }

    fn intersects(&self, other: &Rect) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }
}

#[derive(Debug, Clone)]
pub struct VisibilityGate {
    margin_px: f64,
    admitted: bool,
}

impl VisibilityGate {
    pub fn new(margin_px: f64) -> Self {
        Self {
            margin_px: margin_px.max(0.0),
            admitted: false,
        }
    }

    pub fn thumbnail() -> Self {
        Self::new(THUMBNAIL_MARGIN_PX)
    }

    pub fn page() -> Self {
        Self::new(PAGE_MARGIN_PX)
    }

    /// Feed the latest layout; returns whether the element may fetch.
    pub fn observe(&mut self, element: Rect, viewport: Rect) -> bool {
        if !self.admitted && viewport.expand(self.margin_px).intersects(&element) {
            self.admitted = true;
            tracing::trace!(margin_px = self.margin_px, "Element admitted for loading");
        }
        self.admitted
    }

    pub fn is_admitted(&self) -> bool {
        self.admitted
    }

    pub fn margin_px(&self) -> f64 {
        self.margin_px
    }
}
