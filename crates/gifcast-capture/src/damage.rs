//! Region Damage Tracking
//!
//! Tracks which pixels of the capture area changed since the last
//! snapshot. Damage notifications arrive as rectangles; they are folded
//! into a [`Region`] of disjoint rectangles so every changed pixel is
//! copied exactly once.
//!
//! # Usage
//!
//! ```rust
//! use gifcast_capture::damage::DamageTracker;
//! use gifcast_gifenc::Rect;
//!
//! let mut tracker = DamageTracker::new(1920, 1080);
//!
//! tracker.add(Rect::new(0, 0, 100, 100));
//! tracker.add(Rect::new(50, 50, 100, 100));
//! assert_eq!(tracker.pending().extents(), Some(Rect::new(0, 0, 150, 150)));
//!
//! // Hand the region to a snapshot and start over
//! let region = tracker.take();
//! assert_eq!(region.area(), 100 * 100 * 2 - 50 * 50);
//! assert!(!tracker.has_damage());
//! ```

use gifcast_gifenc::Rect;
use tracing::debug;

/// Default limit of disjoint rectangles before a region collapses
pub const DEFAULT_MAX_RECTS: usize = 256;

/// A set of disjoint rectangles
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    /// Create an empty region
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Region covering a single rectangle
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.union_rect(rect);
        region
    }

    /// Build a region from possibly overlapping rectangles
    #[must_use]
    pub fn from_rects(rects: impl IntoIterator<Item = Rect>) -> Self {
        let mut region = Self::new();
        for rect in rects {
            region.union_rect(rect);
        }
        region
    }

    /// Whether the region covers no pixels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Disjoint rectangles of the region
    #[must_use]
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Number of rectangles
    #[must_use]
    pub fn len(&self) -> usize {
        self.rects.len()
    }

    /// Number of covered pixels
    #[must_use]
    pub fn area(&self) -> u64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Bounding box of the region
    #[must_use]
    pub fn extents(&self) -> Option<Rect> {
        self.rects.iter().copied().reduce(|a, b| a.merge(&b))
    }

    /// Check if the region contains a point
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.rects.iter().any(|r| r.contains(x, y))
    }

    /// Add a rectangle
    ///
    /// Only the parts not already covered are stored, so rectangles stay
    /// disjoint.
    pub fn union_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }

        let mut pieces = vec![rect];
        for existing in &self.rects {
            if !pieces.iter().any(|p| p.overlaps(existing)) {
                continue;
            }
            pieces = pieces.iter().flat_map(|p| p.subtract(existing)).collect();
            if pieces.is_empty() {
                return;
            }
        }

        self.rects.extend(pieces);
    }

    /// Add every rectangle of another region
    pub fn union(&mut self, other: &Self) {
        for rect in &other.rects {
            self.union_rect(*rect);
        }
    }

    /// Remove a rectangle
    pub fn subtract_rect(&mut self, rect: Rect) {
        if rect.is_empty() || !self.rects.iter().any(|r| r.overlaps(&rect)) {
            return;
        }
        self.rects = self.rects.iter().flat_map(|r| r.subtract(&rect)).collect();
    }

    /// Remove every rectangle of another region
    pub fn subtract(&mut self, other: &Self) {
        for rect in &other.rects {
            self.subtract_rect(*rect);
        }
    }

    /// Restrict the region to `bounds`
    pub fn intersect_rect(&mut self, bounds: Rect) {
        self.rects = self.rects.iter().filter_map(|r| r.intersect(&bounds)).collect();
    }

    /// Replace the region with its bounding box
    pub fn collapse(&mut self) {
        if let Some(extents) = self.extents() {
            self.rects = vec![extents];
        }
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.rects.clear();
    }
}

/// Damage tracking statistics
#[derive(Debug, Clone, Default)]
pub struct DamageStats {
    /// Damage notifications received
    pub damage_events: u64,

    /// Notifications that fell entirely outside the tracked area
    pub discarded_events: u64,

    /// Regions handed out by [`DamageTracker::take`]
    pub regions_taken: u64,

    /// Times the pending region was collapsed to its bounding box
    pub collapses: u64,

    /// Total pixels handed out
    pub total_area: u64,
}

impl DamageStats {
    /// Average handed-out area per region
    #[must_use]
    pub fn avg_region_area(&self) -> f64 {
        if self.regions_taken == 0 {
            0.0
        } else {
            self.total_area as f64 / self.regions_taken as f64
        }
    }
}

/// Accumulates damage inside a fixed area between snapshots
pub struct DamageTracker {
    /// Damage not yet handed to a snapshot
    pending: Region,

    /// Area in which damage is tracked
    bounds: Rect,

    /// Maximum rectangles before collapsing to the bounding box
    max_rects: usize,

    /// Statistics
    stats: DamageStats,
}

impl DamageTracker {
    /// Create a tracker for a `width` x `height` area
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pending: Region::new(),
            bounds: Rect::from_size(width, height),
            max_rects: DEFAULT_MAX_RECTS,
            stats: DamageStats::default(),
        }
    }

    /// Create with a custom rectangle limit
    #[must_use]
    pub fn with_max_rects(width: u32, height: u32, max_rects: usize) -> Self {
        Self {
            max_rects: max_rects.max(1),
            ..Self::new(width, height)
        }
    }

    /// Add a damaged rectangle, clipped to the tracked area
    ///
    /// Returns `false` if nothing of it lies inside the area.
    pub fn add(&mut self, rect: Rect) -> bool {
        self.stats.damage_events += 1;

        let Some(clipped) = rect.intersect(&self.bounds) else {
            self.stats.discarded_events += 1;
            return false;
        };

        self.pending.union_rect(clipped);

        if self.pending.len() > self.max_rects {
            // Too many rectangles - fall back to the bounding box
            debug!("Collapsing {} damage rectangles", self.pending.len());
            self.pending.collapse();
            self.stats.collapses += 1;
        }

        true
    }

    /// Mark the entire area as damaged
    pub fn mark_full_damage(&mut self) {
        self.pending = Region::from_rect(self.bounds);
    }

    /// Check if there is any damage
    #[must_use]
    pub fn has_damage(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Damage accumulated so far
    #[must_use]
    pub fn pending(&self) -> &Region {
        &self.pending
    }

    /// Tracked area
    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Hand out the pending damage and start over
    pub fn take(&mut self) -> Region {
        let region = std::mem::take(&mut self.pending);
        self.stats.regions_taken += 1;
        self.stats.total_area += region.area();
        region
    }

    /// Get statistics
    #[must_use]
    pub fn stats(&self) -> &DamageStats {
        &self.stats
    }
}
