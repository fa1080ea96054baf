//! Capture Configuration
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use gifcast_capture::CaptureConfig;
//!
//! // Using builder pattern
//! let config = CaptureConfig::builder()
//!     .frame_interval(Duration::from_millis(50))
//!     .record_cursor(true)
//!     .build();
//!
//! // Using struct literal with defaults
//! let config = CaptureConfig {
//!     max_region_rects: 64,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use crate::damage::DEFAULT_MAX_RECTS;

/// Configuration for the frame producer
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Minimum time between snapshots (default: 40ms, about 25 fps)
    ///
    /// Damage arriving while the timer runs is coalesced into the next
    /// snapshot.
    pub frame_interval: Duration,

    /// Paint the pointer into the recording (default: false)
    ///
    /// Ignored when the source has no cursor support or the `cursor`
    /// feature is disabled.
    pub record_cursor: bool,

    /// Damage rectangles kept before the pending region collapses to its
    /// bounding box (default: 256)
    pub max_region_rects: usize,

    /// Cursor images cached by serial (default: 8)
    pub cursor_cache_entries: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(40),
            record_cursor: false,
            max_region_rects: DEFAULT_MAX_RECTS,
            cursor_cache_entries: 8,
        }
    }
}

impl CaptureConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> CaptureConfigBuilder {
        CaptureConfigBuilder::default()
    }

    /// Validate configuration and return any issues
    ///
    /// Returns `Ok(())` if configuration is valid, or a list of issues.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.frame_interval < Duration::from_millis(1) {
            issues.push("frame_interval must be at least 1ms".to_string());
        }

        if self.frame_interval > Duration::from_secs(10) {
            issues.push("frame_interval should not exceed 10s".to_string());
        }

        if self.max_region_rects == 0 {
            issues.push("max_region_rects must be at least 1".to_string());
        }

        if self.cursor_cache_entries == 0 {
            issues.push("cursor_cache_entries must be at least 1".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`CaptureConfig`]
#[derive(Debug, Clone, Default)]
pub struct CaptureConfigBuilder {
    frame_interval: Option<Duration>,
    record_cursor: Option<bool>,
    max_region_rects: Option<usize>,
    cursor_cache_entries: Option<usize>,
}

impl CaptureConfigBuilder {
    /// Set minimum time between snapshots
    #[must_use]
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Set whether to paint the pointer
    #[must_use]
    pub fn record_cursor(mut self, enable: bool) -> Self {
        self.record_cursor = Some(enable);
        self
    }

    /// Set damage rectangle limit
    #[must_use]
    pub fn max_region_rects(mut self, max: usize) -> Self {
        self.max_region_rects = Some(max);
        self
    }

    /// Set cursor image cache size
    #[must_use]
    pub fn cursor_cache_entries(mut self, entries: usize) -> Self {
        self.cursor_cache_entries = Some(entries);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> CaptureConfig {
        let defaults = CaptureConfig::default();

        CaptureConfig {
            frame_interval: self.frame_interval.unwrap_or(defaults.frame_interval),
            record_cursor: self.record_cursor.unwrap_or(defaults.record_cursor),
            max_region_rects: self.max_region_rects.unwrap_or(defaults.max_region_rects),
            cursor_cache_entries: self
                .cursor_cache_entries
                .unwrap_or(defaults.cursor_cache_entries),
        }
    }
}
