//! Session Configuration
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use gifcast_capture::CaptureConfig;
//! use gifcast_gifenc::Rect;
//! use gifcast_session::{CacheConfig, SessionConfig};
//!
//! let config = SessionConfig::builder()
//!     .area(Rect::new(100, 100, 640, 480))
//!     .looping(true)
//!     .capture(CaptureConfig::builder().record_cursor(true).build())
//!     .cache(CacheConfig::builder().max_memory_bytes(16 << 20).build())
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;

use gifcast_capture::CaptureConfig;
use gifcast_gifenc::{DelayRounding, Rect};

/// Configuration for a recording session
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Producer settings: frame interval, cursor recording
    pub capture: CaptureConfig,

    /// Area to record in source coordinates (default: None, the whole source)
    ///
    /// Clipped to the source when the session is created.
    pub area: Option<Rect>,

    /// Loop the animation forever (default: false)
    pub looping: bool,

    /// Job queue memory and spill limits
    pub cache: CacheConfig,

    /// Conversion of frame durations to GIF delays
    pub delay: DelayRounding,
}

impl SessionConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Validate configuration and return any issues
    ///
    /// Returns `Ok(())` if configuration is valid, or a list of issues.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if let Err(capture) = self.capture.validate() {
            issues.extend(capture);
        }

        if let Some(area) = self.area {
            if area.is_empty() {
                issues.push("area must not be empty".to_string());
            }
        }

        if let Err(cache) = self.cache.validate() {
            issues.extend(cache);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`SessionConfig`]
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    capture: Option<CaptureConfig>,
    area: Option<Rect>,
    looping: Option<bool>,
    cache: Option<CacheConfig>,
    delay: Option<DelayRounding>,
}

impl SessionConfigBuilder {
    /// Set producer configuration
    #[must_use]
    pub fn capture(mut self, config: CaptureConfig) -> Self {
        self.capture = Some(config);
        self
    }

    /// Set the area to record
    #[must_use]
    pub fn area(mut self, area: Rect) -> Self {
        self.area = Some(area);
        self
    }

    /// Set whether the animation loops
    #[must_use]
    pub fn looping(mut self, enable: bool) -> Self {
        self.looping = Some(enable);
        self
    }

    /// Set job queue limits
    #[must_use]
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    /// Set delay rounding
    #[must_use]
    pub fn delay(mut self, delay: DelayRounding) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> SessionConfig {
        let defaults = SessionConfig::default();

        SessionConfig {
            capture: self.capture.unwrap_or(defaults.capture),
            area: self.area.or(defaults.area),
            looping: self.looping.unwrap_or(defaults.looping),
            cache: self.cache.unwrap_or(defaults.cache),
            delay: self.delay.unwrap_or(defaults.delay),
        }
    }
}

/// Memory and disk limits of the job queue
///
/// Snapshots waiting for the encoder are kept in memory up to
/// `max_memory_bytes`. Past that they are written to anonymous temporary
/// files, so a slow encoder never stalls the producer.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Pixel bytes held in memory, queued and pooled (default: 50 MiB)
    pub max_memory_bytes: usize,

    /// Spill to disk when over the memory limit (default: true)
    ///
    /// When disabled the queue grows in memory without bound.
    pub spill_to_disk: bool,

    /// Directory for spill files (default: None, the system temp dir)
    pub spill_dir: Option<PathBuf>,

    /// Size at which a new spill file is started (default: 256 MiB)
    pub max_spill_file_bytes: u64,

    /// Total spill size before pushes fail (default: 4 GiB)
    pub max_spill_total_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 50 << 20,
            spill_to_disk: true,
            spill_dir: None,
            max_spill_file_bytes: 256 << 20,
            max_spill_total_bytes: 4 << 30,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate configuration and return any issues
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.max_spill_file_bytes == 0 {
            issues.push("max_spill_file_bytes must be at least 1".to_string());
        }

        if self.max_spill_total_bytes < self.max_spill_file_bytes {
            issues.push("max_spill_total_bytes must not be smaller than max_spill_file_bytes".to_string());
        }

        if let Some(dir) = &self.spill_dir {
            if !dir.is_dir() {
                issues.push(format!("spill_dir {} is not a directory", dir.display()));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Builder for [`CacheConfig`]
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    max_memory_bytes: Option<usize>,
    spill_to_disk: Option<bool>,
    spill_dir: Option<PathBuf>,
    max_spill_file_bytes: Option<u64>,
    max_spill_total_bytes: Option<u64>,
}

impl CacheConfigBuilder {
    /// Set the in-memory budget
    #[must_use]
    pub fn max_memory_bytes(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Set whether to spill to disk
    #[must_use]
    pub fn spill_to_disk(mut self, enable: bool) -> Self {
        self.spill_to_disk = Some(enable);
        self
    }

    /// Set spill file directory
    #[must_use]
    pub fn spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }

    /// Set size at which spill files are split
    #[must_use]
    pub fn max_spill_file_bytes(mut self, bytes: u64) -> Self {
        self.max_spill_file_bytes = Some(bytes);
        self
    }

    /// Set total spill limit
    #[must_use]
    pub fn max_spill_total_bytes(mut self, bytes: u64) -> Self {
        self.max_spill_total_bytes = Some(bytes);
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            max_memory_bytes: self.max_memory_bytes.unwrap_or(defaults.max_memory_bytes),
            spill_to_disk: self.spill_to_disk.unwrap_or(defaults.spill_to_disk),
            spill_dir: self.spill_dir.or(defaults.spill_dir),
            max_spill_file_bytes: self
                .max_spill_file_bytes
                .unwrap_or(defaults.max_spill_file_bytes),
            max_spill_total_bytes: self
                .max_spill_total_bytes
                .unwrap_or(defaults.max_spill_total_bytes),
        }
    }
}
