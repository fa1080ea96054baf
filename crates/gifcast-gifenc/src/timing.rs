//! Frame delay rounding
//!
//! GIF delays are stored in centiseconds. The elapsed time between two
//! frames is padded by a rounding term and floored before the division so
//! that very short gaps still produce a visible delay.

use std::time::Duration;

/// Conversion from elapsed time to a centisecond delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRounding {
    /// Added to the elapsed time before dividing (default: 5ms)
    pub rounding: Duration,

    /// Lower bound applied after rounding (default: 10ms)
    pub minimum: Duration,
}

impl Default for DelayRounding {
    fn default() -> Self {
        Self {
            rounding: Duration::from_millis(5),
            minimum: Duration::from_millis(10),
        }
    }
}

impl DelayRounding {
    /// Delay field for a frame shown for `elapsed`
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use gifcast_gifenc::DelayRounding;
    ///
    /// let rounding = DelayRounding::default();
    /// assert_eq!(rounding.centiseconds(Duration::from_millis(37)), 4);
    /// assert_eq!(rounding.centiseconds(Duration::from_millis(3)), 1);
    /// ```
    #[must_use]
    pub fn centiseconds(&self, elapsed: Duration) -> u16 {
        let millis = (elapsed + self.rounding).max(self.minimum).as_millis() / 10;
        u16::try_from(millis).unwrap_or(u16::MAX)
    }
}
