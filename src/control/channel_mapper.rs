//! # Channel Mapper Module
//!
//! Converts raw 11-bit SBUS channel values into actuator commands.
//!
//! ## Stick/Lever Channels
//!
//! Raw values are centered around ~992 on this receiver. A symmetric deadband
//! around center is reported as exactly neutral; outside it the offset from
//! center is scaled by a fixed half-span and clamped:
//!
//! ```text
//! |raw - center| <  deadband   ->  0.0
//! otherwise                    ->  clamp((raw - center) / half_span, -1.0, 1.0)
//! ```
//!
//! ## Calibration Knob
//!
//! The knob channel is mapped linearly onto the steering trim window
//! (1350-1650 µs by default). With [`Polarity::Inverted`] the knob's low end
//! gives the high end of the window.
//!
//! ## Usage
//!
//! ```
//! use sbus_rover::control::channel_mapper::ChannelMapper;
//!
//! let mapper = ChannelMapper::default();
//! assert_eq!(mapper.map(992), 0.0);
//! assert_eq!(mapper.map(1792), 1.0);
//! assert_eq!(mapper.map(192), -1.0);
//! ```

use serde::Deserialize;

use crate::config::{CalibrationConfig, MappingConfig};

/// Direction of a linear mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// Larger input gives larger output
    Normal,
    /// Larger input gives smaller output
    Inverted,
}

impl Polarity {
    /// `1.0` for normal, `-1.0` for inverted
    #[must_use]
    pub fn sign(self) -> f32 {
        match self {
            Polarity::Normal => 1.0,
            Polarity::Inverted => -1.0,
        }
    }
}

/// Maps raw channel values to normalized commands in -1.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMapper {
    center: u16,
    deadband: u16,
    half_span: u16,
}

impl Default for ChannelMapper {
    fn default() -> Self {
        Self::new(992, 100, 800)
    }
}

impl ChannelMapper {
    /// Creates a mapper.
    ///
    /// # Arguments
    ///
    /// * `center` - Raw value reported at rest
    /// * `deadband` - Offsets strictly smaller than this map to 0.0
    /// * `half_span` - Offset from center that maps to full deflection (must be > 0)
    #[must_use]
    pub fn new(center: u16, deadband: u16, half_span: u16) -> Self {
        Self {
            center,
            deadband,
            half_span: half_span.max(1),
        }
    }

    #[must_use]
    pub fn from_config(config: &MappingConfig) -> Self {
        Self::new(config.center, config.deadband, config.half_span)
    }

    /// Maps a raw channel value to a command in -1.0..=1.0.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbus_rover::control::channel_mapper::ChannelMapper;
    ///
    /// let mapper = ChannelMapper::default();
    ///
    /// // Within deadband
    /// assert_eq!(mapper.map(1091), 0.0);
    /// assert_eq!(mapper.map(893), 0.0);
    ///
    /// // Half deflection
    /// assert_eq!(mapper.map(1392), 0.5);
    /// ```
    #[must_use]
    pub fn map(&self, raw: u16) -> f32 {
        let offset = f32::from(raw) - f32::from(self.center);

        if offset.abs() < f32::from(self.deadband) {
            return 0.0;
        }

        (offset / f32::from(self.half_span)).clamp(-1.0, 1.0)
    }
}

/// Maps the calibration knob onto the steering trim window (microseconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimMapping {
    knob_min: u16,
    knob_max: u16,
    trim_min_us: u32,
    trim_max_us: u32,
    polarity: Polarity,
}

impl Default for TrimMapping {
    fn default() -> Self {
        Self::new(200, 1800, 1350, 1650, Polarity::Inverted)
    }
}

impl TrimMapping {
    #[must_use]
    pub fn new(
        knob_min: u16,
        knob_max: u16,
        trim_min_us: u32,
        trim_max_us: u32,
        polarity: Polarity,
    ) -> Self {
        Self {
            knob_min,
            knob_max: knob_max.max(knob_min + 1),
            trim_min_us,
            trim_max_us: trim_max_us.max(trim_min_us),
            polarity,
        }
    }

    /// Knob travel comes from the mapping span, the window from calibration.
    #[must_use]
    pub fn from_config(mapping: &MappingConfig, calibration: &CalibrationConfig) -> Self {
        Self::new(
            mapping.min,
            mapping.max,
            calibration.trim_min_us,
            calibration.trim_max_us,
            calibration.knob_polarity,
        )
    }

    /// Trim target for a raw knob value, truncated and clamped to the window.
    ///
    /// # Examples
    ///
    /// ```
    /// use sbus_rover::control::channel_mapper::TrimMapping;
    ///
    /// let trim = TrimMapping::default();
    /// assert_eq!(trim.target_us(200), 1650);
    /// assert_eq!(trim.target_us(1800), 1350);
    /// assert_eq!(trim.target_us(1000), 1500);
    /// ```
    #[must_use]
    pub fn target_us(&self, knob: u16) -> u32 {
        let travel = match self.polarity {
            Polarity::Inverted => f64::from(self.knob_max) - f64::from(knob),
            Polarity::Normal => f64::from(knob) - f64::from(self.knob_min),
        };
        let knob_span = f64::from(self.knob_max - self.knob_min);
        let window = f64::from(self.trim_max_us - self.trim_min_us);

        let target = (f64::from(self.trim_min_us) + travel / knob_span * window).trunc();
        target.clamp(f64::from(self.trim_min_us), f64::from(self.trim_max_us)) as u32
    }
}
