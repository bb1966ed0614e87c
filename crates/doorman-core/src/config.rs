//! Pipeline configuration.
//!
//! [`PipelineConfig`] is the validated, strongly-typed form used by every
//! component. [`Settings`] is the file-shaped form (JSON) with defaults for
//! every missing key; it only becomes usable through
//! [`Settings::into_config`], which validates eagerly.
//!
//! # Examples
//!
//! ```
//! use doorman_core::config::PipelineConfig;
//! use std::time::Duration;
//!
//! let config = PipelineConfig::default()
//!     .delimiter('*')
//!     .keypad_timeout(Duration::from_secs(8));
//! assert!(config.validate().is_ok());
//!
//! let bad = PipelineConfig::default().delimiter('0');
//! assert!(bad.validate().is_err());
//! ```

use crate::constants::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Transform parameters for one recognized card frame width.
///
/// The leading and trailing parity bits are always stripped; the remaining
/// bits are split into bytes (chunk 0 is the first byte received), re-emitted
/// in `byte_order`, and rendered as `width` upper-case hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    /// Total frame width including parity bits.
    pub bits: u32,

    /// Received chunk index to emit at each output position.
    pub byte_order: Vec<usize>,

    /// Hex characters in the rendered token.
    pub width: usize,
}

impl FrameLayout {
    /// Layout that reverses the byte order and renders every data byte.
    ///
    /// Readers transmit the UID least significant byte first, so reversing
    /// restores the order printed on the card.
    pub fn reversed(bits: u32) -> Self {
        let chunks = bits.saturating_sub(PARITY_BITS) as usize / 8;
        Self {
            bits,
            byte_order: (0..chunks).rev().collect(),
            width: chunks * 2,
        }
    }

    /// Number of data bytes carried between the parity bits.
    #[must_use]
    pub fn chunks(&self) -> usize {
        self.bits.saturating_sub(PARITY_BITS) as usize / 8
    }

    /// Check the layout describes a transform the canonicalizer can apply.
    ///
    /// # Errors
    /// Returns `Error::InvalidFrameLayout` naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.bits <= PARITY_BITS || self.bits > MAX_FRAME_BITS {
            return Err(Error::frame_layout(
                self.bits,
                format!("width must be {}-{MAX_FRAME_BITS} bits", PARITY_BITS + 8),
            ));
        }

        let data_bits = self.bits - PARITY_BITS;
        if data_bits % 8 != 0 {
            return Err(Error::frame_layout(
                self.bits,
                format!("{data_bits} data bits are not whole bytes"),
            ));
        }

        let chunks = self.chunks();
        let mut seen = vec![false; chunks];
        if self.byte_order.len() != chunks {
            return Err(Error::frame_layout(
                self.bits,
                format!(
                    "byte order lists {} bytes, frame carries {chunks}",
                    self.byte_order.len()
                ),
            ));
        }
        for &index in &self.byte_order {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(Error::frame_layout(
                        self.bits,
                        format!("byte order {:?} is not a permutation", self.byte_order),
                    ));
                }
            }
        }

        if self.width == 0 || self.width > chunks * 2 {
            return Err(Error::frame_layout(
                self.bits,
                format!("output width must be 1-{} hex chars", chunks * 2),
            ));
        }

        Ok(())
    }
}

/// Validated configuration shared by every pipeline component.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Keypad start/stop key, `#` or `*`.
    pub delimiter: char,

    /// Inactivity after which a partial keypad code is abandoned.
    pub keypad_timeout: Duration,

    /// Frame width the keypad uses for a single keystroke.
    pub keystroke_bits: u32,

    /// Attempts within `brute_force_window` that trigger a lockout.
    pub brute_force_attempts: usize,

    /// Window the brute-force attempts must fall within.
    pub brute_force_window: Duration,

    /// How long any lockout lasts.
    pub lockout_duration: Duration,

    /// Keystrokes closer together than this trigger an overspeed lockout.
    /// Zero disables the overspeed trigger.
    pub overspeed_interval: Duration,

    /// Quiet time on both data lines that ends a frame.
    pub bit_gap: Duration,

    /// Recognized card frame widths and their transforms.
    pub frame_layouts: Vec<FrameLayout>,

    /// Width of the frames the installed card reader produces. Stored card
    /// tokens are shortened to this layout's output width on load.
    pub card_bits: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            keypad_timeout: Duration::from_secs_f64(DEFAULT_KEYPAD_TIMEOUT_SECS),
            keystroke_bits: DEFAULT_KEYSTROKE_BITS,
            brute_force_attempts: DEFAULT_BRUTE_FORCE_ATTEMPTS,
            brute_force_window: Duration::from_secs_f64(DEFAULT_BRUTE_FORCE_WINDOW_SECS),
            lockout_duration: Duration::from_secs_f64(DEFAULT_LOCKOUT_SECS),
            overspeed_interval: Duration::from_secs_f64(DEFAULT_OVERSPEED_SECS),
            bit_gap: Duration::from_millis(DEFAULT_BIT_GAP_MS),
            frame_layouts: vec![FrameLayout::reversed(26), FrameLayout::reversed(34)],
            card_bits: DEFAULT_CARD_BITS,
        }
    }
}

impl PipelineConfig {
    /// Set the keypad start/stop key.
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the keypad inactivity timeout.
    pub fn keypad_timeout(mut self, timeout: Duration) -> Self {
        self.keypad_timeout = timeout;
        self
    }

    /// Set the brute-force threshold: `attempts` within `window`.
    pub fn brute_force(mut self, attempts: usize, window: Duration) -> Self {
        self.brute_force_attempts = attempts;
        self.brute_force_window = window;
        self
    }

    /// Set how long a lockout lasts.
    pub fn lockout_duration(mut self, duration: Duration) -> Self {
        self.lockout_duration = duration;
        self
    }

    /// Set the minimum plausible spacing between keystrokes.
    pub fn overspeed_interval(mut self, interval: Duration) -> Self {
        self.overspeed_interval = interval;
        self
    }

    /// Set the quiet time that ends a frame.
    pub fn bit_gap(mut self, gap: Duration) -> Self {
        self.bit_gap = gap;
        self
    }

    /// Set the installed card reader's frame width.
    pub fn card_bits(mut self, bits: u32) -> Self {
        self.card_bits = bits;
        self
    }

    /// Replace the recognized frame layouts.
    pub fn frame_layouts(mut self, layouts: Vec<FrameLayout>) -> Self {
        self.frame_layouts = layouts;
        self
    }

    /// Layout for the installed card reader.
    #[must_use]
    pub fn card_layout(&self) -> Option<&FrameLayout> {
        self.frame_layouts.iter().find(|l| l.bits == self.card_bits)
    }

    /// Check every value, failing on the first one that is out of range.
    ///
    /// # Errors
    /// Returns `Error::InvalidDelimiter`, `Error::InvalidFrameLayout` or
    /// `Error::Config` describing the offending value.
    pub fn validate(&self) -> Result<()> {
        if !ALLOWED_DELIMITERS.contains(&self.delimiter) {
            return Err(Error::InvalidDelimiter(self.delimiter));
        }
        if self.keypad_timeout.is_zero() {
            return Err(Error::config("keypad timeout must be greater than zero"));
        }
        if self.keystroke_bits == 0 || self.keystroke_bits > MAX_FRAME_BITS {
            return Err(Error::config(format!(
                "keystroke width must be 1-{MAX_FRAME_BITS} bits, got {}",
                self.keystroke_bits
            )));
        }
        if self.brute_force_attempts == 0 {
            return Err(Error::config("brute-force attempts must be at least 1"));
        }
        if self.brute_force_window.is_zero() {
            return Err(Error::config("brute-force window must be greater than zero"));
        }
        if self.lockout_duration.is_zero() {
            return Err(Error::config("lockout duration must be greater than zero"));
        }
        if self.overspeed_interval >= Duration::from_secs_f64(MAX_OVERSPEED_SECS) {
            return Err(Error::config(format!(
                "overspeed interval must be under {MAX_OVERSPEED_SECS}s, got {:?}",
                self.overspeed_interval
            )));
        }
        if self.bit_gap.is_zero() {
            return Err(Error::config("bit gap must be greater than zero"));
        }

        let mut widths = HashSet::new();
        for layout in &self.frame_layouts {
            layout.validate()?;
            if layout.bits == self.keystroke_bits {
                return Err(Error::frame_layout(
                    layout.bits,
                    "width is reserved for keystrokes",
                ));
            }
            if !widths.insert(layout.bits) {
                return Err(Error::frame_layout(layout.bits, "configured more than once"));
            }
        }
        if self.card_layout().is_none() {
            return Err(Error::config(format!(
                "card reader width {} has no frame layout",
                self.card_bits
            )));
        }

        Ok(())
    }
}

/// Keypad and lockout section of [`Settings`].
///
/// Accepts the key names used by older settings files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputHandling {
    pub delimiter: char,

    #[serde(alias = "timeOut")]
    pub keypad_timeout_secs: f64,

    #[serde(alias = "bruteForceThresholdAttempts")]
    pub brute_force_attempts: usize,

    #[serde(alias = "bruteForceThresholdTime")]
    pub brute_force_window_secs: f64,

    #[serde(alias = "bruteForceLockoutTime")]
    pub lockout_secs: f64,

    #[serde(alias = "overspeedThresholdTime")]
    pub overspeed_secs: f64,
}

impl Default for InputHandling {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            keypad_timeout_secs: DEFAULT_KEYPAD_TIMEOUT_SECS,
            brute_force_attempts: DEFAULT_BRUTE_FORCE_ATTEMPTS,
            brute_force_window_secs: DEFAULT_BRUTE_FORCE_WINDOW_SECS,
            lockout_secs: DEFAULT_LOCKOUT_SECS,
            overspeed_secs: DEFAULT_OVERSPEED_SECS,
        }
    }
}

/// File-shaped settings with a default for every missing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(alias = "inputHandling")]
    pub input_handling: InputHandling,

    #[serde(alias = "__wiegandLength")]
    pub card_bits: u32,

    pub keystroke_bits: u32,

    pub bit_gap_ms: u64,

    pub frame_layouts: Vec<FrameLayout>,
}

impl Default for Settings {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            input_handling: InputHandling::default(),
            card_bits: defaults.card_bits,
            keystroke_bits: defaults.keystroke_bits,
            bit_gap_ms: DEFAULT_BIT_GAP_MS,
            frame_layouts: defaults.frame_layouts,
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document.
    ///
    /// # Errors
    /// Returns `Error::Json` if the document is not valid JSON or a value
    /// has the wrong type.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read settings from a JSON file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read, otherwise as
    /// [`from_json`](Self::from_json).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Convert to a [`PipelineConfig`], validating every value.
    ///
    /// # Errors
    /// Returns a configuration error for negative or non-finite durations and
    /// for anything [`PipelineConfig::validate`] rejects.
    pub fn into_config(self) -> Result<PipelineConfig> {
        let input = &self.input_handling;
        let config = PipelineConfig {
            delimiter: input.delimiter,
            keypad_timeout: seconds("keypad timeout", input.keypad_timeout_secs)?,
            keystroke_bits: self.keystroke_bits,
            brute_force_attempts: input.brute_force_attempts,
            brute_force_window: seconds("brute-force window", input.brute_force_window_secs)?,
            lockout_duration: seconds("lockout duration", input.lockout_secs)?,
            overspeed_interval: seconds("overspeed interval", input.overspeed_secs)?,
            bit_gap: Duration::from_millis(self.bit_gap_ms),
            frame_layouts: self.frame_layouts,
            card_bits: self.card_bits,
        };
        config.validate()?;
        Ok(config)
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| Error::config(format!("{name} of {value}s is not a valid duration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.card_layout().unwrap().width, 8);
    }

    #[test]
    fn test_reversed_layouts() {
        let layout = FrameLayout::reversed(34);
        assert_eq!(layout.byte_order, vec![3, 2, 1, 0]);
        assert_eq!(layout.width, 8);

        let layout = FrameLayout::reversed(26);
        assert_eq!(layout.byte_order, vec![2, 1, 0]);
        assert_eq!(layout.width, 6);
    }

    #[rstest]
    #[case('#')]
    #[case('*')]
    fn test_allowed_delimiters(#[case] delimiter: char) {
        assert!(PipelineConfig::default().delimiter(delimiter).validate().is_ok());
    }

    #[rstest]
    #[case('0')]
    #[case('A')]
    #[case(' ')]
    fn test_rejected_delimiters(#[case] delimiter: char) {
        let result = PipelineConfig::default().delimiter(delimiter).validate();
        assert!(matches!(result, Err(Error::InvalidDelimiter(c)) if c == delimiter));
    }

    #[rstest]
    #[case(FrameLayout { bits: 27, byte_order: vec![2, 1, 0], width: 6 })]
    #[case(FrameLayout { bits: 34, byte_order: vec![3, 2, 1], width: 8 })]
    #[case(FrameLayout { bits: 34, byte_order: vec![3, 3, 1, 0], width: 8 })]
    #[case(FrameLayout { bits: 34, byte_order: vec![4, 2, 1, 0], width: 8 })]
    #[case(FrameLayout { bits: 34, byte_order: vec![3, 2, 1, 0], width: 9 })]
    #[case(FrameLayout { bits: 34, byte_order: vec![3, 2, 1, 0], width: 0 })]
    #[case(FrameLayout { bits: 2, byte_order: vec![], width: 1 })]
    #[case(FrameLayout { bits: 74, byte_order: (0..9).collect(), width: 8 })]
    fn test_rejected_layouts(#[case] layout: FrameLayout) {
        let bits = layout.bits;
        let result = layout.validate();
        assert!(matches!(result, Err(Error::InvalidFrameLayout { bits: b, .. }) if b == bits));
    }

    #[test]
    fn test_duplicate_layout_rejected() {
        let config = PipelineConfig::default().frame_layouts(vec![
            FrameLayout::reversed(34),
            FrameLayout::reversed(34),
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_card_bits_must_have_layout() {
        let config = PipelineConfig::default().card_bits(42);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[rstest]
    #[case(PipelineConfig::default().brute_force(0, Duration::from_secs(20)))]
    #[case(PipelineConfig::default().brute_force(3, Duration::ZERO))]
    #[case(PipelineConfig::default().lockout_duration(Duration::ZERO))]
    #[case(PipelineConfig::default().keypad_timeout(Duration::ZERO))]
    #[case(PipelineConfig::default().overspeed_interval(Duration::from_secs(2)))]
    #[case(PipelineConfig::default().bit_gap(Duration::ZERO))]
    fn test_rejected_thresholds(#[case] config: PipelineConfig) {
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_settings_defaults_from_empty_document() {
        let config = Settings::from_json("{}").unwrap().into_config().unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_settings_accept_legacy_keys() {
        let json = r#"{
            "__wiegandLength": 26,
            "inputHandling": {
                "delimiter": "*",
                "timeOut": 8,
                "bruteForceThresholdAttempts": 5,
                "bruteForceThresholdTime": 30,
                "bruteForceLockoutTime": 120
            }
        }"#;
        let config = Settings::from_json(json).unwrap().into_config().unwrap();
        assert_eq!(config.delimiter, '*');
        assert_eq!(config.keypad_timeout, Duration::from_secs(8));
        assert_eq!(config.brute_force_attempts, 5);
        assert_eq!(config.brute_force_window, Duration::from_secs(30));
        assert_eq!(config.lockout_duration, Duration::from_secs(120));
        assert_eq!(config.card_bits, 26);
        assert_eq!(config.card_layout().unwrap().width, 6);
    }

    #[test]
    fn test_settings_negative_duration_rejected() {
        let json = r#"{ "input_handling": { "keypad_timeout_secs": -1.0 } }"#;
        let result = Settings::from_json(json).unwrap().into_config();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_settings_invalid_delimiter_rejected() {
        let json = r#"{ "inputHandling": { "delimiter": "5" } }"#;
        let result = Settings::from_json(json).unwrap().into_config();
        assert!(matches!(result, Err(Error::InvalidDelimiter('5'))));
    }

    #[test]
    fn test_settings_wrong_type_is_json_error() {
        let result = Settings::from_json(r#"{ "keystroke_bits": "four" }"#);
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn test_missing_settings_file_is_io_error() {
        let result = Settings::from_path("/nonexistent/doorman/settings.json");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
