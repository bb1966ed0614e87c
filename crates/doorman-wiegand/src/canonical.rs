//! Frame canonicalization.
//!
//! Turns a decoded [`BitFrame`] into the hex token used for credential
//! lookup. Frames whose width matches the keypad keystroke width are routed
//! to the keypad instead; every other unknown width is rejected.
//!
//! # Card transform
//!
//! For a layout of `bits` total bits:
//!
//! 1. drop the leading and trailing parity bit,
//! 2. split the remaining bits into bytes, first received byte first,
//! 3. re-emit the bytes in the layout's `byte_order`,
//! 4. render as upper-case hex, keeping the trailing `width` characters.
//!
//! ```
//! use doorman_core::{BitFrame, PipelineConfig};
//! use doorman_wiegand::FrameCanonicalizer;
//!
//! let canonicalizer = FrameCanonicalizer::new(&PipelineConfig::default()).unwrap();
//!
//! // UID 04:A2:19:7B arrives least significant byte first.
//! let frame = canonicalizer.encode(34, "04A2197B").unwrap();
//! let token = canonicalizer.canonicalize(frame).unwrap();
//! assert_eq!(token.as_str(), "04A2197B");
//! ```

use doorman_core::{
    BitFrame, CanonicalToken, FrameLayout, PipelineConfig, Result, constants::PARITY_BITS,
};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Why a frame did not produce a card token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// No layout is configured for this width.
    UnknownWidth { bits: u32 },
    /// The frame is a keypad keystroke, not a card.
    Keystroke,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::UnknownWidth { bits } => write!(f, "unrecognized {bits}-bit frame"),
            Rejection::Keystroke => write!(f, "keystroke frame"),
        }
    }
}

/// Where a decoded frame goes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Keystroke value for the keypad session.
    Keystroke(u64),
    /// Card token for the lockout gate and credential lookup.
    Card(CanonicalToken),
    /// Unusable frame; logged and dropped.
    Rejected(Rejection),
}

/// Applies the configured per-width transforms to decoded frames.
#[derive(Debug, Clone)]
pub struct FrameCanonicalizer {
    layouts: HashMap<u32, FrameLayout>,
    keystroke_bits: u32,
}

impl FrameCanonicalizer {
    /// Build a canonicalizer from a configuration.
    ///
    /// # Errors
    /// Returns the configuration error if `config` does not validate.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            layouts: config
                .frame_layouts
                .iter()
                .map(|layout| (layout.bits, layout.clone()))
                .collect(),
            keystroke_bits: config.keystroke_bits,
        })
    }

    /// Decide whether a frame is a keystroke, a card or garbage.
    pub fn route(&self, frame: BitFrame) -> Routed {
        if frame.bit_count == self.keystroke_bits {
            return Routed::Keystroke(frame.value);
        }
        match self.canonicalize(frame) {
            Ok(token) => Routed::Card(token),
            Err(rejection) => {
                warn!(bits = frame.bit_count, value = frame.value, %rejection, "frame rejected");
                Routed::Rejected(rejection)
            }
        }
    }

    /// Transform a card frame into its canonical token.
    ///
    /// # Errors
    /// Returns a [`Rejection`] for keystroke frames and unrecognized widths.
    pub fn canonicalize(&self, frame: BitFrame) -> std::result::Result<CanonicalToken, Rejection> {
        if frame.bit_count == self.keystroke_bits {
            return Err(Rejection::Keystroke);
        }
        let layout = self
            .layouts
            .get(&frame.bit_count)
            .ok_or(Rejection::UnknownWidth {
                bits: frame.bit_count,
            })?;

        let chunks = layout.chunks();
        let data = strip_parity(frame.value, layout.bits);
        let reordered = layout.byte_order.iter().fold(0u64, |acc, &index| {
            let shift = 8 * (chunks - 1 - index);
            (acc << 8) | ((data >> shift) & 0xFF)
        });

        let full = format!("{:0width$X}", reordered, width = chunks * 2);
        let token = full[full.len() - layout.width..].to_string();
        debug!(bits = frame.bit_count, token = %token, "card frame canonicalized");
        Ok(CanonicalToken::card(token))
    }

    /// Build the frame a reader of the given width sends for a card token.
    ///
    /// This is the inverse of [`canonicalize`](Self::canonicalize) for
    /// layouts that render every data byte. Parity bits are computed the
    /// usual Wiegand way: even parity over the first half of the data bits,
    /// odd parity over the second half.
    ///
    /// Returns `None` for unknown widths or tokens that are not hex or do not
    /// fit the layout.
    #[must_use]
    pub fn encode(&self, bits: u32, token: &str) -> Option<BitFrame> {
        let layout = self.layouts.get(&bits)?;
        let chunks = layout.chunks();
        if token.is_empty() || token.len() > layout.width {
            return None;
        }
        let reordered = u64::from_str_radix(token, 16).ok()?;

        let mut bytes = vec![0u64; chunks];
        for (position, &index) in layout.byte_order.iter().enumerate() {
            let shift = 8 * (chunks - 1 - position);
            bytes[index] = (reordered >> shift) & 0xFF;
        }
        let data = bytes.iter().fold(0u64, |acc, byte| (acc << 8) | byte);

        let data_bits = bits - PARITY_BITS;
        let half = data_bits / 2;
        let leading_ones = (data >> (data_bits - half)).count_ones();
        let trailing_ones = (data & low_mask(data_bits - half)).count_ones();
        let leading = u64::from(leading_ones % 2 == 1);
        let trailing = u64::from(trailing_ones % 2 == 0);

        let value = (leading << (bits - 1)) | (data << 1) | trailing;
        Some(BitFrame::new(bits, value))
    }
}

/// Remove the trailing and leading parity bits of a `bits`-wide frame.
fn strip_parity(value: u64, bits: u32) -> u64 {
    (value >> 1) & low_mask(bits - PARITY_BITS)
}

fn low_mask(bits: u32) -> u64 {
    if bits >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}
