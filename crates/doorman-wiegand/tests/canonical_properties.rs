//! Property-based tests for frame canonicalization.
//!
//! These tests use proptest to check that the canonicalizer is total over
//! arbitrary frames and that the byte reordering loses nothing but parity.

use doorman_core::{BitFrame, PipelineConfig};
use doorman_wiegand::{FrameCanonicalizer, Rejection, Routed};
use proptest::prelude::*;

fn canonicalizer() -> FrameCanonicalizer {
    FrameCanonicalizer::new(&PipelineConfig::default()).expect("default config is valid")
}

/// Widths that are neither a configured card layout nor a keystroke.
fn unknown_width() -> impl Strategy<Value = u32> {
    (0u32..=128).prop_filter("configured widths", |bits| ![4, 26, 34].contains(bits))
}

proptest! {
    /// Property: unknown widths are always rejected, never panic.
    #[test]
    fn prop_unknown_widths_rejected(bits in unknown_width(), value in any::<u64>()) {
        let frame = BitFrame::new(bits, value);
        let c = canonicalizer();
        prop_assert_eq!(c.canonicalize(frame), Err(Rejection::UnknownWidth { bits }));
        prop_assert_eq!(c.route(frame), Routed::Rejected(Rejection::UnknownWidth { bits }));
    }

    /// Property: any 34-bit frame canonicalizes, and re-encoding the token
    /// reproduces the frame's data bits.
    #[test]
    fn prop_34_bit_reorder_is_reversible(value in 0u64..(1 << 34)) {
        let c = canonicalizer();
        let frame = BitFrame::new(34, value);
        let token = c.canonicalize(frame).unwrap();
        prop_assert_eq!(token.as_str().len(), 8);

        let encoded = c.encode(34, token.as_str()).unwrap();
        let data_mask = ((1u64 << 32) - 1) << 1;
        prop_assert_eq!(encoded.value & data_mask, value & data_mask);
    }

    /// Property: same for 26-bit frames.
    #[test]
    fn prop_26_bit_reorder_is_reversible(value in 0u64..(1 << 26)) {
        let c = canonicalizer();
        let frame = BitFrame::new(26, value);
        let token = c.canonicalize(frame).unwrap();
        prop_assert_eq!(token.as_str().len(), 6);

        let encoded = c.encode(26, token.as_str()).unwrap();
        let data_mask = ((1u64 << 24) - 1) << 1;
        prop_assert_eq!(encoded.value & data_mask, value & data_mask);
    }

    /// Property: encoding a UID and canonicalizing it gives the UID back.
    #[test]
    fn prop_uid_roundtrip(uid in any::<u32>()) {
        let c = canonicalizer();
        let hex = format!("{uid:08X}");
        let frame = c.encode(34, &hex).unwrap();
        let token = c.canonicalize(frame).unwrap();
        prop_assert_eq!(token.as_str(), hex.as_str());
    }
}
