//! Property-based tests for the surrounding-text validator invariants.

use core_validate::{
    NoopValidationHooks, PositionField, clamp_position, validate_surrounding_text,
    within_size_limit,
};
use proptest::prelude::*;

proptest! {
    // Clamped offsets never exceed the text length.
    #[test]
    fn clamp_stays_in_bounds(text in proptest::collection::vec(any::<u8>(), 0..512), cursor: u32, anchor: u32) {
        let r = validate_surrounding_text(&text, cursor, anchor, &NoopValidationHooks);
        prop_assert!(r.cursor as usize <= text.len());
        prop_assert!(r.anchor as usize <= text.len());
    }

    // Clamping is non-increasing.
    #[test]
    fn clamp_is_monotonic(offset: u32, text_len in 0u64..4096) {
        let clamped = clamp_position(PositionField::Cursor, offset, text_len, &NoopValidationHooks);
        prop_assert!(clamped <= offset);
    }

    // An offset already within bounds passes through untouched.
    #[test]
    fn in_range_offsets_are_identity(text_len in 1u64..4096, frac: u64) {
        let offset = (frac % (text_len + 1)) as u32;
        let clamped = clamp_position(PositionField::Anchor, offset, text_len, &NoopValidationHooks);
        prop_assert_eq!(clamped, offset);
    }

    // Validity depends only on the text size, never on the offsets.
    #[test]
    fn validity_ignores_offsets(text in proptest::collection::vec(any::<u8>(), 0..512), cursor: u32, anchor: u32) {
        let r = validate_surrounding_text(&text, cursor, anchor, &NoopValidationHooks);
        prop_assert_eq!(r.valid, within_size_limit(text.len() as u64));
    }

    // Re-validating the produced offsets against the same text is a fixpoint.
    #[test]
    fn validation_is_idempotent(text in proptest::collection::vec(any::<u8>(), 0..512), cursor: u32, anchor: u32) {
        let first = validate_surrounding_text(&text, cursor, anchor, &NoopValidationHooks);
        let second = validate_surrounding_text(&text, first.cursor, first.anchor, &NoopValidationHooks);
        prop_assert_eq!(first, second);
    }

    // The two fields are clamped independently: swapping inputs swaps outputs.
    #[test]
    fn fields_clamp_independently(text in proptest::collection::vec(any::<u8>(), 0..512), a: u32, b: u32) {
        let ab = validate_surrounding_text(&text, a, b, &NoopValidationHooks);
        let ba = validate_surrounding_text(&text, b, a, &NoopValidationHooks);
        prop_assert_eq!(ab.cursor, ba.anchor);
        prop_assert_eq!(ab.anchor, ba.cursor);
    }
}
