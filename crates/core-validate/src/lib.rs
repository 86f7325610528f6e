//! Boundary sanitization for peer-supplied surrounding-text state.
//!
//! The display-server peer sends a surrounding-text buffer together with
//! cursor and anchor byte offsets. All three arrive straight off the wire:
//! the offsets may be any representable `u32` (including values above
//! `i32::MAX`) and the text may be arbitrarily large. This crate renders
//! them safe to use as indices into the buffer:
//!
//! * each offset is clamped to the text length, independently of the other;
//! * text larger than [`MAX_SURROUNDING_TEXT_BYTES`] marks the whole event
//!   invalid (the clamped offsets are still computed and well formed).
//!
//! Every comparison between an offset and the text length happens in `u64`.
//! A narrowing to a signed 32-bit value at any intermediate step would turn
//! large wire offsets negative and defeat the bounds check; the regression
//! test `clamps_offset_that_wraps_signed_range` pins the exact wire value
//! that once slipped through that way.
//!
//! The functions here are pure and total: no error type, no panic, no read
//! of the buffer contents. Diagnostics go through an injected
//! [`ValidationHooks`] sink so callers and tests choose where they land.

use tracing::warn;

/// Upper bound on accepted surrounding text. Normal surrounding text is
/// well under 100 KiB; anything above this is treated as a hostile or
/// corrupt event rather than clamped.
pub const MAX_SURROUNDING_TEXT_BYTES: u32 = 1024 * 1024;

/// Which offset field a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionField {
    Cursor,
    Anchor,
}

impl PositionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionField::Cursor => "cursor",
            PositionField::Anchor => "anchor",
        }
    }
}

impl std::fmt::Display for PositionField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sanitized surrounding-text positions.
///
/// `cursor` and `anchor` are always within `[0, text_len]`. `valid` records
/// only the size-guard outcome; callers must drop the entire event when it
/// is `false` and may index the same buffer with the offsets when `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurroundingTextValidation {
    pub valid: bool,
    pub cursor: u32,
    pub anchor: u32,
}

/// Diagnostic sink invoked by the validator. Implementations must not
/// block; emission is fire-and-forget and never fails the validation call.
pub trait ValidationHooks {
    /// An offset exceeded the text length and was reduced to `bound`.
    fn on_position_clamped(&self, _field: PositionField, _original: u32, _bound: u32) {}
    /// The text exceeded [`MAX_SURROUNDING_TEXT_BYTES`]; the event will be
    /// flagged invalid.
    fn on_oversized_text(&self, _size_bytes: u64) {}
}

/// Sink that swallows all diagnostics.
pub struct NoopValidationHooks;

impl ValidationHooks for NoopValidationHooks {}

/// Default sink emitting structured `warn` events on the `wire.surrounding`
/// target.
pub struct TracingValidationHooks;

impl ValidationHooks for TracingValidationHooks {
    fn on_position_clamped(&self, field: PositionField, original: u32, bound: u32) {
        warn!(
            target: "wire.surrounding",
            field = field.as_str(),
            original,
            bound,
            "position_clamped"
        );
    }

    fn on_oversized_text(&self, size_bytes: u64) {
        warn!(
            target: "wire.surrounding",
            size_bytes,
            limit = MAX_SURROUNDING_TEXT_BYTES,
            "surrounding_text_oversized"
        );
    }
}

/// Size guard: `false` iff `size_bytes` strictly exceeds
/// [`MAX_SURROUNDING_TEXT_BYTES`]. A size exactly at the limit is valid.
pub fn within_size_limit(size_bytes: u64) -> bool {
    size_bytes <= u64::from(MAX_SURROUNDING_TEXT_BYTES)
}

/// Clamp one offset to `text_len`, reporting through `hooks` only when the
/// value actually changed.
///
/// The comparison is performed in `u64`; `offset` is never narrowed to a
/// signed type, so wire values above `i32::MAX` compare correctly.
pub fn clamp_position(
    field: PositionField,
    offset: u32,
    text_len: u64,
    hooks: &dyn ValidationHooks,
) -> u32 {
    if u64::from(offset) <= text_len {
        return offset;
    }
    // text_len < offset <= u32::MAX here, so the narrowing is lossless.
    let bound = text_len as u32;
    hooks.on_position_clamped(field, offset, bound);
    bound
}

/// Validate one surrounding-text event.
///
/// Both offsets are always clamped, each against the text length and
/// independently of the other; the size guard never short-circuits the
/// clamping. Idempotent: feeding the returned offsets back in with the same
/// text yields them unchanged.
pub fn validate_surrounding_text(
    text: &[u8],
    cursor: u32,
    anchor: u32,
    hooks: &dyn ValidationHooks,
) -> SurroundingTextValidation {
    let text_len = text.len() as u64;
    let cursor = clamp_position(PositionField::Cursor, cursor, text_len, hooks);
    let anchor = clamp_position(PositionField::Anchor, anchor, text_len, hooks);
    let valid = within_size_limit(text_len);
    if !valid {
        hooks.on_oversized_text(text_len);
    }
    SurroundingTextValidation {
        valid,
        cursor,
        anchor,
    }
}

/// Convenience wrapper using [`TracingValidationHooks`].
pub fn validate(text: &[u8], cursor: u32, anchor: u32) -> SurroundingTextValidation {
    validate_surrounding_text(text, cursor, anchor, &TracingValidationHooks)
}
