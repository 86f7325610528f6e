//! Input-context state assembled from validated peer events.
//!
//! `InputContext` is the consumer side of the wire boundary: every
//! surrounding-text update passes through `core-validate` before any field
//! is stored, so the held cursor/anchor are always within the held text.
//! Oversized payloads are discarded wholesale; the context keeps its
//! previous state in that case.
//!
//! Text content is never logged from here, only byte lengths, so fields
//! carrying `ContentHint::HIDDEN_TEXT` or `SENSITIVE_DATA` cannot leak
//! through diagnostics.

use std::sync::atomic::Ordering;

use core_events::{
    ContentHint, ContentPurpose, PeerEvent, SURROUNDING_DROPPED_OVERSIZED, SURROUNDING_EVENTS,
    SURROUNDING_POSITIONS_CLAMPED,
};
use core_validate::{
    PositionField, TracingValidationHooks, ValidationHooks, validate_surrounding_text,
};
use tracing::{debug, trace};

/// Validation sink used by the context: structured warn logs plus the
/// workspace telemetry counter for clamped fields.
struct ContextValidationHooks;

impl ValidationHooks for ContextValidationHooks {
    fn on_position_clamped(&self, field: PositionField, original: u32, bound: u32) {
        SURROUNDING_POSITIONS_CLAMPED.fetch_add(1, Ordering::Relaxed);
        TracingValidationHooks.on_position_clamped(field, original, bound);
    }

    fn on_oversized_text(&self, size_bytes: u64) {
        TracingValidationHooks.on_oversized_text(size_bytes);
    }
}

/// Per-seat input context holding the last accepted peer state.
#[derive(Debug, Default, Clone)]
pub struct InputContext {
    active: bool,
    surrounding_text: String,
    cursor: u32,
    anchor: u32,
    content_hint: ContentHint,
    content_purpose: ContentPurpose,
}

impl InputContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one decoded peer event. Returns whether any state changed.
    pub fn apply(&mut self, event: PeerEvent) -> bool {
        match event {
            PeerEvent::SurroundingText {
                text,
                cursor,
                anchor,
            } => self.apply_surrounding_text(text, cursor, anchor),
            PeerEvent::ContentType { hint, purpose } => self.set_content_type(hint, purpose),
            PeerEvent::Reset => {
                self.reset();
                true
            }
            PeerEvent::Activate => {
                let was_active = self.active;
                self.active = true;
                !was_active
            }
            PeerEvent::Deactivate => {
                let was_active = self.active;
                self.active = false;
                self.reset();
                was_active
            }
        }
    }

    /// Validate and store a surrounding-text update.
    ///
    /// Returns `false` and leaves all state untouched when the payload is
    /// oversized; the whole event is discarded, not partially applied.
    pub fn apply_surrounding_text(&mut self, text: String, cursor: u32, anchor: u32) -> bool {
        SURROUNDING_EVENTS.fetch_add(1, Ordering::Relaxed);
        let validation =
            validate_surrounding_text(text.as_bytes(), cursor, anchor, &ContextValidationHooks);
        if !validation.valid {
            SURROUNDING_DROPPED_OVERSIZED.fetch_add(1, Ordering::Relaxed);
            debug!(
                target: "context",
                size_bytes = text.len(),
                "surrounding_text_discarded"
            );
            return false;
        }
        self.surrounding_text = text;
        self.cursor = validation.cursor;
        self.anchor = validation.anchor;
        debug_assert!(self.cursor as usize <= self.surrounding_text.len());
        debug_assert!(self.anchor as usize <= self.surrounding_text.len());
        trace!(
            target: "context",
            size_bytes = self.surrounding_text.len(),
            cursor = self.cursor,
            anchor = self.anchor,
            "surrounding_text_applied"
        );
        true
    }

    /// Store the focused field's content type. Returns whether it changed.
    pub fn set_content_type(&mut self, hint: ContentHint, purpose: ContentPurpose) -> bool {
        let changed = self.content_hint != hint || self.content_purpose != purpose;
        self.content_hint = hint;
        self.content_purpose = purpose;
        if changed {
            trace!(
                target: "context",
                hint = hint.bits(),
                purpose = ?purpose,
                "content_type_changed"
            );
        }
        changed
    }

    /// Drop all peer-supplied state. The active flag is left as is; focus
    /// changes arrive as separate events.
    pub fn reset(&mut self) {
        self.surrounding_text.clear();
        self.cursor = 0;
        self.anchor = 0;
        self.content_hint = ContentHint::empty();
        self.content_purpose = ContentPurpose::Normal;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn surrounding_text(&self) -> &str {
        &self.surrounding_text
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn anchor(&self) -> u32 {
        self.anchor
    }

    pub fn content_hint(&self) -> ContentHint {
        self.content_hint
    }

    pub fn content_purpose(&self) -> ContentPurpose {
        self.content_purpose
    }

    pub fn has_selection(&self) -> bool {
        self.cursor != self.anchor
    }

    /// Selected text between anchor and cursor, in either order. `None`
    /// when either offset falls inside a multi-byte sequence (the peer may
    /// legally send offsets on any byte).
    pub fn selection(&self) -> Option<&str> {
        let start = self.cursor.min(self.anchor) as usize;
        let end = self.cursor.max(self.anchor) as usize;
        self.surrounding_text.get(start..end)
    }

    /// Text strictly before the cursor, `None` off a UTF-8 boundary.
    pub fn before_cursor(&self) -> Option<&str> {
        self.surrounding_text.get(..self.cursor as usize)
    }

    /// Text from the cursor to the end, `None` off a UTF-8 boundary.
    pub fn after_cursor(&self) -> Option<&str> {
        self.surrounding_text.get(self.cursor as usize..)
    }
}
