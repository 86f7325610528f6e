//! Event types and channel helpers for the imkit runtime.
//!
//! The dispatch loop consumes [`Event`]s from a single bounded channel.
//! Peer events model text-input protocol state *after* decoding; wire
//! parsing and transport live outside this workspace. The raw integer
//! conversions that do appear here ([`ContentHint::from_wire`],
//! [`ContentPurpose::from_wire`]) are total: unknown bits and unknown
//! discriminants from a hostile peer degrade to neutral values instead of
//! failing.

use std::sync::atomic::AtomicU64;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

// -------------------------------------------------------------------------------------------------
// Channel Policy
// -------------------------------------------------------------------------------------------------
// The runtime uses one bounded mpsc channel sized by `EVENT_CHANNEL_CAP`. Peer traffic is bursty
// (a preedit session can emit several surrounding-text updates per keystroke) but each event is
// small; the cap bounds memory while leaving ample headroom for bursts. Producers are async tasks
// using `send().await`, so a full channel applies backpressure to the source rather than dropping
// events. `CHANNEL_SEND_FAILURES` counts sends against a closed channel (consumer gone).
// -------------------------------------------------------------------------------------------------
pub const EVENT_CHANNEL_CAP: usize = 1024;

// -------------------------------------------------------------------------------------------------
// Telemetry
// -------------------------------------------------------------------------------------------------
// Atomic counters, relaxed ordering, no locking. Inspected in unit tests and logged periodically
// by the runtime; a metrics exporter can pick them up later without changing call sites.
// -------------------------------------------------------------------------------------------------
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
/// Surrounding-text events observed by the context (accepted or not).
pub static SURROUNDING_EVENTS: AtomicU64 = AtomicU64::new(0);
/// Surrounding-text events discarded because the payload exceeded the size limit.
pub static SURROUNDING_DROPPED_OVERSIZED: AtomicU64 = AtomicU64::new(0);
/// Individual cursor/anchor fields reduced to the text bound.
pub static SURROUNDING_POSITIONS_CLAMPED: AtomicU64 = AtomicU64::new(0);

/// Top-level event enum consumed by the central dispatch loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// Decoded state from the display-server peer.
    Peer(PeerEvent),
    Command(CommandEvent),
    /// Periodic monotonic tick used for housekeeping (telemetry flush,
    /// ephemeral expiry) without busy polling.
    Tick,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum CommandEvent {
    Quit,
}

/// Text-input protocol state, already decoded off the wire.
///
/// Integer fields are untrusted: `SurroundingText` offsets may be any
/// representable `u32` and must pass through `core-validate` before use.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Editable text around the caret plus cursor/anchor byte offsets.
    SurroundingText {
        text: String,
        cursor: u32,
        anchor: u32,
    },
    /// Content hint bitmask and purpose for the focused field.
    ContentType {
        hint: ContentHint,
        purpose: ContentPurpose,
    },
    /// Peer asked for all pending input state to be dropped.
    Reset,
    /// An editable field gained focus.
    Activate,
    /// Focus left the editable field; peer-supplied state is stale.
    Deactivate,
}

bitflags::bitflags! {
    /// Behaviour hints for the focused field, mirroring the wire bitmask.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ContentHint: u32 {
        const COMPLETION          = 0x1;
        const SPELLCHECK          = 0x2;
        const AUTO_CAPITALIZATION = 0x4;
        const LOWERCASE           = 0x8;
        const UPPERCASE           = 0x10;
        const TITLECASE           = 0x20;
        const HIDDEN_TEXT         = 0x40;
        const SENSITIVE_DATA      = 0x80;
        const LATIN               = 0x100;
        const MULTILINE           = 0x200;
    }
}

impl ContentHint {
    /// Decode the wire bitmask, dropping bits this version does not know.
    pub fn from_wire(raw: u32) -> Self {
        Self::from_bits_truncate(raw)
    }

    /// Hints that mark the field content as unsuitable for logging or
    /// prediction dictionaries.
    pub fn is_sensitive(&self) -> bool {
        self.intersects(Self::HIDDEN_TEXT | Self::SENSITIVE_DATA)
    }
}

/// Semantic purpose of the focused field, mirroring the wire enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentPurpose {
    #[default]
    Normal,
    Alpha,
    Digits,
    Number,
    Phone,
    Url,
    Email,
    Name,
    Password,
    Date,
    Time,
    Datetime,
    Terminal,
}

impl ContentPurpose {
    /// Decode the wire discriminant. Unknown values (newer protocol
    /// revisions, hostile peers) degrade to `Normal`.
    pub fn from_wire(raw: u32) -> Self {
        match raw {
            0 => Self::Normal,
            1 => Self::Alpha,
            2 => Self::Digits,
            3 => Self::Number,
            4 => Self::Phone,
            5 => Self::Url,
            6 => Self::Email,
            7 => Self::Name,
            8 => Self::Password,
            9 => Self::Date,
            10 => Self::Time,
            11 => Self::Datetime,
            12 => Self::Terminal,
            _ => Self::Normal,
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Event Transform Hooks
// -------------------------------------------------------------------------------------------------
/// Optional hooks that can observe events at the loop boundary. Hooks must
/// not block; the loop calls them inline.
pub trait EventHooks: Send + Sync + 'static {
    fn pre_handle(&self, _event: &Event) {}
    fn post_handle(&self, _event: &Event) {}
}

/// Default no-op hooks implementation.
pub struct NoopEventHooks;

impl EventHooks for NoopEventHooks {}

// -------------------------------------------------------------------------------------------------
// Async Event Sources
// -------------------------------------------------------------------------------------------------
/// Trait implemented by any async event producer. Implementors usually hold
/// configuration and spawn one background task that pushes [`Event`]s into
/// the shared channel. A connection crate registers its peer source here the
/// same way the built-in tick source does.
pub trait AsyncEventSource: Send + 'static {
    /// Stable identifier used for logging and diagnostics.
    fn name(&self) -> &'static str;
    /// Consume self and spawn the background task. Implementors stop when
    /// `tx.send(..).await` returns Err (channel closed) or on their own
    /// internal stop condition, and avoid busy loops by awaiting timers or
    /// external IO futures.
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()>;
}

/// Registry of event sources, spawned together at startup.
pub struct EventSourceRegistry {
    sources: Vec<Box<dyn AsyncEventSource>>,
}

impl Default for EventSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register<S: AsyncEventSource>(&mut self, src: S) {
        self.sources.push(Box::new(src));
    }

    /// Spawn all registered sources, returning their JoinHandles. Sources
    /// are drained so a second call spawns nothing. During shutdown the
    /// caller drops its final `Sender` clone before awaiting the handles so
    /// the sources observe the closed channel and exit cooperatively.
    pub fn spawn_all(&mut self, tx: &Sender<Event>) -> Vec<JoinHandle<()>> {
        let mut out = Vec::with_capacity(self.sources.len());
        for src in self.sources.drain(..) {
            let name = src.name();
            tracing::info!(target: "runtime.events", source = name, "spawning event source");
            out.push(src.spawn(tx.clone()));
        }
        out
    }
}

/// Built-in monotonic tick source. Emits [`Event::Tick`] every configured
/// interval until the channel closes.
pub struct TickEventSource {
    interval: std::time::Duration,
}

impl TickEventSource {
    pub fn new(interval: std::time::Duration) -> Self {
        Self { interval }
    }
}

impl AsyncEventSource for TickEventSource {
    fn name(&self) -> &'static str {
        "tick"
    }
    fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
        let dur = self.interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(dur);
            loop {
                interval.tick().await;
                if tx.send(Event::Tick).await.is_err() {
                    break;
                }
            }
        })
    }
}

/// Helper result type for channel plumbing in higher layers.
pub type EventResult<T> = anyhow::Result<T>;


#[cfg(test)]
mod tests_async_sources {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct MockResetSource {
        emitted: bool,
    }

    impl MockResetSource {
        fn new() -> Self {
            Self { emitted: false }
        }
    }

    impl AsyncEventSource for MockResetSource {
        fn name(&self) -> &'static str {
            "mock_reset"
        }
        fn spawn(mut self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
            tokio::spawn(async move {
                if !self.emitted {
                    let _ = tx.send(Event::Peer(PeerEvent::Reset)).await;
                    self.emitted = true;
                }
            })
        }
    }

    #[tokio::test]
    async fn registry_spawns_and_emits() {
        let (tx, mut rx) = mpsc::channel::<Event>(8);
        let mut reg = EventSourceRegistry::new();
        reg.register(MockResetSource::new());
        reg.register(TickEventSource::new(Duration::from_millis(10)));
        let handles = reg.spawn_all(&tx);

        let mut got_reset = false;
        let mut got_tick = false;
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(100) && (!got_reset || !got_tick) {
            if let Ok(Some(ev)) = tokio::time::timeout(Duration::from_millis(5), rx.recv()).await {
                match ev {
                    Event::Peer(PeerEvent::Reset) => got_reset = true,
                    Event::Tick => got_tick = true,
                    _ => {}
                }
            }
        }
        assert!(got_reset, "expected mock source to produce a reset event");
        assert!(got_tick, "expected tick source to emit tick events");

        drop(tx);
        drop(rx);
        for handle in handles {
            let _ = tokio::time::timeout(Duration::from_millis(20), handle).await;
        }
    }

    struct MockCloseSource {
        flag: Arc<AtomicBool>,
    }

    impl MockCloseSource {
        fn new(flag: Arc<AtomicBool>) -> Self {
            Self { flag }
        }
    }

    impl AsyncEventSource for MockCloseSource {
        fn name(&self) -> &'static str {
            "mock_close"
        }

        fn spawn(self: Box<Self>, tx: Sender<Event>) -> JoinHandle<()> {
            let flag = self.flag;
            tokio::spawn(async move {
                tx.closed().await;
                flag.store(true, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn registry_sources_exit_on_channel_drop() {
        let (tx, rx) = mpsc::channel::<Event>(8);
        let mut reg = EventSourceRegistry::new();
        let flag = Arc::new(AtomicBool::new(false));
        reg.register(MockCloseSource::new(flag.clone()));
        let handles = reg.spawn_all(&tx);

        drop(tx);
        drop(rx);

        for handle in handles {
            match tokio::time::timeout(Duration::from_millis(50), handle).await {
                Ok(join_res) => join_res.expect("source task should exit cleanly"),
                Err(_) => panic!("source task did not observe channel closure"),
            }
        }

        assert!(flag.load(Ordering::SeqCst));
    }
}
