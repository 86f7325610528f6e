//! imkit entrypoint.
//!
//! Bootstraps logging, configuration, and display-backend detection, then
//! runs the event dispatch loop. Peer event sources (one per connection
//! transport) register through `EventSourceRegistry` exactly like the
//! built-in tick and signal sources; this binary ships only the built-ins
//! and the loop that feeds validated peer state into `InputContext`.

use anyhow::Result;
use clap::Parser;
use core_config::load_from;
use core_context::InputContext;
use core_events::{
    AsyncEventSource, CommandEvent, EVENT_CHANNEL_CAP, Event, EventHooks, EventSourceRegistry,
    NoopEventHooks, PeerEvent, SURROUNDING_DROPPED_OVERSIZED, SURROUNDING_EVENTS,
    SURROUNDING_POSITIONS_CLAMPED, TickEventSource,
};
use core_platform::{DisplayBackend, SystemEnvironment, detect_backend};
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "imkit", version, about = "Input-method context runtime")] // minimal metadata
struct Args {
    /// Optional configuration file path (overrides discovery of `imkit.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Display backend to use, bypassing auto-detection ("wayland", "x11", ...).
    #[arg(long = "backend")]
    pub backend: Option<String>,
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

struct RuntimeContext {
    config: core_config::Config,
    backend: Option<DisplayBackend>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn run(&mut self) -> Result<RuntimeContext> {
        self.configure_logging()?;
        Self::install_panic_hook();

        info!(target: "runtime", "startup");

        let args = Args::parse();
        let mut config = load_from(args.config.clone())?;
        config.apply_limits();

        // CLI wins over the config file; the platform layer still consults
        // its own override variable when both are absent.
        let requested = args
            .backend
            .as_deref()
            .or_else(|| config.requested_backend());
        let backend = detect_backend(&SystemEnvironment, requested);
        match &backend {
            Some(backend) => info!(
                target: "runtime.startup",
                backend = backend.as_str(),
                config_override = args.config.is_some(),
                tick_ms = config.effective_tick_ms,
                "bootstrap_complete"
            ),
            None => warn!(
                target: "runtime.startup",
                "no display backend available, running detached"
            ),
        }

        Ok(RuntimeContext { config, backend })
    }

    fn configure_logging(&mut self) -> Result<()> {
        let log_dir = Path::new(".");
        let log_path = log_dir.join("imkit.log");
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, "imkit.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        match tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .try_init()
        {
            Ok(_) => {
                self.log_guard = Some(guard);
            }
            Err(_err) => {
                // Global tracing subscriber already installed; drop guard so writer shuts down.
            }
        }

        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

/// Emits [`Event::Shutdown`] when the process receives SIGINT.
struct SignalEventSource;

impl AsyncEventSource for SignalEventSource {
    fn name(&self) -> &'static str {
        "signal"
    }

    fn spawn(self: Box<Self>, tx: mpsc::Sender<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = tx.send(Event::Shutdown).await;
                }
                Err(err) => {
                    error!(target: "runtime", ?err, "signal_listener_failed");
                }
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownReason {
    ChannelClosed,
    Quit,
    Signal,
}

impl ShutdownReason {
    fn as_str(&self) -> &'static str {
        match self {
            ShutdownReason::ChannelClosed => "channel_closed",
            ShutdownReason::Quit => "quit",
            ShutdownReason::Signal => "signal",
        }
    }
}

enum LoopControl {
    Continue,
    Break { reason: ShutdownReason },
}

struct ImRuntime {
    context: InputContext,
    backend: Option<DisplayBackend>,
    hooks: Box<dyn EventHooks>,
    rx: mpsc::Receiver<Event>,
    tx: Option<mpsc::Sender<Event>>,
    source_handles: Vec<JoinHandle<()>>,
}

impl ImRuntime {
    fn new(
        backend: Option<DisplayBackend>,
        tx: mpsc::Sender<Event>,
        rx: mpsc::Receiver<Event>,
        source_handles: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            context: InputContext::new(),
            backend,
            hooks: Box::new(NoopEventHooks),
            rx,
            tx: Some(tx),
            source_handles,
        }
    }

    async fn run(&mut self) -> Result<()> {
        let mut shutdown_reason = ShutdownReason::ChannelClosed;
        while let Some(event) = self.rx.recv().await {
            self.hooks.pre_handle(&event);

            let control = match &event {
                Event::Peer(peer) => self.handle_peer_event(peer.clone()),
                Event::Command(cmd) => self.handle_command_event(cmd),
                Event::Tick => self.handle_tick(),
                Event::Shutdown => LoopControl::Break {
                    reason: ShutdownReason::Signal,
                },
            };

            match control {
                LoopControl::Break { reason } => {
                    shutdown_reason = reason;
                    break;
                }
                LoopControl::Continue => {
                    self.hooks.post_handle(&event);
                }
            }
        }

        self.rx.close();
        self.finalize_shutdown(shutdown_reason).await;
        Ok(())
    }

    fn handle_peer_event(&mut self, event: PeerEvent) -> LoopControl {
        let changed = self.context.apply(event);
        if changed {
            trace!(
                target: "runtime.context",
                active = self.context.is_active(),
                text_len = self.context.surrounding_text().len(),
                cursor = self.context.cursor(),
                anchor = self.context.anchor(),
                "context_updated"
            );
        }
        LoopControl::Continue
    }

    fn handle_command_event(&mut self, cmd: &CommandEvent) -> LoopControl {
        match cmd {
            CommandEvent::Quit => LoopControl::Break {
                reason: ShutdownReason::Quit,
            },
        }
    }

    fn handle_tick(&mut self) -> LoopControl {
        trace!(
            target: "runtime.telemetry",
            backend = self.backend.as_ref().map(DisplayBackend::as_str),
            surrounding_events = SURROUNDING_EVENTS.load(Ordering::Relaxed),
            positions_clamped = SURROUNDING_POSITIONS_CLAMPED.load(Ordering::Relaxed),
            dropped_oversized = SURROUNDING_DROPPED_OVERSIZED.load(Ordering::Relaxed),
            "tick"
        );
        LoopControl::Continue
    }

    async fn finalize_shutdown(&mut self, reason: ShutdownReason) {
        info!(target: "runtime.shutdown", reason = reason.as_str(), "begin");
        if let Some(tx) = self.tx.take() {
            drop(tx);
        }

        while let Some(handle) = self.source_handles.pop() {
            match tokio::time::timeout(Duration::from_millis(200), handle).await {
                Ok(Ok(_)) => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event_source_task_stopped"
                ),
                Ok(Err(err)) if err.is_cancelled() => trace!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event_source_task_cancelled"
                ),
                Ok(Err(err)) => error!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    ?err,
                    "event_source_task_error"
                ),
                Err(_) => warn!(
                    target: "runtime.shutdown",
                    reason = reason.as_str(),
                    "event_source_task_timeout"
                ),
            }
        }

        info!(target: "runtime.shutdown", reason = reason.as_str(), "complete");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut startup = AppStartup::new();
    let context = startup.run()?;
    let tick_interval = context.config.effective_tick_interval();

    let (tx, rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAP);
    let mut registry = EventSourceRegistry::new();
    registry.register(TickEventSource::new(tick_interval));
    registry.register(SignalEventSource);
    let source_handles = registry.spawn_all(&tx);

    let mut runtime = ImRuntime::new(context.backend, tx, rx, source_handles);
    runtime.run().await
}
