//! Display-server backend detection.
//!
//! Detection runs once at startup and is cheap: a few environment variables
//! and at most two socket-path existence checks. All probing goes through
//! the [`Environment`] capability so tests run against a mock provider with
//! no real environment mutation.
//!
//! Decision ladder:
//! 1. an explicit request (CLI/config, else the `IMKIT_BACKEND` variable)
//!    wins; a wayland request is verified against a live display first and
//!    falls back to X11 with a warning when none is found;
//! 2. auto-detection prefers Wayland, then X11 via `DISPLAY`;
//! 3. `None` when no display server is reachable (headless).

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Read-only view of the process environment used for detection.
pub trait Environment {
    fn var(&self, name: &str) -> Option<String>;
    fn path_exists(&self, path: &Path) -> bool;
}

/// [`Environment`] backed by `std::env` and the real filesystem.
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Environment variable honoured as an explicit backend request when the
/// caller supplies none.
pub const BACKEND_OVERRIDE_VAR: &str = "IMKIT_BACKEND";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayBackend {
    Wayland,
    X11,
    /// A backend named explicitly by the user that this crate does not
    /// probe (e.g. an offscreen or test backend). Passed through as-is.
    Other(String),
}

impl DisplayBackend {
    pub fn as_str(&self) -> &str {
        match self {
            DisplayBackend::Wayland => "wayland",
            DisplayBackend::X11 => "x11",
            DisplayBackend::Other(name) => name,
        }
    }
}

impl std::fmt::Display for DisplayBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when `WAYLAND_DISPLAY` names a socket we can find.
///
/// Sockets live under `XDG_RUNTIME_DIR`, with `/tmp` as a legacy fallback.
/// `WAYLAND_DISPLAY` may also hold an absolute path.
fn wayland_display_available(env: &dyn Environment) -> bool {
    let Some(display) = env.var("WAYLAND_DISPLAY") else {
        debug!(target: "platform.detect", "WAYLAND_DISPLAY not set");
        return false;
    };

    if display.starts_with('/') {
        let path = PathBuf::from(&display);
        let found = env.path_exists(&path);
        debug!(target: "platform.detect", socket = %path.display(), found, "absolute wayland socket probe");
        return found;
    }

    if let Some(runtime_dir) = env.var("XDG_RUNTIME_DIR") {
        let socket = Path::new(&runtime_dir).join(&display);
        if env.path_exists(&socket) {
            debug!(target: "platform.detect", socket = %socket.display(), "wayland socket found");
            return true;
        }
        debug!(target: "platform.detect", socket = %socket.display(), "wayland socket not in runtime dir");
    }

    let tmp_socket = Path::new("/tmp").join(&display);
    if env.path_exists(&tmp_socket) {
        debug!(target: "platform.detect", socket = %tmp_socket.display(), "wayland socket found in /tmp");
        return true;
    }

    let display_str = display.as_str();
    warn!(
        target: "platform.detect",
        display = display_str,
        "WAYLAND_DISPLAY is set but no socket was found"
    );
    false
}

/// True when `DISPLAY` is set.
fn x11_display_available(env: &dyn Environment) -> bool {
    match env.var("DISPLAY") {
        Some(display) => {
            let display_str = display.as_str();
            debug!(target: "platform.detect", display = display_str, "X11 display present");
            true
        }
        None => {
            debug!(target: "platform.detect", "DISPLAY not set");
            false
        }
    }
}

/// Resolve the backend to use.
///
/// `requested` comes from CLI or configuration and takes precedence over
/// the [`BACKEND_OVERRIDE_VAR`] variable. Returns `None` only when nothing
/// was requested and no display server is reachable.
pub fn detect_backend(env: &dyn Environment, requested: Option<&str>) -> Option<DisplayBackend> {
    let requested = requested
        .map(str::to_owned)
        .or_else(|| env.var(BACKEND_OVERRIDE_VAR));

    if let Some(name) = requested {
        debug!(target: "platform.detect", requested = name.as_str(), "explicit backend request");

        if name.starts_with("wayland") {
            if wayland_display_available(env) {
                return Some(DisplayBackend::Wayland);
            }
            warn!(
                target: "platform.detect",
                "wayland requested but not available, trying X11"
            );
            if x11_display_available(env) {
                return Some(DisplayBackend::X11);
            }
            return None;
        }

        if name == "x11" || name == "xcb" {
            return Some(DisplayBackend::X11);
        }

        // Unprobed backends are the user's responsibility.
        return Some(DisplayBackend::Other(name));
    }

    if wayland_display_available(env) {
        info!(target: "platform.detect", "auto-detected wayland session");
        return Some(DisplayBackend::Wayland);
    }

    if x11_display_available(env) {
        info!(target: "platform.detect", "auto-detected X11 session");
        return Some(DisplayBackend::X11);
    }

    warn!(target: "platform.detect", "no display server detected");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    struct MockEnvironment {
        vars: HashMap<String, String>,
        paths: HashSet<PathBuf>,
    }

    impl MockEnvironment {
        fn with_var(mut self, name: &str, value: &str) -> Self {
            self.vars.insert(name.to_string(), value.to_string());
            self
        }

        fn with_path(mut self, path: &str) -> Self {
            self.paths.insert(PathBuf::from(path));
            self
        }
    }

    impl Environment for MockEnvironment {
        fn var(&self, name: &str) -> Option<String> {
            self.vars.get(name).cloned().filter(|v| !v.is_empty())
        }

        fn path_exists(&self, path: &Path) -> bool {
            self.paths.contains(path)
        }
    }

    #[test]
    fn auto_detects_wayland_when_socket_exists() {
        let env = MockEnvironment::default()
            .with_var("WAYLAND_DISPLAY", "wayland-0")
            .with_var("XDG_RUNTIME_DIR", "/run/user/1000")
            .with_path("/run/user/1000/wayland-0");
        assert_eq!(detect_backend(&env, None), Some(DisplayBackend::Wayland));
    }

    #[test]
    fn wayland_display_without_socket_is_unavailable() {
        let env = MockEnvironment::default()
            .with_var("WAYLAND_DISPLAY", "wayland-0")
            .with_var("XDG_RUNTIME_DIR", "/run/user/1000");
        assert_eq!(detect_backend(&env, None), None);
    }

    #[test]
    fn falls_back_to_tmp_socket() {
        let env = MockEnvironment::default()
            .with_var("WAYLAND_DISPLAY", "wayland-1")
            .with_path("/tmp/wayland-1");
        assert_eq!(detect_backend(&env, None), Some(DisplayBackend::Wayland));
    }

    #[test]
    fn absolute_wayland_display_is_probed_directly() {
        let env = MockEnvironment::default()
            .with_var("WAYLAND_DISPLAY", "/custom/run/wl-0")
            .with_path("/custom/run/wl-0");
        assert_eq!(detect_backend(&env, None), Some(DisplayBackend::Wayland));
    }

    #[test]
    fn auto_detect_prefers_wayland_over_x11() {
        let env = MockEnvironment::default()
            .with_var("WAYLAND_DISPLAY", "wayland-0")
            .with_var("XDG_RUNTIME_DIR", "/run/user/1000")
            .with_var("DISPLAY", ":0")
            .with_path("/run/user/1000/wayland-0");
        assert_eq!(detect_backend(&env, None), Some(DisplayBackend::Wayland));
    }

    #[test]
    fn falls_back_to_x11_when_no_wayland() {
        let env = MockEnvironment::default().with_var("DISPLAY", ":0");
        assert_eq!(detect_backend(&env, None), Some(DisplayBackend::X11));
    }

    #[test]
    fn headless_yields_none() {
        let env = MockEnvironment::default();
        assert_eq!(detect_backend(&env, None), None);
    }

    #[test]
    fn explicit_wayland_request_verifies_availability() {
        // Requested wayland, none available, X11 present: fall back.
        let env = MockEnvironment::default().with_var("DISPLAY", ":0");
        assert_eq!(
            detect_backend(&env, Some("wayland")),
            Some(DisplayBackend::X11)
        );
    }

    #[test]
    fn explicit_wayland_request_fully_headless_yields_none() {
        let env = MockEnvironment::default();
        assert_eq!(detect_backend(&env, Some("wayland")), None);
    }

    #[test]
    fn explicit_x11_request_is_honoured_without_probe() {
        let env = MockEnvironment::default();
        assert_eq!(detect_backend(&env, Some("xcb")), Some(DisplayBackend::X11));
        assert_eq!(detect_backend(&env, Some("x11")), Some(DisplayBackend::X11));
    }

    #[test]
    fn unknown_backend_request_passes_through() {
        let env = MockEnvironment::default();
        assert_eq!(
            detect_backend(&env, Some("offscreen")),
            Some(DisplayBackend::Other("offscreen".to_string()))
        );
    }

    #[test]
    fn override_var_acts_as_request() {
        let env = MockEnvironment::default()
            .with_var(BACKEND_OVERRIDE_VAR, "offscreen")
            .with_var("DISPLAY", ":0");
        assert_eq!(
            detect_backend(&env, None),
            Some(DisplayBackend::Other("offscreen".to_string()))
        );
    }

    #[test]
    fn caller_request_beats_override_var() {
        let env = MockEnvironment::default()
            .with_var(BACKEND_OVERRIDE_VAR, "offscreen")
            .with_var("DISPLAY", ":0");
        assert_eq!(detect_backend(&env, Some("x11")), Some(DisplayBackend::X11));
    }

    #[test]
    fn system_environment_probes_real_paths() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("wayland-9");
        std::fs::write(&socket, b"").unwrap();

        let sys = SystemEnvironment;
        assert!(sys.path_exists(&socket));
        assert!(!sys.path_exists(&dir.path().join("missing")));
    }
}
