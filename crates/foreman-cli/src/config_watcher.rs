//! Config hot-reload watcher.
//!
//! Watches a `foreman.toml` file for modifications and invokes a callback
//! with the freshly parsed [`ReloadableConfig`] after a debounce window.
#![allow(dead_code)]

use foreman_core::{ForemanError, ForemanResult};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;

/// Subset of the full Foreman configuration that supports hot-reload:
/// the knobs an operator might want to tune without restarting a long
/// -running Autonomous loop.
///
/// Every section is optional so that a partial config file (containing only
/// the sections the operator wants to tweak at runtime) is accepted.
/// Values are kept as opaque `serde_json::Value` to avoid coupling this
/// module to the full config types defined in `main.rs`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReloadableConfig {
    /// `[safety]`: `SafetyConfig` overrides (max_change_size,
    /// require_tests, max_operations_per_hour).
    #[serde(default)]
    pub safety: Option<serde_json::Value>,
    /// `[constraints]`: default `Constraints` applied to Commands that
    /// don't specify their own.
    #[serde(default)]
    pub constraints: Option<serde_json::Value>,
    /// `[[models]]`: the model roster `default_profiles` is built from.
    #[serde(default)]
    pub models: Option<Vec<serde_json::Value>>,
}

/// Watches a config file on disk and calls back on every (debounced) change.
///
/// The watcher is kept alive as long as this struct is alive; dropping it
/// stops the background thread and releases the file-system watch.
pub struct ConfigWatcher {
    /// Stored to prevent the watcher from being dropped (which would stop
    /// watching the file).
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `config_path` for modifications.
    ///
    /// * `debounce_ms` -- minimum milliseconds between two successive reload
    ///   callbacks.  Use `500` as a sensible default.
    /// * `on_reload` -- called on a background thread each time the config
    ///   file is modified and successfully parsed.  Parse errors are logged
    ///   via `tracing::warn` and do **not** invoke the callback.
    pub fn start<F>(config_path: PathBuf, debounce_ms: u64, on_reload: F) -> ForemanResult<Self>
    where
        F: Fn(ReloadableConfig) + Send + Sync + 'static,
    {
        let (tx, rx) = std_mpsc::channel();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Modify(_)) {
                        let _ = tx.send(());
                    }
                }
            })
            .map_err(|e| ForemanError::Config(format!("failed to create file watcher: {e}")))?;

        watcher
            .watch(config_path.as_ref(), RecursiveMode::NonRecursive)
            .map_err(|e| ForemanError::Config(format!("failed to watch config file: {e}")))?;

        let path = config_path.clone();
        std::thread::spawn(move || {
            let mut last_reload = std::time::Instant::now();
            let debounce = std::time::Duration::from_millis(debounce_ms);

            while rx.recv().is_ok() {
                // Drain any additional events that arrived during the debounce
                // window so we only reload once per burst of writes.
                while rx.try_recv().is_ok() {}

                let now = std::time::Instant::now();
                if now.duration_since(last_reload) < debounce {
                    std::thread::sleep(debounce - now.duration_since(last_reload));
                }

                last_reload = std::time::Instant::now();

                match parse_config(&path) {
                    Ok(config) => on_reload(config),
                    Err(e) => tracing::warn!(error = %e, "failed to reload config"),
                }
            }

            tracing::debug!("config watcher thread exiting");
        });

        tracing::info!(path = %config_path.display(), "config hot-reload watcher started");

        Ok(Self { _watcher: watcher })
    }
}

/// Read and parse a TOML config file into a [`ReloadableConfig`].
pub fn parse_config(path: &Path) -> ForemanResult<ReloadableConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ForemanError::Config(format!("failed to read config '{}': {e}", path.display()))
    })?;
    let config: ReloadableConfig = toml::from_str(&content).map_err(|e| {
        ForemanError::Config(format!("failed to parse config '{}': {e}", path.display()))
    })?;
    Ok(config)
}
