use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use client_core::TrackerOptions;
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "scanctl.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub agent_id: String,
    pub poll_interval: Duration,
    /// `None` disables stall detection.
    pub stall_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        let tracker = TrackerOptions::default();
        Self {
            server_url: "http://127.0.0.1:8780".into(),
            agent_id: "local-agent".into(),
            poll_interval: tracker.poll_interval,
            stall_timeout: tracker.stall_timeout,
        }
    }
}

impl Settings {
    pub fn tracker_options(&self) -> TrackerOptions {
        TrackerOptions {
            poll_interval: self.poll_interval,
            stall_timeout: self.stall_timeout,
            ..TrackerOptions::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    server_url: Option<String>,
    agent_id: Option<String>,
    poll_interval_ms: Option<u64>,
    stall_timeout_secs: Option<u64>,
}

impl FileSettings {
    fn apply(self, settings: &mut Settings) {
        if let Some(v) = self.server_url {
            settings.server_url = v;
        }
        if let Some(v) = self.agent_id {
            settings.agent_id = v;
        }
        if let Some(v) = self.poll_interval_ms {
            settings.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = self.stall_timeout_secs {
            settings.stall_timeout = stall_timeout(v);
        }
    }
}

pub fn load_settings(explicit_path: Option<&Path>) -> Result<Settings> {
    load_settings_from(explicit_path, |key| std::env::var(key).ok())
}

/// Defaults, then the settings file, then `SCANCTL_*` and `APP__*` environment overrides.
///
/// An explicitly requested file must exist and parse; the implicit `scanctl.toml` is optional.
pub fn load_settings_from(
    explicit_path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let mut settings = Settings::default();

    match explicit_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            parse_file(&raw, path)?.apply(&mut settings);
        }
        None => {
            let path = Path::new(SETTINGS_FILE);
            if let Ok(raw) = fs::read_to_string(path) {
                parse_file(&raw, path)?.apply(&mut settings);
            }
        }
    }

    for key in ["SCANCTL_SERVER_URL", "APP__SERVER_URL"] {
        if let Some(v) = env(key) {
            settings.server_url = v;
        }
    }
    for key in ["SCANCTL_AGENT_ID", "APP__AGENT_ID"] {
        if let Some(v) = env(key) {
            settings.agent_id = v;
        }
    }
    if let Some(v) = env("SCANCTL_POLL_INTERVAL_MS") {
        let parsed: u64 = v
            .trim()
            .parse()
            .with_context(|| format!("SCANCTL_POLL_INTERVAL_MS must be an integer, got {v}"))?;
        settings.poll_interval = Duration::from_millis(parsed);
    }
    if let Some(v) = env("SCANCTL_STALL_TIMEOUT_SECS") {
        let parsed: u64 = v
            .trim()
            .parse()
            .with_context(|| format!("SCANCTL_STALL_TIMEOUT_SECS must be an integer, got {v}"))?;
        settings.stall_timeout = stall_timeout(parsed);
    }

    if settings.poll_interval.is_zero() {
        settings.poll_interval = Settings::default().poll_interval;
    }
    Ok(settings)
}

fn parse_file(raw: &str, path: &Path) -> Result<FileSettings> {
    toml::from_str(raw).with_context(|| format!("invalid config file {}", path.display()))
}

fn stall_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
