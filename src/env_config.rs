//! Environment overrides for [`CaptureConfig`].
//!
//! All env-var parsing goes through these helpers so the truthy/falsey rules
//! live in one place.

use std::time::Duration;

use crate::types::{CaptureConfig, ReadPolicy};

pub const ENV_READ_POLICY: &str = "WGC_CAPTURE_READ_POLICY";
pub const ENV_ONE_SHOT_TIMEOUT_MS: &str = "WGC_CAPTURE_ONESHOT_TIMEOUT_MS";
pub const ENV_NO_BORDER_SUPPRESS: &str = "WGC_CAPTURE_NO_BORDER_SUPPRESS";
pub const ENV_FRAME_POOL_BUFFERS: &str = "WGC_CAPTURE_FRAME_POOL_BUFFERS";

/// `1`, `true`, `yes` or `on`, case-insensitive, trimmed.
fn is_truthy(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
}

/// Positive (> 0) integers only.
fn parse_positive_u64(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|value| *value > 0)
}

impl CaptureConfig {
    /// Defaults with overrides from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults with overrides from an arbitrary variable source.
    ///
    /// Unparseable values are ignored with a warning and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = CaptureConfig::default();

        if let Some(raw) = lookup(ENV_READ_POLICY) {
            match ReadPolicy::parse(&raw) {
                Some(policy) => config.read_policy = policy,
                None => log::warn!("ignoring {}={:?}", ENV_READ_POLICY, raw),
            }
        }

        if let Some(raw) = lookup(ENV_ONE_SHOT_TIMEOUT_MS) {
            match parse_positive_u64(&raw) {
                Some(ms) => config.one_shot_timeout = Duration::from_millis(ms),
                None => log::warn!("ignoring {}={:?}", ENV_ONE_SHOT_TIMEOUT_MS, raw),
            }
        }

        if let Some(raw) = lookup(ENV_NO_BORDER_SUPPRESS) {
            config.suppress_border = !is_truthy(&raw);
        }

        if let Some(raw) = lookup(ENV_FRAME_POOL_BUFFERS) {
            match parse_positive_u64(&raw).and_then(|n| u32::try_from(n).ok()) {
                Some(buffers) => config.frame_pool_buffers = buffers,
                None => log::warn!("ignoring {}={:?}", ENV_FRAME_POOL_BUFFERS, raw),
            }
        }

        config
    }
}
