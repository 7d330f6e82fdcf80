//! Narrow configuration lookup consumed by the playback engine for
//! `wasapi.allow-resampler`. The config store itself lives outside this
//! crate; this trait is the only surface the engines call through.

/// A source of boolean configuration values, keyed by device name and
/// option key (mirroring the original's `GetConfigValueBool(device,
/// section, key, default)`).
pub trait ConfigSource: Send + Sync {
    fn get_bool(&self, device: &str, key: &str) -> Option<bool>;
}

/// A `ConfigSource` that never has an override, so callers fall back to
/// their own default. Useful for tests and as a do-nothing default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConfig;

impl ConfigSource for NoConfig {
    fn get_bool(&self, _device: &str, _key: &str) -> Option<bool> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_config_always_none() {
        let cfg = NoConfig;
        assert_eq!(cfg.get_bool("Speakers", "allow-resampler"), None);
    }
}
