//! Engine tunables. Loaded from a TOML file named by `ENGINE_CONFIG`,
//! falling back to defaults on any read/parse failure.

use serde::Deserialize;
use std::path::PathBuf;

const ENV_CONFIG_PATH: &str = "ENGINE_CONFIG";

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_phys_avail_percent")]
    pub phys_avail_percent: u8,
    #[serde(default = "default_min_budget_bytes")]
    pub min_budget_bytes: u64,
    #[serde(default = "default_segment_scale")]
    pub segment_scale: u64,
    #[serde(default = "default_max_segments_per_timeline")]
    pub max_segments_per_timeline: usize,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_eviction_poll_interval_ms")]
    pub eviction_poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            phys_avail_percent: default_phys_avail_percent(),
            min_budget_bytes: default_min_budget_bytes(),
            segment_scale: default_segment_scale(),
            max_segments_per_timeline: default_max_segments_per_timeline(),
            worker_threads: default_worker_threads(),
            eviction_poll_interval_ms: default_eviction_poll_interval_ms(),
        }
    }
}

impl EngineConfig {
    /// Load from the file named by `ENGINE_CONFIG`, or defaults if unset,
    /// unreadable, or unparseable.
    pub fn load() -> Self {
        let path = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => PathBuf::from(p),
            Err(_) => return Self::default(),
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }
}

fn default_phys_avail_percent() -> u8 {
    80
}
fn default_min_budget_bytes() -> u64 {
    100 * 1024 * 1024
}
fn default_segment_scale() -> u64 {
    10
}
fn default_max_segments_per_timeline() -> usize {
    65_536
}
fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_eviction_poll_interval_ms() -> u64 {
    250
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_defaults() {
        let toml = r#"
phys_avail_percent = 70
min_budget_bytes = 52428800
"#;
        let cfg: EngineConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.phys_avail_percent, 70);
        assert_eq!(cfg.min_budget_bytes, 52_428_800);
        assert_eq!(cfg.segment_scale, 10);
        assert_eq!(cfg.max_segments_per_timeline, 65_536);
    }

    #[test]
    fn env_override() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "phys_avail_percent = 50").unwrap();
        unsafe {
            std::env::set_var(ENV_CONFIG_PATH, file.path());
        }
        let cfg = EngineConfig::load();
        assert_eq!(cfg.phys_avail_percent, 50);
        unsafe {
            std::env::remove_var(ENV_CONFIG_PATH);
        }
    }

    #[test]
    fn missing_env_falls_back_to_defaults() {
        unsafe {
            std::env::remove_var(ENV_CONFIG_PATH);
        }
        let cfg = EngineConfig::load();
        assert_eq!(cfg.phys_avail_percent, 80);
    }
}
