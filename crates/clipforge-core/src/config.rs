//! The job-wide, immutable configuration value (§9 "global configuration
//! object" redesign). Built once at startup — defaults, then an optional JSON
//! file, then CLI flags — and threaded by reference into every stage. No
//! process-wide singleton.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CPU-path encoder quality preset, selects the `crf`/`preset` pair (§4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderQuality {
    Low,
    Medium,
    High,
}

impl RenderQuality {
    /// `(crf, preset)` for the CPU H.264 fallback path.
    pub fn cpu_params(self) -> (u32, &'static str) {
        match self {
            Self::Low => (28, "veryfast"),
            Self::Medium => (20, "medium"),
            Self::High => (16, "slow"),
        }
    }
}

impl Default for RenderQuality {
    fn default() -> Self {
        Self::Medium
    }
}

/// Ranker blending weights (§4.G), surfaced as configurable per §9.1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankerWeights {
    pub coverage: f64,
    pub density: f64,
    pub cogency: f64,
    pub quote_bonus: f64,
    pub scene_cut_penalty: f64,
    pub filler_ratio: f64,
}

impl Default for RankerWeights {
    fn default() -> Self {
        Self {
            coverage: 0.35,
            density: 0.20,
            cogency: 0.25,
            quote_bonus: 0.10,
            scene_cut_penalty: -0.05,
            filler_ratio: -0.05,
        }
    }
}

/// JSON shape of the optional `--config` file (§6). Every field is optional;
/// absent fields fall back to `Config`'s defaults. `#[serde(deny_unknown_fields)]`
/// is what makes unknown keys a `ConfigError` rather than a silent no-op.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub whisper_server_url: Option<String>,
    pub chat_server_url: Option<String>,
    pub window_duration: Option<f64>,
    pub window_stride: Option<f64>,
    pub window_min: Option<f64>,
    pub window_max: Option<f64>,
    pub grader_concurrency: Option<usize>,
    pub render_concurrency: Option<usize>,
    pub render_quality: Option<RenderQuality>,
    pub output_dir: Option<PathBuf>,
    pub cancel_on_first_failure: Option<bool>,
}

/// The fully resolved, immutable job configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub whisper_server_url: String,
    pub chat_server_url: String,
    pub window_duration: f64,
    pub window_stride: f64,
    pub window_min: f64,
    pub window_max: f64,
    pub grader_concurrency: usize,
    pub render_concurrency: usize,
    pub render_quality: RenderQuality,
    pub output_dir: PathBuf,
    pub cancel_on_first_failure: bool,
    pub k: usize,
    pub scratch_quota_bytes: u64,
    /// Mean-absolute-difference threshold for the scene detector (§4.C, §9.1).
    pub scene_cut_threshold: f32,
    pub ranker_weights: RankerWeights,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            whisper_server_url: "http://localhost:9000".to_string(),
            chat_server_url: "http://localhost:8000".to_string(),
            window_duration: 90.0,
            window_stride: 15.0,
            window_min: 45.0,
            window_max: 120.0,
            grader_concurrency: 4,
            render_concurrency: 2,
            render_quality: RenderQuality::default(),
            output_dir: PathBuf::from("./rendered_clips"),
            cancel_on_first_failure: false,
            k: 5,
            scratch_quota_bytes: 20 * 1024 * 1024 * 1024,
            scene_cut_threshold: 0.5,
            ranker_weights: RankerWeights::default(),
        }
    }
}

impl Config {
    /// Apply a parsed config file on top of the defaults.
    pub fn merge_file(mut self, file: ConfigFile) -> Self {
        if let Some(v) = file.whisper_server_url {
            self.whisper_server_url = v;
        }
        if let Some(v) = file.chat_server_url {
            self.chat_server_url = v;
        }
        if let Some(v) = file.window_duration {
            self.window_duration = v;
        }
        if let Some(v) = file.window_stride {
            self.window_stride = v;
        }
        if let Some(v) = file.window_min {
            self.window_min = v;
        }
        if let Some(v) = file.window_max {
            self.window_max = v;
        }
        if let Some(v) = file.grader_concurrency {
            self.grader_concurrency = v;
        }
        if let Some(v) = file.render_concurrency {
            self.render_concurrency = v;
        }
        if let Some(v) = file.render_quality {
            self.render_quality = v;
        }
        if let Some(v) = file.output_dir {
            self.output_dir = v;
        }
        if let Some(v) = file.cancel_on_first_failure {
            self.cancel_on_first_failure = v;
        }
        self
    }

    /// Load a `ConfigFile` from disk and merge it on top of the defaults.
    pub fn load_and_merge(self, path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&contents)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Ok(self.merge_file(file))
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_min <= 0.0 || self.window_max < self.window_min {
            return Err(CoreError::Config(
                "window_min must be positive and window_min <= window_max".into(),
            ));
        }
        if self.window_duration < self.window_min || self.window_duration > self.window_max {
            return Err(CoreError::Config(
                "window_duration must lie within [window_min, window_max]".into(),
            ));
        }
        if self.grader_concurrency == 0 || self.render_concurrency == 0 {
            return Err(CoreError::Config(
                "grader_concurrency and render_concurrency must be >= 1".into(),
            ));
        }
        if self.k == 0 {
            return Err(CoreError::Config("k must be >= 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_config_key_is_rejected() {
        let json = r#"{"whisper_server_url": "http://x", "bogus_key": 1}"#;
        let result: std::result::Result<ConfigFile, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn merge_file_overrides_only_present_fields() {
        let cfg = Config::default();
        let original_chat_url = cfg.chat_server_url.clone();
        let file = ConfigFile {
            whisper_server_url: Some("http://override".into()),
            ..Default::default()
        };
        let merged = cfg.merge_file(file);
        assert_eq!(merged.whisper_server_url, "http://override");
        assert_eq!(merged.chat_server_url, original_chat_url);
    }

    #[test]
    fn validate_rejects_inverted_window_bounds() {
        let mut cfg = Config::default();
        cfg.window_min = 100.0;
        cfg.window_max = 50.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }
}
