use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::recording::RecorderSettings;

const MIN_FPS_LIMIT: f64 = 1.0;
const MAX_FPS_LIMIT: f64 = 100.0;
const MAX_DURATION_SECS: u32 = 600;
const MAX_FILENAME_TEMPLATE_LEN: usize = 128;
const DEFAULT_FILENAME_TEMPLATE: &str = "recording_%Y%m%d_%H%M%S";
const PERSIST_THREADS: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub output: OutputConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub filename_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordingConfig {
    pub fps_limit: f64,
    pub max_duration_secs: u32,
    #[serde(default)]
    pub monitor: Option<u32>,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            fps_limit: 15.0,
            max_duration_secs: 30,
            monitor: None,
            temp_dir: None,
        }
    }
}

fn has_path_chars(template: &str) -> bool {
    template.contains('/') || template.contains('\\') || template.contains("..")
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let fps = self.recording.fps_limit;
        if !fps.is_finite() || !(MIN_FPS_LIMIT..=MAX_FPS_LIMIT).contains(&fps) {
            return Err(anyhow!("fps_limit must be between {} and {}", MIN_FPS_LIMIT, MAX_FPS_LIMIT));
        }
        if self.recording.max_duration_secs == 0 || self.recording.max_duration_secs > MAX_DURATION_SECS {
            return Err(anyhow!("max_duration_secs must be between 1 and {}", MAX_DURATION_SECS));
        }
        if self.output.filename_template.is_empty() {
            return Err(anyhow!("filename_template is empty"));
        }
        if self.output.filename_template.len() > MAX_FILENAME_TEMPLATE_LEN {
            return Err(anyhow!("filename_template too long"));
        }
        if has_path_chars(&self.output.filename_template) {
            return Err(anyhow!("filename_template contains invalid path characters"));
        }
        if let Some(dir) = &self.recording.temp_dir {
            if dir.as_os_str().is_empty() {
                return Err(anyhow!("temp_dir is empty"));
            }
        }
        Ok(())
    }

    pub fn sanitize(&mut self) {
        self.recording.fps_limit = if self.recording.fps_limit.is_finite() {
            self.recording.fps_limit.clamp(MIN_FPS_LIMIT, MAX_FPS_LIMIT)
        } else {
            RecordingConfig::default().fps_limit
        };
        self.recording.max_duration_secs = self.recording.max_duration_secs.clamp(1, MAX_DURATION_SECS);

        if self.output.filename_template.is_empty()
            || self.output.filename_template.len() > MAX_FILENAME_TEMPLATE_LEN
            || has_path_chars(&self.output.filename_template)
        {
            self.output.filename_template = DEFAULT_FILENAME_TEMPLATE.to_string();
        }

        if self.recording.temp_dir.as_ref().is_some_and(|d| d.as_os_str().is_empty()) {
            self.recording.temp_dir = None;
        }
    }

    pub fn recorder_settings(&self, fps: Option<f64>) -> RecorderSettings {
        RecorderSettings {
            fps_limit: fps.unwrap_or(self.recording.fps_limit),
            temp_dir: self
                .recording
                .temp_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("capgif")),
            persist_threads: PERSIST_THREADS,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let videos_dir = directories::UserDirs::new()
            .and_then(|d| d.video_dir().or_else(|| d.picture_dir()).map(|p| p.to_path_buf()))
            .unwrap_or_else(|| {
                directories::BaseDirs::new()
                    .map(|b| b.home_dir().to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        Self {
            output: OutputConfig {
                directory: videos_dir.join("capgif"),
                filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
            },
            recording: RecordingConfig::default(),
        }
    }
}

impl Config {
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("com", "capgif", "capgif").map(|p| p.config_dir().to_path_buf())
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.sanitize();
        config.validate()?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().ok_or_else(|| anyhow!("no config directory for this platform"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn ensure_output_dir(&self) -> Result<()> {
        let dir = &self.output.directory;
        if dir.as_os_str().is_empty() {
            return Err(anyhow!("Output directory path is empty"));
        }
        if dir.to_string_lossy().contains("..") {
            return Err(anyhow!("Output directory contains path traversal"));
        }
        fs::create_dir_all(dir)?;
        Ok(())
    }

    pub fn generate_filename(&self) -> String {
        let now = chrono::Local::now();
        let formatted = now.format(&self.output.filename_template).to_string();
        let sanitized: String = formatted
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .take(200)
            .collect();
        let safe_name = if sanitized.is_empty() {
            format!("recording_{}", now.timestamp())
        } else {
            sanitized
        };
        format!("{}.gif", safe_name)
    }

    pub fn output_path(&self) -> PathBuf {
        self.output.directory.join(self.generate_filename())
    }
}
