use crate::error::{LaborlogError, Result};
use chrono::FixedOffset;
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaborlogConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Custom path for SQLite database. Defaults to `~/.config/laborlog/laborlog.db`.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

/// The single local timezone used to decide which calendar day labor lands on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Offset from UTC in minutes. Default: 540 (KST, UTC+9).
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

impl TimeConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            LaborlogError::Config(format!(
                "time.utc_offset_minutes = {} is out of range",
                self.utc_offset_minutes
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Custom path for the event log. Defaults to `~/.config/laborlog/history.jsonl`.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Valid storage backend names.
pub const VALID_STORAGE_BACKENDS: &[&str] = &["sqlite", "memory"];

/// Largest accepted offset magnitude (chrono rejects a full day).
const MAX_OFFSET_MINUTES: i32 = 24 * 60 - 1;

// -- Defaults --

fn default_storage_backend() -> String {
    "sqlite".to_string()
}
fn default_utc_offset_minutes() -> i32 {
    540
}
fn default_true() -> bool {
    true
}

impl LaborlogConfig {
    /// Load configuration with three-layer TOML merge:
    /// 1. ~/.config/laborlog/config.toml (global)
    /// 2. .laborlog/config.toml (project)
    /// 3. .laborlog/config.local.toml (local, gitignored)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        // Layer 1: Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        // Layer 2: Project config
        if let Some(dir) = project_dir {
            let project_config = dir.join(".laborlog").join("config.toml");
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }

            // Layer 3: Local config (gitignored)
            let local_config = dir.join(".laborlog").join("config.local.toml");
            if local_config.exists() {
                builder = builder.add_source(File::from(local_config).required(false));
            }
        }

        let config = builder
            .build()
            .map_err(|e| LaborlogError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| LaborlogError::Config(e.to_string()))?;

        cfg.validate();
        Ok(cfg)
    }

    /// Load with defaults only (no files).
    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig::default(),
            time: TimeConfig::default(),
            history: HistoryConfig::default(),
        }
    }

    /// Validate config values, resetting out-of-range values and logging warnings.
    /// Lenient: out-of-range values are reset rather than rejected.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !VALID_STORAGE_BACKENDS.contains(&self.storage.backend.as_str()) {
            warnings.push(format!(
                "unknown storage backend '{}', valid: {}",
                self.storage.backend,
                VALID_STORAGE_BACKENDS.join(", ")
            ));
        }

        if self.time.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            warnings.push(format!(
                "time.utc_offset_minutes = {} out of range [-{MAX_OFFSET_MINUTES}, {MAX_OFFSET_MINUTES}], using {}",
                self.time.utc_offset_minutes,
                default_utc_offset_minutes()
            ));
            self.time.utc_offset_minutes = default_utc_offset_minutes();
        }

        for w in &warnings {
            tracing::warn!("config: {}", w);
        }

        warnings
    }
}

/// Write the default configuration to `<dir>/.laborlog/config.toml`.
/// Refuses to overwrite an existing file.
pub fn write_project_config(dir: &Path) -> Result<PathBuf> {
    let cfg_dir = dir.join(".laborlog");
    let path = cfg_dir.join("config.toml");
    if path.exists() {
        return Err(LaborlogError::Config(format!(
            "{} already exists",
            path.display()
        )));
    }
    std::fs::create_dir_all(&cfg_dir)
        .map_err(|e| LaborlogError::Config(format!("failed to create {}: {e}", cfg_dir.display())))?;
    let body = toml::to_string_pretty(&LaborlogConfig::default_config())
        .map_err(|e| LaborlogError::Config(e.to_string()))?;
    std::fs::write(&path, body)
        .map_err(|e| LaborlogError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(path)
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("laborlog").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LaborlogConfig::default_config();
        assert_eq!(config.storage.backend, "sqlite");
        assert!(config.storage.path.is_none());
        assert_eq!(config.time.utc_offset_minutes, 540);
        assert!(config.history.enabled);
    }

    #[test]
    fn test_load_config_no_files() {
        let config = LaborlogConfig::load(Some(Path::new("/nonexistent/path"))).unwrap();
        assert_eq!(config.time.utc_offset_minutes, 540);
    }

    #[test]
    fn test_load_project_layers() {
        let dir = std::env::temp_dir().join(format!("laborlog-cfg-{}", uuid::Uuid::now_v7()));
        let cfg_dir = dir.join(".laborlog");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[storage]\nbackend = \"memory\"\n[time]\nutc_offset_minutes = 0\n",
        )
        .unwrap();
        std::fs::write(
            cfg_dir.join("config.local.toml"),
            "[time]\nutc_offset_minutes = 60\n",
        )
        .unwrap();

        let config = LaborlogConfig::load(Some(&dir)).unwrap();
        assert_eq!(config.storage.backend, "memory");
        // Local layer wins over project layer.
        assert_eq!(config.time.utc_offset_minutes, 60);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_rejects_bad_value() {
        let dir = std::env::temp_dir().join(format!("laborlog-cfg-{}", uuid::Uuid::now_v7()));
        let cfg_dir = dir.join(".laborlog");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "[time]\nutc_offset_minutes = 0\n[history]\nenabled = \"maybe\"\n",
        )
        .unwrap();

        let err = LaborlogConfig::load(Some(&dir)).unwrap_err();
        assert!(matches!(err, LaborlogError::Config(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = LaborlogConfig::default_config();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: LaborlogConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.storage.backend, config.storage.backend);
        assert_eq!(
            parsed.time.utc_offset_minutes,
            config.time.utc_offset_minutes
        );
    }

    #[test]
    fn test_write_project_config_once() {
        let dir = std::env::temp_dir().join(format!("laborlog-init-{}", uuid::Uuid::now_v7()));
        let path = write_project_config(&dir).unwrap();
        assert!(path.ends_with(".laborlog/config.toml"));

        let config = LaborlogConfig::load(Some(&dir)).unwrap();
        assert_eq!(config.storage.backend, "sqlite");

        let err = write_project_config(&dir).unwrap_err();
        assert!(matches!(err, LaborlogError::Config(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: LaborlogConfig = toml::from_str("[history]\nenabled = false\n").unwrap();
        assert!(!config.history.enabled);
        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(config.time.utc_offset_minutes, 540);
    }

    #[test]
    fn test_offset_kst() {
        let offset = TimeConfig::default().offset().unwrap();
        assert_eq!(offset.local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_offset_negative() {
        let time = TimeConfig {
            utc_offset_minutes: -300,
        };
        assert_eq!(time.offset().unwrap().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_offset_out_of_range_errors() {
        let time = TimeConfig {
            utc_offset_minutes: 24 * 60,
        };
        assert!(time.offset().is_err());
    }

    #[test]
    fn test_validate_default_config_no_warnings() {
        let mut config = LaborlogConfig::default_config();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_validate_resets_out_of_range_offset() {
        let mut config = LaborlogConfig::default_config();
        config.time.utc_offset_minutes = 5000;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(config.time.utc_offset_minutes, 540);
    }

    #[test]
    fn test_validate_unknown_storage_backend() {
        let mut config = LaborlogConfig::default_config();
        config.storage.backend = "supabase".to_string();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("supabase"));
    }
}
