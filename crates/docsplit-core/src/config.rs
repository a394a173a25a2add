use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::admission;
use crate::preflight;
use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per work item (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 2.0,
            max_delay_secs: 60,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

/// Static request limits enforced by preflight (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_source_bytes: u64,
    pub max_source_units: u32,
    pub max_outputs: usize,
    pub max_total_extracted_units: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let l = preflight::Limits::default();
        Self {
            max_source_bytes: l.max_source_bytes,
            max_source_units: l.max_source_units,
            max_outputs: l.max_outputs,
            max_total_extracted_units: l.max_total_extracted_units,
        }
    }
}

/// Where uploaded artifacts go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UploadTarget {
    /// Local directory tree standing in for a remote drive.
    Dir { root: PathBuf },
    /// WebDAV collection reached over HTTP(S).
    Webdav {
        base_url: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
}

/// Global configuration loaded from `~/.config/docsplit/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsplitConfig {
    /// Maximum number of RUNNING jobs across all run modes.
    pub max_running_jobs_total: usize,
    /// Maximum number of RUNNING async jobs.
    pub max_running_jobs_async: usize,
    /// Work items per split chunk task.
    pub split_chunk_size: usize,
    /// Work items per upload chunk task.
    pub upload_chunk_size: usize,
    /// Tasks the in-process queue runs at once.
    pub worker_slots: usize,
    /// Delay between finalizer rounds while a phase has not converged.
    pub finalize_delay_secs: f64,
    /// Finalizer rounds before a phase with missing item records is failed.
    pub max_finalize_rounds: u32,
    /// Start the next phase automatically when one succeeds.
    pub auto_advance: bool,
    /// Override for the state directory (default `~/.local/state/docsplit`).
    pub state_dir: Option<PathBuf>,
    /// Optional retry policy; if missing, built-in defaults are used.
    pub retry: Option<RetryConfig>,
    /// Optional preflight limits; if missing, built-in defaults are used.
    pub limits: Option<LimitsConfig>,
    /// Upload target; defaults to a `remote/` directory under the state dir.
    pub upload_target: Option<UploadTarget>,
}

impl Default for DocsplitConfig {
    fn default() -> Self {
        Self {
            max_running_jobs_total: 4,
            max_running_jobs_async: 3,
            split_chunk_size: 25,
            upload_chunk_size: 25,
            worker_slots: 8,
            finalize_delay_secs: 2.0,
            max_finalize_rounds: 150,
            auto_advance: true,
            state_dir: None,
            retry: None,
            limits: None,
            upload_target: None,
        }
    }
}

impl DocsplitConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default().to_policy()
    }

    pub fn preflight_limits(&self) -> preflight::Limits {
        let l = self.limits.clone().unwrap_or_default();
        preflight::Limits {
            max_source_bytes: l.max_source_bytes,
            max_source_units: l.max_source_units,
            max_outputs: l.max_outputs,
            max_total_extracted_units: l.max_total_extracted_units,
        }
    }

    pub fn admission_limits(&self) -> admission::Limits {
        admission::Limits {
            max_running_total: self.max_running_jobs_total,
            max_running_async: self.max_running_jobs_async,
        }
    }

    pub fn finalize_delay(&self) -> Duration {
        Duration::from_secs_f64(self.finalize_delay_secs.max(0.0))
    }

    /// State directory: `state_dir` if set, else the XDG state home.
    pub fn resolve_state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("docsplit")?;
        Ok(xdg_dirs.get_state_home())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("docsplit")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DocsplitConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DocsplitConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path.
pub fn load_from(path: &Path) -> Result<DocsplitConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config: {}", path.display()))?;
    let cfg: DocsplitConfig =
        toml::from_str(&data).with_context(|| format!("parse config: {}", path.display()))?;
    Ok(cfg)
}
