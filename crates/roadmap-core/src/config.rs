use crate::error::{Result, RoadmapError};
use crate::lock::LockOptions;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// LeaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Claims older than this are force-released by `expire`.
    #[serde(default = "default_lease_minutes")]
    pub minutes: u32,
    /// Run lease expiry inside every claim transaction.
    #[serde(default = "default_true")]
    pub expire_on_claim: bool,
}

fn default_lease_minutes() -> u32 {
    45
}

fn default_true() -> bool {
    true
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            minutes: default_lease_minutes(),
            expire_on_claim: true,
        }
    }
}

impl LeaseConfig {
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.minutes))
    }
}

// ---------------------------------------------------------------------------
// LockConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_stale_after_secs() -> u64 {
    120
}

fn default_retry_initial_ms() -> u64 {
    5
}

fn default_retry_max_ms() -> u64 {
    200
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            stale_after_secs: default_stale_after_secs(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

impl LockConfig {
    pub fn options(&self) -> LockOptions {
        LockOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            stale_after: Duration::from_secs(self.stale_after_secs),
            retry_initial: Duration::from_millis(self.retry_initial_ms.max(1)),
            retry_max: Duration::from_millis(self.retry_max_ms.max(1)),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub lock: LockConfig,
    /// Markdown file rewritten after every change, relative to the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<PathBuf>,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            lease: LeaseConfig::default(),
            lock: LockConfig::default(),
            projection: None,
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(RoadmapError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&data)
            .map_err(|e| RoadmapError::Parse(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn projection_path(&self, root: &Path) -> Option<PathBuf> {
        self.projection.as_ref().map(|p| root.join(p))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.project.name.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "project.name is empty".to_string(),
            });
        }

        if self.lease.minutes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "lease.minutes is 0: every claim would expire immediately".to_string(),
            });
        }

        if self.lock.timeout_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "lock.timeout_ms is 0: contended writes would always fail".to_string(),
            });
        }

        if self.lock.retry_initial_ms > self.lock.retry_max_ms {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "lock.retry_initial_ms ({}) exceeds lock.retry_max_ms ({})",
                    self.lock.retry_initial_ms, self.lock.retry_max_ms
                ),
            });
        }

        // A lock held longer than the stale threshold by a live process would
        // be broken out from under it.
        if self.lock.stale_after_secs.saturating_mul(1000) <= self.lock.timeout_ms {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "lock.stale_after_secs ({}s) should be well above lock.timeout_ms ({}ms)",
                    self.lock.stale_after_secs, self.lock.timeout_ms
                ),
            });
        }

        if let Some(p) = &self.projection {
            if p.is_absolute() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "projection '{}' is absolute; it is normally relative to the project root",
                        p.display()
                    ),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
