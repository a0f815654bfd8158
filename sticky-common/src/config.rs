//! Configuration loading for StickyWall
//!
//! Every tunable resolves with the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`STICKYWALL_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Which identity source the rate-limit gate keys on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStrategy {
    /// Salted hash of the client network address (server-enforced, default)
    HashedIp,
    /// Client-supplied opaque session token (dev/legacy fallback only)
    Session,
}

impl RateLimitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitStrategy::HashedIp => "hashed-ip",
            RateLimitStrategy::Session => "session",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hashed-ip" => Some(RateLimitStrategy::HashedIp),
            "session" => Some(RateLimitStrategy::Session),
            _ => None,
        }
    }
}

/// Rate-limit gate settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub strategy: RateLimitStrategy,
    /// Rolling window length; one accepted submission per identity per window
    pub window_secs: u64,
    /// Salt prepended to the identity before hashing; raw identities are never stored
    pub salt: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strategy: RateLimitStrategy::HashedIp,
            window_secs: 86_400,
            salt: "stickywall-v1".to_string(),
        }
    }
}

/// Moderation classifier settings
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    /// Chat-completions style endpoint of the vision service.
    /// When unset, classification is unavailable and every note lands in
    /// the manual review queue.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    /// Minimum classifier confidence to adopt its verdict at creation
    pub confidence_threshold: f64,
    /// Bounded wait on the external call; a timeout is treated as a
    /// classifier failure
    pub timeout_secs: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            confidence_threshold: 0.8,
            timeout_secs: 30,
        }
    }
}

/// Placement and spatial-query settings
#[derive(Debug, Clone)]
pub struct PlacementConfig {
    /// Fixed note dimensions on the shared plane
    pub note_width: f64,
    pub note_height: f64,
    /// A placement is valid iff its worst-case overlap against any single
    /// existing note stays at or under this fraction
    pub max_overlap_fraction: f64,
    /// Margin added on all sides of viewport region queries
    pub region_padding: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            note_width: 200.0,
            note_height: 200.0,
            max_overlap_fraction: 0.25,
            region_padding: 250.0,
        }
    }
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct WallConfig {
    pub bind_addr: String,
    /// Root folder for the database and uploaded images
    pub data_dir: PathBuf,
    /// Local development mode: admin endpoints are not credential-gated
    pub local_dev: bool,
    /// Shared-secret bearer credential for admin endpoints
    pub admin_key: Option<String>,
    /// Store images as inline data URIs instead of files (degraded/dev mode)
    pub inline_images: bool,
    /// Hard ceiling on the decoded image payload
    pub max_image_bytes: usize,
    /// Flag count at which an approved note auto-escalates to flagged
    pub flag_threshold: i64,
    pub rate_limit: RateLimitConfig,
    pub moderation: ModerationConfig,
    pub placement: PlacementConfig,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5850".to_string(),
            data_dir: default_data_dir(),
            local_dev: false,
            admin_key: None,
            inline_images: false,
            max_image_bytes: 512_000,
            flag_threshold: 3,
            rate_limit: RateLimitConfig::default(),
            moderation: ModerationConfig::default(),
            placement: PlacementConfig::default(),
        }
    }
}

/// Command-line overrides forwarded from the binary
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub bind: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub local_dev: bool,
}

// ---------------------------------------------------------------------------
// TOML file shape (all fields optional; absent fields keep their defaults)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub bind_addr: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub local_dev: Option<bool>,
    pub admin_key: Option<String>,
    pub inline_images: Option<bool>,
    pub max_image_bytes: Option<usize>,
    pub flag_threshold: Option<i64>,
    pub rate_limit: Option<TomlRateLimit>,
    pub moderation: Option<TomlModeration>,
    pub placement: Option<TomlPlacement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlRateLimit {
    pub strategy: Option<String>,
    pub window_secs: Option<u64>,
    pub salt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlModeration {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlPlacement {
    pub note_width: Option<f64>,
    pub note_height: Option<f64>,
    pub max_overlap_fraction: Option<f64>,
    pub region_padding: Option<f64>,
}

impl WallConfig {
    /// Load configuration with the CLI → env → TOML → default priority order.
    pub fn load(cli: &CliOverrides) -> Result<WallConfig> {
        let mut config = WallConfig::default();

        // Priority 3: TOML config file
        if let Some(path) = resolve_config_path(cli.config.as_deref()) {
            let toml_config = read_toml_config(&path)?;
            config.apply_toml(toml_config)?;
        }

        // Priority 2: environment variables
        config.apply_env()?;

        // Priority 1: command-line arguments
        if let Some(bind) = &cli.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(data_dir) = &cli.data_dir {
            config.data_dir = data_dir.clone();
        }
        if cli.local_dev {
            config.local_dev = true;
        }

        config.validate()?;
        Ok(config)
    }

    /// Path of the SQLite database inside the data dir
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("stickywall.db")
    }

    /// Directory for uploaded images inside the data dir
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    fn apply_toml(&mut self, t: TomlConfig) -> Result<()> {
        if let Some(v) = t.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = t.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = t.local_dev {
            self.local_dev = v;
        }
        if let Some(v) = t.admin_key {
            self.admin_key = Some(v);
        }
        if let Some(v) = t.inline_images {
            self.inline_images = v;
        }
        if let Some(v) = t.max_image_bytes {
            self.max_image_bytes = v;
        }
        if let Some(v) = t.flag_threshold {
            self.flag_threshold = v;
        }
        if let Some(rl) = t.rate_limit {
            if let Some(s) = rl.strategy {
                self.rate_limit.strategy = RateLimitStrategy::parse(&s).ok_or_else(|| {
                    Error::Config(format!(
                        "unknown rate limit strategy '{}' (expected 'hashed-ip' or 'session')",
                        s
                    ))
                })?;
            }
            if let Some(v) = rl.window_secs {
                self.rate_limit.window_secs = v;
            }
            if let Some(v) = rl.salt {
                self.rate_limit.salt = v;
            }
        }
        if let Some(m) = t.moderation {
            if m.endpoint.is_some() {
                self.moderation.endpoint = m.endpoint;
            }
            if m.api_key.is_some() {
                self.moderation.api_key = m.api_key;
            }
            if let Some(v) = m.model {
                self.moderation.model = v;
            }
            if let Some(v) = m.confidence_threshold {
                self.moderation.confidence_threshold = v;
            }
            if let Some(v) = m.timeout_secs {
                self.moderation.timeout_secs = v;
            }
        }
        if let Some(p) = t.placement {
            if let Some(v) = p.note_width {
                self.placement.note_width = v;
            }
            if let Some(v) = p.note_height {
                self.placement.note_height = v;
            }
            if let Some(v) = p.max_overlap_fraction {
                self.placement.max_overlap_fraction = v;
            }
            if let Some(v) = p.region_padding {
                self.placement.region_padding = v;
            }
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("STICKYWALL_BIND") {
            self.bind_addr = v;
        }
        if let Ok(v) = std::env::var("STICKYWALL_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("STICKYWALL_LOCAL_DEV") {
            self.local_dev = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("STICKYWALL_ADMIN_KEY") {
            self.admin_key = Some(v);
        }
        if let Ok(v) = std::env::var("STICKYWALL_RATE_LIMIT_STRATEGY") {
            self.rate_limit.strategy = RateLimitStrategy::parse(&v).ok_or_else(|| {
                Error::Config(format!("unknown rate limit strategy '{}' in environment", v))
            })?;
        }
        if let Ok(v) = std::env::var("STICKYWALL_RATE_LIMIT_SALT") {
            self.rate_limit.salt = v;
        }
        if let Ok(v) = std::env::var("STICKYWALL_MODERATION_ENDPOINT") {
            self.moderation.endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("STICKYWALL_MODERATION_API_KEY") {
            self.moderation.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("STICKYWALL_MODERATION_MODEL") {
            self.moderation.model = v;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.rate_limit.window_secs == 0 {
            return Err(Error::Config("rate_limit.window_secs must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.moderation.confidence_threshold) {
            return Err(Error::Config(
                "moderation.confidence_threshold must be within [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.placement.max_overlap_fraction) {
            return Err(Error::Config(
                "placement.max_overlap_fraction must be within [0, 1]".into(),
            ));
        }
        if self.placement.note_width <= 0.0 || self.placement.note_height <= 0.0 {
            return Err(Error::Config("note dimensions must be positive".into()));
        }
        if self.flag_threshold < 1 {
            return Err(Error::Config("flag_threshold must be >= 1".into()));
        }
        if self.max_image_bytes == 0 {
            return Err(Error::Config("max_image_bytes must be > 0".into()));
        }
        if !self.local_dev && self.admin_key.is_none() {
            warn!("no admin key configured; admin endpoints will reject all requests");
        }
        Ok(())
    }
}

/// Locate the TOML config file: explicit CLI path, then the
/// `STICKYWALL_CONFIG` env var, then the platform config directory.
fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("STICKYWALL_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let default = dirs::config_dir()?.join("stickywall").join("config.toml");
    if default.exists() {
        Some(default)
    } else {
        None
    }
}

fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read config file {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid config file {}: {}", path.display(), e)))
}

/// OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("stickywall"))
        .unwrap_or_else(|| PathBuf::from("./stickywall-data"))
}
