use crate::core::policy::{AttendancePolicy, OpenBreakPolicy, OvertimeBasis};
use crate::core::resolver::DEFAULT_GEOFENCE_RADIUS_M;
use crate::core::strategy::DeviceCapabilities;
use crate::errors::{AppError, AppResult};
use crate::models::TrackingMethod;
use crate::utils::time::parse_duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Where attendance transitions are recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The SQLite file in `database`.
    #[default]
    Local,
    /// The REST API at `api_base_url`.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: String,
    pub user_id: String,
    pub tenant_id: String,
    pub backend: BackendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub http_timeout_secs: u64,
    pub geofence_radius_m: f64,
    pub verification_window_secs: u64,
    pub break_required_after: String,
    pub overtime_after: String,
    pub overtime_basis: OvertimeBasis,
    pub open_break_policy: OpenBreakPolicy,
    pub tick_interval_secs: u64,
    pub default_method: TrackingMethod,
    pub capabilities: DeviceCapabilities,
    pub log_level: String,
}

fn default_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "local-user".to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: Self::database_file().to_string_lossy().to_string(),
            user_id: default_user(),
            tenant_id: "default".to_string(),
            backend: BackendKind::Local,
            api_base_url: None,
            api_key: None,
            http_timeout_secs: 10,
            geofence_radius_m: DEFAULT_GEOFENCE_RADIUS_M,
            verification_window_secs: 120,
            break_required_after: "6h".to_string(),
            overtime_after: "8h".to_string(),
            overtime_basis: OvertimeBasis::default(),
            open_break_policy: OpenBreakPolicy::default(),
            tick_interval_secs: 1,
            default_method: TrackingMethod::Smart,
            capabilities: DeviceCapabilities::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Return the standard configuration directory depending on the platform
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(appdata).join("rattendance")
        } else {
            let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            home.join(".rattendance")
        }
    }

    /// Return the full path of the config file
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("rattendance.conf")
    }

    /// Return the full path of the SQLite database
    pub fn database_file() -> PathBuf {
        Self::config_dir().join("rattendance.sqlite")
    }

    /// Load configuration from file, or return defaults if not found
    pub fn load() -> AppResult<Self> {
        Self::load_from(&Self::config_file())
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&content)?;
        Ok(cfg)
    }

    /// Fields of the default configuration missing from the file at `path`.
    pub fn missing_fields(path: &Path) -> AppResult<Vec<String>> {
        let content = fs::read_to_string(path)?;
        let present: serde_yaml::Value = serde_yaml::from_str(&content)?;
        let defaults = serde_yaml::to_value(Self::default())?;

        let mut missing = Vec::new();
        if let serde_yaml::Value::Mapping(map) = defaults {
            for key in map.keys() {
                if present.get(key).is_none()
                    && let Some(k) = key.as_str()
                {
                    missing.push(k.to_string());
                }
            }
        }
        Ok(missing)
    }

    /// Initialize configuration and database paths.
    ///
    /// In test mode the config file is left untouched. Returns the database path.
    pub fn init_all(custom_name: Option<String>, is_test: bool) -> AppResult<PathBuf> {
        let dir = Self::config_dir();

        let db_path = match custom_name {
            Some(name) => {
                let p = Path::new(&name);
                if p.is_absolute() {
                    p.to_path_buf()
                } else if is_test {
                    PathBuf::from(&name)
                } else {
                    dir.join(p)
                }
            }
            None => Self::database_file(),
        };

        if !is_test {
            fs::create_dir_all(&dir)?;
            let config = Config {
                database: db_path.to_string_lossy().to_string(),
                ..Self::load()?
            };
            let yaml = serde_yaml::to_string(&config)?;
            let mut file = fs::File::create(Self::config_file())?;
            file.write_all(yaml.as_bytes())?;
        }

        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        Ok(db_path)
    }

    /// The attendance rules described by this configuration.
    pub fn policy(&self) -> AppResult<AttendancePolicy> {
        if self.tick_interval_secs == 0 {
            return Err(AppError::Config("tick_interval_secs must be positive".into()));
        }
        let verification_window = i64::try_from(self.verification_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .filter(|w| *w > chrono::Duration::zero())
            .ok_or_else(|| {
                AppError::Config(format!(
                    "verification_window_secs out of range: {}",
                    self.verification_window_secs
                ))
            })?;

        Ok(AttendancePolicy {
            break_required_after: parse_duration(&self.break_required_after)?,
            overtime_after: parse_duration(&self.overtime_after)?,
            overtime_basis: self.overtime_basis,
            open_break_policy: self.open_break_policy,
            verification_window,
            tick_interval: std::time::Duration::from_secs(self.tick_interval_secs),
        })
    }

    /// Sanity checks that do not need any I/O.
    pub fn validate(&self) -> AppResult<()> {
        self.policy()?;
        if !(self.geofence_radius_m.is_finite() && self.geofence_radius_m > 0.0) {
            return Err(AppError::Config(format!(
                "geofence_radius_m must be positive, got {}",
                self.geofence_radius_m
            )));
        }
        if self.user_id.trim().is_empty() {
            return Err(AppError::Config("user_id is empty".into()));
        }
        if self.backend == BackendKind::Http && self.api_base_url.is_none() {
            return Err(AppError::Config(
                "backend 'http' needs api_base_url".into(),
            ));
        }
        Ok(())
    }
}
