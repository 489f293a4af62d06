use chrono_tz::Tz;
use famscore_shared::domain::MemberRole;
use serde::Deserialize;
use std::{env, fs, path::Path};

use crate::engine::MemberSeed;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub family: FamilyConfig,
    pub members: Vec<MemberConfig>,
    pub users: Vec<UserConfig>,
    /// IANA timezone name defining the family's calendar day.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FamilyConfig {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberConfig {
    pub id: String,
    pub name: String,
    pub role: MemberRole,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password_hash: String, // bcrypt hash
    pub member_id: String,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Timezone(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Timezone(tz) => write!(f, "unknown timezone: {}", tz),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        let cfg: AppConfig = serde_yaml::from_str(&text)?;
        cfg.tz()?;
        Ok(cfg)
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Timezone(self.timezone.clone()))
    }

    pub fn member_seeds(&self) -> Vec<MemberSeed> {
        self.members
            .iter()
            .map(|m| MemberSeed {
                id: m.id.clone(),
                name: m.name.clone(),
                role: m.role,
                avatar: m.avatar.clone(),
            })
            .collect()
    }
}
