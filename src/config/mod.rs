// backup-database/src/config/mod.rs
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{BackupError, Result};

/// Environment variable naming the organization whose shared config is used.
pub const ORG_ENV_VAR: &str = "MY_ORG";
pub const CONFIG_FILE_NAME: &str = "backup-database.yaml";

/// Port as written in the YAML document. The Ruby-era configs quote it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(i64),
    Text(String),
}

// One entry under `databases`, as written in config.yaml. Fields are optional
// here so an incomplete entry only fails when it is the one requested.
#[derive(Debug, Clone, Deserialize)]
struct RawDatabaseEntry {
    db_type: Option<String>,
    db_host: Option<String>,
    db_port: Option<PortValue>,
    db_name: Option<String>,
    db_user: Option<String>,
    db_password: Option<String>,
    backup_dir: Option<PathBuf>,
    dump_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    MySql,
    PostgreSql,
}

impl EngineKind {
    /// Name of the dump utility invoked for this engine.
    pub fn dump_utility(self) -> &'static str {
        match self {
            EngineKind::MySql => "mysqldump",
            EngineKind::PostgreSql => "pg_dump",
        }
    }
}

impl FromStr for EngineKind {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "mysql" => Ok(EngineKind::MySql),
            "postgresql" | "postgres" => Ok(EngineKind::PostgreSql),
            other => Err(BackupError::UnsupportedEngine(other.to_string())),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::MySql => write!(f, "mysql"),
            EngineKind::PostgreSql => write!(f, "postgresql"),
        }
    }
}

/// Fully validated settings for the database being backed up.
#[derive(Clone, PartialEq)]
pub struct DatabaseConfig {
    pub id: String,
    pub engine: EngineKind,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub backup_dir: Option<PathBuf>,
    pub dump_timeout_secs: Option<u64>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("backup_dir", &self.backup_dir)
            .field("dump_timeout_secs", &self.dump_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    pub log_dir: PathBuf,
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    #[serde(default)]
    pub dump_timeout_secs: Option<u64>,
    databases: Vec<BTreeMap<String, RawDatabaseEntry>>,
}

/// Picks the config file: an explicit override wins, otherwise the
/// organization's shared file under /etc.
pub fn resolve_config_path(override_path: Option<&Path>, org: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    match org.map(str::trim).filter(|o| !o.is_empty()) {
        Some(org) => Ok(PathBuf::from("/etc").join(org).join(CONFIG_FILE_NAME)),
        None => Err(BackupError::ConfigLocation),
    }
}

impl GlobalConfig {
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path).map_err(|source| BackupError::ConfigRead {
            path: config_path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content, config_path)
    }

    /// Parses a config document. `origin` is only used in error messages.
    pub fn from_yaml_str(content: &str, origin: &Path) -> Result<Self> {
        let config: GlobalConfig =
            serde_yaml::from_str(content).map_err(|source| BackupError::ConfigParse {
                path: origin.to_path_buf(),
                source,
            })?;

        {
            let mut seen = HashSet::new();
            if let Some(dup) = config.database_ids().find(|id| !seen.insert(*id)) {
                return Err(BackupError::DuplicateDatabase(dup.to_string()));
            }
        }
        Ok(config)
    }

    /// Database identifiers in document order.
    pub fn database_ids(&self) -> impl Iterator<Item = &str> {
        self.databases
            .iter()
            .flat_map(|entry| entry.keys().map(String::as_str))
    }

    /// Looks up the entry whose key matches `id` exactly and validates it.
    pub fn database(&self, id: &str) -> Result<DatabaseConfig> {
        let raw = self
            .databases
            .iter()
            .find_map(|entry| entry.get(id))
            .ok_or_else(|| BackupError::DatabaseNotFound(id.to_string()))?;

        let required = |value: &Option<String>, field: &'static str| -> Result<String> {
            value
                .as_ref()
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or_else(|| BackupError::MissingField {
                    database: id.to_string(),
                    field,
                })
        };

        let engine: EngineKind = required(&raw.db_type, "db_type")?.parse()?;
        let port = match &raw.db_port {
            Some(PortValue::Number(number)) => {
                u16::try_from(*number).map_err(|_| BackupError::InvalidField {
                    database: id.to_string(),
                    field: "db_port",
                    value: number.to_string(),
                })?
            }
            Some(PortValue::Text(text)) => {
                text.trim().parse().map_err(|_| BackupError::InvalidField {
                    database: id.to_string(),
                    field: "db_port",
                    value: text.clone(),
                })?
            }
            None => {
                return Err(BackupError::MissingField {
                    database: id.to_string(),
                    field: "db_port",
                });
            }
        };

        Ok(DatabaseConfig {
            id: id.to_string(),
            engine,
            host: required(&raw.db_host, "db_host")?,
            port,
            name: required(&raw.db_name, "db_name")?,
            user: required(&raw.db_user, "db_user")?,
            // An empty password is legitimate, only absence is an error.
            password: raw.db_password.clone().ok_or_else(|| BackupError::MissingField {
                database: id.to_string(),
                field: "db_password",
            })?,
            backup_dir: non_empty_path(&raw.backup_dir),
            dump_timeout_secs: raw.dump_timeout_secs,
        })
    }

    /// Per-database `backup_dir` first, then the global default.
    pub fn backup_dir_for(&self, db: &DatabaseConfig) -> Result<PathBuf> {
        db.backup_dir
            .clone()
            .or_else(|| non_empty_path(&self.backup_dir))
            .ok_or_else(|| BackupError::MissingBackupDir(db.id.clone()))
    }

    /// `None` means wait for the dump utility indefinitely.
    pub fn dump_timeout_for(&self, db: &DatabaseConfig) -> Option<Duration> {
        db.dump_timeout_secs
            .or(self.dump_timeout_secs)
            .map(Duration::from_secs)
    }

    pub fn log_file_for(&self, database_id: &str) -> PathBuf {
        self.log_dir
            .join(format!("backup-database-{}.log", database_id))
    }
}

fn non_empty_path(path: &Option<PathBuf>) -> Option<PathBuf> {
    path.clone().filter(|p| !p.as_os_str().is_empty())
}
