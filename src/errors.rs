use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Neither a config file override nor MY_ORG is defined")]
    ConfigLocation,

    #[error("Could not read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Database '{0}' is defined more than once in the config file")]
    DuplicateDatabase(String),

    #[error("Couldn't find configuration for database '{0}'")]
    DatabaseNotFound(String),

    #[error("Database '{database}' is missing required setting '{field}'")]
    MissingField {
        database: String,
        field: &'static str,
    },

    #[error("Database '{database}' has an invalid value for '{field}': {value}")]
    InvalidField {
        database: String,
        field: &'static str,
        value: String,
    },

    #[error("backup_dir is not defined for database '{0}' nor globally")]
    MissingBackupDir(String),

    #[error("db_type '{0}' is not supported, must be either mysql or postgresql")]
    UnsupportedEngine(String),

    #[error("Could not write credential file {path}: {reason}")]
    CredentialWrite { path: PathBuf, reason: String },

    #[error("{0} executable not found in PATH")]
    DumpUtilityNotFound(&'static str),

    #[error("Failed to start {utility}: {source}")]
    DumpSpawn {
        utility: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{utility} failed for database '{database}' ({status}): {stderr}")]
    DumpExecution {
        utility: &'static str,
        database: String,
        status: String,
        stderr: String,
    },

    #[error("{utility} for database '{database}' did not finish within {secs} seconds")]
    DumpTimeout {
        utility: &'static str,
        database: String,
        secs: u64,
    },

    #[error("Could not prepare backup destination {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not secure backup file {path}: {source}")]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BackupError>;
