pub(crate) mod credentials; // mysqldump defaults file
pub(crate) mod db_dump;
pub(crate) mod finalize;

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{DatabaseConfig, EngineKind, GlobalConfig};
use crate::errors::{BackupError, Result};
use crate::utils::find_executable;
use credentials::CredentialFile;
use db_dump::{DumpCommand, DumpJob};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Pending,
    Succeeded,
    Failed(String),
}

/// One backup of one database. The timestamp, and therefore the destination
/// path, is fixed when the run is created.
#[derive(Debug)]
pub struct BackupRun {
    database: DatabaseConfig,
    timestamp: String,
    destination: PathBuf,
    outcome: RunOutcome,
}

impl BackupRun {
    pub fn new(database: DatabaseConfig, backup_dir: &Path, started_at: DateTime<Local>) -> Self {
        let timestamp = finalize::format_timestamp(&started_at);
        let destination = finalize::destination_path(backup_dir, &database.id, &timestamp);
        BackupRun {
            database,
            timestamp,
            destination,
            outcome: RunOutcome::Pending,
        }
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    fn fail(&mut self, err: BackupError) -> BackupError {
        self.outcome = RunOutcome::Failed(err.to_string());
        debug!("Backup run failed: {:?}", self);
        err
    }
}

/// Backs up `database_id` as described by `config`.
///
/// `home` is where the mysql credential file goes. The first failing step
/// aborts the run and is returned for the caller to log.
pub async fn run_backup(
    config: &GlobalConfig,
    config_path: &Path,
    database_id: &str,
    home: Option<&Path>,
) -> Result<BackupRun> {
    info!("Beginning backup of database {}", database_id);
    let database = config.database(database_id)?;
    info!(
        "Loading configuration for database '{}' from {}",
        database_id,
        config_path.display()
    );

    let backup_dir = config.backup_dir_for(&database)?;
    finalize::ensure_backup_dir(&backup_dir)?;
    let timeout = config.dump_timeout_for(&database);
    let mut run = BackupRun::new(database, &backup_dir, Local::now());

    // Held until the dump is done; dropping it deletes the file.
    let _credentials: Option<CredentialFile>;
    let mut job = match run.database.engine {
        EngineKind::MySql => {
            let program = find_executable(EngineKind::MySql.dump_utility())
                .map_err(|e| run.fail(e))?;
            let home = home.ok_or_else(|| {
                run.fail(BackupError::CredentialWrite {
                    path: PathBuf::from(format!("~/.my.{}.cnf", database_id)),
                    reason: "HOME is not set".to_string(),
                })
            })?;
            let creds = CredentialFile::provision(home, &run.database).map_err(|e| run.fail(e))?;
            let command = DumpCommand::mysql(program, &run.database, creds.path());
            _credentials = Some(creds);
            DumpJob::new(command)
        }
        EngineKind::PostgreSql => {
            let program = find_executable(EngineKind::PostgreSql.dump_utility())
                .map_err(|e| run.fail(e))?;
            _credentials = None;
            DumpJob::new(DumpCommand::postgres(program, &run.database))
        }
    };

    info!(
        "Dumping {} database to {}",
        run.database.engine,
        run.destination.display()
    );
    let destination = run.destination.clone();
    job.run(database_id, &destination, timeout)
        .await
        .map_err(|e| run.fail(e))?;
    debug!("{} finished: {:?}", run.database.engine.dump_utility(), job.state());

    finalize::secure_artifact(&destination).map_err(|e| run.fail(e))?;
    run.outcome = RunOutcome::Succeeded;
    info!("Backup completed.");
    Ok(run)
}
