// backup-database/src/backup/db_dump.rs
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::backup::finalize::ARTIFACT_MODE;
use crate::config::{DatabaseConfig, EngineKind};
use crate::errors::{BackupError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

/// A fully built invocation of a dump utility. Secrets only ever travel
/// through a defaults file or the child's environment, never through `args`.
#[derive(Debug, Clone)]
pub struct DumpCommand {
    utility: &'static str,
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
}

impl DumpCommand {
    /// `mysqldump --defaults-file=<cnf> -h <host> -P <port> -v <name>`
    pub fn mysql(program: PathBuf, db: &DatabaseConfig, defaults_file: &Path) -> Self {
        let mut defaults_arg = OsString::from("--defaults-file=");
        defaults_arg.push(defaults_file);
        DumpCommand {
            utility: EngineKind::MySql.dump_utility(),
            program,
            args: vec![
                defaults_arg,
                "-h".into(),
                db.host.clone().into(),
                "-P".into(),
                db.port.to_string().into(),
                "-v".into(),
                db.name.clone().into(),
            ],
            envs: Vec::new(),
        }
    }

    /// `pg_dump -U <user> -h <host> -p <port> <name>` with `PGPASSWORD` set
    /// on the child only.
    pub fn postgres(program: PathBuf, db: &DatabaseConfig) -> Self {
        DumpCommand {
            utility: EngineKind::PostgreSql.dump_utility(),
            program,
            args: vec![
                "-U".into(),
                db.user.clone().into(),
                "-h".into(),
                db.host.clone().into(),
                "-p".into(),
                db.port.to_string().into(),
                db.name.clone().into(),
            ],
            envs: vec![("PGPASSWORD".to_string(), db.password.clone())],
        }
    }

    /// Printable form of the command line, safe to log.
    pub fn display_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Runs one dump and tracks its state. stdout is streamed straight into the
/// destination file; a failed or timed out dump leaves no file behind.
#[derive(Debug)]
pub struct DumpJob {
    command: DumpCommand,
    state: DumpState,
}

impl DumpJob {
    pub fn new(command: DumpCommand) -> Self {
        DumpJob {
            command,
            state: DumpState::NotStarted,
        }
    }

    pub fn state(&self) -> DumpState {
        self.state
    }

    pub async fn run(
        &mut self,
        database_id: &str,
        destination: &Path,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let utility = self.command.utility;
        let output_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(ARTIFACT_MODE)
            .open(destination)
            .map_err(|source| BackupError::Destination {
                path: destination.to_path_buf(),
                source,
            })?;

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .envs(self.command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(output_file))
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.state = DumpState::Failed;
                remove_partial(destination);
                return Err(BackupError::DumpSpawn { utility, source });
            }
        };
        self.state = DumpState::Running;
        debug!("Started {} (pid {:?})", utility, child.id());

        let waited = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    // Dropping the wait future drops the child, which kills it.
                    self.state = DumpState::Failed;
                    remove_partial(destination);
                    error!("This command timed out: '{}'", self.command.display_line());
                    return Err(BackupError::DumpTimeout {
                        utility,
                        database: database_id.to_string(),
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait_with_output().await,
        };
        let output = match waited {
            Ok(output) => output,
            Err(source) => {
                self.state = DumpState::Failed;
                remove_partial(destination);
                return Err(BackupError::DumpSpawn { utility, source });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        if output.status.success() {
            self.state = DumpState::Succeeded;
            for line in stderr.lines() {
                debug!("{}: {}", utility, line);
            }
            return Ok(());
        }

        self.state = DumpState::Failed;
        remove_partial(destination);
        error!("This command failed: '{}'", self.command.display_line());
        Err(BackupError::DumpExecution {
            utility,
            database: database_id.to_string(),
            status: output.status.to_string(),
            stderr,
        })
    }
}

fn remove_partial(destination: &Path) {
    match fs::remove_file(destination) {
        Ok(()) => debug!("Removed incomplete dump {}", destination.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(
            "Could not remove incomplete dump {}: {}",
            destination.display(),
            e
        ),
    }
}
