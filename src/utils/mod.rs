pub mod logging;

use std::path::PathBuf;
use which::which;

use crate::errors::{BackupError, Result};

/// Finds a dump utility executable in the system PATH.
pub fn find_executable(name: &'static str) -> Result<PathBuf> {
    which(name).map_err(|_| BackupError::DumpUtilityNotFound(name))
}
