use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KillSwitchError {
    #[error("Kill switch engaged: {0}")]
    Engaged(PathBuf),
}

impl KillSwitchError {
    pub fn class(&self) -> &'static str {
        match self {
            KillSwitchError::Engaged(_) => "KillSwitchError::Engaged",
        }
    }
}

/// Externally controlled stop signal: engaged while the marker file exists.
#[derive(Debug, Clone)]
pub struct KillSwitch {
    path: PathBuf,
    enabled: bool,
}

impl KillSwitch {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
        }
    }

    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn engaged(&self) -> bool {
        self.enabled && self.path.exists()
    }

    pub fn fail_if_engaged(&self) -> Result<(), KillSwitchError> {
        if self.engaged() {
            return Err(KillSwitchError::Engaged(self.path.clone()));
        }
        Ok(())
    }
}
