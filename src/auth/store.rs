use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::AuthSession;
use crate::error::CallError;

const SESSION_FILE_NAME: &str = "session.toml";

/// Storage for the signed-in session.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<AuthSession>, CallError>;
    fn save(&self, session: &AuthSession) -> Result<(), CallError>;
    fn clear(&self) -> Result<(), CallError>;
}

/// TOML file store, readable only by the owner on unix.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SESSION_FILE_NAME),
        }
    }

    /// Store under the platform data directory.
    pub fn new_default() -> Self {
        let dir = directories::ProjectDirs::from("com", "ceritain", "ceritain-call")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".ceritain"));
        Self::new(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<AuthSession>, CallError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let file: SessionFile = toml::from_str(&raw)
            .map_err(|e| CallError::Configuration(format!("Invalid session file: {e}")))?;
        Ok(Some(file.session))
    }

    fn save(&self, session: &AuthSession) -> Result<(), CallError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = SessionFile {
            version: 1,
            saved_at: Utc::now(),
            session: session.clone(),
        };
        let serialized = toml::to_string(&file)
            .map_err(|e| CallError::Configuration(format!("Cannot encode session: {e}")))?;
        fs::write(&self.path, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CallError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    saved_at: DateTime<Utc>,
    session: AuthSession,
}
