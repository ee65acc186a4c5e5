//! JSON persistence for service and front end state.
use std::{
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::StateError;

/// A JSON document of type `T` at a fixed path.
#[derive(Debug, Clone)]
pub struct StateStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Store backed by `path`. Nothing is touched until load or save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted value. A missing file is [`StateError::NotFound`].
    pub fn load(&self) -> Result<T, StateError> {
        if !self.path.exists() {
            return Err(StateError::NotFound(self.path.clone()));
        }
        let contents = fs::read_to_string(&self.path)?;
        let value = serde_json::from_str::<T>(&contents)?;
        Ok(value)
    }

    /// Persists `value`, replacing the file atomically.
    pub fn save(&self, value: &T) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(value)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}
