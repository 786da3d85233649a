use super::files::{atomic_write, read_file};
use super::gateway::PersistenceGateway;
use crate::domain::{DailyStatistics, Task};
use crate::error::PersistenceError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Key the task list is stored under
pub const TASKS_KEY: &str = "tasks";

/// Gateway storing one pretty-printed JSON document per key
#[derive(Debug, Clone)]
pub struct JsonFileGateway {
    dir: PathBuf,
}

impl JsonFileGateway {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(value).map_err(|source| PersistenceError::Encode {
            key: key.to_string(),
            source,
        })?;
        atomic_write(self.path_for(key), &json)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        let Some(content) = read_file(self.path_for(key))? else {
            return Ok(None);
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| PersistenceError::Decode {
                key: key.to_string(),
                source,
            })
    }
}

impl PersistenceGateway for JsonFileGateway {
    fn save_tasks(&self, tasks: &[Task]) -> Result<(), PersistenceError> {
        self.write(TASKS_KEY, tasks)
    }

    fn load_tasks(&self) -> Result<Vec<Task>, PersistenceError> {
        Ok(self.read(TASKS_KEY)?.unwrap_or_default())
    }

    fn save_daily_statistics(
        &self,
        stats: &DailyStatistics,
        date_key: &str,
    ) -> Result<(), PersistenceError> {
        self.write(date_key, stats)
    }

    fn load_daily_statistics(
        &self,
        date_key: &str,
    ) -> Result<Option<DailyStatistics>, PersistenceError> {
        self.read(date_key)
    }
}
