use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local};
use rusqlite::Connection;

use crate::{
    config::CacheConfig,
    storage::{error::StorageError, schema},
};

pub type SecondsSinceUnix = i64;

const INDEX_FILE_NAME: &str = "index.sqlite";

fn open_in_memory() -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open_in_memory()
}

fn open_from_file(path: &Path) -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open(path)
}

/// location of the cache index file, inside the cache dir unless configured
pub fn index_path(config: &CacheConfig) -> PathBuf {
    config
        .database
        .path
        .clone()
        .unwrap_or_else(|| config.dir.join(INDEX_FILE_NAME))
}

pub fn open(config: &CacheConfig) -> Result<rusqlite::Connection, StorageError> {
    let db = if config.database.in_memory {
        open_in_memory()?
    } else {
        let path = index_path(config);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        open_from_file(&path)?
    };
    schema::init(&db)?;
    Ok(db)
}

/// converts time to number of seconds since unix_epoch
pub fn system_time_to_i64(time: SystemTime) -> anyhow::Result<SecondsSinceUnix> {
    i64::try_from(
        time.duration_since(UNIX_EPOCH)
            .with_context(|| "failed to get unix timestamp")?
            .as_secs(),
    )
    .with_context(|| "failed to get timestamp in seconds")
}

/// converts number of seconds since unix epoch local time to local date time
pub fn i64_seconds_to_local_time(since_unix: i64) -> anyhow::Result<DateTime<Local>> {
    let datetime = DateTime::from_timestamp_secs(since_unix).ok_or(anyhow!(
        "failed to convert {since_unix} s timestamp to datetime"
    ))?;

    Ok(DateTime::from(datetime))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::{
        config::{CacheConfig, Database},
        storage::{
            db::{i64_seconds_to_local_time, index_path, open},
            schema,
        },
    };

    fn in_memory_config() -> CacheConfig {
        CacheConfig {
            dir: "unused".into(),
            database: Database {
                in_memory: true,
                path: None,
            },
        }
    }

    #[test]
    fn open_in_memory_db_initializes_schema() {
        let db = open(&in_memory_config()).unwrap();

        let mut stmt = db
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap();

        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        for table in schema::tables::ALL_TABLES {
            assert!(tables.contains(&table.to_string()));
        }
    }

    #[test]
    fn open_on_disk_creates_index_inside_cache_dir() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let config = CacheConfig {
            dir: tmp.path().join("audio_cache"),
            database: Database::default(),
        };

        open(&config)?;

        assert_eq!(
            index_path(&config),
            tmp.path().join("audio_cache").join("index.sqlite")
        );
        assert!(index_path(&config).is_file());
        Ok(())
    }

    #[test]
    fn seconds_convert_to_local_time() -> anyhow::Result<()> {
        let time = i64_seconds_to_local_time(0)?;
        assert_eq!(time.timestamp(), 0);
        Ok(())
    }
}
