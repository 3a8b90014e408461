//! JSON-lines file store
//!
//! A data directory holds two files:
//!
//! - `schema.toml`: the migration versions applied so far
//! - `messages.jsonl`: one committed [`Row`] per line
//!
//! Every append is flushed and synced before it is reported as committed.
//! Only newline-terminated lines count as committed. An unterminated tail is
//! left by an append that never finished, and `migrate` cuts it off.

use crate::store::error::{StoreError, StoreResult};
use crate::store::traits::{NewRow, Row, Store, StoreConnector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const MESSAGES_FILE: &str = "messages.jsonl";
pub const SCHEMA_FILE: &str = "schema.toml";

struct Migration {
    version: u32,
    name: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create_messages",
}];

#[derive(Debug, Default, Serialize, Deserialize)]
struct SchemaState {
    applied: Vec<u32>,
}

/// Connector for a [`JsonlStore`] rooted at a directory
#[derive(Debug, Clone)]
pub struct JsonlConnector {
    dir: PathBuf,
}

impl JsonlConnector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl StoreConnector for JsonlConnector {
    async fn connect(self: Box<Self>) -> StoreResult<Box<dyn Store>> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;
        log::debug!("JsonlStore: opened data directory {}", self.dir.display());
        Ok(Box::new(JsonlStore {
            dir: self.dir,
            file: None,
            next_id: 1,
        }))
    }
}

/// File-backed store; see the module documentation for the layout
pub struct JsonlStore {
    dir: PathBuf,
    file: Option<File>,
    next_id: u64,
}

impl JsonlStore {
    fn schema_path(&self) -> PathBuf {
        self.dir.join(SCHEMA_FILE)
    }

    fn messages_path(&self) -> PathBuf {
        self.dir.join(MESSAGES_FILE)
    }

    async fn load_schema(&self) -> StoreResult<SchemaState> {
        let path = self.schema_path();
        match fs::read_to_string(&path).await {
            Ok(contents) => toml::from_str(&contents).map_err(|e| StoreError::Corrupt {
                path,
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SchemaState::default()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    async fn save_schema(&self, state: &SchemaState) -> StoreResult<()> {
        let path = self.schema_path();
        let tmp = self.dir.join(format!("{}.tmp", SCHEMA_FILE));
        let contents = toml::to_string(state).map_err(|e| StoreError::MigrationFailed {
            message: e.to_string(),
        })?;
        fs::write(&tmp, contents)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    async fn apply(&self, migration: &Migration) -> StoreResult<()> {
        match migration.version {
            1 => {
                let path = self.messages_path();
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await
                    .map_err(|e| StoreError::io(&path, e))?;
                Ok(())
            }
            other => Err(StoreError::MigrationFailed {
                message: format!("no procedure for migration {}", other),
            }),
        }
    }

    /// Truncate an unterminated final line back to the last complete row
    async fn discard_torn_tail(&self) -> StoreResult<()> {
        let path = self.messages_path();
        let contents = fs::read(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        if contents.last().map_or(true, |byte| *byte == b'\n') {
            return Ok(());
        }
        let keep = contents
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(0, |pos| pos + 1);
        log::warn!(
            "JsonlStore: discarding {} byte(s) of an unfinished append at the end of {}",
            contents.len() - keep,
            path.display()
        );

        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.set_len(keep as u64)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.sync_all().await.map_err(|e| StoreError::io(&path, e))
    }

    /// Read every committed row from a data directory
    pub async fn read_rows(dir: impl AsRef<Path>) -> StoreResult<Vec<Row>> {
        let path = dir.as_ref().join(MESSAGES_FILE);
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        parse_rows(&path, &contents)
    }
}

fn parse_rows(path: &Path, contents: &str) -> StoreResult<Vec<Row>> {
    contents
        .split_inclusive('\n')
        .enumerate()
        .filter(|(_, line)| line.ends_with('\n') && !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<Row>(line).map_err(|e| StoreError::Corrupt {
                path: path.to_path_buf(),
                message: format!("line {}: {}", index + 1, e),
            })
        })
        .collect()
}

#[async_trait]
impl Store for JsonlStore {
    async fn migrate(&mut self) -> StoreResult<()> {
        let mut state = self.load_schema().await?;

        for migration in MIGRATIONS {
            if state.applied.contains(&migration.version) {
                continue;
            }
            log::info!(
                "JsonlStore: applying migration {} ({})",
                migration.version,
                migration.name
            );
            self.apply(migration).await?;
            state.applied.push(migration.version);
            self.save_schema(&state).await?;
        }

        let path = self.messages_path();
        self.discard_torn_tail().await?;
        let existing = Self::read_rows(&self.dir).await?;
        self.next_id = existing.last().map_or(1, |row| row.id + 1);

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        self.file = Some(file);
        log::debug!(
            "JsonlStore: schema at version {:?}, next id {}",
            state.applied.iter().max(),
            self.next_id
        );
        Ok(())
    }

    async fn append(&mut self, row: NewRow) -> StoreResult<Row> {
        let path = self.dir.join(MESSAGES_FILE);
        let file = self.file.as_mut().ok_or(StoreError::NotMigrated)?;

        let row = row.with_id(self.next_id);
        let mut line = serde_json::to_vec(&row).map_err(|e| StoreError::AppendRejected {
            message: e.to_string(),
        })?;
        line.push(b'\n');

        file.write_all(&line)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        file.flush().await.map_err(|e| StoreError::io(&path, e))?;
        file.sync_data()
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        self.next_id += 1;
        Ok(row)
    }
}
