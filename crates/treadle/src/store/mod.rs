/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Persisted state store
//!
//! A durable mapping task-name → {per-dependency witness map, saved-values
//! map, last-success timestamp}, backed by Diesel over SQLite and pooled
//! with `r2d2`. The core only ever talks to this module through
//! [`StateStoreDal`]; the schema is an implementation detail.

pub mod models;
pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::capability::Witness;
use crate::error::EngineError;
use crate::values::ValueMap;

use models::{DependencyWitnessRow, NewDependencyWitnessRow, NewTaskRecord, TaskRecord};
use schema::{dependency_witnesses, task_records};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/store/migrations");

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

/// Thread-safe wrapper around the state store's connection pool.
///
/// `Database` is `Clone`; each clone references the same pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if absent) the SQLite file at `path` and runs pending
    /// migrations. Panics on failure: an unopenable state store is not a
    /// per-task error, it is why the session exists.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create state store directory");
        }
        let manager = ConnectionManager::<SqliteConnection>::new(path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("failed to create state store connection pool");

        {
            let mut conn = pool.get().expect("failed to acquire state store connection");
            conn.run_pending_migrations(MIGRATIONS)
                .expect("failed to run state store migrations");
        }

        info!(path = %path.display(), "state store opened");
        Self { pool }
    }

    pub fn in_memory() -> Self {
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .expect("failed to create in-memory state store pool");
        {
            let mut conn = pool.get().expect("failed to acquire state store connection");
            conn.run_pending_migrations(MIGRATIONS)
                .expect("failed to run state store migrations");
        }
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<SqliteConnection>>, EngineError> {
        self.pool
            .get()
            .map_err(|e| EngineError::Store(e.to_string()))
    }
}

/// Snapshot of a task's persisted state, as read back for the up-to-date
/// engine and `getargs` resolution.
#[derive(Debug, Clone, Default)]
pub struct StoredTaskState {
    pub witnesses: HashMap<String, Witness>,
    pub saved_values: ValueMap,
    pub last_success: Option<NaiveDateTime>,
}

/// Data-access layer over the state store, the one thing the rest of the
/// core depends on for persistence.
#[derive(Clone)]
pub struct StateStoreDal {
    db: Database,
}

impl StateStoreDal {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("./.treadle/state.sqlite3")
    }

    /// Point lookup for a single task's persisted state.
    pub fn load(&self, task_name: &str) -> Result<StoredTaskState, EngineError> {
        let mut conn = self.db.conn()?;

        let record: Option<TaskRecord> = task_records::table
            .filter(task_records::task_name.eq(task_name))
            .select(TaskRecord::as_select())
            .first(&mut conn)
            .optional()
            .map_err(|e| EngineError::Store(e.to_string()))?;

        let Some(record) = record else {
            return Ok(StoredTaskState::default());
        };

        let witness_rows: Vec<DependencyWitnessRow> = dependency_witnesses::table
            .filter(dependency_witnesses::task_name.eq(task_name))
            .select(DependencyWitnessRow::as_select())
            .load(&mut conn)
            .map_err(|e| EngineError::Store(e.to_string()))?;

        let witnesses = witness_rows
            .into_iter()
            .map(|row| (row.dependency_key, Witness::new(row.witness)))
            .collect();

        let saved_values: ValueMap = serde_json::from_str::<serde_json::Value>(&record.saved_values)
            .ok()
            .and_then(ValueMap::from_json_object)
            .unwrap_or_default();

        Ok(StoredTaskState {
            witnesses,
            saved_values,
            last_success: record.last_success,
        })
    }

    /// Atomically upserts a task's witnesses and saved values after a
    /// successful action sequence. Prior witnesses for this task are
    /// replaced wholesale so the store never retains a witness for a
    /// dependency that is not part of the current declared set (§3
    /// invariant: "never retains witnesses for dependencies that were not
    /// present on the most recent successful execution").
    pub fn commit(
        &self,
        task_name: &str,
        witnesses: &HashMap<String, Witness>,
        saved_values: &ValueMap,
    ) -> Result<(), EngineError> {
        let mut conn = self.db.conn()?;
        let now = Utc::now().naive_utc();
        let saved_values_json = serde_json::to_string(&saved_values.as_json_object())
            .map_err(|e| EngineError::Store(e.to_string()))?;

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::insert_into(task_records::table)
                .values(&NewTaskRecord {
                    task_name: task_name.to_string(),
                    saved_values: saved_values_json.clone(),
                    last_success: Some(now),
                })
                .on_conflict(task_records::task_name)
                .do_update()
                .set((
                    task_records::saved_values.eq(saved_values_json),
                    task_records::last_success.eq(Some(now)),
                ))
                .execute(conn)?;

            diesel::delete(dependency_witnesses::table)
                .filter(dependency_witnesses::task_name.eq(task_name))
                .execute(conn)?;

            for (key, witness) in witnesses {
                diesel::insert_into(dependency_witnesses::table)
                    .values(&NewDependencyWitnessRow {
                        task_name: task_name.to_string(),
                        dependency_key: key.clone(),
                        witness: witness.as_str().to_string(),
                    })
                    .execute(conn)?;
            }

            Ok(())
        })
        .map_err(|e| EngineError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> StateStoreDal {
        StateStoreDal::new(Database::in_memory())
    }

    #[test]
    fn load_of_unknown_task_is_empty() {
        crate::init_test_logging();
        let store = test_store();
        let state = store.load("nope").unwrap();
        assert!(state.witnesses.is_empty());
        assert!(state.saved_values.is_empty());
        assert!(state.last_success.is_none());
    }

    #[test]
    fn commit_then_load_round_trips_witnesses_and_values() {
        crate::init_test_logging();
        let store = test_store();
        let mut witnesses = HashMap::new();
        witnesses.insert("/a.txt".to_string(), Witness::new("w1"));
        let mut values = ValueMap::new();
        values.insert("rev", serde_json::Value::String("r42".into()));

        store.commit("task-a", &witnesses, &values).unwrap();
        let state = store.load("task-a").unwrap();

        assert_eq!(state.witnesses.get("/a.txt"), Some(&Witness::new("w1")));
        assert_eq!(state.saved_values, values);
        assert!(state.last_success.is_some());
    }

    #[test]
    fn commit_replaces_stale_witnesses_wholesale() {
        crate::init_test_logging();
        let store = test_store();
        let mut first = HashMap::new();
        first.insert("/a.txt".to_string(), Witness::new("w1"));
        first.insert("/b.txt".to_string(), Witness::new("w1"));
        store.commit("task-a", &first, &ValueMap::new()).unwrap();

        let mut second = HashMap::new();
        second.insert("/a.txt".to_string(), Witness::new("w2"));
        store.commit("task-a", &second, &ValueMap::new()).unwrap();

        let state = store.load("task-a").unwrap();
        assert_eq!(state.witnesses.len(), 1);
        assert_eq!(state.witnesses.get("/a.txt"), Some(&Witness::new("w2")));
        assert_eq!(state.witnesses.get("/b.txt"), None);
    }
}
