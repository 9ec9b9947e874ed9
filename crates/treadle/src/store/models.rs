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

//! Row types for the persisted state store.
//!
//! Saved values and witnesses are stored as serialized JSON text columns
//! rather than a native JSON column type — this keeps the store backend
//! portable and sidesteps SQLite's lack of a first-class JSON type.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use super::schema::{dependency_witnesses, task_records};

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = task_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskRecord {
    pub task_name: String,
    pub saved_values: String,
    pub last_success: Option<NaiveDateTime>,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = task_records)]
pub struct NewTaskRecord {
    pub task_name: String,
    pub saved_values: String,
    pub last_success: Option<NaiveDateTime>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = dependency_witnesses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DependencyWitnessRow {
    pub task_name: String,
    pub dependency_key: String,
    pub witness: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = dependency_witnesses)]
pub struct NewDependencyWitnessRow {
    pub task_name: String,
    pub dependency_key: String,
    pub witness: String,
}
