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

//! Diesel schema for the persisted state store, normally generated by
//! `diesel print-schema` from the migrations in `store/migrations/`.

diesel::table! {
    task_records (task_name) {
        task_name -> Text,
        saved_values -> Text,
        last_success -> Nullable<Timestamp>,
    }
}

diesel::table! {
    dependency_witnesses (task_name, dependency_key) {
        task_name -> Text,
        dependency_key -> Text,
        witness -> Text,
    }
}

diesel::joinable!(dependency_witnesses -> task_records (task_name));
diesel::allow_tables_to_appear_in_same_query!(task_records, dependency_witnesses);
