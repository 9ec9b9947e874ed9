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

//! Entry point for the crate's integration test binary, one module per
//! seed scenario from the testable-properties section of the engine's
//! specification.

pub mod cascade;
pub mod compile_chain;
pub mod default_store_path;
pub mod failure_and_limits;
pub mod getargs;
pub mod touch_once;
