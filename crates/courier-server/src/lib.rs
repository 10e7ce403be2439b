/*
 *  Copyright 2025-2026 Courier Contributors
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

//! `courierd`: runs the Courier pipeline and exposes the HTTP gateway.

pub mod config;
pub mod load;
pub mod retry;
pub mod routes;
pub mod server;

pub use config::{ConfigError, ServerArgs};
pub use retry::Backoff;
pub use routes::{create_router, AppState};
pub use server::run;
