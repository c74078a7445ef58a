// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod machine_id;
mod schema;

pub use loader::{default_config_path, load, save};
pub use machine_id::machine_id;
pub use schema::*;
