// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Environment-driven configuration for the Kiosk agent.
//!
//! All runtime knobs come from the documented environment variables
//! (`BOT_TOKEN`, `DATABASE_URL`, `SEARCH_MIN_SCORE`, ...), merged over
//! compiled defaults via Figment. An optional `kiosk.toml` in the working
//! directory sits between the two layers for local development.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_str};
pub use model::KioskConfig;
pub use validation::validate;
