// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for the Kiosk agent.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Query modules are grouped per table family under [`queries`].

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::{map_tr_err, now_iso, Database};
