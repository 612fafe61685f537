// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod catalog;
pub mod conversations;
pub mod leads;
pub mod logs;
pub mod messages;
pub mod prompts;
pub mod services;
pub mod settings;
pub mod usage;
pub mod users;
