// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core domain types and the error taxonomy shared by every Kiosk crate.

pub mod error;
pub mod types;

pub use error::KioskError;
pub use types::{
    CatalogVersion, CompanyService, Conversation, HealthStatus, Intent, Lead, LeadSource,
    LeadStatus, Message, Product, Prompt, Role, ScoredProduct, TokenUsage, UsageRecord, User,
    VersionStatus,
};
