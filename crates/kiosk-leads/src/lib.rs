// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lead lifecycle: capture, validation, durable persistence, and CRM
//! delivery with bounded retry.

pub mod crm;
pub mod pipeline;
pub mod validate;
pub mod worker;

pub use crm::{CrmClient, CrmLeadPayload, CrmRecord, HttpCrmClient};
pub use pipeline::{LeadDraft, LeadPipeline};
pub use worker::CrmWorker;
