// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversation core: per-turn orchestration, intent classification,
//! the conversation store, the service/knowledge lookup, and the
//! inactivity monitor.

pub mod classifier;
pub mod conversation;
pub mod knowledge;
pub mod monitor;
pub mod orchestrator;

pub use classifier::QueryClassifier;
pub use conversation::ConversationStore;
pub use knowledge::KnowledgeStore;
pub use monitor::{InactivityMonitor, OutboundMessage};
pub use orchestrator::{Orchestrator, ProductSearch, TurnReply};
