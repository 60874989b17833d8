//! Service integrations for external APIs and clients.
//!
//! This module contains implementations for various services used by the jira-bot:
//! - Chat services (e.g., Slack)
//! - Database services (e.g., SurrealDB)
//! - Issue trackers (e.g., JIRA)
//! - The shared tracker session cache
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod chat;
pub mod db;
pub mod session;
pub mod tracker;
