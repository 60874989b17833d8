//! Event handling and user interactions for jira-bot.
//!
//! This module provides functionality for handling chat messages:
//! - Finding issue references in incoming messages
//! - Looking the issues up and replying with their summaries

pub mod issue_reference;
