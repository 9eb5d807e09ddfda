//! Slack integration built on the generic client.

mod client;
mod manager;

pub use client::{SLACK_API_BASE, SlackClient};
pub use manager::SlackManager;
