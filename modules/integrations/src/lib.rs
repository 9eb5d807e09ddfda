#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Integration managers
//!
//! Turns a stored integration configuration into a manager that can test the
//! connection, list its actions and execute them. Every outcome comes back as
//! an [`ActionResult`]; the caller persists the [`StatusSnapshot`].
//!
//! ## Usage
//!
//! ```ignore
//! use integrations::{IntegrationKind, build_manager};
//!
//! let manager = build_manager(IntegrationKind::RestApi, &stored_config)?;
//! let result = manager.execute_action("get", &params).await;
//! store.save_status(manager.status());
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod models;
mod params;
pub mod rest;
pub mod slack;
mod status;

pub use config::{AuthConfig, IntegrationConfig};
pub use error::{IntegrationError, ValidationError};
pub use manager::{IntegrationManager, ManagerBuilder, build_manager, build_manager_with_transport};
pub use models::{
    ActionRequest, ActionResult, ActionSpec, IntegrationKind, IntegrationStatus, ParamKind,
    ParamSpec, StatusSnapshot,
};
pub use rest::RestApiManager;
pub use slack::{SLACK_API_BASE, SlackClient, SlackManager};

// Re-exported so callers can inject transports without naming the client crate
pub use integration_http::{HttpError, HttpService};
