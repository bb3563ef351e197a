//! sgsync - declarative security group reconciliation
//!
//! Compares a declared set of inbound permission rules against the live rules
//! of a security group and either reports the difference (audit) or applies it
//! (enforce).
//!
//! # Architecture
//!
//! - [`core`] - Diff engine, reconciler, provider gateway and stored specs
//! - [`audit`] - JSON-lines audit trail of reconciliation runs
//! - [`validators`] - Spec validation at the input boundary
//! - [`config`] - Configuration persistence
//! - [`utils`] - Utility functions (XDG directories)
//!
//! # Example
//!
//! ```no_run
//! use sgsync::core::file_gateway::JsonFileGateway;
//! use sgsync::core::gateway::GatewayConfig;
//! use sgsync::{GroupSpec, PermissionRule, Protocol, Reconciler};
//!
//! # async fn run() {
//! let spec = GroupSpec::new("web", "vpc-1", "us-east-1")
//!     .with_permission(PermissionRule::new(Protocol::Tcp, 443, 443, ["0.0.0.0/0"]));
//!
//! let gateway = JsonFileGateway::new(GatewayConfig::new("us-east-1", "/tmp/state.json"));
//! let result = Reconciler::new(gateway).audit(&spec).await;
//! println!("up to date: {}", result.up_to_date);
//! # }
//! ```

#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod utils;
pub mod validators;

pub use core::error::{Error, Result};
pub use core::permission::{GroupSpec, PermissionRule, Protocol, ReconciliationResult};
pub use core::reconcile::Reconciler;
