//! Resource abstraction layer
//!
//! Each managed resource kind implements [`ResourceLifecycle`]. Service
//! names, lookup fields and the actions a type supports are data, loaded from
//! JSON files embedded at compile time.
//!
//! # Architecture
//!
//! - [`registry`] - Loads lookup and resource definitions from embedded JSON
//! - [`lookup`] - Name <-> id resolution driven by the lookup definitions
//! - [`order`] - Order placement, order discovery and billing cancellation
//! - [`dispatch`] - Maps a type name and action onto a lifecycle implementation
//!
//! # Example
//!
//! ```ignore
//! use slcloud::resource::{LookupKind, Resolver};
//!
//! async fn dal09(client: &SlClient) -> SlResult<i64> {
//!     Resolver::for_kind(client, LookupKind::Datacenter)?.id_for("dal09").await
//! }
//! ```

pub mod dispatch;
pub mod lb_service_group;
pub mod lifecycle;
pub mod load_balancer;
pub mod lookup;
pub mod order;
pub mod provisioning_hook;
mod registry;
pub mod scale_group;
pub mod scale_policy;
pub mod user;

pub use dispatch::execute_action;
pub use lifecycle::{ResourceLifecycle, ResourceRef, Timeouts};
pub use lookup::{LookupKey, LookupKind, Resolved, Resolver};
pub use registry::*;
