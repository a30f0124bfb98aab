//! SoftLayer API interaction module
//!
//! Everything between a typed call and the wire: request paths with object
//! masks and filters, the HTTP transport, response classification and
//! credentials.
//!
//! # Module Structure
//!
//! - [`request`] - Request targets, object masks, object filters, parameters
//! - [`classify`] - Turns a raw exchange into success or a typed failure
//! - [`http`] - Transport capability and its reqwest implementation
//! - [`client`] - Typed client combining the three above
//! - [`auth`] - Username / API key discovery
//!
//! # Example
//!
//! ```ignore
//! use slcloud::softlayer::{client::SlClient, request::RequestTarget};
//!
//! async fn example(client: &SlClient) -> slcloud::SlResult<()> {
//!     let target = RequestTarget::list("SoftLayer_Account", "getAdcLoadBalancers");
//!     let lbs: Vec<serde_json::Value> = client.list(&target).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod classify;
pub mod client;
pub mod http;
pub mod request;
