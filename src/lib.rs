//! slcloud: declarative lifecycle client for SoftLayer infrastructure

pub mod config;
pub mod error;
pub mod poll;
pub mod resource;
pub mod softlayer;

#[cfg(test)]
mod testing;

/// Version injected at compile time via SLCLOUD_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("SLCLOUD_VERSION") {
    Some(v) => v,
    None => "dev",
};

pub use error::{SlError, SlResult};
pub use softlayer::client::{format_sl_error, SlClient};
