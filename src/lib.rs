//! Tenant Token Gateway
//!
//! A gateway that issues short-lived RS256-signed tokens asserting a fixed
//! tenant identity to a downstream function endpoint, forwards uploads to
//! that endpoint under a rewritten identity, and mounts an external OpenID
//! Connect identity provider at the root path.
//!
//! # Components
//!
//! - **Key loading**: one-shot service-account import at startup ([`keys`])
//! - **Token issuance**: fresh signature over fresh timestamps per call
//!   ([`token`])
//! - **Upload forwarding**: fixed upstream target, rewritten `Origin`,
//!   bounded timeouts, no retry ([`proxy`])
//! - **Identity-provider seam**: configuration and root-path mount for the
//!   external OIDC collaborator ([`idp`])
//! - **Gateway**: route table and centralized error translation
//!   ([`gateway`], [`error`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod idp;
pub mod keys;
pub mod proxy;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
