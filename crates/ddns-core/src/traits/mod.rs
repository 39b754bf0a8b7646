//! Core traits for the DDNS system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpSource`]: Ask one external service for the public IP
//! - [`DnsProvider`]: Read and write the managed DNS record
//! - [`StateStore`]: Persistent settings and update history

pub mod ip_source;
pub mod dns_provider;
pub mod state_store;

pub use ip_source::IpSource;
pub use dns_provider::{DnsProvider, DnsRecord};
pub use state_store::StateStore;
