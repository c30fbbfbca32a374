//! pinrelay - pinning orchestration for content-addressed data
//!
//! Stores content in a local embedded node, replicates it to remote pinning
//! providers, and audits afterwards where it actually persists.
//!
//! Key principles:
//! - A pin counts only once the provider's own status query confirms it
//! - One provider failing never affects another provider's outcome
//! - Replication never fails the upload that produced the content
//! - Status checks and storage searches ask live sources, never caches

pub mod cid;
pub mod config;
pub mod index;
pub mod locator;
pub mod orchestrator;
pub mod reconcile;
pub mod remote;
pub mod service;
pub mod store;

#[cfg(test)]
mod proptests;
