//! merge-gate - CI check polling and merge readiness for GitHub and GitLab
//!
//! The engine is layered leaves first:
//!
//! - [`fetch`] collects check runs for a PR's head commit (I/O only)
//! - [`classify`] maps raw check results onto a small taxonomy (pure)
//! - [`poll`] waits for checks with backoff, fetch retry and cancellation
//! - [`readiness`] turns a snapshot plus merge state into a verdict (pure)
//! - [`automerge`] tracks an auto-merge request and the events that cancel it
//!
//! All remote access goes through [`platform::PlatformService`].

pub mod auth;
pub mod automerge;
pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod platform;
pub mod poll;
pub mod readiness;
pub mod types;
