//! Container entrypoint for the gallery backend.
//!
//! Loads [`config::BootConfig`] from the environment, runs the startup
//! sequence from `alibi-supervisor` and, when `STATUS_ADDR` is set, serves
//! a small health endpoint describing progress.

pub mod boot;
pub mod config;
pub mod logging;
pub mod routes;
pub mod state;
pub mod status_server;
pub mod wait_for;
