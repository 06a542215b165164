//! Pure domain types for the container entrypoint.
//!
//! Nothing in this crate touches sockets or processes; the supervisor
//! crate consumes these types and performs the I/O.

pub mod command;
pub mod error;
pub mod readiness;
pub mod restart;
pub mod role;
pub mod service_state;
pub mod startup;
