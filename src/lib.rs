//! machinist library
//!
//! Provisions compute hosts (virtual machines or cloud instances) through
//! a driver-agnostic plugin boundary and configures them to run a
//! container engine.
//!
//! # Design Principles
//!
//! - **Safety First**: No unsafe code (`unsafe_code = "forbid"`)
//! - **Fail Fast**: every input check runs before the first remote or
//!   persistent mutation
//! - **Schema Negotiation**: the `create` flag surface is discovered from
//!   the selected driver at runtime, not hard-coded
//!
//! The crate is organized around three pieces: [`flags`] negotiates a
//! driver's configuration schema into command-line options and back into a
//! typed option bundle, [`create`] sequences the host-creation workflow,
//! and [`cloudinit`] merges custom bootstrap scripts into boot-configuration
//! documents. Drivers implement [`drivers::Driver`]; host metadata persists
//! through [`store::HostStore`].

pub mod cloudinit;
pub mod crashreport;
pub mod create;
pub mod dirs;
pub mod drivers;
pub mod flags;
pub mod host;
pub mod store;

mod error;

pub use error::MachinistError;
pub use host::{HostDescriptor, HostOptions};
