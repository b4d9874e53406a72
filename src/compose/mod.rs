//! Plugin composition.
//!
//! A [`Host`] wraps a store and a set of named [`Capabilities`]. Each call to
//! [`Host::with`] runs a [`Plugin`] against the host and returns a new host
//! with the plugin's capabilities merged on top. [`Host::seal`] ends
//! composition and yields a read-only [`Sealed`] surface.
//!
//! Capabilities are typed structs stored under a name and recovered by
//! downcasting, so the set of capabilities is fixed once a host is sealed.

mod capabilities;
mod host;

pub use capabilities::Capabilities;
pub use host::{Contribution, Host, Plugin, Sealed, MAX_PLUGIN_DEPTH};
