//! # fleetcast common
//! This crate contains functionality that is shared between the publisher
//! tooling and the distribution server: the artifact binary format, the
//! crypto primitives it is built on, and the JSON wire types.

/// The update artifact binary format and its streaming digest.
pub mod artifact;
/// X.509 helpers for device certificates.
pub mod certs;
/// Signing, sealing, and key wrapping primitives.
pub mod crypto;
pub mod error;
/// Small filesystem helpers.
pub mod fsutil;
/// JSON data structures exchanged between publisher and server.
pub mod wire;

pub use error::Error;
