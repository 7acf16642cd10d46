//! Typed WebDAV (RFC 4918) XML vocabulary.
//!
//! Requests and responses are plain Rust values ([`types`]) that know how
//! to read themselves from and write themselves to a namespace-aware XML
//! stream ([`xml::ReadXml`] / [`xml::WriteXml`]). Client-defined ("dead")
//! properties keep their `(namespace, local name)` identity and an opaque
//! value instead of being dropped on the floor.

// utils
pub mod error;
pub mod xml;

// webdav
pub mod decoder;
pub mod encoder;
pub mod types;
