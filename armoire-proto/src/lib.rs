//! WebDAV (RFC 4918) request-processing pipeline.
//!
//! The transport hands an HTTP exchange to [`dist::Distributor::dispatch`];
//! from there the request is parsed into a typed record ([`request`]),
//! routed to the mount owning the longest matching prefix ([`dist`]),
//! checked against the process-wide lock table ([`lock`]), executed
//! against a storage [`provider`] and rendered back as plain HTTP or
//! multistatus XML ([`codec`], [`props`]).

pub mod codec;
mod controller;
pub mod dist;
pub mod error;
pub mod lock;
pub mod mem;
pub mod path;
pub mod props;
pub mod provider;
pub mod request;
pub mod time;
