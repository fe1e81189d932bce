//! Winbind-backed authentication for Windows-style network logons
//!
//! Pluggable authentication backends that delegate NTLM challenge/response
//! and interactive password verification to an out-of-process winbind
//! broker, then normalize the broker's validation payload into the
//! framework's canonical authenticated-user descriptor.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod directory;
pub mod error;
pub mod rpc;

pub use error::{Error, NtStatus, Result};
