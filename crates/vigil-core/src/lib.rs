//! Core types and trait definitions for the Vigil activity store.
//!
//! This crate is deliberately free of HTTP and runtime dependencies;
//! every other crate in the workspace depends on it.

pub mod activity;
pub mod error;
pub mod event;
pub mod query;
pub mod snapshot;
pub mod store;

pub use error::{Error, ErrorKind, FieldError, Result};
