#![deny(missing_docs)]
//! Shared data model for the privacy-preserving record linkage workspace.
//!
//! This crate groups together the values every other crate needs without
//! touching sockets or cryptography:
//!
//! * The raw record and field-declaration model (see [`record`]).
//! * The exhaustively-enumerated run configuration (see [`config`]).
//! * The error kinds a misconfigured run or a malformed record raises (see
//!   [`error`]).
//! * Wire-level tag constants shared by both sides of the two-party
//!   protocol (see [`wire`]).

pub mod config;
pub mod error;
pub mod record;
pub mod wire;

pub use config::RunConfig;
pub use error::{ConfigError, DataError, SkipRateExceeded};
pub use record::{FieldMethod, FieldSpec, RawRecord, ID_COLUMN};
