#![deny(missing_docs)]
//! The two-party transport (C9) and PSI sub-protocol (C10): gets sketches
//! or exact-match tokens from one party to the other over TCP, and nothing
//! else. Sketching, scoring, and assignment live in `pprl-core`; this crate
//! only knows how to carry their outputs across a socket and keep both
//! sides honest about the parameters they were computed under.

pub mod error;
pub mod fingerprint;
pub mod psi;
pub mod session;
pub mod wire;

pub use error::{CryptoError, ProtocolError};
pub use session::{Session, VerifyOutcome};
pub use wire::Message;
