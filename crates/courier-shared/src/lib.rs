//! # courier-shared
//!
//! Types shared between the courier store and relay server: user
//! identifiers, file references, and the validated inbound push frame.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::FrameError;
pub use protocol::InboundFrame;
pub use types::{FileKind, FileRef, UserId};
