pub mod admin;
pub mod envelope;
pub mod netstring;

pub use envelope::{Action, Command, ProtocolError};
pub use netstring::FrameError;
