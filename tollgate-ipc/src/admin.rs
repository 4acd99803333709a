//! JSON command/response types for the local admin socket.

use serde::{Deserialize, Serialize};
use tollgate_core::SessionRow;

#[derive(Serialize, Deserialize, Debug)]
pub enum Command {
    List,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum Response {
    List(Vec<SessionRow>),
    Error(String),
}
