// askai library - ask a hosted model, keep every exchange in sql

pub mod cli;
mod core;
mod error;
mod server;

pub use crate::core::{Ai, Completion, Db, Exchange, Provider, SYSTEM_PROMPT};
pub use error::{Error, ErrorKind};
pub use server::{ApiError, AppState, Server};
