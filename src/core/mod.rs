// core logic - completion providers and conversation storage

mod ai;
mod db;

pub use ai::{Ai, Completion, Provider, SYSTEM_PROMPT};
pub use db::{Db, Exchange};
