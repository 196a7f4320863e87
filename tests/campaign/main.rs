#[path = "../common/mod.rs"]
mod common;

mod kills;
mod termination;
