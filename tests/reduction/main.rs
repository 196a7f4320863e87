#[path = "../common/mod.rs"]
mod common;

mod package;
mod reduce;
