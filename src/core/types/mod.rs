pub mod config;
mod error;
mod hash;
mod kill;
mod program;
mod summary;

pub use error::*;
pub use hash::*;
pub use kill::*;
pub use program::*;
pub use summary::*;
