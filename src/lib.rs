pub mod core;

// Re-export key items for easy importing in this crate
pub use crate::core::store::WorkDir;
pub use crate::core::types;

// Re-export key items for integration tests and embedding
pub use crate::core::classifier::{KillClassifier, TimeoutPolicy};
pub use crate::core::cmds::reduce::Reduction;
pub use crate::core::cmds::run::Campaign;
pub use crate::core::main_shared::run_main;
pub use crate::core::mutation_tree::MutationTree;
