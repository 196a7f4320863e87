pub mod classifier;
pub mod cli;
pub mod cmds;
pub mod generator;
pub mod logging;
pub mod main_shared;
pub mod mutation_tree;
pub mod oracle;
pub mod packing;
pub mod process;
pub mod sanitizer;
pub mod store;
pub mod types;
