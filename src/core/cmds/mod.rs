pub mod init;
pub mod oracle;
pub mod package;
pub mod print;
pub mod reduce;
pub mod replay;
pub mod run;
pub mod status;

pub use init::execute_init;
pub use oracle::execute_oracle;
pub use package::execute_package;
pub use print::execute_print;
pub use reduce::execute_reduce;
pub use replay::execute_replay;
pub use run::execute_run;
pub use status::execute_status;
