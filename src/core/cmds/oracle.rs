use std::env;

use log::debug;

use crate::core::cli::OracleArgs;
use crate::core::oracle::{self, OracleConfig};
use crate::types::AppResult;

/// Evaluate the candidate in the current directory. The reducer runs the generated script
/// from a fresh copy of the reduction directory each time.
pub async fn execute_oracle(args: OracleArgs) -> AppResult<bool> {
    let config = OracleConfig::read(&args.config)?;
    let dir = env::current_dir()?;
    let interesting = oracle::evaluate(&config, &dir).await?;
    debug!(
        "Candidate {} for mutant {} is {}interesting",
        config.program,
        config.mutation_id,
        if interesting { "" } else { "not " }
    );
    Ok(interesting)
}
