use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use log::{debug, warn};

use crate::core::cli::{Args, Commands, PrintArgs};
use crate::core::cmds;
use crate::core::logging::init_logging;
use crate::types::AppResult;
use crate::types::config::{CliOverrides, config, init_with_overrides};

pub async fn run_main() -> AppResult<()> {
    let args = Args::parse();

    // Handle global arguments
    if let Some(cwd_arg) = args.cwd.as_ref() {
        let cwd = PathBuf::from(cwd_arg).canonicalize()?;
        env::set_current_dir(&cwd)?;
    }

    // Build CLI overrides for config precedence
    let mut cli_overrides = CliOverrides {
        work_dir: args.work_dir.clone(),
        log_level: args.log_level.clone(),
        log_color: args.log_color.clone(),
        ..Default::default()
    };
    if let Commands::Run(run_args) = &args.command {
        cli_overrides.seed = run_args.seed;
        cli_overrides.total_time = run_args.total_time;
        cli_overrides.max_time_since_last_kill = run_args.max_time_since_last_kill;
        cli_overrides.max_programs = run_args.max_programs;
    }

    // Initialize configuration (file, then CLI overrides)
    init_with_overrides(&cli_overrides);

    // Initialize logging after config so level/color are applied
    init_logging();
    debug!("Current working directory: {}", env::current_dir()?.display());

    // Setup running flag to handle signals from ctrl-c
    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = Arc::clone(&running);

    ctrlc::set_handler(move || {
        warn!("Received Ctrl-C, cleaning up..");
        running_ctrlc.store(false, Ordering::SeqCst);
    })
    .expect("Error creating a Ctrl-C handler");

    let cfg = config();

    // Dispatch to appropriate command
    let exit_code = match args.command {
        Commands::Init => {
            cmds::execute_init().await?;
            0
        }
        Commands::Run(_) => {
            let report = cmds::execute_run(cfg, Arc::clone(&running)).await?;
            if report.interrupted { 2 } else { 0 }
        }
        Commands::Reduce => {
            cmds::execute_reduce(cfg, Arc::clone(&running)).await?;
            if running.load(Ordering::SeqCst) { 0 } else { 2 }
        }
        Commands::Oracle(oracle_args) => {
            if cmds::execute_oracle(oracle_args).await? {
                0
            } else {
                1
            }
        }
        Commands::Package(package_args) => {
            cmds::execute_package(cfg, package_args).await?;
            0
        }
        Commands::Replay(replay_args) => {
            cmds::execute_replay(cfg, replay_args).await?;
            0
        }
        Commands::Status(status_args) => {
            cmds::execute_status(cfg, status_args).await?;
            0
        }
        Commands::Print {
            command: print_args,
        } => {
            match print_args {
                PrintArgs::Config(args) => {
                    cmds::execute_print(cmds::print::PrintCommand::Config(args.format)).await?
                }
            }
            0
        }
    };

    // Exit with appropriate code
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
