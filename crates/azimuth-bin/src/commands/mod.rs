// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subcommand bodies.

mod validate;

pub use validate::{validate, ValidationReport};

use tracing::info;

use crate::cli::{Cli, Commands, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Runs whichever subcommand the command line selected.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run(&cli, args).await,
        Commands::Validate(args) => validate(&cli, args),
        Commands::Version => {
            print_versions();
            Ok(())
        }
    }
}

/// `azimuth run`: builds the runtime from the config file and blocks until shutdown.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    info!(config = %cli.config.display(), simulate = args.simulate, "Loading bridge configuration");

    RuntimeBuilder::new()
        .config_path(&cli.config)
        .simulate(args.simulate)
        .skip_connect(args.skip_connect)
        .build()?
        .run()
        .await
}

fn print_versions() {
    let crates = [
        ("azimuth-bin", crate::VERSION),
        ("azimuth-core", azimuth_core::VERSION),
        ("azimuth-modbus", azimuth_modbus::VERSION),
        ("azimuth-config", azimuth_config::VERSION),
        ("azimuth-bridge", azimuth_bridge::VERSION),
    ];

    println!("azimuth {} ({} {})", crate::VERSION, std::env::consts::OS, std::env::consts::ARCH);
    for (name, version) in crates {
        println!("  {:<15} {}", name, version);
    }
}
