//! `mainmemoryd` entry point (spec.md §6): parse CLI flags, validate
//! into a `Config`, bind, run until shutdown.

use std::process::ExitCode;

use clap::Parser;

use mainmemory::config::{Args, Config};
use mainmemory::{logging, Server};

fn main() -> ExitCode {
    logging::init();

    let args = Args::parse();
    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start mainmemoryd");
            return ExitCode::FAILURE;
        }
    };

    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "mainmemoryd exited with an error");
            ExitCode::FAILURE
        }
    }
}
