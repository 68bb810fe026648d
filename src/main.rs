//! isoping command line.
//!
//! `isoping` with no host runs a server; `isoping <host>` runs a client
//! against it. Latency lines go to stdout, diagnostics to stderr.

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use isoping::IsopingError;
use isoping::config::{Args, Config};
use isoping::core::EXIT_USAGE;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    let config = match Config::from_args(args).map_err(IsopingError::from) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("isoping: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init()
        .ok();

    match isoping::run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
