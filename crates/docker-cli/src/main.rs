//! Docker CLI main entry point

use clap::Parser;
use docker_cli::{
    cli::{Cli, Commands},
    commands::{CallArgs, CallCommand, ValidateCommand},
    error::CliResult,
    utils::{init_tracing, ColoredOutput},
};
use tracing::debug;

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {}", ColoredOutput::error("Error:"), e);
            1
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    if cli.no_color {
        colored::control::set_override(false);
    }

    debug!("Docker CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Call {
            file,
            demo,
            fixtures,
            retries,
            format,
            output,
            show_headers,
        } => {
            CallCommand::run(CallArgs {
                file,
                config: cli.config,
                demo,
                fixtures,
                retries,
                format,
                output,
                show_headers,
            })
            .await
        }

        Commands::Validate { file } => ValidateCommand::run(&file, cli.config.as_deref()),
    }
}
