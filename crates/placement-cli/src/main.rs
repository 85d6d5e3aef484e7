pub mod cli;
pub mod cmd;
pub mod error;
pub mod format;
pub mod io;

pub use cli::{Cli, Command, OutputFormat, PathOrStdin, TargetEncoding};

use clap::Parser;

use crate::format::FormatterConfig;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(&cli) {
        eprintln!("{}", e.message());
        std::process::exit(e.exit_code());
    }
}

/// Dispatches the parsed CLI arguments to the appropriate command handler.
///
/// Returns `Ok(())` on success or a [`error::CliError`] on failure. The
/// caller is responsible for printing the error message and exiting with the
/// appropriate exit code.
fn dispatch(cli: &Cli) -> Result<(), error::CliError> {
    let config = FormatterConfig::from_flags(&cli.format, cli.no_color, cli.quiet);

    match &cli.command {
        Command::Validate { config: source } => cmd::validate::run(source, &config),

        Command::Inspect { config: source, id } => cmd::inspect::run(source, *id, &config),

        Command::Query {
            config: source,
            nodes,
            placement,
            requester,
            select,
            upload,
        } => {
            let nodes_json = io::read_input(nodes, cli.max_file_size)?;
            cmd::query::run(source, &nodes_json, *placement, requester.as_deref(), *select, *upload, &config)
        }

        Command::Convert { config: source, to } => cmd::convert::run(source, *to, &config),
    }
}
