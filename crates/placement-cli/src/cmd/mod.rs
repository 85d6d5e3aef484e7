/// Command module for the `placement` CLI.
///
/// Each submodule implements one subcommand. The `run` function in each
/// module takes the parsed arguments and returns `Ok(())` on success or
/// a [`crate::error::CliError`] on failure.
pub mod convert;
pub mod inspect;
pub mod query;
pub mod validate;
