//! Clap CLI definition: root struct, subcommands, and shared argument types.
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// A CLI argument that is either a filesystem path or the stdin sentinel `"-"`.
///
/// Parsing `"-"` yields [`PathOrStdin::Stdin`]; anything else yields
/// [`PathOrStdin::Path`]. This avoids stringly-typed handling of the stdin
/// sentinel throughout the codebase.
#[derive(Clone, Debug)]
pub enum PathOrStdin {
    /// Read from standard input.
    Stdin,
    /// Read from the given filesystem path.
    Path(PathBuf),
}

impl std::str::FromStr for PathOrStdin {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            Ok(PathOrStdin::Stdin)
        } else {
            Ok(PathOrStdin::Path(PathBuf::from(s)))
        }
    }
}

/// Output format for CLI commands.
#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, optionally colored output (default).
    Human,
    /// Structured JSON output.
    Json,
}

/// Target config encoding for the `convert` subcommand.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TargetEncoding {
    /// The full YAML schema (`templates`, `placements[]`, `ec`).
    Yaml,
    /// The legacy `id:expr;id:expr` string form.
    Legacy,
}

/// All top-level subcommands exposed by the `placement` binary.
#[derive(Subcommand)]
pub enum Command {
    /// Compile a placement config and report any errors.
    ///
    /// Accepts the three forms documented for `--config`: a path to a YAML
    /// file, a path to a file holding the legacy `id:expr;id:expr` form, or
    /// a literal string in that legacy form.
    Validate {
        /// Placement config: a path, or a literal legacy-form string.
        #[arg(value_name = "CONFIG")]
        config: String,
    },

    /// Print a summary of every compiled placement.
    Inspect {
        /// Placement config: a path, or a literal legacy-form string.
        #[arg(value_name = "CONFIG")]
        config: String,
        /// Restrict the summary to a single placement id.
        #[arg(long, value_name = "ID")]
        id: Option<u16>,
    },

    /// Exercise `Match`, `MatchForUpload`, or `Select` against a node
    /// snapshot.
    Query {
        /// Placement config: a path, or a literal legacy-form string.
        #[arg(long, value_name = "CONFIG")]
        config: String,
        /// Path to a JSON array of nodes, or `-` for stdin.
        #[arg(long, value_name = "FILE")]
        nodes: PathOrStdin,
        /// Placement id to query against.
        #[arg(long, value_name = "ID")]
        placement: u16,
        /// The requesting node's id (hex or base58), for tracker-backed
        /// filters/comparators. Defaults to an all-zero id.
        #[arg(long, value_name = "NODE_ID")]
        requester: Option<String>,
        /// Select up to N nodes instead of testing `Match`.
        #[arg(long, value_name = "N")]
        select: Option<usize>,
        /// Test `MatchForUpload` instead of `Match` (ignored with `--select`).
        #[arg(long)]
        upload: bool,
    },

    /// Re-serialize a placement config between the YAML and legacy forms.
    Convert {
        /// Placement config: a path, or a literal legacy-form string.
        #[arg(value_name = "CONFIG")]
        config: String,
        /// Target encoding: yaml (default) or legacy.
        #[arg(long, default_value = "yaml", value_enum)]
        to: TargetEncoding,
    },
}

/// Root CLI struct for the `placement` binary.
#[derive(Parser)]
#[command(
    name = "placement",
    version,
    about = "Placement engine operator CLI",
    long_about = "Operator tool for the node-selection engine: validates and inspects\n\
                  placement configs, converts between the YAML and legacy config\n\
                  forms, and exercises Match/MatchForUpload/Select against a node\n\
                  snapshot."
)]
pub struct Cli {
    /// Active subcommand.
    #[command(subcommand)]
    pub command: Command,

    /// Output format: human (default) or json.
    #[arg(long, short = 'f', default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Suppress all non-error stderr output.
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable ANSI color codes in human output.
    ///
    /// Also respects the `NO_COLOR` environment variable per
    /// <https://no-color.org>.
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Maximum input file size in bytes.
    #[arg(long, global = true, env = "PLACEMENT_MAX_FILE_SIZE", default_value = "268435456")]
    pub max_file_size: u64,
}
