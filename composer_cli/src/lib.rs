use std::io::BufRead;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Compile module templates into a single merged deployment descriptor.",
	long_about = "composer compiles the module templates declared in `clusterConfig.json` into \
	              one merged YAML document, such as the `docker-compose.yml` of a multi-service \
	              stack.\n\nTemplates mix literal YAML with statement lines (`#$` in YAML files, \
	              `//$` elsewhere) and `${ expression }` interpolation. Every module can read the \
	              values of the others through `other[\"<fullName>\"]`.\n\nQuick start:\n  \
	              composer init   Create a sample cluster\n  composer build  Write the merged \
	              document\n  composer check  Verify the document is up to date\n  composer info   \
	              Inspect the resolved modules"
)]
pub struct ComposerCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the cluster configuration file or the directory containing it.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Create a sample `clusterConfig.json` and module template.
	///
	/// Existing files are never overwritten.
	Init,
	/// Compile every module and write the merged document.
	///
	/// Nothing is written when any module fails. After the document is
	/// written, modules with an `env` block are checked for missing required
	/// variables behind a confirmation prompt.
	Build {
		/// Write the generated program of every failing template next to it
		/// as `<template>.program`.
		#[arg(long, default_value_t = false)]
		report: bool,

		/// Directory for `.program` reports instead of the template
		/// directories.
		#[arg(long, requires = "report")]
		report_dir: Option<PathBuf>,

		/// Run the environment checks without asking.
		#[arg(long, short, default_value_t = false)]
		yes: bool,

		/// Skip the environment checks.
		#[arg(long, default_value_t = false, conflicts_with = "yes")]
		skip_env: bool,

		/// Rebuild whenever a file under the cluster directory changes.
		#[arg(long, default_value_t = false)]
		watch: bool,
	},
	/// Check that the output document is up to date.
	///
	/// Compiles every module in memory and compares the merged document with
	/// the file on disk. Exits with status 1 when it is stale or missing.
	Check {
		/// Show a line diff between the file on disk and the expected
		/// document.
		#[arg(long, default_value_t = false)]
		diff: bool,
	},
	/// Run only the environment checks.
	Env {
		/// Run the environment checks without asking.
		#[arg(long, short, default_value_t = false)]
		yes: bool,
	},
	/// Print the resolved cluster and its modules.
	Info {
		/// Output format for info results.
		#[arg(long, value_enum, default_value_t = InfoOutputFormat::Text)]
		format: InfoOutputFormat,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InfoOutputFormat {
	/// Human-readable text output.
	Text,
	/// JSON output for programmatic consumption.
	Json,
}

/// Ask a yes/no question. An empty answer (or end of input) counts as yes;
/// an answer starting with `n` counts as no.
pub fn confirm(
	prompt: &str,
	input: &mut impl BufRead,
	output: &mut impl Write,
) -> std::io::Result<bool> {
	write!(output, "{prompt} [Y/n] ")?;
	output.flush()?;

	let mut answer = String::new();
	input.read_line(&mut answer)?;

	Ok(!answer.trim().to_ascii_lowercase().starts_with('n'))
}
