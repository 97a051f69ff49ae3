use std::path::Path;
use std::path::PathBuf;

use crate::Assembly;
use crate::ClusterSpec;
use crate::ComposerError;
use crate::ComposerResult;
use crate::DEFAULT_FUEL;
use crate::Executor;
use crate::ExecutorOptions;
use crate::MergedDocument;
use crate::TagRules;
use crate::Transpiler;
use crate::assemble;
use crate::merge_outputs;
use crate::write_atomic;

/// Settings for a compose run.
#[derive(Debug, Clone)]
pub struct ComposeOptions {
	/// Template kind and directive tag selection.
	pub tag_rules: TagRules,
	/// Write the program of every failing template as `<file>.program`.
	pub report: bool,
	/// Directory for program dumps. Defaults to each template's directory.
	pub report_dir: Option<PathBuf>,
	/// Instruction budget per program run. `None` disables the limit.
	pub fuel: Option<u64>,
}

impl Default for ComposeOptions {
	fn default() -> Self {
		Self {
			tag_rules: TagRules::default(),
			report: false,
			report_dir: None,
			fuel: Some(DEFAULT_FUEL),
		}
	}
}

impl ComposeOptions {
	/// An executor anchored at `base_dir`.
	pub fn executor(&self, base_dir: &Path) -> Executor {
		Executor::new(
			ExecutorOptions {
				base_dir: base_dir.to_path_buf(),
				fuel: self.fuel,
				report: self.report,
				report_dir: self.report_dir.clone(),
			},
			Transpiler::new(self.tag_rules.clone()),
		)
	}
}

/// Result of compiling and merging a cluster.
#[derive(Debug)]
pub struct Composition {
	pub assembly: Assembly,
	/// The merged document. `None` when any module failed.
	pub document: Option<MergedDocument>,
	/// Where the document belongs.
	pub output_path: PathBuf,
}

impl Composition {
	/// Returns true if every module compiled and the outputs merged.
	pub fn is_ok(&self) -> bool {
		self.assembly.is_ok() && self.document.is_some()
	}

	/// The merged document, or [`ComposerError::ModulesFailed`] when any
	/// module failed.
	pub fn merged(&self) -> ComposerResult<&MergedDocument> {
		self.document
			.as_ref()
			.ok_or_else(|| ComposerError::ModulesFailed(self.assembly.failures.len()))
	}

	/// The serialized document, when there is one.
	pub fn output_text(&self) -> ComposerResult<Option<String>> {
		self.document.as_ref().map(MergedDocument::to_yaml).transpose()
	}
}

/// Compile every module and merge their outputs in memory. The merge is
/// skipped when any module failed.
pub fn compose(spec: &ClusterSpec, options: &ComposeOptions) -> ComposerResult<Composition> {
	let assembly = assemble(spec, options)?;
	let document = if assembly.is_ok() {
		Some(merge_outputs(&assembly.outputs)?)
	} else {
		tracing::debug!(
			failures = assembly.failures.len(),
			"skipping merge because modules failed"
		);
		None
	};

	Ok(Composition {
		assembly,
		document,
		output_path: spec.output_path(),
	})
}

/// Write the composed document to its output path. Returns false when
/// nothing was written: either a module failed or the file is already up to
/// date.
pub fn write_output(composition: &Composition) -> ComposerResult<bool> {
	let Some(content) = composition.output_text()? else {
		return Ok(false);
	};

	let current = std::fs::read_to_string(&composition.output_path).ok();
	if current.as_deref() == Some(content.as_str()) {
		tracing::debug!(path = %composition.output_path.display(), "output already up to date");
		return Ok(false);
	}

	write_atomic(&composition.output_path, &content)?;
	Ok(true)
}

/// Comparison of the composed document with the file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCheck {
	pub output_path: PathBuf,
	/// Content currently on disk, `None` when the file does not exist.
	pub current_content: Option<String>,
	/// Content a build would write.
	pub expected_content: String,
}

impl OutputCheck {
	/// Returns true if the file on disk matches the composed document.
	pub fn is_up_to_date(&self) -> bool {
		self.current_content.as_deref() == Some(self.expected_content.as_str())
	}
}

/// Compare the composed document with the output file. Returns `None` when
/// there is no document because a module failed.
pub fn check_output(composition: &Composition) -> ComposerResult<Option<OutputCheck>> {
	let Some(expected_content) = composition.output_text()? else {
		return Ok(None);
	};

	let current_content = match std::fs::read_to_string(&composition.output_path) {
		Ok(content) => Some(content),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
		Err(e) => return Err(e.into()),
	};

	Ok(Some(OutputCheck {
		output_path: composition.output_path.clone(),
		current_content,
		expected_content,
	}))
}
