use std::path::PathBuf;

use derive_more::Deref;
use derive_more::DerefMut;
use serde::Serialize;

/// The kind of non-fatal finding produced while composing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub enum DiagnosticKind {
	/// A pass-through property shadows a reserved context name. The reserved
	/// value is used.
	ReservedProperty { key: String },
	/// A program both exported a value and emitted literal text. The export
	/// is used.
	ExportShadowsOutput,
	/// A module rendered nothing and does not contribute to the document.
	EmptyOutput,
	/// A module declares no template and only takes part in env checks.
	NoTemplate,
}

/// A finding attached to the module it was produced for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
	/// Full name of the module.
	pub module: String,
	/// Template the finding refers to, when there is one.
	pub file: Option<PathBuf>,
	pub kind: DiagnosticKind,
}

impl Diagnostic {
	/// Human-readable message for this diagnostic.
	pub fn message(&self) -> String {
		match &self.kind {
			DiagnosticKind::ReservedProperty { key } => {
				format!(
					"module `{}` declares property `{key}` which is reserved; the reserved value is \
					 used",
					self.module
				)
			}
			DiagnosticKind::ExportShadowsOutput => {
				format!(
					"module `{}` exported a value and also emitted text; the exported value is used",
					self.module
				)
			}
			DiagnosticKind::EmptyOutput => {
				format!("module `{}` rendered an empty document", self.module)
			}
			DiagnosticKind::NoTemplate => {
				format!(
					"module `{}` has no template and is only used for environment checks",
					self.module
				)
			}
		}
	}
}

/// Ordered collection of diagnostics returned next to each result.
#[derive(Debug, Clone, Default, Deref, DerefMut, Serialize)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
	/// Record a diagnostic and log it.
	pub fn report(&mut self, module: &str, file: Option<PathBuf>, kind: DiagnosticKind) {
		let diagnostic = Diagnostic {
			module: module.to_string(),
			file,
			kind,
		};

		match diagnostic.kind {
			DiagnosticKind::NoTemplate => tracing::debug!("{}", diagnostic.message()),
			_ => tracing::warn!("{}", diagnostic.message()),
		}

		self.0.push(diagnostic);
	}

	/// Returns true if no diagnostics were recorded.
	pub fn is_clean(&self) -> bool {
		self.0.is_empty()
	}
}

impl IntoIterator for Diagnostics {
	type IntoIter = std::vec::IntoIter<Diagnostic>;
	type Item = Diagnostic;

	fn into_iter(self) -> Self::IntoIter {
		self.0.into_iter()
	}
}
