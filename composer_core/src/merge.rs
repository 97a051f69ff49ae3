use std::path::Path;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde_yaml_ng::Value;

use crate::ComposerError;
use crate::ComposerResult;
use crate::ModuleOutput;
use crate::RenderedOutput;

/// Merge `right` into `left`. Sequences concatenate, mappings merge
/// recursively and everything else is replaced by `right`.
pub fn deep_merge(left: &mut Value, right: Value) {
	match (left, right) {
		(Value::Sequence(left), Value::Sequence(right)) => left.extend(right),
		(Value::Mapping(left), Value::Mapping(right)) => {
			for (key, value) in right {
				match left.get_mut(&key) {
					Some(existing) => deep_merge(existing, value),
					None => {
						left.insert(key, value);
					}
				}
			}
		}
		(left, right) => *left = right,
	}
}

/// Parse the rendered output of a module into a document.
pub fn parse_output(module: &str, output: &RenderedOutput) -> ComposerResult<Value> {
	match output {
		RenderedOutput::Export(value) => Ok(value.clone()),
		RenderedOutput::Text(text) if text.trim().is_empty() => Ok(Value::Null),
		RenderedOutput::Text(text) => {
			serde_yaml_ng::from_str(text).map_err(|e| {
				ComposerError::Parse {
					module: module.to_string(),
					reason: e.to_string(),
				}
			})
		}
	}
}

/// Merge every module output in order. The first parse failure aborts.
pub fn merge_outputs(outputs: &[ModuleOutput]) -> ComposerResult<MergedDocument> {
	let mut document = Value::Null;

	for output in outputs {
		let value = parse_output(&output.module, &output.output)?;
		if value.is_null() {
			continue;
		}

		if document.is_null() {
			document = value;
		} else {
			deep_merge(&mut document, value);
		}
	}

	Ok(MergedDocument(document))
}

/// The combined document of every module.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDocument(Value);

impl MergedDocument {
	pub fn new(value: Value) -> Self {
		Self(value)
	}

	pub fn value(&self) -> &Value {
		&self.0
	}

	/// Serialize as YAML. An empty document serializes to an empty string.
	pub fn to_yaml(&self) -> ComposerResult<String> {
		if self.0.is_null() {
			return Ok(String::new());
		}

		serde_yaml_ng::to_string(&self.0).map_err(|e| ComposerError::Serialize(e.to_string()))
	}

	/// Write the document to `path` through a temporary file in the same
	/// directory. Parent directories are created.
	pub fn write(&self, path: &Path) -> ComposerResult<()> {
		let content = self.to_yaml()?;
		write_atomic(path, &content)
	}
}

/// Write `content` to a temporary sibling of `path` and rename it into place.
pub fn write_atomic(path: &Path, content: &str) -> ComposerResult<()> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent)?;
	}

	let file_name = path
		.file_name()
		.map_or_else(|| "output".to_string(), |n| n.to_string_lossy().to_string());
	let temp_path = path.with_file_name(format!(
		"{file_name}.tmp-{}-{}",
		std::process::id(),
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map_or(0, |duration| duration.as_nanos())
	));

	std::fs::write(&temp_path, content)?;

	if let Err(e) = std::fs::rename(&temp_path, path) {
		let _ = std::fs::remove_file(&temp_path);
		return Err(e.into());
	}

	tracing::debug!(path = %path.display(), "wrote output document");
	Ok(())
}
