use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use minijinja::AutoEscape;
use minijinja::Environment;
use minijinja::Error;
use minijinja::ErrorKind;
use minijinja::UndefinedBehavior;
use minijinja::syntax::SyntaxConfig;
use minijinja::value::Value;
use minijinja::value::ValueKind;

use crate::ComposerError;
use crate::ComposerResult;
use crate::DiagnosticKind;
use crate::paths::PathUtils;
use crate::transpiler::BLOCK_END;
use crate::transpiler::BLOCK_START;
use crate::transpiler::COMMENT_END;
use crate::transpiler::COMMENT_START;
use crate::transpiler::CompiledProgram;
use crate::transpiler::TemplateKind;
use crate::transpiler::Transpiler;
use crate::transpiler::VARIABLE_END;
use crate::transpiler::VARIABLE_START;

/// Default instruction budget for a single program run.
pub const DEFAULT_FUEL: u64 = 1_000_000;

/// The text or structured value produced by one module.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedOutput {
	/// Accumulated literal output.
	Text(String),
	/// The value stored in the export slot.
	Export(serde_yaml_ng::Value),
}

impl RenderedOutput {
	/// Canonical text form: the buffer itself, or the export serialized as
	/// YAML.
	pub fn to_text(&self) -> ComposerResult<String> {
		match self {
			Self::Text(text) => Ok(text.clone()),
			Self::Export(value) => {
				serde_yaml_ng::to_string(value).map_err(|e| ComposerError::Serialize(e.to_string()))
			}
		}
	}

	/// Returns true if the output carries no content.
	pub fn is_blank(&self) -> bool {
		match self {
			Self::Text(text) => text.trim().is_empty(),
			Self::Export(value) => value.is_null(),
		}
	}
}

/// A successful program run together with non-fatal findings.
#[derive(Debug, Clone)]
pub struct Rendered {
	pub output: RenderedOutput,
	pub findings: Vec<DiagnosticKind>,
}

/// Settings shared by every program run.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
	/// Directory `path.resolve` anchors relative paths at.
	pub base_dir: PathBuf,
	/// Instruction budget per run. `None` disables the limit.
	pub fuel: Option<u64>,
	/// Write the program of a failed template to disk.
	pub report: bool,
	/// Directory for program dumps. Defaults to the template's directory.
	pub report_dir: Option<PathBuf>,
}

impl Default for ExecutorOptions {
	fn default() -> Self {
		Self {
			base_dir: PathBuf::from("."),
			fuel: Some(DEFAULT_FUEL),
			report: false,
			report_dir: None,
		}
	}
}

/// Shared cell behind the `export` function.
#[derive(Debug, Clone, Default)]
struct ExportSlot(Arc<Mutex<Option<Value>>>);

impl ExportSlot {
	fn store(&self, value: Value) {
		if let Ok(mut slot) = self.0.lock() {
			*slot = Some(value);
		}
	}

	fn take(&self) -> Option<Value> {
		self.0.lock().ok().and_then(|mut slot| slot.take())
	}
}

/// Runs compiled programs in a fresh, capability-free environment.
#[derive(Debug, Clone, Default)]
pub struct Executor {
	options: ExecutorOptions,
	transpiler: Transpiler,
}

impl Executor {
	pub fn new(options: ExecutorOptions, transpiler: Transpiler) -> Self {
		Self {
			options,
			transpiler,
		}
	}

	pub fn options(&self) -> &ExecutorOptions {
		&self.options
	}

	pub fn transpiler(&self) -> &Transpiler {
		&self.transpiler
	}

	/// Execute a program once. The export slot takes precedence over the
	/// buffer.
	pub fn execute(&self, program: &CompiledProgram, context: &Value) -> ComposerResult<Rendered> {
		let name = program.template().display().to_string();
		let slot = ExportSlot::default();
		let mut env = self
			.environment(&slot)
			.map_err(|error| self.compile_error(program, &error))?;
		let text = env
			.add_template(&name, program.source())
			.and_then(|()| env.get_template(&name))
			.and_then(|template| template.render(context))
			.map_err(|error| self.compile_error(program, &error))?;

		let Some(exported) = slot.take() else {
			return Ok(Rendered {
				output: RenderedOutput::Text(text),
				findings: vec![],
			});
		};

		let mut findings = vec![];
		if !text.trim().is_empty() {
			tracing::warn!(
				template = %name,
				"template exported a value and also produced literal output; the export wins"
			);
			findings.push(DiagnosticKind::ExportShadowsOutput);
		}

		let value = serde_yaml_ng::to_value(&exported).map_err(|e| {
			ComposerError::Compile {
				template: name.clone(),
				message: format!("exported value cannot be serialized: {e}"),
				line: None,
			}
		})?;

		Ok(Rendered {
			output: RenderedOutput::Export(value),
			findings,
		})
	}

	/// Execute a program, applying the two-phase rule for programmable
	/// templates: the exported value is serialized and rendered again as a
	/// literal template with the same context.
	pub fn render(&self, program: &CompiledProgram, context: &Value) -> ComposerResult<Rendered> {
		let phase_one = self.execute(program, context)?;
		if program.kind() != TemplateKind::Programmable {
			return Ok(phase_one);
		}

		let RenderedOutput::Export(value) = &phase_one.output else {
			return Err(ComposerError::MissingExport {
				template: program.template().display().to_string(),
			});
		};

		let materialized =
			serde_yaml_ng::to_string(value).map_err(|e| ComposerError::Serialize(e.to_string()))?;
		let literal = Transpiler::literal(program.template(), &materialized);

		tracing::debug!(template = %program.template().display(), "rendering exported value");
		let mut phase_two = self.execute(&literal, context)?;
		let mut findings = phase_one.findings;
		findings.append(&mut phase_two.findings);
		phase_two.findings = findings;

		Ok(phase_two)
	}

	fn environment<'source>(&self, slot: &ExportSlot) -> Result<Environment<'source>, Error> {
		let mut env = Environment::new();
		env.set_syntax(program_syntax()?);
		env.set_trim_blocks(true);
		env.set_keep_trailing_newline(true);
		env.set_undefined_behavior(UndefinedBehavior::Strict);
		env.set_auto_escape_callback(|_| AutoEscape::None);
		env.set_fuel(self.options.fuel);

		env.add_global(
			"path",
			Value::from_object(PathUtils::new(&self.options.base_dir)),
		);
		env.add_function("spread", spread);

		let export_slot = slot.clone();
		env.add_function("export", move |value: Value| -> Result<Value, Error> {
			export_slot.store(value);
			Ok(Value::from(()))
		});

		Ok(env)
	}

	fn compile_error(&self, program: &CompiledProgram, error: &Error) -> ComposerError {
		let message = match error.detail() {
			Some(detail) => format!("{}: {detail}", error.kind()),
			None => error.kind().to_string(),
		};
		let line = error.line().and_then(|line| program.template_line(line));

		if self.options.report {
			self.write_report(program);
		}

		ComposerError::Compile {
			template: program.template().display().to_string(),
			message,
			line,
		}
	}

	/// Persist the program of a failed template as `<file name>.program`.
	fn write_report(&self, program: &CompiledProgram) {
		let template = program.template();
		let file_name = template
			.file_name()
			.map_or_else(|| "template".to_string(), |n| n.to_string_lossy().to_string());
		let dir = self
			.options
			.report_dir
			.clone()
			.or_else(|| template.parent().map(Path::to_path_buf))
			.unwrap_or_default();
		let report_path = dir.join(format!("{file_name}.program"));

		match std::fs::write(&report_path, program.source()) {
			Ok(()) => {
				tracing::info!(path = %report_path.display(), "wrote program of failed template");
			}
			Err(e) => {
				tracing::warn!(path = %report_path.display(), "could not write program report: {e}");
			}
		}
	}
}

/// The delimiter syntax of synthesized programs.
fn program_syntax() -> Result<SyntaxConfig, Error> {
	SyntaxConfig::builder()
		.block_delimiters(BLOCK_START, BLOCK_END)
		.variable_delimiters(VARIABLE_START, VARIABLE_END)
		.comment_delimiters(COMMENT_START, COMMENT_END)
		.build()
}

/// Render a mapping's entries as JSON without the enclosing braces, for use
/// inside flow mappings: `environment: {${ spread(vars) }}`.
fn spread(value: Value) -> Result<String, Error> {
	if value.kind() != ValueKind::Map {
		return Err(Error::new(
			ErrorKind::InvalidOperation,
			format!("spread expects a mapping, got {}", value.kind()),
		));
	}

	let json = serde_json::to_string(&value)
		.map_err(|e| Error::new(ErrorKind::BadSerialization, e.to_string()))?;

	Ok(json[1..json.len() - 1].to_string())
}
