use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use crate::ClusterSpec;
use crate::ComposeOptions;
use crate::ComposerError;
use crate::ComposerResult;
use crate::ContextSet;
use crate::DiagnosticKind;
use crate::Diagnostics;
use crate::Executor;
use crate::ModuleContext;
use crate::Rendered;
use crate::RenderedOutput;

/// The rendered output of one module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOutput {
	/// Full name of the module.
	pub module: String,
	/// Resolved template path.
	pub template: PathBuf,
	pub output: RenderedOutput,
}

/// A module whose template could not be compiled.
#[derive(Debug)]
pub struct ModuleFailure {
	/// Full name of the module.
	pub module: String,
	pub error: ComposerError,
}

/// Result of compiling every module of a cluster.
#[derive(Debug)]
pub struct Assembly {
	pub contexts: ContextSet,
	/// Outputs in declaration order.
	pub outputs: Vec<ModuleOutput>,
	pub failures: Vec<ModuleFailure>,
	pub diagnostics: Diagnostics,
}

impl Assembly {
	/// Returns true if every module compiled.
	pub fn is_ok(&self) -> bool {
		self.failures.is_empty()
	}
}

/// Build the context of every module in declaration order. Fails when two
/// modules share a full name.
pub fn build_contexts(
	spec: &ClusterSpec,
	diagnostics: &mut Diagnostics,
) -> ComposerResult<ContextSet> {
	let mut seen = HashSet::new();
	let mut contexts = Vec::with_capacity(spec.modules.len());

	for module in &spec.modules {
		let context = ModuleContext::from_spec(spec, module, diagnostics);
		if !seen.insert(context.full_name.clone()) {
			return Err(ComposerError::DuplicateModule {
				full_name: context.full_name,
			});
		}

		contexts.push(context);
	}

	Ok(ContextSet::new(contexts))
}

/// Compile every module with a template. A failing module is recorded and
/// the remaining modules are still compiled.
pub fn assemble(spec: &ClusterSpec, options: &ComposeOptions) -> ComposerResult<Assembly> {
	let mut diagnostics = Diagnostics::default();
	let contexts = build_contexts(spec, &mut diagnostics)?;
	let executor = options.executor(&spec.cd);
	let mut outputs = vec![];
	let mut failures = vec![];

	for (index, context) in contexts.iter().enumerate() {
		let Some(template) = context.template_path(&spec.cd) else {
			diagnostics.report(&context.full_name, None, DiagnosticKind::NoTemplate);
			continue;
		};

		tracing::debug!(module = %context.full_name, template = %template.display(), "compiling module");

		match compile_module(&executor, &contexts, index, context, &template) {
			Ok(rendered) => {
				for finding in rendered.findings {
					diagnostics.report(&context.full_name, Some(template.clone()), finding);
				}

				if rendered.output.is_blank() {
					diagnostics.report(
						&context.full_name,
						Some(template.clone()),
						DiagnosticKind::EmptyOutput,
					);
				}

				outputs.push(ModuleOutput {
					module: context.full_name.clone(),
					template,
					output: rendered.output,
				});
			}
			Err(error) => {
				tracing::error!(module = %context.full_name, "{error}");
				failures.push(ModuleFailure {
					module: context.full_name.clone(),
					error,
				});
			}
		}
	}

	Ok(Assembly {
		contexts,
		outputs,
		failures,
		diagnostics,
	})
}

fn compile_module(
	executor: &Executor,
	contexts: &ContextSet,
	index: usize,
	context: &ModuleContext,
	template: &Path,
) -> ComposerResult<Rendered> {
	if !template.is_file() {
		return Err(ComposerError::TemplateNotFound {
			module: context.full_name.clone(),
			path: template.display().to_string(),
		});
	}

	let raw = std::fs::read_to_string(template)?;
	let program = executor.transpiler().transpile(template, &raw)?;
	executor.render(&program, &contexts.execution_value(index))
}
