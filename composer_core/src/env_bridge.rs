use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::ClusterSpec;
use crate::ComposeOptions;
use crate::ComposerError;
use crate::ComposerResult;
use crate::ContextSet;
use crate::EnvSpec;
use crate::Executor;
use crate::ModuleContext;
use crate::paths::module_dir;
use crate::paths::normalize;
use crate::paths::to_slash;

/// What an environment checker asks the bridge for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRequest<'a> {
	/// The rendered env spec of the module with this name or full name.
	Module(&'a str),
	/// The content of a file. Env configs are rendered, anything else goes to
	/// the fallback reader.
	Path(&'a Path),
}

/// Supplies file content to an environment checker.
pub trait ContentProvider {
	fn provide_content(&self, request: ContentRequest<'_>) -> ComposerResult<String>;
}

/// Validates the environment of one module.
pub trait EnvChecker {
	/// Check the module `module_id` whose env spec lives at `env_config`.
	fn check(
		&mut self,
		env_config: &Path,
		module_id: &str,
		provider: &dyn ContentProvider,
	) -> ComposerResult<()>;
}

type FallbackReader<'a> = Box<dyn Fn(&Path) -> ComposerResult<String> + 'a>;

/// Renders env specs as dynamic templates on behalf of a checker.
pub struct EnvBridge<'a> {
	spec: &'a ClusterSpec,
	contexts: &'a ContextSet,
	executor: Executor,
	fallback: FallbackReader<'a>,
}

impl<'a> EnvBridge<'a> {
	/// A bridge reading unknown paths straight from disk.
	pub fn new(spec: &'a ClusterSpec, contexts: &'a ContextSet, options: &ComposeOptions) -> Self {
		Self {
			spec,
			contexts,
			executor: options.executor(&spec.cd),
			fallback: Box::new(read_file),
		}
	}

	/// Replace the reader used for paths that are not env configs.
	#[must_use]
	pub fn with_fallback(
		mut self,
		fallback: impl Fn(&Path) -> ComposerResult<String> + 'a,
	) -> Self {
		self.fallback = Box::new(fallback);
		self
	}

	/// Absolute path of a module's env config.
	pub fn env_config_path(&self, env: &EnvSpec) -> PathBuf {
		self.spec.resolve(&env.env_config)
	}

	fn find_by_path(&self, path: &Path) -> Option<(&ModuleContext, &EnvSpec)> {
		let wanted = normalize(&to_slash(&self.spec.resolve(path)));

		self.contexts.iter().find_map(|context| {
			let env = context.env.as_ref()?;
			let candidate = normalize(&to_slash(&self.env_config_path(env)));
			(candidate == wanted).then_some((context, env))
		})
	}

	/// Render the env config of a module.
	pub fn render_env(&self, context: &ModuleContext, env: &EnvSpec) -> ComposerResult<String> {
		let env_render = |reason: String| {
			ComposerError::EnvRender {
				module: context.full_name.clone(),
				reason,
			}
		};

		let path = self.env_config_path(env);
		if !path.is_file() {
			return Err(env_render(format!(
				"env config `{}` does not exist",
				path.display()
			)));
		}

		let raw = std::fs::read_to_string(&path).map_err(|e| env_render(e.to_string()))?;
		let program = self
			.executor
			.transpiler()
			.transpile(&path, &raw)
			.map_err(|e| env_render(e.to_string()))?;
		let data = minijinja::Value::from_serialize(env_context(self.spec, context, env));

		tracing::debug!(module = %context.full_name, path = %path.display(), "rendering env config");
		self.executor
			.render(&program, &data)
			.and_then(|rendered| rendered.output.to_text())
			.map_err(|e| env_render(e.to_string()))
	}
}

impl ContentProvider for EnvBridge<'_> {
	fn provide_content(&self, request: ContentRequest<'_>) -> ComposerResult<String> {
		match request {
			ContentRequest::Module(id) => {
				let Some((context, env)) = self
					.contexts
					.find(id)
					.and_then(|context| context.env.as_ref().map(|env| (context, env)))
				else {
					return Err(ComposerError::UnknownEnvModule(id.to_string()));
				};

				self.render_env(context, env)
			}
			ContentRequest::Path(path) => {
				match self.find_by_path(path) {
					Some((context, env)) => self.render_env(context, env),
					None => (self.fallback)(&self.spec.resolve(path)),
				}
			}
		}
	}
}

fn read_file(path: &Path) -> ComposerResult<String> {
	Ok(std::fs::read_to_string(path)?)
}

/// The variables an env config template sees.
fn env_context(spec: &ClusterSpec, context: &ModuleContext, env: &EnvSpec) -> Map<String, Value> {
	let mut data = env.properties.clone();
	data.insert("name".to_string(), Value::String(context.name.clone()));
	data.insert(
		"fullName".to_string(),
		Value::String(context.full_name.clone()),
	);
	data.insert(
		"moduleDir".to_string(),
		Value::String(module_dir(&spec.cd, &env.env_config)),
	);
	data.insert("file".to_string(), Value::String(env.file.clone()));
	data.insert(
		"envConfig".to_string(),
		Value::String(to_slash(&env.env_config)),
	);
	data
}

/// Run `checker` for every module with an env block, in declaration order.
/// Stops at the first error. Returns the number of checked modules.
pub fn run_env_checks(
	contexts: &ContextSet,
	bridge: &EnvBridge<'_>,
	checker: &mut dyn EnvChecker,
) -> ComposerResult<usize> {
	let mut checked = 0;

	for context in contexts {
		let Some(env) = &context.env else {
			continue;
		};

		checker.check(&bridge.env_config_path(env), &context.full_name, bridge)?;
		checked += 1;
	}

	Ok(checked)
}

/// Env findings for one module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvModuleReport {
	pub module: String,
	/// Derived env file name.
	pub file: String,
	/// Declared variables in declaration order.
	pub declared: Vec<String>,
	/// Required variables without a value or default.
	pub missing: Vec<String>,
}

/// Aggregated result of [`RequiredVarsChecker`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvReport {
	pub modules: Vec<EnvModuleReport>,
}

impl EnvReport {
	/// Returns true if no required variable is missing.
	pub fn is_ok(&self) -> bool {
		self.modules.iter().all(|module| module.missing.is_empty())
	}

	/// Every missing variable as `(module, variable)`.
	pub fn missing(&self) -> impl Iterator<Item = (&str, &str)> {
		self.modules.iter().flat_map(|module| {
			module
				.missing
				.iter()
				.map(|var| (module.module.as_str(), var.as_str()))
		})
	}
}

/// Checks that every required variable of a rendered env spec is set.
///
/// The env spec is a mapping of variable names to either a default scalar or
/// a mapping:
///
/// ```yaml
/// DATABASE_URL:
///   required: true
///   description: connection string
/// LOG_LEVEL: info
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequiredVarsChecker {
	variables: BTreeMap<String, String>,
	report: EnvReport,
}

impl RequiredVarsChecker {
	/// A checker resolving variables against `variables`.
	pub fn new(variables: impl IntoIterator<Item = (String, String)>) -> Self {
		Self {
			variables: variables.into_iter().collect(),
			report: EnvReport::default(),
		}
	}

	pub fn report(&self) -> &EnvReport {
		&self.report
	}

	pub fn into_report(self) -> EnvReport {
		self.report
	}
}

impl EnvChecker for RequiredVarsChecker {
	fn check(
		&mut self,
		_env_config: &Path,
		module_id: &str,
		provider: &dyn ContentProvider,
	) -> ComposerResult<()> {
		let content = provider.provide_content(ContentRequest::Module(module_id))?;
		let parsed: serde_yaml_ng::Value = serde_yaml_ng::from_str(&content).map_err(|e| {
			ComposerError::EnvRender {
				module: module_id.to_string(),
				reason: format!("env spec is not valid YAML: {e}"),
			}
		})?;

		let entries = match parsed {
			serde_yaml_ng::Value::Null => serde_yaml_ng::Mapping::new(),
			serde_yaml_ng::Value::Mapping(mapping) => mapping,
			_ => {
				return Err(ComposerError::EnvRender {
					module: module_id.to_string(),
					reason: "env spec must be a mapping of variable names".to_string(),
				});
			}
		};

		let mut module = EnvModuleReport {
			module: module_id.to_string(),
			file: EnvSpec::file_name(module_id),
			..EnvModuleReport::default()
		};

		for (key, value) in entries {
			let Some(var) = key.as_str().map(ToString::to_string) else {
				continue;
			};

			let (required, has_default) = match &value {
				serde_yaml_ng::Value::Mapping(options) => {
					(
						options
							.get("required")
							.and_then(serde_yaml_ng::Value::as_bool)
							.unwrap_or(false),
						options.get("default").is_some_and(|d| !d.is_null()),
					)
				}
				serde_yaml_ng::Value::Null => (false, false),
				_ => (false, true),
			};

			if required && !has_default && !self.variables.contains_key(&var) {
				tracing::debug!(module = module_id, var = %var, "required variable is not set");
				module.missing.push(var.clone());
			}

			module.declared.push(var);
		}

		self.report.modules.push(module);
		Ok(())
	}
}
