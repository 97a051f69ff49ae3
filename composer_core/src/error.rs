use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum ComposerError {
	#[error(transparent)]
	#[diagnostic(code(composer::io_error))]
	Io(#[from] std::io::Error),

	#[error("no cluster configuration found at `{0}`")]
	#[diagnostic(
		code(composer::config_not_found),
		help("pass a path to `clusterConfig.json` or to a directory containing it")
	)]
	ConfigNotFound(String),

	#[error("failed to parse configuration file `{path}`: {reason}")]
	#[diagnostic(code(composer::config_parse))]
	ConfigParse { path: String, reason: String },

	#[error("unsupported configuration file format: `{0}`")]
	#[diagnostic(
		code(composer::unsupported_format),
		help("supported formats: json, yaml, yml, toml")
	)]
	UnsupportedConfigFormat(String),

	#[error("field `{field}` (in {location}) should be {expected}")]
	#[diagnostic(code(composer::spec_validation))]
	SpecValidation {
		field: String,
		expected: String,
		location: String,
	},

	#[error("two modules resolve to the same full name `{full_name}`")]
	#[diagnostic(
		code(composer::duplicate_module),
		help("module names combined with the prefix must be unique")
	)]
	DuplicateModule { full_name: String },

	#[error("template `{path}` of module `{module}` does not exist")]
	#[diagnostic(code(composer::template_not_found))]
	TemplateNotFound { module: String, path: String },

	#[error("template `{path}` contains a forbidden backtick at {line}:{column}")]
	#[diagnostic(
		code(composer::forbidden_content),
		help("the backtick delimits program blocks and cannot appear in templates")
	)]
	ForbiddenContent {
		path: String,
		line: usize,
		column: usize,
	},

	#[error("failed to compile `{template}`{}: {message}", at_line(.line))]
	#[diagnostic(code(composer::compile))]
	Compile {
		template: String,
		message: String,
		line: Option<usize>,
	},

	#[error("programmable module `{template}` did not export a value")]
	#[diagnostic(
		code(composer::missing_export),
		help("add a script line such as `//$ export {{\"services\": services}}`")
	)]
	MissingExport { template: String },

	#[error("output of module `{module}` is not valid YAML: {reason}")]
	#[diagnostic(code(composer::parse))]
	Parse { module: String, reason: String },

	#[error("failed to serialize document: {0}")]
	#[diagnostic(code(composer::serialize))]
	Serialize(String),

	#[error("{0} module(s) failed to compile")]
	#[diagnostic(
		code(composer::modules_failed),
		help("fix the reported templates; no output file was written")
	)]
	ModulesFailed(usize),

	#[error("no environment spec declared for module `{0}`")]
	#[diagnostic(
		code(composer::unknown_env_module),
		help("add an `env` block with an `envConfig` path to the module")
	)]
	UnknownEnvModule(String),

	#[error("failed to render environment spec of module `{module}`: {reason}")]
	#[diagnostic(code(composer::env_render))]
	EnvRender { module: String, reason: String },
}

fn at_line(line: &Option<usize>) -> String {
	line.map(|line| format!(" at line {line}"))
		.unwrap_or_default()
}

pub type ComposerResult<T> = Result<T, ComposerError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
