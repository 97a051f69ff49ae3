use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::ComposerError;
use crate::ComposerResult;

/// Config file names searched for when a directory is given, in discovery
/// order.
pub const CONFIG_FILE_CANDIDATES: [&str; 4] = [
	"clusterConfig.json",
	"clusterConfig.yaml",
	"clusterConfig.yml",
	"clusterConfig.toml",
];

/// Root keys that are never treated as modules.
pub const RESERVED_ROOT_KEYS: [&str; 4] = ["projectName", "cd", "outputFile", "prefix"];

/// JSON-level types a field may hold, used for shape validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
	String,
	Object,
	Undefined,
}

impl FieldType {
	fn matches(self, value: Option<&Value>) -> bool {
		match (self, value) {
			(Self::String, Some(Value::String(_))) | (Self::Object, Some(Value::Object(_))) => {
				true
			}
			(Self::Undefined, None) => true,
			_ => false,
		}
	}

	fn name(self) -> &'static str {
		match self {
			Self::String => "string",
			Self::Object => "object",
			Self::Undefined => "undefined",
		}
	}
}

/// Fail with a validation error unless `object[field]` has one of `types`.
fn check_field(
	object: &Map<String, Value>,
	field: &str,
	types: &[FieldType],
	location: &str,
) -> ComposerResult<()> {
	let value = object.get(field);
	if types.iter().any(|t| t.matches(value)) {
		return Ok(());
	}

	Err(ComposerError::SpecValidation {
		field: field.to_string(),
		expected: types
			.iter()
			.map(|t| t.name())
			.collect::<Vec<_>>()
			.join(", or "),
		location: location.to_string(),
	})
}

/// Append the `-` separator to a non-empty prefix unless it already ends
/// with `-` or `_`.
pub fn normalize_prefix(prefix: &str) -> String {
	if prefix.is_empty() || prefix.ends_with('-') || prefix.ends_with('_') {
		prefix.to_string()
	} else {
		format!("{prefix}-")
	}
}

/// An `env` block of a module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvSpec {
	/// Path of the environment spec template, relative to the cluster base
	/// directory.
	#[serde(rename = "envConfig")]
	pub env_config: PathBuf,
	/// Derived env file name, `<fullName>.env`.
	pub file: String,
	/// Remaining fields of the block.
	pub properties: Map<String, Value>,
}

impl EnvSpec {
	/// Derived env file name for a module.
	pub fn file_name(full_name: &str) -> String {
		format!("{full_name}.env")
	}
}

/// A module block of the cluster configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleSpec {
	/// Key of the module block.
	pub name: String,
	/// Template path, relative to the cluster base directory.
	pub template: Option<PathBuf>,
	pub env: Option<EnvSpec>,
	/// Every other field of the block, forwarded into the module context.
	pub properties: Map<String, Value>,
}

/// The root cluster configuration.
///
/// ```json
/// {
///   "projectName": "shop",
///   "outputFile": "docker-compose.yml",
///   "prefix": "shop",
///   "web": { "template": "web/compose.yml", "replicas": 2 },
///   "db": {
///     "template": "db/compose.yml",
///     "env": { "envConfig": "db/env.yml" }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSpec {
	pub project_name: Option<String>,
	/// Base directory every relative path is resolved against.
	pub cd: PathBuf,
	/// Output path, relative to `cd` unless absolute.
	pub output_file: PathBuf,
	/// Effective prefix, including its trailing separator.
	pub prefix: String,
	/// Modules in declaration order.
	pub modules: Vec<ModuleSpec>,
}

impl ClusterSpec {
	/// Resolve the config file path. Directories are searched for
	/// [`CONFIG_FILE_CANDIDATES`].
	pub fn resolve_path(path: &Path) -> Option<PathBuf> {
		if path.is_file() {
			return Some(path.to_path_buf());
		}

		if path.is_dir() {
			return CONFIG_FILE_CANDIDATES
				.iter()
				.map(|candidate| path.join(candidate))
				.find(|candidate| candidate.is_file());
		}

		None
	}

	/// Load and validate the cluster configuration at `path` (a file or a
	/// directory containing one).
	///
	/// `cd` defaults to the directory of the configuration file, and a
	/// relative `cd` is resolved against it.
	pub fn load(path: &Path) -> ComposerResult<ClusterSpec> {
		let Some(config_path) = Self::resolve_path(path) else {
			return Err(ComposerError::ConfigNotFound(path.display().to_string()));
		};

		let content = std::fs::read_to_string(&config_path)?;
		let format = config_path
			.extension()
			.and_then(|e| e.to_str())
			.unwrap_or("")
			.to_ascii_lowercase();
		let config_display = config_path.display().to_string();
		let mut value = parse_config(&content, &format, &config_display)?;

		let config_dir = std::path::absolute(&config_path)?
			.parent()
			.map(Path::to_path_buf)
			.unwrap_or_default();

		if let Value::Object(object) = &mut value {
			let cd = match object.get("cd") {
				None => Some(config_dir.clone()),
				Some(Value::String(cd)) => Some(config_dir.join(cd)),
				// Leave mistyped values for validation to report.
				Some(_) => None,
			};

			if let Some(cd) = cd {
				object.insert(
					"cd".to_string(),
					Value::String(cd.to_string_lossy().to_string()),
				);
			}
		}

		tracing::debug!(path = %config_display, "loaded cluster configuration");
		Self::from_value(value, &format!("configuration file {config_display}"))
	}

	/// Validate a parsed configuration document and build the spec.
	pub fn from_value(value: Value, location: &str) -> ComposerResult<ClusterSpec> {
		let Value::Object(root) = value else {
			return Err(ComposerError::SpecValidation {
				field: "<root>".to_string(),
				expected: "object".to_string(),
				location: location.to_string(),
			});
		};

		let root_location = format!("root of {location}");
		check_field(&root, "cd", &[FieldType::String], &root_location)?;
		check_field(&root, "outputFile", &[FieldType::String], &root_location)?;
		check_field(
			&root,
			"prefix",
			&[FieldType::String, FieldType::Undefined],
			&root_location,
		)?;
		check_field(
			&root,
			"projectName",
			&[FieldType::String, FieldType::Undefined],
			&root_location,
		)?;

		let string_field = |key: &str| root.get(key).and_then(Value::as_str).map(str::to_string);
		let project_name = string_field("projectName");
		let cd = PathBuf::from(string_field("cd").unwrap_or_default());
		let output_file = PathBuf::from(string_field("outputFile").unwrap_or_default());
		let prefix = normalize_prefix(&string_field("prefix").unwrap_or_default());

		let mut modules = Vec::new();
		for (name, block) in &root {
			if RESERVED_ROOT_KEYS.contains(&name.as_str()) {
				continue;
			}

			let module_location = format!("module \"{name}\" of {location}");
			modules.push(module_from_value(name, block, &prefix, &module_location)?);
		}

		Ok(ClusterSpec {
			project_name,
			cd,
			output_file,
			prefix,
			modules,
		})
	}

	/// Fully qualified name of a module.
	pub fn full_name(&self, module: &ModuleSpec) -> String {
		format!("{}{}", self.prefix, module.name)
	}

	/// Absolute (or `cd`-relative) path of the output file.
	pub fn output_path(&self) -> PathBuf {
		self.cd.join(&self.output_file)
	}

	/// Resolve a path declared in the configuration against `cd`.
	pub fn resolve(&self, path: &Path) -> PathBuf {
		self.cd.join(path)
	}
}

fn module_from_value(
	name: &str,
	block: &Value,
	prefix: &str,
	location: &str,
) -> ComposerResult<ModuleSpec> {
	let Value::Object(block) = block else {
		return Err(ComposerError::SpecValidation {
			field: name.to_string(),
			expected: "object".to_string(),
			location: location.to_string(),
		});
	};

	check_field(
		block,
		"template",
		&[FieldType::String, FieldType::Undefined],
		location,
	)?;
	check_field(
		block,
		"env",
		&[FieldType::Object, FieldType::Undefined],
		location,
	)?;

	let template = block
		.get("template")
		.and_then(Value::as_str)
		.map(PathBuf::from);

	let env = match block.get("env") {
		Some(Value::Object(env)) => {
			let env_location = format!("env of {location}");
			check_field(env, "envConfig", &[FieldType::String], &env_location)?;

			let env_config = env
				.get("envConfig")
				.and_then(Value::as_str)
				.map(PathBuf::from)
				.unwrap_or_default();
			let properties = env
				.iter()
				.filter(|(key, _)| *key != "envConfig" && *key != "file")
				.map(|(key, value)| (key.clone(), value.clone()))
				.collect();

			Some(EnvSpec {
				env_config,
				file: EnvSpec::file_name(&format!("{prefix}{name}")),
				properties,
			})
		}
		_ => None,
	};

	let properties = block
		.iter()
		.filter(|(key, _)| *key != "template" && *key != "env")
		.map(|(key, value)| (key.clone(), value.clone()))
		.collect();

	Ok(ModuleSpec {
		name: name.to_string(),
		template,
		env,
		properties,
	})
}

/// Parse a configuration document based on its format.
fn parse_config(content: &str, format: &str, path_display: &str) -> ComposerResult<Value> {
	match format {
		"json" => {
			serde_json::from_str(content).map_err(|e| {
				ComposerError::ConfigParse {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})
		}
		"yaml" | "yml" => {
			serde_yaml_ng::from_str(content).map_err(|e| {
				ComposerError::ConfigParse {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})
		}
		"toml" => {
			let table: toml::Table = toml::from_str(content).map_err(|e| {
				ComposerError::ConfigParse {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})?;
			serde_json::to_value(table).map_err(|e| {
				ComposerError::ConfigParse {
					path: path_display.to_string(),
					reason: e.to_string(),
				}
			})
		}
		other => Err(ComposerError::UnsupportedConfigFormat(other.to_string())),
	}
}
