use std::path::Path;
use std::path::PathBuf;

use serde_json::Map;
use serde_json::Value;

use crate::ClusterSpec;
use crate::DiagnosticKind;
use crate::Diagnostics;
use crate::EnvSpec;
use crate::ModuleSpec;
use crate::paths::module_dir;

/// Names every module program sees regardless of its properties.
pub const RESERVED_CONTEXT_KEYS: [&str; 7] = [
	"name",
	"fullName",
	"moduleDir",
	"other",
	"path",
	"spread",
	"export",
];

/// The resolved context of one module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleContext {
	pub name: String,
	/// `prefix + name`.
	pub full_name: String,
	/// Template directory relative to the cluster base directory, with a
	/// single trailing slash when non-empty.
	pub module_dir: String,
	/// Template path relative to the cluster base directory.
	pub template: Option<PathBuf>,
	pub env: Option<EnvSpec>,
	/// Pass-through properties, without any reserved key.
	pub properties: Map<String, Value>,
}

impl ModuleContext {
	/// Resolve a module declaration. Properties named like a reserved context
	/// key are dropped and reported.
	pub fn from_spec(
		cluster: &ClusterSpec,
		module: &ModuleSpec,
		diagnostics: &mut Diagnostics,
	) -> ModuleContext {
		let full_name = cluster.full_name(module);
		let module_dir = module
			.template
			.as_deref()
			.map(|template| module_dir(&cluster.cd, template))
			.unwrap_or_default();

		let mut properties = Map::new();
		for (key, value) in &module.properties {
			if RESERVED_CONTEXT_KEYS.contains(&key.as_str()) {
				diagnostics.report(
					&full_name,
					module.template.clone(),
					DiagnosticKind::ReservedProperty { key: key.clone() },
				);
				continue;
			}

			properties.insert(key.clone(), value.clone());
		}

		ModuleContext {
			name: module.name.clone(),
			full_name,
			module_dir,
			template: module.template.clone(),
			env: module.env.clone(),
			properties,
		}
	}

	/// The data other modules see under `other[fullName]`: the pass-through
	/// properties plus `name`, `fullName` and `moduleDir`.
	pub fn data(&self) -> Map<String, Value> {
		let mut data = self.properties.clone();
		data.insert("name".to_string(), Value::String(self.name.clone()));
		data.insert(
			"fullName".to_string(),
			Value::String(self.full_name.clone()),
		);
		data.insert(
			"moduleDir".to_string(),
			Value::String(self.module_dir.clone()),
		);
		data
	}

	/// Template path resolved against `cd`.
	pub fn template_path(&self, cd: &Path) -> Option<PathBuf> {
		self.template.as_deref().map(|template| cd.join(template))
	}
}

/// Every module context of a cluster, built before any program runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSet {
	contexts: Vec<ModuleContext>,
}

impl ContextSet {
	pub fn new(contexts: Vec<ModuleContext>) -> Self {
		Self { contexts }
	}

	pub fn iter(&self) -> std::slice::Iter<'_, ModuleContext> {
		self.contexts.iter()
	}

	pub fn len(&self) -> usize {
		self.contexts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.contexts.is_empty()
	}

	pub fn get(&self, index: usize) -> Option<&ModuleContext> {
		self.contexts.get(index)
	}

	/// Find a module by full name, falling back to its unprefixed name.
	pub fn find(&self, id: &str) -> Option<&ModuleContext> {
		self.contexts
			.iter()
			.find(|context| context.full_name == id)
			.or_else(|| self.contexts.iter().find(|context| context.name == id))
	}

	/// The `other` map seen by the module at `index`: every sibling's data
	/// keyed by full name.
	pub fn other(&self, index: usize) -> Map<String, Value> {
		self.contexts
			.iter()
			.enumerate()
			.filter(|(position, _)| *position != index)
			.map(|(_, context)| (context.full_name.clone(), Value::Object(context.data())))
			.collect()
	}

	/// The variables injected into the program of the module at `index`.
	pub fn execution_value(&self, index: usize) -> minijinja::Value {
		let mut data = self
			.contexts
			.get(index)
			.map(ModuleContext::data)
			.unwrap_or_default();
		data.insert("other".to_string(), Value::Object(self.other(index)));

		minijinja::Value::from_serialize(&data)
	}
}

impl<'a> IntoIterator for &'a ContextSet {
	type IntoIter = std::slice::Iter<'a, ModuleContext>;
	type Item = &'a ModuleContext;

	fn into_iter(self) -> Self::IntoIter {
		self.contexts.iter()
	}
}
