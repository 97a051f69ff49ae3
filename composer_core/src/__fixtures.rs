use std::path::Path;
use std::path::PathBuf;

use tempfile::TempDir;

use crate::ClusterSpec;
use crate::CompiledProgram;
use crate::ComposerResult;
use crate::Executor;
use crate::ExecutorOptions;
use crate::Transpiler;

pub fn tempdir() -> TempDir {
	tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"))
}

/// Write `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
	let path = root.join(relative);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create_dir_all: {e}"));
	}
	std::fs::write(&path, content).unwrap_or_else(|e| panic!("write: {e}"));
	path
}

pub fn read_file(path: &Path) -> String {
	std::fs::read_to_string(path).unwrap_or_else(|e| panic!("read: {e}"))
}

/// Two modules where `svcB` depends on `svcA` through the `other` map.
pub fn demo_cluster() -> TempDir {
	let tmp = tempdir();
	write_file(
		tmp.path(),
		"clusterConfig.json",
		r#"{
  "outputFile": "out.yml",
  "prefix": "demo",
  "svcA": { "template": "a/compose.yml", "image": "nginx" },
  "svcB": { "template": "b/compose.yml" }
}
"#,
	);
	write_file(
		tmp.path(),
		"a/compose.yml",
		"services:\n  ${ fullName }:\n    image: ${ image }\n    name: ${ fullName }\n",
	);
	write_file(
		tmp.path(),
		"b/compose.yml",
		"services:\n  ${ fullName }:\n    depends_on: [${ other[\"demo-svcA\"].fullName }]\n",
	);
	tmp
}

pub fn load_cluster(root: &Path) -> ClusterSpec {
	ClusterSpec::load(root).unwrap_or_else(|e| panic!("load: {e}"))
}

/// Transpile a template with the default tag rules.
pub fn program(path: &str, raw: &str) -> ComposerResult<CompiledProgram> {
	Transpiler::default().transpile(Path::new(path), raw)
}

/// Transpile and render a template with the default executor.
pub fn render(path: &str, raw: &str, context: &minijinja::Value) -> ComposerResult<String> {
	let program = program(path, raw)?;
	let executor = Executor::new(ExecutorOptions::default(), Transpiler::default());
	executor.render(&program, context)?.output.to_text()
}
