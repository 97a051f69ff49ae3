use std::path::Path;

use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub fn composer_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("composer"));
	cmd.env("NO_COLOR", "1");
	cmd
}

/// Write `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) -> std::io::Result<()> {
	let path = root.join(relative);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	std::fs::write(path, content)
}

/// Two modules where `svcB` reads the full name of `svcA`.
#[allow(dead_code)]
pub fn write_demo_cluster(root: &Path) -> std::io::Result<()> {
	write_file(
		root,
		"clusterConfig.json",
		r#"{
  "outputFile": "out.yml",
  "prefix": "demo",
  "svcA": { "template": "a/compose.yml", "image": "nginx" },
  "svcB": { "template": "b/compose.yml" }
}
"#,
	)?;
	write_file(
		root,
		"a/compose.yml",
		"services:\n  ${ fullName }:\n    image: ${ image }\n",
	)?;
	write_file(
		root,
		"b/compose.yml",
		"services:\n  ${ fullName }:\n    depends_on: [${ other[\"demo-svcA\"].fullName }]\n",
	)
}

/// A single module with an env block requiring `COMPOSER_TEST_DATABASE_URL`.
#[allow(dead_code)]
pub fn write_env_cluster(root: &Path) -> std::io::Result<()> {
	write_file(
		root,
		"clusterConfig.json",
		r#"{
  "outputFile": "out.yml",
  "prefix": "demo",
  "db": {
    "template": "db/compose.yml",
    "env": { "envConfig": "db/env.yml" }
  }
}
"#,
	)?;
	write_file(root, "db/compose.yml", "services:\n  ${ fullName }:\n    image: postgres\n")?;
	write_file(
		root,
		"db/env.yml",
		"COMPOSER_TEST_DATABASE_URL:\n  required: true\n  description: url for ${ fullName \
		 }\nLOG_LEVEL: info\n",
	)
}
