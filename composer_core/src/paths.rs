//! Forward-slash path helpers exposed to module programs as the `path`
//! namespace.
//!
//! Everything here is lexical: no function touches the filesystem or the
//! process working directory. `resolve` anchors relative paths at the cluster
//! base directory the namespace was created with.

use std::path::Path;
use std::sync::Arc;

use minijinja::Error;
use minijinja::ErrorKind;
use minijinja::State;
use minijinja::value::Object;
use minijinja::value::Value;

/// Convert a native path into a forward-slash string.
pub fn to_slash(path: &Path) -> String {
	path.to_string_lossy().replace('\\', "/")
}

/// Returns true for `/x`, `\x` and drive-rooted paths like `C:/x`.
pub fn is_absolute(path: &str) -> bool {
	!split_root(path).0.is_empty()
}

/// Split a forward-slash path into its root (`/`, `C:/` or empty) and the
/// remainder.
fn split_root(path: &str) -> (&str, &str) {
	if path.starts_with('/') || path.starts_with('\\') {
		return (&path[..1], &path[1..]);
	}

	let bytes = path.as_bytes();
	if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
		if bytes.len() == 2 {
			return (path, "");
		}
		if bytes[2] == b'/' || bytes[2] == b'\\' {
			return (&path[..3], &path[3..]);
		}
	}

	("", path)
}

/// Lexically normalize a path: collapse separators, `.` and `..` segments.
/// An empty relative result becomes `.`.
pub fn normalize(path: &str) -> String {
	let path = path.replace('\\', "/");
	let (root, rest) = split_root(&path);
	let mut parts: Vec<&str> = Vec::new();

	for part in rest.split('/') {
		match part {
			"" | "." => {}
			".." => {
				if parts.last().is_some_and(|last| *last != "..") {
					parts.pop();
				} else if root.is_empty() {
					parts.push("..");
				}
			}
			other => parts.push(other),
		}
	}

	let joined = parts.join("/");
	if !root.is_empty() {
		let root = root.replace('\\', "/");
		if root.ends_with('/') {
			format!("{root}{joined}")
		} else {
			format!("{root}/{joined}")
		}
	} else if joined.is_empty() {
		".".to_string()
	} else {
		joined
	}
}

/// Prefix relative results with `./` unless they already start with a dot
/// segment.
pub fn dot_relative(path: String) -> String {
	if path.is_empty() {
		return ".".to_string();
	}

	if is_absolute(&path)
		|| path == "."
		|| path == ".."
		|| path.starts_with("./")
		|| path.starts_with("../")
	{
		path
	} else {
		format!("./{path}")
	}
}

/// Join segments and normalize the result.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
	let joined = segments
		.iter()
		.map(AsRef::as_ref)
		.filter(|segment| !segment.is_empty())
		.collect::<Vec<_>>()
		.join("/");

	if joined.is_empty() {
		".".to_string()
	} else {
		normalize(&joined)
	}
}

/// Resolve segments right to left until an absolute path is formed, starting
/// from `base`.
pub fn resolve<S: AsRef<str>>(base: &str, segments: &[S]) -> String {
	let mut resolved = base.replace('\\', "/");

	for segment in segments.iter().map(AsRef::as_ref) {
		if segment.is_empty() {
			continue;
		}

		if is_absolute(segment) {
			resolved = segment.to_string();
		} else {
			resolved = format!("{resolved}/{segment}");
		}
	}

	normalize(&resolved)
}

/// The relative path from `from` to `to`, both resolved against `base`.
/// Returns an empty string when both point at the same location.
pub fn relative(base: &str, from: &str, to: &str) -> String {
	let from = resolve(base, &[from]);
	let to = resolve(base, &[to]);
	let (from_root, from_rest) = split_root(&from);
	let (to_root, to_rest) = split_root(&to);

	if from_root != to_root {
		return to;
	}

	let from_parts: Vec<&str> = from_rest.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
	let to_parts: Vec<&str> = to_rest.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
	let common = from_parts
		.iter()
		.zip(&to_parts)
		.take_while(|(a, b)| a == b)
		.count();

	let mut parts: Vec<&str> = vec![".."; from_parts.len() - common];
	parts.extend(&to_parts[common..]);
	parts.join("/")
}

/// The directory portion of a path. Paths without a separator yield `.`.
pub fn dirname(path: &str) -> String {
	let path = path.replace('\\', "/");
	let (root, rest) = split_root(&path);
	let rest = rest.trim_end_matches('/');

	match rest.rfind('/') {
		Some(index) => format!("{root}{}", rest[..index].trim_end_matches('/')),
		None if !root.is_empty() => root.to_string(),
		None => ".".to_string(),
	}
}

/// The last segment of a path, optionally without the given extension.
pub fn basename(path: &str, ext: Option<&str>) -> String {
	let path = path.replace('\\', "/");
	let trimmed = path.trim_end_matches('/');
	let base = trimmed.rsplit('/').next().unwrap_or_default();

	match ext {
		Some(ext) if !ext.is_empty() && base != ext && base.ends_with(ext) => {
			base[..base.len() - ext.len()].to_string()
		}
		_ => base.to_string(),
	}
}

/// The extension of the last segment including the dot, or an empty string.
pub fn extname(path: &str) -> String {
	let base = basename(path, None);

	match base.rfind('.') {
		Some(index) if index > 0 => base[index..].to_string(),
		_ => String::new(),
	}
}

/// Directory of a template relative to the cluster base directory, with
/// forward slashes and exactly one trailing slash when non-empty.
pub fn module_dir(cd: &Path, template: &Path) -> String {
	let template = to_slash(template);
	let relative_template = if is_absolute(&template) {
		relative(&to_slash(cd), &to_slash(cd), &template)
	} else {
		normalize(&template)
	};

	let dir = dirname(&relative_template);
	let dir = dir.trim_end_matches('/');

	if dir.is_empty() || dir == "." {
		String::new()
	} else {
		format!("{dir}/")
	}
}

/// The `path` namespace object injected into every module program.
#[derive(Debug, Clone)]
pub struct PathUtils {
	base: String,
}

impl PathUtils {
	pub fn new(base: &Path) -> Self {
		Self {
			base: normalize(&to_slash(base)),
		}
	}
}

impl Object for PathUtils {
	fn call_method(
		self: &Arc<Self>,
		_state: &State<'_, '_>,
		method: &str,
		args: &[Value],
	) -> Result<Value, Error> {
		let args = string_args(method, args)?;

		let value = match method {
			"join" => Value::from(dot_relative(join(&args))),
			"resolve" => Value::from(dot_relative(resolve(&self.base, &args))),
			"isAbsolute" => Value::from(is_absolute(required(method, &args, 0)?)),
			"relative" => {
				let from = required(method, &args, 0)?;
				let to = required(method, &args, 1)?;
				Value::from(dot_relative(relative(&self.base, from, to)))
			}
			"dirname" => Value::from(dot_relative(dirname(required(method, &args, 0)?))),
			"basename" => {
				let path = required(method, &args, 0)?;
				Value::from(basename(path, args.get(1).map(String::as_str)))
			}
			"extname" => Value::from(extname(required(method, &args, 0)?)),
			_ => {
				return Err(Error::new(
					ErrorKind::InvalidOperation,
					format!("path has no function named `{method}`"),
				));
			}
		};

		Ok(value)
	}
}

fn string_args(method: &str, args: &[Value]) -> Result<Vec<String>, Error> {
	args.iter()
		.map(|arg| {
			arg.as_str().map(ToString::to_string).ok_or_else(|| {
				Error::new(
					ErrorKind::InvalidOperation,
					format!("path.{method} expects string arguments, got {arg}"),
				)
			})
		})
		.collect()
}

fn required<'a>(method: &str, args: &'a [String], index: usize) -> Result<&'a str, Error> {
	args.get(index).map(String::as_str).ok_or_else(|| {
		Error::new(
			ErrorKind::MissingArgument,
			format!("path.{method} expects at least {} argument(s)", index + 1),
		)
	})
}
