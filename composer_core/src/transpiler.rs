use std::path::Path;
use std::path::PathBuf;

use crate::ComposerError;
use crate::ComposerResult;

/// The character bounding program blocks. Templates containing it are
/// rejected before they are transpiled.
pub const PROGRAM_DELIMITER: char = '`';
/// Opening delimiter of a statement block in the synthesized program.
pub const BLOCK_START: &str = "`%";
/// Closing delimiter of a statement block in the synthesized program.
pub const BLOCK_END: &str = "%`";
/// Opening delimiter of an interpolation marker.
pub const VARIABLE_START: &str = "${";
/// Closing delimiter of an interpolation marker.
pub const VARIABLE_END: &str = "}";
/// Opening delimiter of a program comment.
pub const COMMENT_START: &str = "`#";
/// Closing delimiter of a program comment.
pub const COMMENT_END: &str = "#`";
/// Fixed comment closing every synthesized program.
pub const PROGRAM_MARKER: &str = "`# composer module program #`";

/// Script statement keyword that stores a value in the export slot.
const EXPORT_KEYWORD: &str = "export";
/// Escape for a literal `${` inside literal lines.
const ESCAPED_VARIABLE_START: &str = "$${";

/// How a template file is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
	/// Markup files (`.yml`, `.yaml`) marking script lines with `#$`.
	Markup,
	/// Any other file, marking script lines with `//$`.
	Script,
	/// Script files that export a structured value which is then rendered as
	/// a second, literal template.
	Programmable,
}

/// Extension and directive tag configuration for each template kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRules {
	/// Extensions (without the dot) compiled as [`TemplateKind::Markup`].
	pub markup_extensions: Vec<String>,
	/// Extensions (without the dot) compiled as
	/// [`TemplateKind::Programmable`].
	pub programmable_extensions: Vec<String>,
	/// Directive tag for markup templates.
	pub markup_tag: String,
	/// Directive tag for every other template.
	pub script_tag: String,
}

impl Default for TagRules {
	fn default() -> Self {
		Self {
			markup_extensions: vec!["yml".to_string(), "yaml".to_string()],
			programmable_extensions: vec!["prog".to_string()],
			markup_tag: "#$".to_string(),
			script_tag: "//$".to_string(),
		}
	}
}

impl TagRules {
	/// Determine the template kind from the file extension.
	pub fn kind_for(&self, path: &Path) -> TemplateKind {
		let extension = path
			.extension()
			.and_then(|e| e.to_str())
			.unwrap_or("")
			.to_ascii_lowercase();

		if self.markup_extensions.iter().any(|e| *e == extension) {
			TemplateKind::Markup
		} else if self.programmable_extensions.iter().any(|e| *e == extension) {
			TemplateKind::Programmable
		} else {
			TemplateKind::Script
		}
	}

	/// The directive tag used by a template kind.
	pub fn tag_for(&self, kind: TemplateKind) -> &str {
		match kind {
			TemplateKind::Markup => &self.markup_tag,
			TemplateKind::Script | TemplateKind::Programmable => &self.script_tag,
		}
	}
}

/// A unit of the synthesized program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
	/// A run of consecutive literal lines, each paired with its 1-indexed
	/// template line.
	Literal(Vec<(usize, String)>),
	/// A single script statement and its template line.
	Statement(usize, String),
}

/// The output of the transpiler for one template.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
	template: PathBuf,
	kind: TemplateKind,
	segments: Vec<Segment>,
	source: String,
	line_map: Vec<usize>,
}

impl CompiledProgram {
	/// Path of the template this program was compiled from.
	pub fn template(&self) -> &Path {
		&self.template
	}

	pub fn kind(&self) -> TemplateKind {
		self.kind
	}

	pub fn segments(&self) -> &[Segment] {
		&self.segments
	}

	/// The synthesized program text.
	pub fn source(&self) -> &str {
		&self.source
	}

	/// Map a 1-indexed program line to the template line it came from.
	pub fn template_line(&self, program_line: usize) -> Option<usize> {
		program_line
			.checked_sub(1)
			.and_then(|index| self.line_map.get(index))
			.copied()
	}
}

/// Scanner state while classifying lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
	None,
	Literal,
	Script,
}

/// Builds the segment list line by line.
struct ProgramBuilder {
	state: ScanState,
	segments: Vec<Segment>,
	open_literal: Vec<(usize, String)>,
}

impl ProgramBuilder {
	fn new() -> Self {
		Self {
			state: ScanState::None,
			segments: vec![],
			open_literal: vec![],
		}
	}

	fn close_literal_block(&mut self) {
		let block = std::mem::take(&mut self.open_literal);
		self.segments.push(Segment::Literal(block));
	}

	fn push_script_line(&mut self, line: usize, statement: &str) {
		if self.state == ScanState::Literal {
			self.close_literal_block();
		}

		self.state = ScanState::Script;
		if !statement.is_empty() {
			self.segments
				.push(Segment::Statement(line, statement.to_string()));
		}
	}

	fn push_literal_line(&mut self, line: usize, raw: &str) {
		// Entering from `None` or `Script` opens a fresh block.
		if self.state != ScanState::Literal {
			self.open_literal = vec![];
		}

		self.state = ScanState::Literal;
		self.open_literal.push((line, raw.to_string()));
	}

	fn finish(mut self) -> Vec<Segment> {
		if self.state == ScanState::Literal {
			self.close_literal_block();
		}

		self.segments
	}
}

/// Turns template text into a [`CompiledProgram`].
#[derive(Debug, Clone, Default)]
pub struct Transpiler {
	rules: TagRules,
}

impl Transpiler {
	pub fn new(rules: TagRules) -> Self {
		Self { rules }
	}

	/// Transpile a template, selecting its kind from the file extension.
	pub fn transpile(&self, path: &Path, raw: &str) -> ComposerResult<CompiledProgram> {
		let kind = self.rules.kind_for(path);
		self.transpile_as(path, kind, raw)
	}

	/// Transpile a template as an explicit kind.
	pub fn transpile_as(
		&self,
		path: &Path,
		kind: TemplateKind,
		raw: &str,
	) -> ComposerResult<CompiledProgram> {
		check_forbidden_content(path, raw)?;

		let tag = self.rules.tag_for(kind);
		let normalized = raw.replace("\r\n", "\n");
		let mut builder = ProgramBuilder::new();

		for (index, row) in normalized.split('\n').enumerate() {
			let line = index + 1;
			let trimmed = row.trim_start();

			if let Some(statement) = trimmed.strip_prefix(tag) {
				builder.push_script_line(line, statement.trim_start());
			} else {
				builder.push_literal_line(line, row);
			}
		}

		let segments = builder.finish();
		let (source, line_map) = synthesize(&segments);

		Ok(CompiledProgram {
			template: path.to_path_buf(),
			kind,
			segments,
			source,
			line_map,
		})
	}

	/// Compile text that is rendered as a single literal block. No line is
	/// read as a script statement and the program delimiter is escaped
	/// rather than rejected, so only interpolation markers are evaluated.
	pub fn literal(path: &Path, raw: &str) -> CompiledProgram {
		let normalized = raw.replace("\r\n", "\n");
		let rows = normalized
			.split('\n')
			.enumerate()
			.map(|(index, row)| (index + 1, row.to_string()))
			.collect();
		let segments = vec![Segment::Literal(rows)];
		let (source, line_map) = synthesize(&segments);

		CompiledProgram {
			template: path.to_path_buf(),
			kind: TemplateKind::Markup,
			segments,
			source,
			line_map,
		}
	}
}

/// Reject templates containing the program delimiter.
fn check_forbidden_content(path: &Path, raw: &str) -> ComposerResult<()> {
	for (index, row) in raw.split('\n').enumerate() {
		if let Some(offset) = row.find(PROGRAM_DELIMITER) {
			return Err(ComposerError::ForbiddenContent {
				path: path.display().to_string(),
				line: index + 1,
				column: row[..offset].chars().count() + 1,
			});
		}
	}

	Ok(())
}

/// Render segments into program text. Each program line maps to exactly one
/// template line; empty statements never produce a program line.
fn synthesize(segments: &[Segment]) -> (String, Vec<usize>) {
	let mut lines: Vec<String> = vec![];
	let mut line_map: Vec<usize> = vec![];

	for segment in segments {
		match segment {
			Segment::Literal(rows) => {
				for (line, row) in rows {
					lines.push(escape_literal(row));
					line_map.push(*line);
				}
			}
			Segment::Statement(line, statement) => {
				lines.push(statement_block(statement));
				line_map.push(*line);
			}
		}
	}

	(format!("{}{PROGRAM_MARKER}", lines.join("\n")), line_map)
}

fn statement_block(statement: &str) -> String {
	let export = statement
		.strip_prefix(EXPORT_KEYWORD)
		.filter(|rest| rest.starts_with(char::is_whitespace));

	match export {
		Some(expression) => {
			format!(
				"{BLOCK_START} set __exported = export({}) {BLOCK_END}",
				expression.trim()
			)
		}
		None => format!("{BLOCK_START} {statement} {BLOCK_END}"),
	}
}

fn escape_literal(row: &str) -> String {
	row.replace(ESCAPED_VARIABLE_START, "${ '${' }")
		.replace(PROGRAM_DELIMITER, "${ '`' }")
}
