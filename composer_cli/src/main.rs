use std::path::Path;
use std::path::PathBuf;
use std::process;
use std::sync::mpsc;
use std::time::Duration;

use clap::Parser;
use composer_cli::Commands;
use composer_cli::ComposerCli;
use composer_cli::InfoOutputFormat;
use composer_cli::confirm;
use composer_core::ClusterSpec;
use composer_core::ComposeOptions;
use composer_core::ContextSet;
use composer_core::DiagnosticKind;
use composer_core::Diagnostics;
use composer_core::EnvBridge;
use composer_core::ModuleFailure;
use composer_core::RequiredVarsChecker;
use composer_core::build_contexts;
use composer_core::check_output;
use composer_core::compose;
use composer_core::paths::to_slash;
use composer_core::run_env_checks;
use composer_core::write_output;
use owo_colors::OwoColorize;
use similar::ChangeTag;
use similar::TextDiff;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
struct BuildOptions {
	report: bool,
	report_dir: Option<PathBuf>,
	yes: bool,
	skip_env: bool,
	watch: bool,
}

fn main() {
	let args = ComposerCli::parse();

	// Respect NO_COLOR env var, --no-color flag and terminal support.
	let use_color = !args.no_color
		&& std::env::var_os("NO_COLOR").is_none()
		&& supports_color::on(supports_color::Stream::Stderr).is_some();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	init_tracing(args.verbose, use_color);

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match &args.command {
		Some(Commands::Init) => run_init(&args),
		Some(Commands::Build {
			report,
			report_dir,
			yes,
			skip_env,
			watch,
		}) => {
			let options = BuildOptions {
				report: *report,
				report_dir: report_dir.clone(),
				yes: *yes,
				skip_env: *skip_env,
				watch: *watch,
			};
			run_build(&args, &options)
		}
		Some(Commands::Check { diff }) => run_check(&args, *diff),
		Some(Commands::Env { yes }) => run_env(&args, *yes),
		Some(Commands::Info { format }) => run_info(&args, *format),
		None => {
			eprintln!("No subcommand specified. Run `composer --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Try to render through miette for rich diagnostics with help text
		// and error codes.
		match e.downcast::<composer_core::ComposerError>() {
			Ok(composer_err) => {
				let report: miette::Report = (*composer_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Library logs are off unless `--verbose` or `RUST_LOG` ask for them.
fn init_tracing(verbose: bool, use_color: bool) {
	let filter = if verbose {
		tracing_subscriber::EnvFilter::new("debug")
	} else {
		tracing_subscriber::EnvFilter::try_from_default_env()
			.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"))
	};

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.try_init()
		.ok();
}

fn resolve_root(args: &ComposerCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn load_spec(args: &ComposerCli) -> CliResult<ClusterSpec> {
	Ok(ClusterSpec::load(&resolve_root(args))?)
}

fn print_section(title: &str) {
	println!();
	println!("{}", colored!(title, bold));
}

fn print_field(label: &str, value: impl std::fmt::Display) {
	println!("{label:<16} {value}");
}

fn run_init(args: &ComposerCli) -> CliResult<()> {
	let root = resolve_root(args);
	let config_path = root.join("clusterConfig.json");
	let template_path = root.join("web").join("compose.yml");

	let config_exists = config_path.exists();

	if config_exists {
		println!("Cluster configuration already exists: {}", config_path.display());
	} else {
		let sample_config = "{\n  \"projectName\": \"my-stack\",\n  \"outputFile\": \
		                     \"docker-compose.yml\",\n  \"prefix\": \"stack\",\n  \"web\": {\n    \
		                     \"template\": \"web/compose.yml\",\n    \"image\": \"nginx:latest\",\n    \
		                     \"port\": 8080\n  }\n}\n";

		std::fs::create_dir_all(&root)?;
		std::fs::write(&config_path, sample_config)?;
		println!("Created cluster configuration: {}", config_path.display());
	}

	if template_path.exists() {
		println!("Template file already exists: {}", template_path.display());
	} else {
		let sample_template = "# Statement lines start with the directive tag and are never \
		                       printed.\n#$ set published = port ~ \":80\"\nservices:\n  ${ \
		                       fullName }:\n    image: ${ image }\n    ports:\n      - \"${ \
		                       published }\"\n";

		if let Some(parent) = template_path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(&template_path, sample_template)?;
		println!("Created template file: {}", template_path.display());
	}

	if !config_exists {
		println!();
		println!("Next steps:");
		println!("  1. Add a block to clusterConfig.json for every module");
		println!("  2. Reference sibling values with ${{ other[\"stack-web\"].image }}");
		println!("  3. Run `composer build` to write docker-compose.yml");
	}

	Ok(())
}

fn run_build(args: &ComposerCli, options: &BuildOptions) -> CliResult<()> {
	// Run the initial build.
	let ok = run_build_once(args, options)?;

	if !options.watch {
		if !ok {
			process::exit(1);
		}
		return Ok(());
	}

	// Watch mode
	println!("\nWatching for file changes... (press Ctrl+C to stop)");

	let spec = load_spec(args)?;
	let output_path = spec.output_path();
	let (tx, rx) = mpsc::channel();

	let mut watcher =
		notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
			if let Ok(event) = res {
				if matches!(
					event.kind,
					notify::EventKind::Modify(_)
						| notify::EventKind::Create(_)
						| notify::EventKind::Remove(_)
				) && event
					.paths
					.iter()
					.any(|path| !is_build_artifact(path, &output_path))
				{
					let _ = tx.send(());
				}
			}
		})?;

	use notify::Watcher;
	watcher.watch(&spec.cd, notify::RecursiveMode::Recursive)?;

	// Rebuilds never prompt; the environment phase only runs with `--yes`.
	let rebuild = BuildOptions {
		skip_env: options.skip_env || !options.yes,
		..options.clone()
	};

	loop {
		rx.recv()?;
		// Debounce: drain additional events within 200ms.
		while rx.recv_timeout(Duration::from_millis(200)).is_ok() {}

		println!("\nFile change detected, rebuilding...");
		if let Err(e) = run_build_once(args, &rebuild) {
			// A broken env config is fatal even while watching.
			if matches!(
				e.downcast_ref::<composer_core::ComposerError>(),
				Some(composer_core::ComposerError::EnvRender { .. })
			) {
				return Err(e);
			}

			eprintln!("{} {e}", colored!("error:", red));
		}
	}
}

/// Files written by the build itself.
fn is_build_artifact(path: &Path, output_path: &Path) -> bool {
	if path == output_path {
		return true;
	}

	let file_name = path
		.file_name()
		.map(|name| name.to_string_lossy().to_string())
		.unwrap_or_default();
	let output_name = output_path
		.file_name()
		.map(|name| name.to_string_lossy().to_string())
		.unwrap_or_default();

	file_name.ends_with(".program") || file_name.starts_with(&format!("{output_name}.tmp-"))
}

/// Run a single build and return whether it succeeded.
fn run_build_once(args: &ComposerCli, options: &BuildOptions) -> CliResult<bool> {
	let spec = load_spec(args)?;
	let compose_options = ComposeOptions {
		report: options.report,
		report_dir: options.report_dir.clone(),
		..ComposeOptions::default()
	};
	let composition = compose(&spec, &compose_options)?;
	let rel = make_relative(&composition.output_path, &spec.cd);

	print_diagnostics(&composition.assembly.diagnostics, args.verbose);

	if !composition.is_ok() {
		print_failures(&composition.assembly.failures);
		eprintln!(
			"Build failed: {} module(s) failed, {rel} was not written.",
			composition.assembly.failures.len()
		);
		return Ok(false);
	}

	if write_output(&composition)? {
		println!(
			"{} {rel} ({} module(s))",
			colored!("Wrote", green),
			composition.assembly.outputs.len()
		);
	} else {
		println!("{rel} is already up to date.");
	}

	if options.skip_env {
		return Ok(true);
	}

	run_env_phase(&spec, &composition.assembly.contexts, &compose_options, options.yes)
}

fn run_env(args: &ComposerCli, yes: bool) -> CliResult<()> {
	let spec = load_spec(args)?;
	let mut diagnostics = Diagnostics::default();
	let contexts = build_contexts(&spec, &mut diagnostics)?;

	if !run_env_phase(&spec, &contexts, &ComposeOptions::default(), yes)? {
		process::exit(1);
	}

	Ok(())
}

/// Check every module with an `env` block against the process environment.
/// Returns false when a required variable is missing.
fn run_env_phase(
	spec: &ClusterSpec,
	contexts: &ContextSet,
	options: &ComposeOptions,
	yes: bool,
) -> CliResult<bool> {
	let count = contexts.iter().filter(|context| context.env.is_some()).count();
	if count == 0 {
		println!("No modules declare an env block.");
		return Ok(true);
	}

	if !yes {
		let prompt = format!("Run environment checks for {count} module(s)?");
		let proceed = confirm(
			&prompt,
			&mut std::io::stdin().lock(),
			&mut std::io::stdout(),
		)?;
		println!();

		if !proceed {
			println!("Skipped environment checks.");
			return Ok(true);
		}
	}

	let bridge = EnvBridge::new(spec, contexts, options);
	let mut checker = RequiredVarsChecker::new(std::env::vars());
	run_env_checks(contexts, &bridge, &mut checker)?;
	let report = checker.into_report();

	for module in &report.modules {
		if module.missing.is_empty() {
			println!(
				"{} {} ({} variable(s))",
				colored!("env ok:", green),
				module.module,
				module.declared.len()
			);
		}
	}

	for (module, var) in report.missing() {
		eprintln!(
			"{} module `{module}` requires `{var}` which is not set",
			colored!("error:", red)
		);
	}

	Ok(report.is_ok())
}

fn run_check(args: &ComposerCli, show_diff: bool) -> CliResult<()> {
	let spec = load_spec(args)?;
	let composition = compose(&spec, &ComposeOptions::default())?;
	let rel = make_relative(&composition.output_path, &spec.cd);

	print_diagnostics(&composition.assembly.diagnostics, args.verbose);

	let Some(check) = check_output(&composition)? else {
		print_failures(&composition.assembly.failures);
		eprintln!("Check failed: modules failed to compile.");
		process::exit(1);
	};

	if check.is_up_to_date() {
		println!("Check passed: {rel} is up to date.");
		return Ok(());
	}

	match &check.current_content {
		Some(_) => eprintln!("Check failed: {rel} is out of date."),
		None => eprintln!("Check failed: {rel} does not exist."),
	}

	if show_diff {
		eprintln!();
		print_diff(
			check.current_content.as_deref().unwrap_or_default(),
			&check.expected_content,
		);
	}

	eprintln!();
	eprintln!("Run `composer build` to update it.");
	process::exit(1);
}

fn run_info(args: &ComposerCli, format: InfoOutputFormat) -> CliResult<()> {
	let spec = load_spec(args)?;
	let mut diagnostics = Diagnostics::default();
	let contexts = build_contexts(&spec, &mut diagnostics)?;

	if matches!(format, InfoOutputFormat::Json) {
		let modules: Vec<serde_json::Value> = contexts
			.iter()
			.map(|context| {
				serde_json::json!({
					"name": context.name,
					"fullName": context.full_name,
					"moduleDir": context.module_dir,
					"template": context.template.as_deref().map(to_slash),
					"env": context.env.as_ref().map(|env| serde_json::json!({
						"envConfig": to_slash(&env.env_config),
						"file": env.file,
					})),
				})
			})
			.collect();
		let output = serde_json::json!({
			"projectName": spec.project_name,
			"cd": to_slash(&spec.cd),
			"outputFile": to_slash(&spec.output_file),
			"prefix": spec.prefix,
			"modules": modules,
		});
		println!("{}", serde_json::to_string_pretty(&output)?);
		return Ok(());
	}

	print_section("Cluster");
	print_field("project", spec.project_name.as_deref().unwrap_or("-"));
	print_field("base directory", spec.cd.display());
	print_field("output", make_relative(&spec.output_path(), &spec.cd));
	print_field(
		"prefix",
		if spec.prefix.is_empty() {
			"-"
		} else {
			spec.prefix.as_str()
		},
	);

	print_section(&format!("Modules ({})", contexts.len()));
	for context in &contexts {
		println!();
		print_field("name", &context.name);
		print_field("fullName", &context.full_name);
		print_field(
			"moduleDir",
			if context.module_dir.is_empty() {
				"-"
			} else {
				context.module_dir.as_str()
			},
		);
		print_field(
			"template",
			context
				.template
				.as_deref()
				.map_or_else(|| "-".to_string(), to_slash),
		);
		print_field(
			"env",
			context.env.as_ref().map_or_else(
				|| "-".to_string(),
				|env| format!("{} -> {}", to_slash(&env.env_config), env.file),
			),
		);
	}

	if !diagnostics.is_clean() {
		println!();
		print_diagnostics(&diagnostics, args.verbose);
	}

	Ok(())
}

/// Print non-fatal findings. Modules without a template are only mentioned
/// in verbose mode.
fn print_diagnostics(diagnostics: &Diagnostics, verbose: bool) {
	for diagnostic in diagnostics.iter() {
		if diagnostic.kind == DiagnosticKind::NoTemplate && !verbose {
			continue;
		}

		eprintln!("{} {}", colored!("warning:", yellow), diagnostic.message());
	}
}

fn print_failures(failures: &[ModuleFailure]) {
	for failure in failures {
		eprintln!(
			"{} module `{}` failed: {}",
			colored!("error:", red),
			failure.module,
			failure.error
		);
	}
}

/// Print a unified diff between two strings, colorized.
fn print_diff(current: &str, expected: &str) {
	let diff = TextDiff::from_lines(current, expected);
	for change in diff.iter_all_changes() {
		match change.tag() {
			ChangeTag::Delete => {
				eprint!("  {}", colored!(format!("-{change}"), red));
			}
			ChangeTag::Insert => {
				eprint!("  {}", colored!(format!("+{change}"), green));
			}
			ChangeTag::Equal => {
				eprint!("   {change}");
			}
		}
	}
}

/// Make a path relative to root for display purposes.
fn make_relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.display()
		.to_string()
}
