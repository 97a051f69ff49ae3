//! `composer_core` compiles a cluster of module templates into a single
//! merged YAML document, such as the `docker-compose.yml` of a multi-service
//! stack.
//!
//! ## Processing Pipeline
//!
//! ```text
//! clusterConfig.json
//!   → Config (validates the cluster and module blocks)
//!   → Assembler (builds every module context, including the `other` map)
//!   → Transpiler (turns each template into a program of literal lines and statements)
//!   → Executor (runs the program in a fresh, capability-free environment)
//!   → Merger (deep-merges every rendered document and writes the output atomically)
//!   → Env bridge (renders env specs for an environment checker)
//! ```
//!
//! ## Templates
//!
//! Lines starting with the directive tag (`#$` in `.yml` and `.yaml` files,
//! `//$` everywhere else) are statements. Every other line is literal output
//! with `${ expression }` interpolation:
//!
//! ```yaml
//! services:
//!   ${ fullName }:
//!     image: ${ image }
//! #$ if replicas is defined and replicas > 1
//!     deploy:
//!       replicas: ${ replicas }
//! #$ endif
//! ```
//!
//! `export <expression>` replaces the literal output with a structured value.
//! Templates with the `.prog` extension must export a value, which is then
//! rendered again as a YAML template.
//!
//! ## Modules
//!
//! - [`config`]: loading and validating `clusterConfig.json`, `.yaml`,
//!   `.yml` or `.toml`.
//! - [`paths`]: the forward-slash `path` namespace available to programs.

pub use assembler::*;
pub use compose::*;
pub use config::*;
pub use context::*;
pub use diagnostics::*;
pub use env_bridge::*;
pub use error::*;
pub use executor::*;
pub use merge::*;
pub use transpiler::*;

mod assembler;
mod compose;
pub mod config;
mod context;
mod diagnostics;
mod env_bridge;
#[allow(unused_assignments)]
mod error;
mod executor;
mod merge;
pub mod paths;
mod transpiler;

#[cfg(test)]
mod __fixtures;
