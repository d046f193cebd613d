//! A3S Dockerfile - Dockerfile syntax tree, image reference rewriting and
//! printing.
//!
//! The usual flow is parse, rewrite, print:
//!
//! ```
//! use a3s_dockerfile::{Ast, BuildArgs, ImageReference, RefSelector};
//!
//! let mut ast = Ast::parse("FROM myapp:latest\n").unwrap();
//! let selector = RefSelector::parse_name("myapp").unwrap();
//! let pinned = ImageReference::parse_named(
//!     "myapp@sha256:2222222222222222222222222222222222222222222222222222222222222222",
//! )
//! .unwrap();
//!
//! let modified = ast
//!     .inject_image_digest(&selector, &pinned, &BuildArgs::new())
//!     .unwrap();
//! assert!(modified);
//! assert!(ast.print().unwrap().starts_with("FROM myapp@sha256:2222"));
//! ```

pub mod ast;
pub mod directive;
pub mod format;
pub mod instructions;
pub mod parser;
pub mod reference;
pub mod resolve;
pub mod selector;
pub mod shell;
pub mod traverse;

// Re-export commonly used types
pub use a3s_dockerfile_core::{BuildArgs, DockerfileError, Result};
pub use ast::{Argument, Ast, Attributes, Command, Directive, Heredoc, Node};
pub use format::{format_node, print};
pub use instructions::{ArgCommand, CopyCommand, KeyValuePairOptional, Stage};
pub use reference::ImageReference;
pub use resolve::{for_each_image_reference, VariableMap};
pub use selector::{RefSelector, Selector};
pub use shell::ShellLex;
pub use traverse::{traverse, traverse_with_depth};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Rewrite the references in `text` matched by `selector` to `replacement`.
///
/// Returns the new text and whether anything changed. When nothing matched,
/// `text` comes back byte-for-byte, comments and layout included.
pub fn inject_image_digest<S>(
    text: &str,
    selector: &S,
    replacement: &ImageReference,
    build_args: &BuildArgs,
) -> Result<(String, bool)>
where
    S: Selector + ?Sized,
{
    let mut ast = Ast::parse(text)?;
    if !ast.inject_image_digest(selector, replacement, build_args)? {
        return Ok((text.to_string(), false));
    }

    let printed = ast.print()?;
    tracing::debug!(replacement = %replacement, "Injected image reference");
    Ok((printed, true))
}
