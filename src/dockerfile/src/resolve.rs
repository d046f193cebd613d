//! Image reference resolution and rewriting.
//!
//! Walks the instructions in source order, accumulating `ARG` defaults, and
//! reports every image reference found in a `FROM` base or a `COPY --from=`
//! flag. The visitor may hand back a replacement, which is written into the
//! node in place.
//!
//! Interpretation failures on a single node (malformed instruction, failed
//! substitution, string that is not a reference) only skip that node; a
//! rewrite pass over a whole file never aborts because of one odd line.

use std::collections::HashMap;

use a3s_dockerfile_core::config::BuildArgs;
use a3s_dockerfile_core::error::Result;

use crate::ast::{Ast, Command, Node};
use crate::instructions::{ArgCommand, CopyCommand, Stage};
use crate::reference::ImageReference;
use crate::selector::Selector;
use crate::shell::ShellLex;
use crate::traverse::traverse_with_depth;

/// Base name that starts a stage from an empty filesystem.
const SCRATCH: &str = "scratch";

const FROM_FLAG_PREFIX: &str = "--from=";

/// Insertion-ordered variable values for one resolver pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableMap {
    entries: Vec<(String, String)>,
}

impl VariableMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key`, keeping its original position if already present.
    pub fn set(&mut self, key: &str, value: String) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries.iter().cloned().collect()
    }
}

/// State of one resolver pass.
struct ImageRefResolver<'a> {
    lex: ShellLex,
    build_args: &'a BuildArgs,
    vars: VariableMap,
    /// Stage aliases declared so far, lowercased
    stages: Vec<String>,
}

impl<'a> ImageRefResolver<'a> {
    fn new(escape: char, build_args: &'a BuildArgs) -> Self {
        let mut vars = VariableMap::default();
        for (key, value) in build_args.iter() {
            if let Some(value) = value {
                vars.set(key, value.to_string());
            }
        }
        Self {
            lex: ShellLex::new(escape),
            build_args,
            vars,
            stages: Vec::new(),
        }
    }

    /// Record the defaults of an `ARG`. A caller override always wins, on
    /// every redeclaration.
    fn declare(&mut self, node: &Node) {
        let arg = match ArgCommand::from_node(node) {
            Ok(arg) => arg,
            Err(e) => {
                tracing::debug!(line = node.start_line, error = %e, "Ignoring malformed ARG");
                return;
            }
        };

        for kv in arg.args {
            if let Some(Some(value)) = self.build_args.get(&kv.key) {
                self.vars.set(&kv.key, value.to_string());
                continue;
            }
            let Some(raw) = kv.value else {
                continue;
            };
            let value = self.expand(&raw, node);
            self.vars.set(&kv.key, value);
        }
    }

    /// Expand `word`, falling back to the word itself.
    fn expand(&self, word: &str, node: &Node) -> String {
        match self.lex.process_word_with_map(word, &self.vars.to_map()) {
            Ok(expanded) => expanded,
            Err(e) => {
                tracing::debug!(
                    line = node.start_line,
                    word,
                    error = %e,
                    "Substitution failed, using the word unexpanded"
                );
                word.to_string()
            }
        }
    }

    fn is_stage_reference(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.stages.contains(&name)
    }

    /// Base image of a `FROM`, expanded. Records the stage alias.
    fn base_name(&mut self, node: &Node) -> Option<String> {
        let raw = match Stage::from_node(node) {
            Ok(stage) => {
                let base = stage.base_name;
                let expanded = self.expand(&base, node);
                if let Some(alias) = stage.name {
                    self.stages.push(alias);
                }
                expanded
            }
            Err(e) => {
                tracing::debug!(
                    line = node.start_line,
                    error = %e,
                    "Malformed FROM, falling back to its first argument"
                );
                let first = node.first_value()?;
                self.expand(first, node)
            }
        };
        if raw.is_empty() {
            None
        } else {
            Some(raw)
        }
    }

    fn visit_from<V>(&mut self, node: &mut Node, visitor: &mut V)
    where
        V: FnMut(&Node, &ImageReference) -> Option<ImageReference>,
    {
        let stages_before = self.stages.len();
        let Some(base_name) = self.base_name(node) else {
            return;
        };
        // Only aliases declared by earlier stages count
        let is_stage = self.stages[..stages_before].contains(&base_name.to_lowercase());
        if is_stage || base_name == SCRATCH {
            return;
        }

        let reference = match ImageReference::parse_named(&base_name) {
            Ok(reference) => reference,
            Err(e) => {
                tracing::debug!(line = node.start_line, base_name = %base_name, error = %e, "FROM base is not an image reference");
                return;
            }
        };

        if let Some(replacement) = visitor(node, &reference) {
            let value = replacement.familiar_string();
            tracing::debug!(
                line = node.start_line,
                from = %reference.familiar_string(),
                to = %value,
                "Rewriting FROM image"
            );
            node.set_argument(0, value);
        }
    }

    fn visit_copy<V>(&mut self, node: &mut Node, visitor: &mut V)
    where
        V: FnMut(&Node, &ImageReference) -> Option<ImageReference>,
    {
        if node.flags.is_empty() {
            return;
        }
        let copy = match CopyCommand::from_node(node) {
            Ok(copy) => copy,
            Err(e) => {
                tracing::debug!(line = node.start_line, error = %e, "Ignoring malformed COPY");
                return;
            }
        };
        let Some(from) = copy.from else {
            return;
        };
        if self.is_stage_reference(&from) || from.chars().all(|c| c.is_ascii_digit()) {
            return;
        }

        let reference = match ImageReference::parse_named(&from) {
            Ok(reference) => reference,
            Err(e) => {
                tracing::debug!(line = node.start_line, from = %from, error = %e, "COPY --from is not an image reference");
                return;
            }
        };

        if let Some(replacement) = visitor(node, &reference) {
            let flag = format!("{}{}", FROM_FLAG_PREFIX, replacement.familiar_string());
            tracing::debug!(line = node.start_line, flag = %flag, "Rewriting COPY --from image");
            for i in 0..node.flags.len() {
                if node.flags[i].starts_with(FROM_FLAG_PREFIX) {
                    node.set_flag(i, flag.clone());
                }
            }
        }
    }
}

/// Call `visitor` for every image reference in `nodes`, in source order.
///
/// `FROM` bases are expanded against the `ARG` defaults seen so far, with
/// `build_args` taking precedence. `COPY --from=` values are used as
/// written. When the visitor returns a replacement, the base-name argument
/// or the `--from=` flag is overwritten with its familiar form.
///
/// Only top-level instructions are interpreted. `ONBUILD` triggers are left
/// untouched.
pub fn for_each_image_reference<V>(
    nodes: &mut [Node],
    escape: char,
    build_args: &BuildArgs,
    mut visitor: V,
) -> Result<()>
where
    V: FnMut(&Node, &ImageReference) -> Option<ImageReference>,
{
    let mut resolver = ImageRefResolver::new(escape, build_args);

    traverse_with_depth(nodes, &mut |node: &mut Node, depth: usize| {
        // ONBUILD triggers run in downstream builds, not this one
        if depth > 0 {
            return Ok(());
        }
        match node.command() {
            Command::Arg => resolver.declare(node),
            Command::From => resolver.visit_from(node, &mut visitor),
            Command::Copy => resolver.visit_copy(node, &mut visitor),
            _ => {}
        }
        Ok(())
    })
}

impl Ast {
    /// See [`for_each_image_reference`].
    pub fn for_each_image_reference<V>(&mut self, build_args: &BuildArgs, visitor: V) -> Result<()>
    where
        V: FnMut(&Node, &ImageReference) -> Option<ImageReference>,
    {
        let escape = self.escape_token;
        for_each_image_reference(&mut self.nodes, escape, build_args, visitor)
    }

    /// Replace every reference matched by `selector` with `replacement`.
    ///
    /// Returns whether anything was replaced.
    pub fn inject_image_digest<S>(
        &mut self,
        selector: &S,
        replacement: &ImageReference,
        build_args: &BuildArgs,
    ) -> Result<bool>
    where
        S: Selector + ?Sized,
    {
        let mut modified = false;
        self.for_each_image_reference(build_args, |_, found| {
            if selector.matches(found) {
                modified = true;
                Some(replacement.clone())
            } else {
                None
            }
        })?;
        Ok(modified)
    }

    /// All image references, in source order. The tree is left untouched.
    pub fn find_images(&self, build_args: &BuildArgs) -> Result<Vec<ImageReference>> {
        let mut images = Vec::new();
        let mut tree = self.clone();
        tree.for_each_image_reference(build_args, |_, found| {
            images.push(found.clone());
            None
        })?;
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::RefSelector;

    const DIGEST: &str = "sha256:1111111111111111111111111111111111111111111111111111111111111111";

    fn refs(content: &str, build_args: &BuildArgs) -> Vec<String> {
        Ast::parse(content)
            .unwrap()
            .find_images(build_args)
            .unwrap()
            .iter()
            .map(ImageReference::familiar_string)
            .collect()
    }

    fn no_args() -> BuildArgs {
        BuildArgs::new()
    }

    #[test]
    fn test_variable_map_keeps_position() {
        let mut vars = VariableMap::default();
        vars.set("A", "1".to_string());
        vars.set("B", "2".to_string());
        vars.set("A", "3".to_string());
        let entries: Vec<_> = vars.iter().collect();
        assert_eq!(entries, vec![("A", "3"), ("B", "2")]);
        assert_eq!(vars.get("A"), Some("3"));
        assert_eq!(vars.get("C"), None);
    }

    #[test]
    fn test_literal_from() {
        assert_eq!(refs("FROM alpine:3.19\n", &no_args()), vec!["alpine:3.19"]);
    }

    #[test]
    fn test_arg_substitution() {
        let content = "ARG BASE=alpine\nARG TAG=3.18\nFROM ${BASE}:${TAG}\n";
        assert_eq!(refs(content, &no_args()), vec!["alpine:3.18"]);
    }

    #[test]
    fn test_default_references_earlier_arg() {
        let content = "ARG REGISTRY=ghcr.io/org\nARG IMAGE=${REGISTRY}/app\nFROM $IMAGE:v1\n";
        assert_eq!(refs(content, &no_args()), vec!["ghcr.io/org/app:v1"]);
    }

    #[test]
    fn test_override_without_in_file_default() {
        let args = BuildArgs::from_kv_strings(["BASE=ubuntu"]).unwrap();
        assert_eq!(refs("FROM ${BASE}\n", &args), vec!["ubuntu"]);
    }

    #[test]
    fn test_override_beats_later_default() {
        let args = BuildArgs::from_kv_strings(["BASE=ubuntu"]).unwrap();
        let content = "ARG BASE=alpine\nFROM $BASE\nARG BASE=debian\nFROM $BASE AS second\n";
        assert_eq!(refs(content, &args), vec!["ubuntu", "ubuntu"]);
    }

    #[test]
    fn test_override_without_value_uses_default() {
        let args = BuildArgs::from_kv_strings(["BASE"]).unwrap();
        assert_eq!(refs("ARG BASE=alpine\nFROM $BASE\n", &args), vec!["alpine"]);
    }

    #[test]
    fn test_latest_declaration_wins() {
        let content = "ARG TAG=1\nFROM app:$TAG\nARG TAG=2\nFROM app:$TAG\n";
        assert_eq!(refs(content, &no_args()), vec!["app:1", "app:2"]);
    }

    #[test]
    fn test_bare_arg_keeps_value() {
        let content = "ARG TAG=1\nFROM app:$TAG\nARG TAG\nFROM app:$TAG\n";
        assert_eq!(refs(content, &no_args()), vec!["app:1", "app:1"]);
    }

    #[test]
    fn test_unset_variable_is_skipped() {
        // "app:" is not a valid reference
        assert!(refs("FROM app:${MISSING}\n", &no_args()).is_empty());
    }

    #[test]
    fn test_failed_substitution_falls_back() {
        // Unterminated brace: the raw word is used and then rejected
        assert!(refs("FROM ${BASE\n", &no_args()).is_empty());
        let content = "FROM ${U:?required}\nFROM alpine\n";
        assert_eq!(refs(content, &no_args()), vec!["alpine"]);
    }

    #[test]
    fn test_malformed_from_uses_first_argument() {
        assert_eq!(refs("FROM alpine extra\n", &no_args()), vec!["alpine"]);
        assert_eq!(refs("FROM --bogus=1 redis:7\n", &no_args()), vec!["redis:7"]);
    }

    #[test]
    fn test_copy_from_image() {
        let content = "FROM alpine\nCOPY --from=nginx:1.25 /etc/nginx /etc/nginx\n";
        assert_eq!(refs(content, &no_args()), vec!["alpine", "nginx:1.25"]);
    }

    #[test]
    fn test_copy_from_stage_skipped() {
        let content = "FROM golang:1.21 AS builder\nFROM alpine\nCOPY --from=builder /x /y\nCOPY --from=0 /a /b\n";
        assert_eq!(refs(content, &no_args()), vec!["golang:1.21", "alpine"]);
    }

    #[test]
    fn test_copy_from_invalid_reference_skipped() {
        let content = "FROM alpine\nCOPY --from=Not_A_Ref /x /y\n";
        assert_eq!(refs(content, &no_args()), vec!["alpine"]);
    }

    #[test]
    fn test_copy_without_flags_skipped() {
        assert_eq!(refs("FROM alpine\nCOPY . /app\n", &no_args()), vec!["alpine"]);
    }

    #[test]
    fn test_from_stage_and_scratch_skipped() {
        let content = "FROM node:20 AS deps\nFROM deps\nFROM scratch\n";
        assert_eq!(refs(content, &no_args()), vec!["node:20"]);
    }

    #[test]
    fn test_stage_alias_only_counts_afterwards() {
        let content = "FROM base AS base\n";
        assert_eq!(refs(content, &no_args()), vec!["base"]);
    }

    #[test]
    fn test_onbuild_copy_not_visited() {
        let content = "FROM alpine\nONBUILD COPY --from=tools:1 /bin/t /bin/t\n";
        assert_eq!(refs(content, &no_args()), vec!["alpine"]);
    }

    #[test]
    fn test_onbuild_arg_does_not_change_variables() {
        let content = "ARG TAG=1\nONBUILD ARG TAG=2\nFROM app:$TAG\n";
        assert_eq!(refs(content, &no_args()), vec!["app:1"]);
    }

    #[test]
    fn test_inject_leaves_onbuild_trigger_alone() {
        let mut ast = Ast::parse("FROM alpine\nONBUILD COPY --from=myapp:v1 /a /b\n").unwrap();
        let selector = RefSelector::parse_name("myapp").unwrap();
        let replacement = ImageReference::parse_named(&format!("myapp@{}", DIGEST)).unwrap();
        let before = ast.clone();
        assert!(!ast.inject_image_digest(&selector, &replacement, &no_args()).unwrap());
        assert_eq!(ast, before);
    }

    #[test]
    fn test_other_instructions_ignored() {
        let content = "FROM alpine\nRUN docker pull nginx\nLABEL image=nginx\n";
        assert_eq!(refs(content, &no_args()), vec!["alpine"]);
    }

    #[test]
    fn test_inject_image_digest_from() {
        let mut ast = Ast::parse("FROM myapp:latest\nRUN make\n").unwrap();
        let selector = RefSelector::parse_name("myapp").unwrap();
        let replacement = ImageReference::parse_named(&format!("myapp@{}", DIGEST)).unwrap();
        let modified = ast.inject_image_digest(&selector, &replacement, &no_args()).unwrap();
        assert!(modified);
        assert_eq!(ast.nodes[0].first_value(), Some(format!("myapp@{}", DIGEST).as_str()));
        assert_eq!(ast.nodes[1].first_value(), Some("make"));
    }

    #[test]
    fn test_inject_image_digest_copy_only_touches_from_flag() {
        let mut ast = Ast::parse("FROM alpine\nCOPY --chown=1:1 --from=myapp:v1 --link /a /b\n").unwrap();
        let selector = RefSelector::parse_name("myapp").unwrap();
        let replacement = ImageReference::parse_named(&format!("myapp:v1@{}", DIGEST)).unwrap();
        assert!(ast.inject_image_digest(&selector, &replacement, &no_args()).unwrap());
        assert_eq!(
            ast.nodes[1].flags,
            vec![
                "--chown=1:1".to_string(),
                format!("--from=myapp:v1@{}", DIGEST),
                "--link".to_string(),
            ]
        );
        assert_eq!(ast.nodes[0].first_value(), Some("alpine"));
    }

    #[test]
    fn test_inject_image_digest_no_match() {
        let original = Ast::parse("FROM alpine\nCOPY --from=builder /x /y\n").unwrap();
        let mut ast = original.clone();
        let selector = RefSelector::parse_name("myapp").unwrap();
        let replacement = ImageReference::parse_named(&format!("myapp@{}", DIGEST)).unwrap();
        assert!(!ast.inject_image_digest(&selector, &replacement, &no_args()).unwrap());
        assert_eq!(ast, original);
    }

    #[test]
    fn test_inject_through_variables() {
        let mut ast = Ast::parse("ARG IMG=myapp\nFROM ${IMG}:dev AS app\n").unwrap();
        let selector = RefSelector::parse_name("myapp").unwrap();
        let replacement = ImageReference::parse_named(&format!("myapp@{}", DIGEST)).unwrap();
        assert!(ast.inject_image_digest(&selector, &replacement, &no_args()).unwrap());
        let values: Vec<&str> = ast.nodes[1].values().collect();
        let pinned = format!("myapp@{}", DIGEST);
        assert_eq!(values, vec![pinned.as_str(), "AS", "app"]);
    }

    #[test]
    fn test_visitor_sees_node() {
        let mut ast = Ast::parse("FROM alpine\n\nFROM redis\n").unwrap();
        let mut lines = Vec::new();
        ast.for_each_image_reference(&no_args(), |node, _| {
            lines.push(node.start_line);
            None
        })
        .unwrap();
        assert_eq!(lines, vec![1, 3]);
    }
}
