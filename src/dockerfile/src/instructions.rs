//! Structured views of the instructions that carry image references.
//!
//! A [`Node`] only knows its words; these types give `ARG`, `FROM` and
//! `COPY` their meaning (flags validated, stage names checked). Any
//! failure here is an ordinary error, and callers decide whether it is
//! fatal.

use std::collections::HashMap;

use a3s_dockerfile_core::error::{DockerfileError, Result};

use crate::ast::{Command, Node};

/// One `NAME[=value]` pair of an `ARG`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValuePairOptional {
    pub key: String,
    /// Raw default, still unexpanded
    pub value: Option<String>,
}

/// `ARG <name>[=<default>] ...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgCommand {
    pub args: Vec<KeyValuePairOptional>,
}

impl ArgCommand {
    pub fn from_node(node: &Node) -> Result<Self> {
        expect_command(node, Command::Arg)?;
        if let Some(flag) = node.flags.first() {
            return Err(instruction_error(node, format!("unknown flag: {}", flag)));
        }
        if node.args.is_empty() {
            return Err(instruction_error(node, "ARG requires at least one argument"));
        }

        let mut args = Vec::with_capacity(node.args.len());
        for word in node.values() {
            let (key, value) = match word.split_once('=') {
                Some((k, v)) => (k, Some(v.to_string())),
                None => (word, None),
            };
            if key.is_empty() {
                return Err(instruction_error(node, "ARG names can not be blank"));
            }
            args.push(KeyValuePairOptional {
                key: key.to_string(),
                value,
            });
        }

        Ok(Self { args })
    }
}

/// `FROM [--platform=<p>] <image> [AS <name>]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Base image as written, variables unexpanded
    pub base_name: String,
    /// Lowercased stage alias
    pub name: Option<String>,
    pub platform: Option<String>,
}

impl Stage {
    pub fn from_node(node: &Node) -> Result<Self> {
        expect_command(node, Command::From)?;
        let flags = BuilderFlags::parse(node, &[("platform", FlagKind::String)])?;

        let values: Vec<&str> = node.values().collect();
        let (base_name, name) = match values.as_slice() {
            [base] => (base.to_string(), None),
            [base, as_kw, name] if as_kw.eq_ignore_ascii_case("as") => {
                let name = name.to_lowercase();
                if !is_valid_stage_name(&name) {
                    return Err(instruction_error(
                        node,
                        format!("invalid name for build stage: '{}', name can't start with a number or contain symbols", name),
                    ));
                }
                (base.to_string(), Some(name))
            }
            _ => {
                return Err(instruction_error(
                    node,
                    "FROM requires either one or three arguments",
                ))
            }
        };

        Ok(Self {
            base_name,
            name,
            platform: flags.string("platform").map(str::to_string),
        })
    }
}

/// `COPY [--from=<src>] [--chown=..] [--chmod=..] [--link] <src>... <dest>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyCommand {
    /// Stage name, stage index or image the files come from
    pub from: Option<String>,
    pub chown: Option<String>,
    pub chmod: Option<String>,
    pub link: bool,
    pub parents: bool,
    pub exclude: Vec<String>,
    pub sources: Vec<String>,
    pub dest: String,
}

impl CopyCommand {
    pub fn from_node(node: &Node) -> Result<Self> {
        expect_command(node, Command::Copy)?;
        let flags = BuilderFlags::parse(
            node,
            &[
                ("from", FlagKind::String),
                ("chown", FlagKind::String),
                ("chmod", FlagKind::String),
                ("link", FlagKind::Bool),
                ("parents", FlagKind::Bool),
                ("exclude", FlagKind::List),
            ],
        )?;

        let values: Vec<String> = node.values().map(str::to_string).collect();
        let Some((dest, sources)) = values.split_last() else {
            return Err(instruction_error(node, "COPY requires at least two arguments"));
        };
        if sources.is_empty() {
            return Err(instruction_error(
                node,
                "COPY requires at least two arguments, but only one was provided. Destination could not be determined",
            ));
        }

        Ok(Self {
            from: flags.string("from").map(str::to_string),
            chown: flags.string("chown").map(str::to_string),
            chmod: flags.string("chmod").map(str::to_string),
            link: flags.bool("link"),
            parents: flags.bool("parents"),
            exclude: flags.list("exclude").to_vec(),
            sources: sources.to_vec(),
            dest: dest.clone(),
        })
    }
}

/// Expected shape of a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// `--name=value`
    String,
    /// `--name` or `--name=true|false`
    Bool,
    /// `--name=value`, repeatable
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FlagValue {
    String(String),
    Bool(bool),
    List(Vec<String>),
}

/// Validated flags of one instruction.
#[derive(Debug, Clone, Default)]
pub struct BuilderFlags {
    values: HashMap<String, FlagValue>,
}

impl BuilderFlags {
    /// Check `node.flags` against the allowed set.
    pub fn parse(node: &Node, allowed: &[(&str, FlagKind)]) -> Result<Self> {
        let mut values: HashMap<String, FlagValue> = HashMap::new();

        for raw in &node.flags {
            let body = raw
                .strip_prefix("--")
                .ok_or_else(|| instruction_error(node, format!("invalid flag: {}", raw)))?;
            let (name, value) = match body.split_once('=') {
                Some((n, v)) => (n, Some(v)),
                None => (body, None),
            };
            let kind = allowed
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, k)| *k)
                .ok_or_else(|| instruction_error(node, format!("unknown flag: {}", name)))?;

            let parsed = match (kind, value) {
                (FlagKind::Bool, None) => FlagValue::Bool(true),
                (FlagKind::Bool, Some(v)) => match v.to_lowercase().as_str() {
                    "true" => FlagValue::Bool(true),
                    "false" => FlagValue::Bool(false),
                    _ => {
                        return Err(instruction_error(
                            node,
                            format!("expecting boolean value for flag {}, not: {}", name, v),
                        ))
                    }
                },
                (_, None) => {
                    return Err(instruction_error(
                        node,
                        format!("missing a value on flag: {}", name),
                    ))
                }
                (FlagKind::String, Some(v)) => FlagValue::String(v.to_string()),
                (FlagKind::List, Some(v)) => FlagValue::List(vec![v.to_string()]),
            };

            if let Some(existing) = values.get_mut(name) {
                match (existing, parsed) {
                    (FlagValue::List(items), FlagValue::List(mut more)) => items.append(&mut more),
                    _ => {
                        return Err(instruction_error(
                            node,
                            format!("duplicate flag specified: {}", name),
                        ))
                    }
                }
            } else {
                values.insert(name.to_string(), parsed);
            }
        }

        Ok(Self { values })
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(FlagValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(FlagValue::Bool(true)))
    }

    pub fn list(&self, name: &str) -> &[String] {
        match self.values.get(name) {
            Some(FlagValue::List(items)) => items,
            _ => &[],
        }
    }
}

/// `[a-z][a-z0-9-_.]*`
fn is_valid_stage_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

fn expect_command(node: &Node, expected: Command) -> Result<()> {
    if node.command() == expected {
        Ok(())
    } else {
        Err(instruction_error(
            node,
            format!("expected {:?} instruction, got {}", expected, node.keyword),
        ))
    }
}

fn instruction_error(node: &Node, message: impl Into<String>) -> DockerfileError {
    DockerfileError::Instruction(format!("line {}: {}", node.start_line, message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;

    fn node(content: &str) -> Node {
        Ast::parse(content).unwrap().nodes.remove(0)
    }

    // --- ARG ---

    #[test]
    fn test_arg_with_default() {
        let arg = ArgCommand::from_node(&node("ARG VERSION=1.0.0\n")).unwrap();
        assert_eq!(
            arg.args,
            vec![KeyValuePairOptional {
                key: "VERSION".to_string(),
                value: Some("1.0.0".to_string()),
            }]
        );
    }

    #[test]
    fn test_arg_multiple() {
        let arg = ArgCommand::from_node(&node("ARG A B=\"x y\"\n")).unwrap();
        assert_eq!(arg.args.len(), 2);
        assert_eq!(arg.args[0].value, None);
        assert_eq!(arg.args[1].value.as_deref(), Some("\"x y\""));
    }

    #[test]
    fn test_arg_blank_name() {
        assert!(ArgCommand::from_node(&node("ARG =x\n")).is_err());
    }

    #[test]
    fn test_arg_rejects_flags() {
        assert!(ArgCommand::from_node(&node("ARG --foo=bar X\n")).is_err());
    }

    #[test]
    fn test_arg_wrong_instruction() {
        assert!(ArgCommand::from_node(&node("ENV A=1\n")).is_err());
    }

    // --- FROM ---

    #[test]
    fn test_stage_simple() {
        let stage = Stage::from_node(&node("FROM alpine:3.19\n")).unwrap();
        assert_eq!(stage.base_name, "alpine:3.19");
        assert_eq!(stage.name, None);
        assert_eq!(stage.platform, None);
    }

    #[test]
    fn test_stage_alias_and_platform() {
        let stage = Stage::from_node(&node("FROM --platform=linux/arm64 golang:1.21 as Builder\n")).unwrap();
        assert_eq!(stage.base_name, "golang:1.21");
        assert_eq!(stage.name.as_deref(), Some("builder"));
        assert_eq!(stage.platform.as_deref(), Some("linux/arm64"));
    }

    #[test]
    fn test_stage_wrong_arity() {
        assert!(Stage::from_node(&node("FROM a b\n")).is_err());
        assert!(Stage::from_node(&node("FROM a FOR b\n")).is_err());
    }

    #[test]
    fn test_stage_invalid_name() {
        assert!(Stage::from_node(&node("FROM alpine AS 1st\n")).is_err());
        assert!(Stage::from_node(&node("FROM alpine AS a$b\n")).is_err());
    }

    #[test]
    fn test_stage_unknown_flag() {
        let err = Stage::from_node(&node("FROM --foo=bar alpine\n")).unwrap_err();
        assert!(err.to_string().contains("unknown flag: foo"));
    }

    // --- COPY ---

    #[test]
    fn test_copy_from() {
        let copy = CopyCommand::from_node(&node("COPY --from=builder --link /app/bin /usr/local/bin/\n")).unwrap();
        assert_eq!(copy.from.as_deref(), Some("builder"));
        assert!(copy.link);
        assert_eq!(copy.sources, vec!["/app/bin"]);
        assert_eq!(copy.dest, "/usr/local/bin/");
    }

    #[test]
    fn test_copy_exclude_repeatable() {
        let copy = CopyCommand::from_node(&node("COPY --exclude=*.md --exclude=*.txt . /src\n")).unwrap();
        assert_eq!(copy.exclude, vec!["*.md", "*.txt"]);
        assert_eq!(copy.from, None);
    }

    #[test]
    fn test_copy_single_argument() {
        assert!(CopyCommand::from_node(&node("COPY onlysource\n")).is_err());
    }

    #[test]
    fn test_copy_duplicate_flag() {
        let err = CopyCommand::from_node(&node("COPY --from=a --from=b x y\n")).unwrap_err();
        assert!(err.to_string().contains("duplicate flag"));
    }

    #[test]
    fn test_copy_flag_missing_value() {
        assert!(CopyCommand::from_node(&node("COPY --from x y\n")).is_err());
    }

    #[test]
    fn test_copy_bool_flag_value() {
        let copy = CopyCommand::from_node(&node("COPY --link=false x y\n")).unwrap();
        assert!(!copy.link);
        assert!(CopyCommand::from_node(&node("COPY --link=maybe x y\n")).is_err());
    }

    #[test]
    fn test_stage_name_rule() {
        assert!(is_valid_stage_name("build-env_1.x"));
        assert!(!is_valid_stage_name(""));
        assert!(!is_valid_stage_name("Build"));
        assert!(!is_valid_stage_name("9lives"));
    }
}
