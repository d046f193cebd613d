//! Dockerfile syntax tree.
//!
//! A parsed Dockerfile is an [`Ast`]: the leading parser directives plus one
//! [`Node`] per instruction, in source order. Nodes are never inserted or
//! removed after parsing; only argument values and flag strings change, and
//! only through [`Node::set_argument`] / [`Node::set_flag`].

use serde::Serialize;

/// Parser directive from a leading comment, e.g. `# escape=\``.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directive {
    /// Lowercased directive name
    pub name: String,
    pub value: String,
    /// 1-based line the directive was read from
    pub line: usize,
}

/// One argument of an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Argument {
    pub value: String,
    /// Flags that follow this argument when printed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

impl Argument {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            flags: Vec::new(),
        }
    }
}

/// Structural attributes recorded by the parser.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Attributes {
    /// Arguments came from a JSON array (exec form)
    pub json: bool,
}

/// Inline here-document attached to `RUN`, `COPY` or `ADD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heredoc {
    /// Terminator word
    pub name: String,
    /// Body lines, each terminated by `\n`
    pub content: String,
    /// Unquoted terminator: body is subject to expansion
    pub expand: bool,
    /// `<<-` form: leading tabs are stripped
    pub chomp: bool,
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    /// Uppercase instruction keyword (`FROM`, `RUN`, ...)
    pub keyword: String,
    pub args: Vec<Argument>,
    /// Raw flag strings in source order (`--from=builder`)
    pub flags: Vec<String>,
    pub attributes: Attributes,
    pub heredocs: Vec<Heredoc>,
    /// Nested instruction (the trigger of `ONBUILD`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    /// First physical line of the instruction (1-based)
    pub start_line: usize,
    /// Last physical line, heredoc bodies included
    pub end_line: usize,
    /// Logical line as read, continuations joined
    #[serde(skip)]
    pub original: String,
}

impl Node {
    pub fn new(keyword: impl Into<String>, start_line: usize) -> Self {
        Self {
            keyword: keyword.into().to_uppercase(),
            args: Vec::new(),
            flags: Vec::new(),
            attributes: Attributes::default(),
            heredocs: Vec::new(),
            children: Vec::new(),
            start_line,
            end_line: start_line,
            original: String::new(),
        }
    }

    /// Typed view of the keyword.
    pub fn command(&self) -> Command {
        Command::from_keyword(&self.keyword)
    }

    /// Argument values in order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|a| a.value.as_str())
    }

    pub fn first_value(&self) -> Option<&str> {
        self.args.first().map(|a| a.value.as_str())
    }

    /// Replace the value of argument `index`. Returns false when out of range.
    pub fn set_argument(&mut self, index: usize, value: impl Into<String>) -> bool {
        match self.args.get_mut(index) {
            Some(arg) => {
                arg.value = value.into();
                true
            }
            None => false,
        }
    }

    /// Replace flag `index`. Returns false when out of range.
    pub fn set_flag(&mut self, index: usize, flag: impl Into<String>) -> bool {
        match self.flags.get_mut(index) {
            Some(f) => {
                *f = flag.into();
                true
            }
            None => false,
        }
    }

    /// Value of a `--name=value` flag, if present.
    pub fn flag_value(&self, name: &str) -> Option<&str> {
        let prefix = format!("--{}=", name);
        self.flags.iter().find_map(|f| f.strip_prefix(prefix.as_str()))
    }
}

/// Known Dockerfile instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add,
    Arg,
    Cmd,
    Copy,
    Entrypoint,
    Env,
    Expose,
    From,
    Healthcheck,
    Label,
    Maintainer,
    Onbuild,
    Run,
    Shell,
    Stopsignal,
    User,
    Volume,
    Workdir,
    /// Anything else, uppercased
    Other(String),
}

impl Command {
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.to_uppercase().as_str() {
            "ADD" => Self::Add,
            "ARG" => Self::Arg,
            "CMD" => Self::Cmd,
            "COPY" => Self::Copy,
            "ENTRYPOINT" => Self::Entrypoint,
            "ENV" => Self::Env,
            "EXPOSE" => Self::Expose,
            "FROM" => Self::From,
            "HEALTHCHECK" => Self::Healthcheck,
            "LABEL" => Self::Label,
            "MAINTAINER" => Self::Maintainer,
            "ONBUILD" => Self::Onbuild,
            "RUN" => Self::Run,
            "SHELL" => Self::Shell,
            "STOPSIGNAL" => Self::Stopsignal,
            "USER" => Self::User,
            "VOLUME" => Self::Volume,
            "WORKDIR" => Self::Workdir,
            other => Self::Other(other.to_string()),
        }
    }

    /// Instructions whose body may be written as a JSON array.
    pub fn is_exec_capable(&self) -> bool {
        matches!(
            self,
            Self::Cmd
                | Self::Entrypoint
                | Self::Run
                | Self::Shell
                | Self::Add
                | Self::Copy
                | Self::Volume
        )
    }

    /// Instructions that accept heredoc bodies.
    pub fn allows_heredoc(&self) -> bool {
        matches!(self, Self::Run | Self::Copy | Self::Add)
    }
}

/// Parsed Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ast {
    pub directives: Vec<Directive>,
    pub nodes: Vec<Node>,
    /// Escape token in effect (`\` unless overridden by a directive)
    pub escape_token: char,
}

impl Ast {
    /// Dump the tree as pretty JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Keyword, argument values and flags of every top-level node.
    ///
    /// Two trees with equal outlines describe the same instructions, even if
    /// their layout differs.
    pub fn outline(&self) -> Vec<(String, Vec<String>, Vec<String>)> {
        self.nodes
            .iter()
            .map(|n| {
                (
                    n.keyword.clone(),
                    n.values().map(str::to_string).collect(),
                    n.flags.clone(),
                )
            })
            .collect()
    }
}
