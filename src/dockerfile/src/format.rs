//! Dockerfile printer.
//!
//! Rebuilds text from an [`Ast`]: one line per instruction (plus heredoc
//! bodies), with blank lines inserted so each instruction lands as close as
//! possible to its original line. Comments and whitespace inside
//! instructions are not preserved.

use std::fmt::Write;

use a3s_dockerfile_core::error::Result;

use crate::ast::{Ast, Command, Directive, Node};
use crate::parser::parse_words;

impl Ast {
    /// Render the tree back to Dockerfile text.
    pub fn print(&self) -> Result<String> {
        print(&self.directives, &self.nodes, self.escape_token)
    }
}

/// Render directives and instructions.
pub fn print(directives: &[Directive], nodes: &[Node], escape: char) -> Result<String> {
    let mut out = String::new();
    let mut current_line = 1;

    for directive in directives {
        writeln!(out, "# {} = {}", directive.name, directive.value)?;
        current_line += 1;
    }

    for node in nodes {
        while current_line < node.start_line {
            out.push('\n');
            current_line += 1;
        }

        let text = format_node(node, escape);
        writeln!(out, "{}", text)?;

        // Spacing after a multi-line instruction is measured from where it
        // originally ended
        let printed = text.matches('\n').count() + 1;
        current_line = (current_line + printed).max(node.end_line + 1);
    }

    Ok(out)
}

/// Render one instruction, heredoc bodies included.
pub fn format_node(node: &Node, escape: char) -> String {
    let line = match node.command() {
        Command::Label | Command::Env => fmt_key_value(node, escape),
        Command::Healthcheck if node.attributes.json => fmt_healthcheck(node),
        Command::Onbuild => fmt_onbuild(node, escape),
        c if c.is_exec_capable() && node.attributes.json => fmt_json(node),
        _ => fmt_default(node),
    };
    append_heredocs(node, line)
}

/// Keyword followed by the instruction's flags.
fn prefix(node: &Node) -> Vec<String> {
    let mut cmd = Vec::with_capacity(1 + node.flags.len());
    cmd.push(node.keyword.to_uppercase());
    cmd.extend(node.flags.iter().cloned());
    cmd
}

/// Argument values, each followed by its own flags.
fn cmd_args(node: &Node) -> Vec<String> {
    let mut args = Vec::with_capacity(node.args.len());
    for arg in &node.args {
        args.push(arg.value.clone());
        args.extend(arg.flags.iter().cloned());
    }
    args
}

fn fmt_default(node: &Node) -> String {
    let mut cmd = prefix(node);
    let args = cmd_args(node);
    // Keep a leading `--value` from being read back as a flag
    if args.first().is_some_and(|a| a.starts_with("--")) {
        cmd.push("--".to_string());
    }
    cmd.extend(args);
    cmd.join(" ")
}

fn quote_all(args: &[String]) -> String {
    args.iter()
        .map(|a| serde_json::Value::String(a.clone()).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn fmt_json(node: &Node) -> String {
    format!("{} [{}]", prefix(node).join(" "), quote_all(&cmd_args(node)))
}

/// `HEALTHCHECK [flags] CMD ["a", "b"]`
fn fmt_healthcheck(node: &Node) -> String {
    let args = cmd_args(node);
    match args.split_first() {
        Some((typ, rest)) => format!("{} {} [{}]", prefix(node).join(" "), typ, quote_all(rest)),
        None => fmt_default(node),
    }
}

/// Consecutive arguments paired as `key=value`; an odd trailing argument
/// stands alone.
fn fmt_key_value(node: &Node, escape: char) -> String {
    let args = cmd_args(node);

    // Legacy single pair whose value has unquoted whitespace
    if let [key, value] = args.as_slice() {
        if parse_words(value, escape).len() > 1 {
            let mut cmd = prefix(node);
            cmd.push(key.clone());
            cmd.push(value.clone());
            return cmd.join(" ");
        }
    }

    let mut assignments = prefix(node);
    for pair in args.chunks(2) {
        match pair {
            [key, value] => assignments.push(format!("{}={}", key, value)),
            [key] => assignments.push(key.clone()),
            _ => {}
        }
    }
    assignments.join(" ")
}

fn fmt_onbuild(node: &Node, escape: char) -> String {
    let mut cmd = prefix(node);
    cmd.extend(node.children.iter().map(|child| format_node(child, escape)));
    cmd.extend(cmd_args(node));
    cmd.join(" ")
}

fn append_heredocs(node: &Node, line: String) -> String {
    let mut out = line;
    for heredoc in &node.heredocs {
        out.push('\n');
        out.push_str(&heredoc.content);
        out.push_str(&heredoc.name);
    }
    out
}
