//! Dockerfile grammar parser.
//!
//! Turns text into an [`Ast`]. Handles comments, blank lines, line
//! continuations via the escape token, leading `--flags`, JSON (exec) and
//! shell argument forms, name/value instructions, `ONBUILD` triggers and
//! heredoc bodies. Every node records the physical lines it spans so the
//! printer can restore blank-line spacing.

use a3s_dockerfile_core::error::{DockerfileError, Result};

use crate::ast::{Argument, Ast, Command, Heredoc, Node};
use crate::directive::{escape_token, parse_directives};

impl Ast {
    /// Parse a Dockerfile from its text content.
    pub fn parse(content: &str) -> Result<Self> {
        let directives = parse_directives(content)?;
        let escape = escape_token(&directives);
        let nodes = parse_instructions(content, escape)?;

        Ok(Ast {
            directives,
            nodes,
            escape_token: escape,
        })
    }

    /// Parse a Dockerfile from a file path.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DockerfileError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read Dockerfile at {}: {}", path.display(), e),
            ))
        })?;
        Self::parse(&content)
    }
}

fn parse_instructions(content: &str, escape: char) -> Result<Vec<Node>> {
    let lines: Vec<&str> = content
        .lines()
        .enumerate()
        .map(|(i, l)| if i == 0 { l.trim_start_matches('\u{feff}') } else { l })
        .collect();
    let mut nodes = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }

        let start_line = i + 1;
        let (first, mut continued) = trim_continuation(lines[i].trim_start(), escape);
        let mut logical = first.to_string();

        while continued && i + 1 < lines.len() {
            i += 1;
            let next = lines[i];
            let next_trimmed = next.trim();
            // Comments and empty lines inside a continuation are dropped
            if next_trimmed.is_empty() || next_trimmed.starts_with('#') {
                continue;
            }
            let (part, more) = trim_continuation(next, escape);
            logical.push_str(part);
            continued = more;
        }

        let mut node = parse_line(logical.trim(), start_line, escape)?;
        node.original = logical.trim().to_string();

        let target = if node.children.is_empty() {
            &mut node
        } else {
            &mut node.children[0]
        };
        if target.command().allows_heredoc() {
            let markers = heredoc_markers(&logical, escape);
            for (name, expand, chomp) in markers {
                let mut content = String::new();
                loop {
                    i += 1;
                    let Some(&body) = lines.get(i) else {
                        return Err(DockerfileError::Parse {
                            line: start_line,
                            message: format!("unterminated heredoc '{}'", name),
                        });
                    };
                    let candidate = if chomp { body.trim_start_matches('\t') } else { body };
                    if candidate == name {
                        break;
                    }
                    content.push_str(body);
                    content.push('\n');
                }
                target.heredocs.push(Heredoc {
                    name,
                    content,
                    expand,
                    chomp,
                });
            }
        }

        let end_line = i + 1;
        node.end_line = end_line;
        for child in &mut node.children {
            child.end_line = end_line;
        }
        nodes.push(node);
        i += 1;
    }

    Ok(nodes)
}

/// Strip a trailing escape token. Returns the remaining text and whether
/// the line continues.
fn trim_continuation(line: &str, escape: char) -> (&str, bool) {
    let trimmed = line.trim_end();
    match trimmed.strip_suffix(escape) {
        Some(rest) => (rest, true),
        None => (line, false),
    }
}

/// Parse one logical line (continuations already joined).
fn parse_line(line: &str, line_num: usize, escape: char) -> Result<Node> {
    let (keyword, rest) = split_first_word(line);
    let mut node = Node::new(keyword, line_num);
    let (flags, rest) = extract_flags(rest);
    node.flags = flags;

    let command = node.command();
    if rest.is_empty() && !matches!(command, Command::Other(_)) {
        return Err(DockerfileError::Parse {
            line: line_num,
            message: format!("{} requires at least one argument", node.keyword),
        });
    }

    match command {
        Command::Cmd | Command::Entrypoint | Command::Run | Command::Shell => {
            let (args, json) = parse_maybe_json(rest);
            node.args = args;
            node.attributes.json = json;
        }
        Command::Add | Command::Copy | Command::Volume => {
            let (args, json) = parse_maybe_json_to_list(rest, escape);
            node.args = args;
            node.attributes.json = json;
        }
        Command::Env | Command::Label => {
            node.args = parse_name_val(rest, &node.keyword, escape, line_num)?;
        }
        Command::User | Command::Workdir | Command::Maintainer | Command::Stopsignal => {
            node.args = vec![Argument::new(rest)];
        }
        Command::Healthcheck => {
            let (args, json) = parse_health_config(rest, line_num)?;
            node.args = args;
            node.attributes.json = json;
        }
        Command::Onbuild => {
            let child = parse_line(rest, line_num, escape)?;
            match child.command() {
                Command::Onbuild => {
                    return Err(DockerfileError::Parse {
                        line: line_num,
                        message: "chaining ONBUILD via `ONBUILD ONBUILD` isn't allowed".to_string(),
                    })
                }
                Command::From | Command::Maintainer => {
                    return Err(DockerfileError::Parse {
                        line: line_num,
                        message: format!("{} isn't allowed as an ONBUILD trigger", child.keyword),
                    })
                }
                _ => {}
            }
            node.children.push(child);
        }
        Command::From | Command::Expose | Command::Arg => {
            node.args = words_to_args(parse_words(rest, escape));
        }
        Command::Other(ref name) => {
            tracing::warn!(
                line = line_num,
                instruction = name.as_str(),
                "Unknown Dockerfile instruction, keeping it verbatim"
            );
            node.args = words_to_args(parse_words(rest, escape));
        }
    }

    Ok(node)
}

/// Split a string into the first word and the rest.
fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

/// Collect leading `--flag` words. A bare `--` ends the flags.
fn extract_flags(rest: &str) -> (Vec<String>, &str) {
    let mut flags = Vec::new();
    let mut rest = rest.trim_start();

    while rest.starts_with("--") {
        let (word, after) = split_first_word(rest);
        rest = after;
        if word == "--" {
            break;
        }
        flags.push(word.to_string());
    }

    (flags, rest)
}

fn words_to_args(words: Vec<String>) -> Vec<Argument> {
    words.into_iter().map(Argument::new).collect()
}

/// JSON string array, if `rest` is one.
fn parse_json_array(rest: &str) -> Option<Vec<String>> {
    let rest = rest.trim();
    if !(rest.starts_with('[') && rest.ends_with(']')) {
        return None;
    }
    serde_json::from_str::<Vec<String>>(rest).ok()
}

/// JSON form, or the whole rest as one argument.
fn parse_maybe_json(rest: &str) -> (Vec<Argument>, bool) {
    match parse_json_array(rest) {
        Some(parts) => (words_to_args(parts), true),
        None => (vec![Argument::new(rest.trim())], false),
    }
}

/// JSON form, or whitespace-separated words.
fn parse_maybe_json_to_list(rest: &str, escape: char) -> (Vec<Argument>, bool) {
    match parse_json_array(rest) {
        Some(parts) => (words_to_args(parts), true),
        None => (words_to_args(parse_words(rest, escape)), false),
    }
}

/// Split on whitespace outside quotes. Quotes and escapes are kept in the
/// words verbatim; expansion happens later.
pub(crate) fn parse_words(rest: &str, escape: char) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut chars = rest.chars();

    while let Some(ch) = chars.next() {
        if ch == escape {
            word.push(ch);
            if let Some(next) = chars.next() {
                word.push(next);
            }
            continue;
        }
        match quote {
            Some(q) if ch == q => {
                quote = None;
                word.push(ch);
            }
            Some(_) => word.push(ch),
            None if ch == '"' || ch == '\'' => {
                quote = Some(ch);
                word.push(ch);
            }
            None if ch.is_whitespace() => {
                if !word.is_empty() {
                    words.push(std::mem::take(&mut word));
                }
            }
            None => word.push(ch),
        }
    }
    if !word.is_empty() {
        words.push(word);
    }

    words
}

/// `ENV`/`LABEL` body: alternating name and value arguments.
fn parse_name_val(rest: &str, keyword: &str, escape: char, line_num: usize) -> Result<Vec<Argument>> {
    let words = parse_words(rest, escape);
    let Some(first) = words.first() else {
        return Err(DockerfileError::Parse {
            line: line_num,
            message: format!("{} requires at least one argument", keyword),
        });
    };

    // Legacy form: KEY value with spaces
    if !first.contains('=') {
        let (key, value) = split_first_word(rest);
        if value.is_empty() {
            return Err(DockerfileError::Parse {
                line: line_num,
                message: format!("{} must have two arguments", keyword),
            });
        }
        return Ok(vec![Argument::new(key), Argument::new(value.trim_end())]);
    }

    let mut args = Vec::with_capacity(words.len() * 2);
    for word in &words {
        let Some((key, value)) = word.split_once('=') else {
            return Err(DockerfileError::Parse {
                line: line_num,
                message: format!(
                    "Syntax error - can't find = in \"{}\". Must be of the form: name=value",
                    word
                ),
            });
        };
        if key.is_empty() {
            return Err(DockerfileError::Parse {
                line: line_num,
                message: format!("{} names can not be blank", keyword),
            });
        }
        args.push(Argument::new(key));
        args.push(Argument::new(value));
    }

    Ok(args)
}

/// `HEALTHCHECK NONE` or `HEALTHCHECK [flags] CMD <command>`.
fn parse_health_config(rest: &str, line_num: usize) -> Result<(Vec<Argument>, bool)> {
    let (typ, cmd) = split_first_word(rest);
    let typ = typ.to_uppercase();

    match typ.as_str() {
        "NONE" if cmd.is_empty() => Ok((vec![Argument::new(typ)], false)),
        "NONE" => Err(DockerfileError::Parse {
            line: line_num,
            message: "HEALTHCHECK NONE takes no arguments".to_string(),
        }),
        "CMD" if cmd.is_empty() => Err(DockerfileError::Parse {
            line: line_num,
            message: "Missing command after HEALTHCHECK CMD".to_string(),
        }),
        "CMD" => {
            let (mut args, json) = parse_maybe_json(cmd);
            args.insert(0, Argument::new(typ));
            Ok((args, json))
        }
        other => Err(DockerfileError::Parse {
            line: line_num,
            message: format!("Unknown type '{}' in HEALTHCHECK (try CMD)", other),
        }),
    }
}

/// Heredoc markers on a logical line, in order: (name, expand, chomp).
fn heredoc_markers(line: &str, escape: char) -> Vec<(String, bool, bool)> {
    parse_words(line, escape)
        .iter()
        .filter_map(|w| parse_heredoc_marker(w))
        .collect()
}

/// Recognise `[fd]<<[-]NAME`, with NAME optionally wrapped in matching quotes.
fn parse_heredoc_marker(word: &str) -> Option<(String, bool, bool)> {
    let word = word.trim_start_matches(|c: char| c.is_ascii_digit());
    let rest = word.strip_prefix("<<")?;
    let (chomp, rest) = match rest.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, rest),
    };

    let (name, expand) = match rest.chars().next() {
        Some(q @ ('"' | '\'')) => {
            let inner = rest[1..].strip_suffix(q)?;
            (inner, false)
        }
        _ => (rest, true),
    };

    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    Some((name.to_string(), expand, chomp))
}
