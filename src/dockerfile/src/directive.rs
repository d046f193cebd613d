//! Parser directives.
//!
//! Directives are comments of the form `# name=value` at the very top of a
//! Dockerfile. Scanning stops at the first line that is not a recognised
//! directive, so a blank line or an ordinary comment ends the block.

use a3s_dockerfile_core::error::{DockerfileError, Result};

use crate::ast::Directive;

/// Default escape token.
pub const DEFAULT_ESCAPE_TOKEN: char = '\\';

const KNOWN_DIRECTIVES: &[&str] = &["syntax", "escape", "check"];

/// Read the leading directive block.
pub fn parse_directives(content: &str) -> Result<Vec<Directive>> {
    let mut directives: Vec<Directive> = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_num = idx + 1;
        let line = if line_num == 1 {
            line.trim_start_matches('\u{feff}')
        } else {
            line
        };

        let Some((name, value)) = split_directive(line) else {
            break;
        };
        if !KNOWN_DIRECTIVES.contains(&name.as_str()) {
            break;
        }
        if directives.iter().any(|d| d.name == name) {
            return Err(DockerfileError::Directive {
                line: line_num,
                message: format!("only one {} parser directive can be used", name),
            });
        }
        if name == "escape" {
            validate_escape(&value, line_num)?;
        }

        directives.push(Directive {
            name,
            value,
            line: line_num,
        });
    }

    Ok(directives)
}

/// Escape token selected by the directives, or the default.
pub fn escape_token(directives: &[Directive]) -> char {
    directives
        .iter()
        .find(|d| d.name == "escape")
        .and_then(|d| d.value.chars().next())
        .unwrap_or(DEFAULT_ESCAPE_TOKEN)
}

fn validate_escape(value: &str, line_num: usize) -> Result<()> {
    if value == "\\" || value == "`" {
        Ok(())
    } else {
        Err(DockerfileError::Directive {
            line: line_num,
            message: format!("invalid escape token '{}' does not match ` or \\", value),
        })
    }
}

/// Split `#  name = value  ` into a lowercased name and trimmed value.
fn split_directive(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix('#')?;
    let rest = rest.trim_start_matches([' ', '\t']);

    let name_len = rest
        .char_indices()
        .take_while(|(i, c)| {
            if *i == 0 {
                c.is_ascii_alphabetic()
            } else {
                c.is_ascii_alphanumeric()
            }
        })
        .count();
    if name_len == 0 {
        return None;
    }
    let (name, rest) = rest.split_at(name_len);

    let rest = rest.trim_start_matches([' ', '\t']);
    let rest = rest.strip_prefix('=')?;
    let value = rest.trim_matches([' ', '\t']);
    if value.is_empty() {
        return None;
    }

    Some((name.to_lowercase(), value.to_string()))
}
