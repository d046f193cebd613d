//! Shell-style word expansion.
//!
//! Only variable substitution and quote removal: `$NAME`, `${NAME}` and the
//! `${NAME:-word}`, `${NAME:+word}`, `${NAME:?message}` modifiers (also
//! without the colon). No command substitution, globbing or field splitting.

use std::collections::HashMap;

use a3s_dockerfile_core::error::{DockerfileError, Result};

/// Word expander bound to an escape token.
#[derive(Debug, Clone, Copy)]
pub struct ShellLex {
    escape: char,
}

impl ShellLex {
    pub fn new(escape: char) -> Self {
        Self { escape }
    }

    /// Expand one word against `vars`. Unset variables expand to "".
    pub fn process_word_with_map(&self, word: &str, vars: &HashMap<String, String>) -> Result<String> {
        let mut processor = WordProcessor {
            chars: word.chars().collect(),
            pos: 0,
            escape: self.escape,
            vars,
        };
        processor.process_until(None)
    }
}

struct WordProcessor<'a> {
    chars: Vec<char>,
    pos: usize,
    escape: char,
    vars: &'a HashMap<String, String>,
}

impl WordProcessor<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    /// Process until end of input or an unconsumed `stop` character.
    fn process_until(&mut self, stop: Option<char>) -> Result<String> {
        let mut out = String::new();

        while let Some(ch) = self.peek() {
            if Some(ch) == stop {
                break;
            }
            match ch {
                '\'' => out.push_str(&self.process_single_quote()?),
                '"' => out.push_str(&self.process_double_quote()?),
                '$' => out.push_str(&self.process_dollar()?),
                c if c == self.escape => {
                    self.next();
                    if let Some(escaped) = self.next() {
                        out.push(escaped);
                    }
                }
                c => {
                    self.next();
                    out.push(c);
                }
            }
        }

        Ok(out)
    }

    fn process_single_quote(&mut self) -> Result<String> {
        self.next();
        let mut out = String::new();
        loop {
            match self.next() {
                Some('\'') => return Ok(out),
                Some(c) => out.push(c),
                None => {
                    return Err(DockerfileError::Substitution(
                        "unexpected end of statement while looking for matching single-quote"
                            .to_string(),
                    ))
                }
            }
        }
    }

    fn process_double_quote(&mut self) -> Result<String> {
        self.next();
        let mut out = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(DockerfileError::Substitution(
                        "unexpected end of statement while looking for matching double-quote"
                            .to_string(),
                    ))
                }
                Some('"') => {
                    self.next();
                    return Ok(out);
                }
                Some('$') => out.push_str(&self.process_dollar()?),
                Some(c) if c == self.escape => {
                    self.next();
                    // Only quote, dollar and the escape itself can be escaped here
                    match self.peek() {
                        Some(n) if n == '"' || n == '$' || n == self.escape => {
                            self.next();
                            out.push(n);
                        }
                        _ => out.push(c),
                    }
                }
                Some(c) => {
                    self.next();
                    out.push(c);
                }
            }
        }
    }

    fn process_dollar(&mut self) -> Result<String> {
        self.next();
        match self.peek() {
            Some('{') => {
                self.next();
                self.process_braced()
            }
            Some(c) if is_name_char(c) => {
                let name = self.process_name();
                Ok(self.lookup(&name).unwrap_or_default().to_string())
            }
            _ => Ok("$".to_string()),
        }
    }

    fn process_braced(&mut self) -> Result<String> {
        let name = self.process_name();
        if name.is_empty() {
            return Err(DockerfileError::Substitution("bad substitution".to_string()));
        }

        let (colon, modifier) = match self.next() {
            Some('}') => return Ok(self.lookup(&name).unwrap_or_default().to_string()),
            Some(':') => match self.next() {
                Some(m @ ('-' | '+' | '?')) => (true, m),
                Some(m) => {
                    return Err(DockerfileError::Substitution(format!(
                        "unsupported modifier (:{}) in substitution",
                        m
                    )))
                }
                None => return Err(missing_brace(&name)),
            },
            Some(m @ ('-' | '+' | '?')) => (false, m),
            Some(m) => {
                return Err(DockerfileError::Substitution(format!(
                    "unsupported modifier ({}) in substitution",
                    m
                )))
            }
            None => return Err(missing_brace(&name)),
        };

        let word = self.process_until(Some('}'))?;
        if self.next() != Some('}') {
            return Err(missing_brace(&name));
        }

        let value = self.lookup(&name);
        let is_set = match value {
            Some(v) => !(colon && v.is_empty()),
            None => false,
        };

        match modifier {
            '-' if is_set => Ok(value.unwrap_or_default().to_string()),
            '-' => Ok(word),
            '+' if is_set => Ok(word),
            '+' => Ok(String::new()),
            _ if is_set => Ok(value.unwrap_or_default().to_string()),
            _ if word.is_empty() => Err(DockerfileError::Substitution(format!(
                "{}: is not allowed to be unset",
                name
            ))),
            _ => Err(DockerfileError::Substitution(format!("{}: {}", name, word))),
        }
    }

    fn process_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if !is_name_char(c) {
                break;
            }
            name.push(c);
            self.next();
        }
        name
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn missing_brace(name: &str) -> DockerfileError {
    DockerfileError::Substitution(format!("missing '}}' in substitution of {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expand(word: &str, pairs: &[(&str, &str)]) -> Result<String> {
        ShellLex::new('\\').process_word_with_map(word, &vars(pairs))
    }

    #[test]
    fn test_plain_word() {
        assert_eq!(expand("alpine:3.18", &[]).unwrap(), "alpine:3.18");
    }

    #[test]
    fn test_simple_and_braced() {
        let v = [("BASE", "alpine"), ("TAG", "3.18")];
        assert_eq!(expand("$BASE:$TAG", &v).unwrap(), "alpine:3.18");
        assert_eq!(expand("${BASE}:${TAG}", &v).unwrap(), "alpine:3.18");
    }

    #[test]
    fn test_unset_is_empty() {
        assert_eq!(expand("img:${TAG}", &[]).unwrap(), "img:");
    }

    #[test]
    fn test_default_modifiers() {
        assert_eq!(expand("${TAG:-latest}", &[]).unwrap(), "latest");
        assert_eq!(expand("${TAG:-latest}", &[("TAG", "")]).unwrap(), "latest");
        assert_eq!(expand("${TAG-latest}", &[("TAG", "")]).unwrap(), "");
        assert_eq!(expand("${TAG:-latest}", &[("TAG", "1")]).unwrap(), "1");
    }

    #[test]
    fn test_alternate_modifiers() {
        assert_eq!(expand("${TAG:+-slim}", &[("TAG", "1")]).unwrap(), "-slim");
        assert_eq!(expand("${TAG:+-slim}", &[]).unwrap(), "");
        assert_eq!(expand("${TAG+x}", &[("TAG", "")]).unwrap(), "x");
    }

    #[test]
    fn test_required_modifier() {
        let err = expand("${TAG:?tag is required}", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Substitution error: TAG: tag is required");
        assert!(expand("${TAG?}", &[]).is_err());
        assert_eq!(expand("${TAG:?x}", &[("TAG", "1")]).unwrap(), "1");
    }

    #[test]
    fn test_nested_default() {
        let v = [("FALLBACK", "debian")];
        assert_eq!(expand("${BASE:-${FALLBACK}}:12", &v).unwrap(), "debian:12");
    }

    #[test]
    fn test_quotes() {
        let v = [("A", "x")];
        assert_eq!(expand("'$A'", &v).unwrap(), "$A");
        assert_eq!(expand("\"$A y\"", &v).unwrap(), "x y");
        assert_eq!(expand("\"a\\\"b\"", &v).unwrap(), "a\"b");
        assert_eq!(expand("\"a\\nb\"", &v).unwrap(), "a\\nb");
    }

    #[test]
    fn test_escape() {
        let v = [("A", "x")];
        assert_eq!(expand("\\$A", &v).unwrap(), "$A");
        assert_eq!(expand("a\\ b", &v).unwrap(), "a b");
    }

    #[test]
    fn test_backtick_escape() {
        let v = vars(&[("A", "x")]);
        let lex = ShellLex::new('`');
        assert_eq!(lex.process_word_with_map("`$A", &v).unwrap(), "$A");
        assert_eq!(lex.process_word_with_map("c:\\$A", &v).unwrap(), "c:\\x");
    }

    #[test]
    fn test_lone_dollar() {
        assert_eq!(expand("cost: $", &[]).unwrap(), "cost: $");
        assert_eq!(expand("$-x", &[]).unwrap(), "$-x");
    }

    #[test]
    fn test_errors() {
        assert!(expand("${}", &[]).is_err());
        assert!(expand("${TAG", &[]).is_err());
        assert!(expand("${TAG:-x", &[]).is_err());
        assert!(expand("${TAG/a/b}", &[]).is_err());
        assert!(expand("'open", &[]).is_err());
        assert!(expand("\"open", &[]).is_err());
    }
}
