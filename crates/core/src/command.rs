//! Command specifications for the processes the entrypoint launches.
//!
//! Commands arrive as single strings from the environment
//! (`SERVER_CMD="gunicorn project.wsgi:application --bind 0.0.0.0:8000"`)
//! and are split here with POSIX-like quoting rules. No shell is involved,
//! so variable expansion and globbing do not happen.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::CoreError;

/// A program, its arguments and the environment it runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
    /// Working directory (inherits the entrypoint's when `None`).
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
        }
    }

    /// Split `line` into program and arguments.
    pub fn parse(line: &str) -> Result<Self, CoreError> {
        Self::from_argv(split_command_line(line)?)
    }

    /// Build from an already-split argument vector.
    pub fn from_argv(argv: Vec<String>) -> Result<Self, CoreError> {
        let mut iter = argv.into_iter();
        let program = iter.next().ok_or(CoreError::EmptyCommand)?;
        if program.is_empty() {
            return Err(CoreError::EmptyCommand);
        }
        Ok(Self {
            program,
            args: iter.collect(),
            env: Vec::new(),
            working_dir: None,
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote_word(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote_word(arg))?;
        }
        Ok(())
    }
}

fn quote_word(word: &str) -> String {
    let needs_quotes = word.is_empty()
        || word
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\'));
    if needs_quotes {
        format!("'{}'", word.replace('\'', r"'\''"))
    } else {
        word.to_string()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Split a command line into words.
///
/// - Unquoted whitespace separates words.
/// - Single quotes preserve everything literally.
/// - Double quotes allow `\"`, `\\` and `\$` escapes.
/// - Outside quotes a backslash escapes the next character.
pub fn split_command_line(line: &str) -> Result<Vec<String>, CoreError> {
    let mut words = Vec::new();
    let mut current = String::new();
    // Tracks `''` / `""` so an explicitly empty argument survives.
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    current.push(c);
                }
            }
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\' | '$')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => return Err(CoreError::UnterminatedQuote(line.to_string())),
                },
                _ => current.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => {
                    // A trailing backslash has nothing to escape and stays literal.
                    current.push(chars.next().unwrap_or('\\'));
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if quote != Quote::None {
        return Err(CoreError::UnterminatedQuote(line.to_string()));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
