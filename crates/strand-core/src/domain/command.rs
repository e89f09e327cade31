//! Command-line construction for external tools.
//!
//! A task's structured parameters are the source of truth. The command string
//! is rendered from them one way. `parse_flag_value` only exists for reading
//! command strings that predate structured parameters.

use std::fmt;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("value for {flag} contains whitespace: {value:?}")]
    Whitespace { flag: String, value: String },

    #[error("value for {flag} is empty")]
    EmptyValue { flag: String },

    #[error("value for {flag} looks like a flag: {value:?}")]
    FlagLikeValue { flag: String, value: String },

    #[error("program name is empty")]
    EmptyProgram,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlagLookupError {
    #[error("flag {0} not found in command line")]
    NotFound(String),

    #[error("flag {flag} is malformed: {reason}")]
    Malformed { flag: String, reason: String },
}

/// A rendered tool invocation: program followed by ordered tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Value recorded for `flag` at build time. No string parsing involved.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.tokens
            .windows(2)
            .find(|pair| pair[0] == flag)
            .map(|pair| pair[1].as_str())
    }

    pub fn render(&self) -> String {
        self.tokens.join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Accumulates flag/value tokens. The first invalid token is remembered and
/// reported by `build`, so calls can be chained without intermediate `?`.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    tokens: Vec<String>,
    error: Option<CommandError>,
}

impl CommandBuilder {
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let error = if program.trim().is_empty() {
            Some(CommandError::EmptyProgram)
        } else if program.chars().any(char::is_whitespace) {
            Some(CommandError::Whitespace {
                flag: "<program>".to_string(),
                value: program.clone(),
            })
        } else {
            None
        };
        Self {
            tokens: vec![program],
            error,
        }
    }

    /// Bare flag without a value (e.g. `-m`).
    pub fn flag(mut self, flag: &str) -> Self {
        self.push_token(flag, flag);
        self
    }

    pub fn arg(mut self, flag: &str, value: impl fmt::Display) -> Self {
        self.push_token(flag, flag);
        let value = value.to_string();
        self.push_value(flag, &value);
        self
    }

    pub fn path(self, flag: &str, value: &Path) -> Self {
        self.arg(flag, value.display())
    }

    pub fn opt_arg<V: fmt::Display>(self, flag: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.arg(flag, value),
            None => self,
        }
    }

    pub fn opt_path(self, flag: &str, value: Option<&Path>) -> Self {
        match value {
            Some(value) => self.path(flag, value),
            None => self,
        }
    }

    /// Positional operand (e.g. a source file for a copy).
    pub fn operand(mut self, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        self.push_value("<operand>", &value);
        self
    }

    pub fn build(self) -> Result<CommandLine, CommandError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(CommandLine {
                tokens: self.tokens,
            }),
        }
    }

    /// Values must not read back as flags.
    fn push_value(&mut self, flag: &str, value: &str) {
        if self.error.is_none() && value.starts_with("--") {
            self.error = Some(CommandError::FlagLikeValue {
                flag: flag.to_string(),
                value: value.to_string(),
            });
            return;
        }
        self.push_token(flag, value);
    }

    fn push_token(&mut self, flag: &str, value: &str) {
        if self.error.is_some() {
            return;
        }
        if value.is_empty() {
            self.error = Some(CommandError::EmptyValue {
                flag: flag.to_string(),
            });
        } else if value.chars().any(char::is_whitespace) {
            self.error = Some(CommandError::Whitespace {
                flag: flag.to_string(),
                value: value.to_string(),
            });
        } else {
            self.tokens.push(value.to_string());
        }
    }
}

/// Finds the token following the first token matching `flag`.
///
/// With `exact == false` a token matches when it contains `flag`; with
/// `exact == true` it must equal `flag`.
pub fn parse_flag_value(
    flag: &str,
    command_line: &str,
    exact: bool,
) -> Result<String, FlagLookupError> {
    let tokens: Vec<&str> = command_line.split_whitespace().collect();
    let position = tokens
        .iter()
        .position(|token| if exact { *token == flag } else { token.contains(flag) })
        .ok_or_else(|| FlagLookupError::NotFound(flag.to_string()))?;

    match tokens.get(position + 1) {
        Some(value) if value.starts_with("--") => Err(FlagLookupError::Malformed {
            flag: flag.to_string(),
            reason: format!("followed by another flag {value}"),
        }),
        Some(value) => Ok((*value).to_string()),
        None => Err(FlagLookupError::Malformed {
            flag: flag.to_string(),
            reason: "no value follows it".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample() -> CommandLine {
        CommandBuilder::new("dragen")
            .arg("--bcl-conversion-only", true)
            .path("--output-directory", &PathBuf::from("/seq/out/run1"))
            .arg("--lane", 3)
            .build()
            .unwrap()
    }

    #[test]
    fn renders_tokens_in_call_order() {
        assert_eq!(
            sample().render(),
            "dragen --bcl-conversion-only true --output-directory /seq/out/run1 --lane 3"
        );
    }

    #[test]
    fn built_values_parse_back() {
        let rendered = sample().render();
        assert_eq!(
            parse_flag_value("--output-directory", &rendered, true).unwrap(),
            "/seq/out/run1"
        );
        assert_eq!(parse_flag_value("--lane", &rendered, true).unwrap(), "3");
        assert_eq!(sample().value_of("--lane"), Some("3"));

        let negative = CommandBuilder::new("tool").arg("--offset", -5).build().unwrap();
        assert_eq!(parse_flag_value("--offset", &negative.render(), true).unwrap(), "-5");
        assert_eq!(
            CommandBuilder::new("tool").arg("--offset", "--5").build(),
            Err(CommandError::FlagLikeValue {
                flag: "--offset".to_string(),
                value: "--5".to_string(),
            })
        );
    }

    #[test]
    fn substring_match_is_the_default() {
        let rendered = sample().render();
        // "--output" is contained in "--output-directory"
        assert_eq!(
            parse_flag_value("--output", &rendered, false).unwrap(),
            "/seq/out/run1"
        );
        assert_eq!(
            parse_flag_value("--output", &rendered, true),
            Err(FlagLookupError::NotFound("--output".to_string()))
        );
    }

    #[test]
    fn trailing_or_flag_followed_flag_is_malformed() {
        assert!(matches!(
            parse_flag_value("--force", "dragen --force", true),
            Err(FlagLookupError::Malformed { .. })
        ));
        assert!(matches!(
            parse_flag_value("--force", "dragen --force --lane 1", true),
            Err(FlagLookupError::Malformed { .. })
        ));
    }

    #[test]
    fn whitespace_values_are_rejected() {
        let err = CommandBuilder::new("dragen")
            .path("--output-directory", &PathBuf::from("/seq/my run"))
            .arg("--lane", 1)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            CommandError::Whitespace {
                flag: "--output-directory".to_string(),
                value: "/seq/my run".to_string(),
            }
        );
    }

    #[test]
    fn empty_values_are_rejected() {
        let err = CommandBuilder::new("dragen").arg("--vc-sample-name", "").build();
        assert!(matches!(err, Err(CommandError::EmptyValue { .. })));
    }
}
