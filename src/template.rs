//! Token evaluation for program templates
//!
//! Supervisor configuration strings embed placeholders of the form
//! `%(name)s` and `%(name)d`. An optional printf-style width may sit between
//! the closing parenthesis and the conversion character, so `%(process_num)02d`
//! renders instance 7 as `07`. `%%` produces a literal percent sign.
//!
//! A [`TokenEvaluator`] holds a fixed binding set and is rebuilt for every
//! program instance, since `process_num` differs between siblings.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

/// Token names bound for every program instance.
pub const PROGRAM_NAME: &str = "program_name";
pub const PROCESS_NUM: &str = "process_num";
pub const GROUP_NAME: &str = "group_name";
pub const HERE: &str = "here";
pub const NUMPROCS: &str = "numprocs";
pub const HOST_NODE_NAME: &str = "host_node_name";

/// Prefix under which caller-supplied environment variables are bound.
pub const ENV_PREFIX: &str = "ENV_";

static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%%|%\((?P<name>[^)]*)\)(?P<flags>[-0-9]*)(?P<conv>[A-Za-z]?)")
        .expect("Invalid regex pattern")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unbound token '{name}' in '{template}'")]
    UnboundToken { name: String, template: String },

    #[error("token '{name}' has value '{value}' which cannot be formatted as an integer")]
    NotAnInteger { name: String, value: String },

    #[error("unsupported conversion '{conversion}' for token '{name}'")]
    UnsupportedConversion { name: String, conversion: char },

    #[error("malformed placeholder in '{template}'")]
    Malformed { template: String },
}

/// A parsed piece of a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Token {
        name: String,
        /// Width flags between `)` and the conversion, e.g. `02` or `-8`.
        flags: String,
        conversion: char,
    },
}

/// Split a template into literal text and token placeholders.
pub fn parse_template(template: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut last_end = 0;

    for cap in TOKEN_REGEX.captures_iter(template) {
        let whole = cap.get(0).expect("capture group 0 always present");
        push_literal(&mut literal, &template[last_end..whole.start()], template)?;
        last_end = whole.end();

        if whole.as_str() == "%%" {
            literal.push('%');
            continue;
        }

        let name = cap.name("name").map_or("", |m| m.as_str());
        let conversion = cap
            .name("conv")
            .and_then(|m| m.as_str().chars().next())
            .ok_or_else(|| TemplateError::Malformed {
                template: template.to_string(),
            })?;
        if name.is_empty() {
            return Err(TemplateError::Malformed {
                template: template.to_string(),
            });
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Token {
            name: name.to_string(),
            flags: cap.name("flags").map_or("", |m| m.as_str()).to_string(),
            conversion,
        });
    }

    push_literal(&mut literal, &template[last_end..], template)?;
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}

// Literal text may not contain the start of a placeholder that the regex
// failed to match, e.g. an unterminated `%(name`.
fn push_literal(buf: &mut String, text: &str, template: &str) -> Result<(), TemplateError> {
    if text.contains("%(") {
        return Err(TemplateError::Malformed {
            template: template.to_string(),
        });
    }
    buf.push_str(text);
    Ok(())
}

/// Whether `template` contains a placeholder for `name`.
pub fn references_token(template: &str, name: &str) -> bool {
    TOKEN_REGEX
        .captures_iter(template)
        .any(|cap| cap.name("name").is_some_and(|m| m.as_str() == name))
}

/// Substitutes bound token values into template strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenEvaluator {
    bindings: BTreeMap<String, String>,
}

impl TokenEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, replacing any previous binding.
    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.bind(name, value);
        self
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.bindings.insert(name.into(), value.into());
    }

    /// Bind every variable as `ENV_<NAME>`.
    pub fn with_environment<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in vars {
            self.bind(format!("{ENV_PREFIX}{key}"), value.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings.get(name).map(String::as_str)
    }

    /// Evaluate `template` against the bound tokens.
    ///
    /// # Errors
    ///
    /// Fails on an unbound token, on `d` applied to a non-integer value, on
    /// conversions other than `s`/`d`, and on malformed placeholders.
    pub fn eval(&self, template: &str) -> Result<String, TemplateError> {
        let mut result = String::with_capacity(template.len());

        for segment in parse_template(template)? {
            match segment {
                Segment::Literal(text) => result.push_str(&text),
                Segment::Token {
                    name,
                    flags,
                    conversion,
                } => {
                    let value =
                        self.bindings
                            .get(&name)
                            .ok_or_else(|| TemplateError::UnboundToken {
                                name: name.clone(),
                                template: template.to_string(),
                            })?;
                    result.push_str(&format_value(&name, value, &flags, conversion)?);
                }
            }
        }

        Ok(result)
    }
}

fn format_value(
    name: &str,
    value: &str,
    flags: &str,
    conversion: char,
) -> Result<String, TemplateError> {
    let left_align = flags.starts_with('-');
    let digits = flags.trim_start_matches('-');
    let zero_pad = !left_align && digits.starts_with('0');
    let width = digits.parse::<usize>().unwrap_or(0);

    match conversion {
        's' => Ok(pad(value.to_string(), width, left_align, false)),
        'd' => {
            let number =
                value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| TemplateError::NotAnInteger {
                        name: name.to_string(),
                        value: value.to_string(),
                    })?;
            Ok(pad(number.to_string(), width, left_align, zero_pad))
        }
        other => Err(TemplateError::UnsupportedConversion {
            name: name.to_string(),
            conversion: other,
        }),
    }
}

fn pad(text: String, width: usize, left_align: bool, zero_pad: bool) -> String {
    let len = text.chars().count();
    if len >= width {
        return text;
    }
    let fill = width - len;
    if left_align {
        format!("{text}{}", " ".repeat(fill))
    } else if zero_pad {
        match text.strip_prefix('-') {
            Some(digits) => format!("-{}{digits}", "0".repeat(fill)),
            None => format!("{}{text}", "0".repeat(fill)),
        }
    } else {
        format!("{}{text}", " ".repeat(fill))
    }
}
