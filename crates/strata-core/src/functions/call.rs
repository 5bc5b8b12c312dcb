//! Recognizing function calls in string values

use crate::{Error, Result};

pub const TAG_TEMPLATE: &str = "!template";
pub const TAG_EXEC: &str = "!exec";
pub const TAG_STORE: &str = "!store";
pub const TAG_TERRAFORM_OUTPUT: &str = "!terraform.output";
pub const TAG_ENV: &str = "!env";
pub const TAG_INCLUDE: &str = "!include";

/// A string value that invokes a function.
///
/// Each variant carries the raw argument text after the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCall {
    Template(String),
    Exec(String),
    Store(String),
    TerraformOutput(String),
    Env(String),
    Include(String),
    /// A `!tag` this engine does not know; the string is kept as is.
    Unrecognized(String),
}

impl FunctionCall {
    /// Classify a string. Plain strings give `None`.
    ///
    /// The tag must be the whole first word, so `!envy` is not `!env`.
    /// A known tag with no argument is a syntax error.
    pub fn parse(raw: &str) -> Result<Option<FunctionCall>> {
        let trimmed = raw.trim_start();
        if !trimmed.starts_with('!') {
            return Ok(None);
        }
        let (tag, arg) = match trimmed.find(char::is_whitespace) {
            Some(idx) => (&trimmed[..idx], trimmed[idx..].trim()),
            None => (trimmed, ""),
        };
        let build: fn(String) -> FunctionCall = match tag {
            TAG_TEMPLATE => FunctionCall::Template,
            TAG_EXEC => FunctionCall::Exec,
            TAG_STORE => FunctionCall::Store,
            TAG_TERRAFORM_OUTPUT => FunctionCall::TerraformOutput,
            TAG_ENV => FunctionCall::Env,
            TAG_INCLUDE => FunctionCall::Include,
            _ => return Ok(Some(FunctionCall::Unrecognized(raw.to_string()))),
        };
        if arg.is_empty() {
            return Err(Error::FunctionCallSyntax {
                raw: raw.to_string(),
                message: format!("'{tag}' requires an argument"),
            });
        }
        Ok(Some(build(arg.to_string())))
    }

    pub fn tag(&self) -> &'static str {
        match self {
            FunctionCall::Template(_) => TAG_TEMPLATE,
            FunctionCall::Exec(_) => TAG_EXEC,
            FunctionCall::Store(_) => TAG_STORE,
            FunctionCall::TerraformOutput(_) => TAG_TERRAFORM_OUTPUT,
            FunctionCall::Env(_) => TAG_ENV,
            FunctionCall::Include(_) => TAG_INCLUDE,
            FunctionCall::Unrecognized(_) => "",
        }
    }
}

/// Split an argument string on whitespace, honoring single and double
/// quotes.
pub fn split_args(raw: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_arg = false;

    for c in raw.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_arg = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if quote.is_some() {
        return Err(Error::FunctionCallSyntax {
            raw: raw.to_string(),
            message: "unterminated quote".to_string(),
        });
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}
