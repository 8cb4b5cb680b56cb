//! Variable templating for task commands
//!
//! `$(name)` expands to the value of `name`; `$$` produces a literal `$`.
//! A `$` followed by anything else is kept verbatim.

use std::collections::{BTreeMap, HashMap};

use crate::error::TemplateError;

/// Source of template values
pub trait VarSource {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl VarSource for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl VarSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl<T: VarSource + ?Sized> VarSource for &T {
    fn lookup(&self, name: &str) -> Option<&str> {
        (**self).lookup(name)
    }
}

/// Looks names up in `.0` first, then in `.1`
impl<A: VarSource, B: VarSource> VarSource for (A, B) {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.0.lookup(name).or_else(|| self.1.lookup(name))
    }
}

enum Piece<'a> {
    Literal(&'a str),
    Var(&'a str),
}

fn parse(template: &str) -> Result<Vec<Piece<'_>>, TemplateError> {
    let mut pieces = Vec::new();
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        if pos > 0 {
            pieces.push(Piece::Literal(&rest[..pos]));
        }
        let after = &rest[pos + 1..];
        if let Some(stripped) = after.strip_prefix('$') {
            pieces.push(Piece::Literal("$"));
            rest = stripped;
        } else if let Some(body) = after.strip_prefix('(') {
            let end = body
                .find(')')
                .ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
            pieces.push(Piece::Var(body[..end].trim()));
            rest = &body[end + 1..];
        } else {
            pieces.push(Piece::Literal("$"));
            rest = after;
        }
    }
    if !rest.is_empty() {
        pieces.push(Piece::Literal(rest));
    }

    Ok(pieces)
}

/// Expands every `$(name)` reference in `template`
pub fn render(template: &str, vars: &impl VarSource) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for piece in parse(template)? {
        match piece {
            Piece::Literal(s) => out.push_str(s),
            Piece::Var(name) => {
                let value = vars
                    .lookup(name)
                    .ok_or_else(|| TemplateError::UnknownVariable(name.to_string()))?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

/// Names referenced by `template`, in order of appearance
pub fn references(template: &str) -> Result<Vec<String>, TemplateError> {
    Ok(parse(template)?
        .into_iter()
        .filter_map(|p| match p {
            Piece::Var(name) => Some(name.to_string()),
            Piece::Literal(_) => None,
        })
        .collect())
}
