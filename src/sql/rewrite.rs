use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use super::params::{ParamValue, Params};
use super::parse::{ParsedTemplate, StatementKind, Token, TokenKind, parse};
use crate::constant::RewriteFlags;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::value::Value;

/// Query text ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    pub sql: String,
    /// Flat bindings in placeholder order.
    pub bindings: Vec<(String, Value)>,
    pub kind: StatementKind,
}

/// Rewrites templates, caching the scan of every distinct template text.
///
/// Rewriting is not idempotent: run it exactly once per execution.
#[derive(Debug, Default)]
pub struct Rewriter {
    opts: Opts,
    templates: RwLock<HashMap<String, Arc<ParsedTemplate>>>,
}

impl Rewriter {
    pub fn new(opts: Opts) -> Self {
        Self {
            opts,
            templates: RwLock::new(HashMap::new()),
        }
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Scan `template`, or return the cached scan.
    pub fn parse(&self, template: &str) -> Arc<ParsedTemplate> {
        if let Some(parsed) = self
            .templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(template)
        {
            trace!(len = template.len(), "template cache hit");
            return Arc::clone(parsed);
        }
        let parsed = Arc::new(parse(template, self.opts.flags));
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(template.to_owned(), Arc::clone(&parsed));
        parsed
    }

    pub fn rewrite(&self, template: &str, params: &Params) -> Result<Rewritten> {
        let parsed = self.parse(template);
        render(&parsed, params, &self.opts)
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Rewrite `template` once with default options and no template cache.
pub fn rewrite(template: &str, params: &Params) -> Result<Rewritten> {
    let opts = Opts::default();
    render(&parse(template, opts.flags), params, &opts)
}

/// Produce the final text and bindings of a scanned template.
pub fn render(parsed: &ParsedTemplate, params: &Params, opts: &Opts) -> Result<Rewritten> {
    match parsed.kind() {
        StatementKind::Text => {}
        kind @ (StatementKind::Procedure | StatementKind::Control) => {
            return bypass(parsed, params, kind);
        }
    }

    let tokens = parsed.tokens();
    let positional = tokens
        .iter()
        .filter(|token| token.kind == TokenKind::Positional)
        .count();
    let named = tokens
        .iter()
        .find(|token| matches!(token.kind, TokenKind::Named | TokenKind::ListExpansion));
    if let Some(token) = named.filter(|_| positional > 0) {
        return Err(Error::AmbiguousParameterStyle(format!(
            "{} positional marker(s) mixed with named placeholder {}",
            positional,
            parsed.source(token)
        )));
    }
    if positional > 0 && positional != params.len() {
        return Err(Error::InvalidInput(format!(
            "{} positional marker(s) but {} parameter(s)",
            positional,
            params.len()
        )));
    }

    let text = parsed.text();
    let mut out = Renderer {
        sql: String::with_capacity(text.len()),
        bindings: Vec::new(),
        bound: Vec::new(),
        opts,
    };
    let mut last = 0;
    let mut next_positional = 0;
    for token in tokens {
        out.sql.push_str(&text[last..token.span.start]);
        last = token.span.end;
        match token.kind {
            TokenKind::Positional => {
                let (name, value) = params
                    .get_index(next_positional)
                    .ok_or_else(|| Error::InvalidInput("missing positional parameter".into()))?;
                next_positional += 1;
                let ParamValue::Scalar(value) = value else {
                    return Err(Error::InvalidInput(format!(
                        "list parameter '{}' cannot bind a positional marker",
                        name
                    )));
                };
                out.sql.push('?');
                out.bindings.push((name.to_owned(), value.clone()));
            }
            TokenKind::Named | TokenKind::ListExpansion => match params.get(&token.name) {
                // Server-side variables and other unknown names stay as written.
                None => out.sql.push_str(parsed.source(token)),
                Some(ParamValue::Scalar(value)) => {
                    out.sql.push_str(parsed.source(token));
                    out.bind_once(&token.name, value);
                }
                Some(ParamValue::List(values)) => out.expand(parsed, token, values),
            },
            TokenKind::Literal => match params.get(&token.name) {
                Some(ParamValue::Scalar(value)) => {
                    out.sql.push_str(&literal(&token.name, value)?);
                }
                Some(ParamValue::List(_)) => {
                    return Err(Error::UnsupportedLiteralType {
                        name: token.name.clone(),
                        kind: "list",
                    });
                }
                None => {
                    return Err(Error::InvalidInput(format!(
                        "no value bound for literal {{={}}}",
                        token.name
                    )));
                }
            },
        }
    }
    out.sql.push_str(&text[last..]);

    for (name, _) in params.iter() {
        if positional == 0 && !tokens.iter().any(|t| t.name.eq_ignore_ascii_case(name)) {
            trace!(name, "parameter not referenced by the template");
        }
    }

    Ok(Rewritten {
        sql: out.sql,
        bindings: out.bindings,
        kind: StatementKind::Text,
    })
}

fn bypass(parsed: &ParsedTemplate, params: &Params, kind: StatementKind) -> Result<Rewritten> {
    let mut bindings = Vec::with_capacity(params.len());
    for (name, value) in params.iter() {
        match value {
            ParamValue::Scalar(value) => bindings.push((name.to_owned(), value.clone())),
            ParamValue::List(_) => {
                return Err(Error::InvalidInput(format!(
                    "list parameter '{}' cannot be passed to {}",
                    name,
                    parsed.text().trim()
                )));
            }
        }
    }
    Ok(Rewritten {
        sql: parsed.text().trim().to_owned(),
        bindings,
        kind,
    })
}

struct Renderer<'a> {
    sql: String,
    bindings: Vec<(String, Value)>,
    /// Names already bound, lowercased.
    bound: Vec<String>,
    opts: &'a Opts,
}

impl Renderer<'_> {
    fn first_use(&mut self, name: &str) -> bool {
        let key = name.to_ascii_lowercase();
        if self.bound.contains(&key) {
            return false;
        }
        self.bound.push(key);
        true
    }

    fn bind_once(&mut self, name: &str, value: &Value) {
        if self.first_use(name) {
            self.bindings.push((name.to_owned(), value.clone()));
        }
    }

    fn padded_len(&self, len: usize) -> usize {
        if self.opts.flags.contains(RewriteFlags::PAD_LISTS)
            && len >= self.opts.list_padding_threshold
        {
            len.div_ceil(10) * 10
        } else {
            len
        }
    }

    fn expand(&mut self, parsed: &ParsedTemplate, token: &Token, values: &[Value]) {
        let wrap = token.kind == TokenKind::ListExpansion;
        let Some(last) = values.last() else {
            let empty = self.opts.empty_list_sql.as_str();
            if wrap {
                self.sql.push_str(empty);
            } else {
                // Already inside the caller's parentheses.
                let inner = empty
                    .strip_prefix('(')
                    .and_then(|s| s.strip_suffix(')'))
                    .unwrap_or(empty);
                self.sql.push_str(inner);
            }
            return;
        };

        let marker = parsed.marker(token);
        let count = self.padded_len(values.len());
        if wrap {
            self.sql.push('(');
        }
        for i in 0..count {
            if i > 0 {
                self.sql.push_str(&self.opts.list_separator);
            }
            self.sql.push(marker);
            self.sql.push_str(&token.name);
            self.sql.push('_');
            self.sql.push_str(&i.to_string());
        }
        if wrap {
            self.sql.push(')');
        }

        if self.first_use(&token.name) {
            for i in 0..count {
                let value = values.get(i).unwrap_or(last);
                self.bindings
                    .push((format!("{}_{}", token.name, i), value.clone()));
            }
        }
    }
}

/// Literal SQL text for `value`, or `UnsupportedLiteralType`.
fn literal(name: &str, value: &Value) -> Result<String> {
    let unsupported = |kind| Error::UnsupportedLiteralType {
        name: name.to_owned(),
        kind,
    };
    Ok(match value {
        Value::Null => "NULL".to_owned(),
        Value::Bool(v) => String::from(if *v { "1" } else { "0" }),
        Value::SignedInt(v) => v.to_string(),
        Value::UnsignedInt(v) => v.to_string(),
        Value::Float(v) if v.is_finite() => v.to_string(),
        Value::Double(v) if v.is_finite() => v.to_string(),
        Value::Float(_) | Value::Double(_) => return Err(unsupported("non-finite float")),
        Value::Decimal(v) => v.to_string(),
        Value::Guid(v) => format!("'{}'", v),
        Value::DateTime(v) => format!("'{}'", v.format("%Y-%m-%d %H:%M:%S%.f")),
        Value::Text(_) | Value::Bytes(_) => return Err(unsupported(value.kind())),
    })
}
