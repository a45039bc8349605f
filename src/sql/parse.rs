use std::ops::Range;

use crate::constant::{CONTROL_VERBS, RewriteFlags, STATEMENT_MARKERS};

/// How a template is sent to the data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// Ordinary SQL text, rewritten.
    Text,
    /// A bare name, executed as a stored procedure.
    Procedure,
    /// A bare transaction-control verb such as `COMMIT`.
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A bare `?`.
    Positional,
    /// `@name` or `:name`.
    Named,
    /// A named placeholder directly after `IN`, expanded with parentheses.
    ListExpansion,
    /// `{=name}`, replaced by the literal text of the value.
    Literal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte span in the template, marker included.
    pub span: Range<usize>,
    /// Referenced member, without the marker. Empty for positional tokens.
    pub name: String,
}

/// A template scanned once and reused for every execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTemplate {
    text: String,
    kind: StatementKind,
    tokens: Vec<Token>,
}

impl ParsedTemplate {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Source text of `token`.
    pub fn source(&self, token: &Token) -> &str {
        self.text.get(token.span.clone()).unwrap_or_default()
    }

    /// The marker character of a named token (`@` or `:`).
    pub fn marker(&self, token: &Token) -> char {
        self.text
            .as_bytes()
            .get(token.span.start)
            .map_or('@', |b| char::from(*b))
    }
}

/// Decide whether `template` is a bare statement name.
///
/// A template with no whitespace, punctuation or placeholder markers is a
/// procedure name, or a control verb when it is one of `CONTROL_VERBS`.
pub fn classify(template: &str) -> StatementKind {
    let trimmed = template.trim();
    let bare = !trimmed.is_empty()
        && !trimmed.chars().any(|c| {
            c.is_whitespace() || STATEMENT_MARKERS.contains(&c) || matches!(c, '@' | ':' | '?' | '{')
        });
    if !bare {
        return StatementKind::Text;
    }
    if CONTROL_VERBS
        .iter()
        .any(|verb| verb.eq_ignore_ascii_case(trimmed))
    {
        StatementKind::Control
    } else {
        StatementKind::Procedure
    }
}

pub fn parse(template: &str, flags: RewriteFlags) -> ParsedTemplate {
    let kind = classify(template);
    let tokens = match kind {
        StatementKind::Text => scan(template, flags),
        StatementKind::Procedure | StatementKind::Control => Vec::new(),
    };
    ParsedTemplate {
        text: template.to_owned(),
        kind,
        tokens,
    }
}

// Non-ASCII bytes count as word characters so identifiers may be Unicode.
fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn word_end(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(|b| is_word(*b)) {
        i += 1;
    }
    i
}

/// Position after the closing quote; doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |pos| start + pos + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |pos| start + 2 + pos + 2)
}

/// Whether the placeholder at `pos` directly follows the keyword `IN`.
fn follows_in(bytes: &[u8], pos: usize) -> bool {
    let mut end = pos;
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if end == pos || end < 2 {
        return false;
    }
    bytes[end - 2..end].eq_ignore_ascii_case(b"in") && (end == 2 || !is_word(bytes[end - 3]))
}

fn is_positional_neighbor(b: Option<&u8>) -> bool {
    b.is_some_and(|b| is_word(*b) || matches!(*b, b'?' | b'|' | b'&'))
}

fn scan(text: &str, flags: RewriteFlags) -> Vec<Token> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let next = bytes.get(i + 1).copied();
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i, quote),
            b'-' if next == Some(b'-') => i = skip_line_comment(bytes, i),
            b'/' if next == Some(b'*') => i = skip_block_comment(bytes, i),
            b'{' if next == Some(b'=') && flags.contains(RewriteFlags::LITERAL_TOKENS) => {
                let end = word_end(bytes, i + 2);
                if end > i + 2 && bytes.get(end) == Some(&b'}') {
                    tokens.push(Token {
                        kind: TokenKind::Literal,
                        span: i..end + 1,
                        name: text[i + 2..end].to_owned(),
                    });
                    i = end + 1;
                } else {
                    i += 1;
                }
            }
            // `@@system_variable`
            b'@' if next == Some(b'@') => i = word_end(bytes, i + 2),
            // `::type` casts
            b':' if next == Some(b':') => i = word_end(bytes, i + 2),
            b'@' | b':' => {
                let standalone = i == 0 || !is_word(bytes[i - 1]);
                if standalone && next.is_some_and(is_ident_start) {
                    let end = word_end(bytes, i + 1);
                    let kind = if follows_in(bytes, i) {
                        TokenKind::ListExpansion
                    } else {
                        TokenKind::Named
                    };
                    tokens.push(Token {
                        kind,
                        span: i..end,
                        name: text[i + 1..end].to_owned(),
                    });
                    i = end;
                } else {
                    i += 1;
                }
            }
            b'?' if flags.contains(RewriteFlags::ALLOW_LEGACY_MARKERS) => {
                let before = i.checked_sub(1).and_then(|j| bytes.get(j));
                if !is_positional_neighbor(before) && !is_positional_neighbor(bytes.get(i + 1)) {
                    tokens.push(Token {
                        kind: TokenKind::Positional,
                        span: i..i + 1,
                        name: String::new(),
                    });
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(template: &str) -> Vec<(TokenKind, String)> {
        parse(template, RewriteFlags::default())
            .tokens
            .into_iter()
            .map(|token| (token.kind, token.name))
            .collect()
    }

    #[test]
    fn classify_bare_names() {
        assert_eq!(classify("COMMIT"), StatementKind::Control);
        assert_eq!(classify("  rollback\n"), StatementKind::Control);
        assert_eq!(classify("dbo.GetUsers"), StatementKind::Procedure);
        assert_eq!(classify("select 1"), StatementKind::Text);
        assert_eq!(classify("sp_who;"), StatementKind::Text);
        assert_eq!(classify(""), StatementKind::Text);
    }

    #[test]
    fn skips_quotes_and_comments() {
        let found = kinds(
            "SELECT '@a', \"@b\", `@c` -- @d\n /* @e */ FROM t WHERE x = @f AND y = 'it''s @g'",
        );
        assert_eq!(found, vec![(TokenKind::Named, "f".to_owned())]);
    }

    #[test]
    fn system_variables_and_casts() {
        let found = kinds("SELECT @@version, x::int, :y FROM t");
        assert_eq!(found, vec![(TokenKind::Named, "y".to_owned())]);
    }

    #[test]
    fn in_list() {
        let found = kinds("SELECT * FROM t WHERE id IN @ids OR id in (@more) OR pin @x");
        assert_eq!(
            found,
            vec![
                (TokenKind::ListExpansion, "ids".to_owned()),
                (TokenKind::Named, "more".to_owned()),
                (TokenKind::Named, "x".to_owned()),
            ]
        );
    }

    #[test]
    fn literal_and_positional() {
        let found = kinds("SELECT * FROM {=table} WHERE a = ? AND b ?| c AND d = x?");
        assert_eq!(
            found,
            vec![
                (TokenKind::Literal, "table".to_owned()),
                (TokenKind::Positional, String::new()),
            ]
        );
    }

    #[test]
    fn flags_disable_tokens() {
        let parsed = parse("SELECT {=a}, ?", RewriteFlags::empty());
        assert!(parsed.tokens().is_empty());
    }
}
