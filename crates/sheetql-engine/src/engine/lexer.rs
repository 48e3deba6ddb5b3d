//! Tokenizer for the SQL dialect.
//!
//! Strings may use single or double quotes (doubling the quote escapes it).
//! Identifiers containing spaces or clashing with keywords are written as
//! `[name]` or `` `name` ``. `--` and `/* */` comments are skipped.

use crate::error::{EngineError, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// Bare identifier or keyword (keywords are matched case-insensitively by the parser).
    Word(String),
    /// Bracketed or backticked identifier; never a keyword.
    Quoted(String),
    Number(f64),
    Str(String),
    /// `?` (positional) or `$name` (named).
    Param(Option<String>),
    Symbol(&'static str),
}

/// A token with its byte span in the source text.
#[derive(Clone, Debug, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

const SYMBOLS: &[&str] = &[
    "<>", "!=", "<=", ">=", "||", "==", "(", ")", ",", ".", "*", "+", "-", "/", "%", "=", "<",
    ">", ";", "{", "}", ":",
];

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn syntax(offset: usize, message: impl Into<String>) -> EngineError {
    EngineError::Syntax {
        offset,
        message: message.into(),
    }
}

pub fn tokenize(sql: &str) -> Result<Vec<Spanned>> {
    let chars: Vec<(usize, char)> = sql.char_indices().collect();
    let end_of = |i: usize| chars.get(i).map(|(pos, _)| *pos).unwrap_or(sql.len());
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let (start, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Comments
        if c == '-' && chars.get(i + 1).is_some_and(|(_, n)| *n == '-') {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }
        if c == '/' && chars.get(i + 1).is_some_and(|(_, n)| *n == '*') {
            i += 2;
            loop {
                if i + 1 >= chars.len() {
                    return Err(syntax(start, "unterminated comment"));
                }
                if chars[i].1 == '*' && chars[i + 1].1 == '/' {
                    i += 2;
                    break;
                }
                i += 1;
            }
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            loop {
                let Some(&(_, ch)) = chars.get(i) else {
                    return Err(syntax(start, "unterminated string literal"));
                };
                if ch == quote {
                    if chars.get(i + 1).is_some_and(|(_, n)| *n == quote) {
                        text.push(quote);
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                text.push(ch);
                i += 1;
            }
            tokens.push(Spanned {
                token: Token::Str(text),
                start,
                end: end_of(i),
            });
            continue;
        }

        if c == '[' || c == '`' {
            let close = if c == '[' { ']' } else { '`' };
            let mut text = String::new();
            i += 1;
            loop {
                let Some(&(_, ch)) = chars.get(i) else {
                    return Err(syntax(start, "unterminated quoted identifier"));
                };
                i += 1;
                if ch == close {
                    break;
                }
                text.push(ch);
            }
            tokens.push(Spanned {
                token: Token::Quoted(text),
                start,
                end: end_of(i),
            });
            continue;
        }

        if c.is_ascii_digit() {
            let mut j = i;
            while j < chars.len() && chars[j].1.is_ascii_digit() {
                j += 1;
            }
            if j + 1 < chars.len() && chars[j].1 == '.' && chars[j + 1].1.is_ascii_digit() {
                j += 1;
                while j < chars.len() && chars[j].1.is_ascii_digit() {
                    j += 1;
                }
            }
            if j < chars.len() && matches!(chars[j].1, 'e' | 'E') {
                let mut k = j + 1;
                if k < chars.len() && matches!(chars[k].1, '+' | '-') {
                    k += 1;
                }
                if k < chars.len() && chars[k].1.is_ascii_digit() {
                    while k < chars.len() && chars[k].1.is_ascii_digit() {
                        k += 1;
                    }
                    j = k;
                }
            }
            let end = end_of(j);
            let text = &sql[start..end];
            let n = text
                .parse::<f64>()
                .map_err(|_| syntax(start, format!("invalid number '{}'", text)))?;
            tokens.push(Spanned {
                token: Token::Number(n),
                start,
                end,
            });
            i = j;
            continue;
        }

        if is_ident_start(c) {
            let mut j = i;
            while j < chars.len() && is_ident_char(chars[j].1) {
                j += 1;
            }
            let end = end_of(j);
            tokens.push(Spanned {
                token: Token::Word(sql[start..end].to_string()),
                start,
                end,
            });
            i = j;
            continue;
        }

        if c == '?' {
            tokens.push(Spanned {
                token: Token::Param(None),
                start,
                end: end_of(i + 1),
            });
            i += 1;
            continue;
        }

        if c == '$' {
            let mut j = i + 1;
            while j < chars.len() && is_ident_char(chars[j].1) {
                j += 1;
            }
            if j == i + 1 {
                return Err(syntax(start, "expected parameter name after '$'"));
            }
            let end = end_of(j);
            tokens.push(Spanned {
                token: Token::Param(Some(sql[end_of(i + 1)..end].to_string())),
                start,
                end,
            });
            i = j;
            continue;
        }

        let rest = &sql[start..];
        let Some(&matched) = SYMBOLS.iter().find(|s| rest.starts_with(**s)) else {
            return Err(syntax(start, format!("unexpected character '{}'", c)));
        };
        let len = matched.len();
        let symbol = if matched == "==" { "=" } else { matched };
        tokens.push(Spanned {
            token: Token::Symbol(symbol),
            start,
            end: start + len,
        });
        i += len;
    }

    Ok(tokens)
}
