//! Tokenizer for the filter subset.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Dot,
    Pipe,
    Question,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Alt,
    And,
    Or,
    Not,
    True,
    False,
    Null,
    Str(String),
    Num(f64),
    /// Bare field name; hyphens are accepted after the first character so
    /// kebab-case keys work (arithmetic is not part of the subset).
    Ident(String),
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '?' => {
                chars.next();
                tokens.push(Token::Question);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::Eq);
                    }
                    _ => return Err(ExprError::Parse("assignment is not supported".into())),
                }
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::Ne);
                    }
                    _ => return Err(ExprError::Parse(format!("unexpected '!' at {pos}"))),
                }
            }
            '<' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '/' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '/')) => {
                        chars.next();
                        tokens.push(Token::Alt);
                    }
                    _ => return Err(ExprError::Parse("division is not supported".into())),
                }
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(read_string(&mut chars)?));
            }
            '-' | '0'..='9' => {
                tokens.push(read_number(input, &mut chars)?);
            }
            c if c.is_alphabetic() || c == '_' => {
                let word = read_ident(&mut chars);
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(ExprError::Parse(format!(
                    "unexpected character '{other}' at {pos}"
                )))
            }
        }
    }

    Ok(tokens)
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::CharIndices>,
) -> Result<String, ExprError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err(ExprError::Parse("unterminated string literal".into())),
            Some((_, '"')) => return Ok(out),
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '\\')) => out.push('\\'),
                Some((_, '"')) => out.push('"'),
                Some((_, '/')) => out.push('/'),
                other => {
                    return Err(ExprError::Parse(format!(
                        "unsupported escape sequence: {other:?}"
                    )))
                }
            },
            Some((_, c)) => out.push(c),
        }
    }
}

fn read_number(
    input: &str,
    chars: &mut std::iter::Peekable<std::str::CharIndices>,
) -> Result<Token, ExprError> {
    let start = chars.peek().map(|&(i, _)| i).unwrap_or(0);
    let mut end = start;
    if let Some(&(_, '-')) = chars.peek() {
        chars.next();
    }
    while let Some(&(i, c)) = chars.peek() {
        if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '+' {
            end = i;
            chars.next();
        } else {
            break;
        }
    }
    let raw = &input[start..=end];
    raw.parse::<f64>()
        .map(Token::Num)
        .map_err(|_| ExprError::Parse(format!("invalid number literal: {raw}")))
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::CharIndices>) -> String {
    let mut out = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_alphanumeric() || c == '_' || (c == '-' && !out.is_empty()) {
            out.push(c);
            chars.next();
        } else {
            break;
        }
    }
    out
}
