//! Recursive-descent parser for the filter subset.
//!
//! Precedence, loosest to tightest, mirrors jq: `|`, `//`, `or`, `and`,
//! comparisons, then postfix path access.

use serde_json::Value;

use super::lexer::Token;
use super::{CmpOp, Expr, ExprError, PathSeg};

pub fn parse(tokens: &[Token]) -> Result<Expr, ExprError> {
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.pipe()?;
    if parser.pos != tokens.len() {
        return Err(ExprError::Parse(format!(
            "unexpected trailing token: {:?}",
            tokens[parser.pos]
        )));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(ExprError::Parse(format!(
                "expected {expected:?}, found {:?}",
                self.peek()
            )))
        }
    }

    fn pipe(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.alternative()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.alternative()?;
            lhs = Expr::Pipe(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn alternative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.or()?;
        while self.eat(&Token::Alt) {
            let rhs = self.or()?;
            lhs = Expr::Alt(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.comparison()?;
        while self.eat(&Token::And) {
            let rhs = self.comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.postfix()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.postfix()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let base = self.primary()?;
        let segments = self.path_segments()?;
        if segments.is_empty() {
            Ok(base)
        } else {
            Ok(Expr::Path(Box::new(base), segments))
        }
    }

    /// `.foo`, `."foo"`, `["foo"]`, `[0]`, each optionally followed by `?`.
    fn path_segments(&mut self) -> Result<Vec<PathSeg>, ExprError> {
        let mut segments = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = match self.next() {
                        Some(Token::Ident(name)) => name.clone(),
                        Some(Token::Str(name)) => name.clone(),
                        other => {
                            return Err(ExprError::Parse(format!(
                                "expected field name after '.', found {other:?}"
                            )))
                        }
                    };
                    let optional = self.eat(&Token::Question);
                    segments.push(PathSeg::Field { name, optional });
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let segment = match self.next() {
                        Some(Token::Num(n)) => {
                            if n.fract() != 0.0 {
                                return Err(ExprError::Parse(format!(
                                    "array index must be an integer: {n}"
                                )));
                            }
                            PathSeg::Index {
                                index: *n as i64,
                                optional: false,
                            }
                        }
                        Some(Token::Str(name)) => PathSeg::Field {
                            name: name.clone(),
                            optional: false,
                        },
                        other => {
                            return Err(ExprError::Parse(format!(
                                "expected index or key inside brackets, found {other:?}"
                            )))
                        }
                    };
                    self.expect(&Token::RBracket)?;
                    let optional = self.eat(&Token::Question);
                    segments.push(match (segment, optional) {
                        (PathSeg::Index { index, .. }, optional) => PathSeg::Index { index, optional },
                        (PathSeg::Field { name, .. }, optional) => PathSeg::Field { name, optional },
                    });
                }
                _ => break,
            }
        }
        Ok(segments)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            None => Err(ExprError::Parse("unexpected end of expression".into())),
            Some(Token::Dot) => {
                // `.foo` leaves the dot for the path loop in `postfix`;
                // a bare `.` (including `.[0]`) is consumed here.
                if !matches!(
                    self.tokens.get(self.pos + 1),
                    Some(Token::Ident(_)) | Some(Token::Str(_))
                ) {
                    self.pos += 1;
                }
                Ok(Expr::Identity)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.pipe()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Str(s)) => {
                let value = Value::String(s.clone());
                self.pos += 1;
                Ok(Expr::Literal(value))
            }
            Some(Token::Num(n)) => {
                // Integral literals stay integers so comparisons and
                // serialized output match the document's own numbers.
                let value = if n.fract() == 0.0 && n.abs() <= i64::MAX as f64 {
                    Value::Number(serde_json::Number::from(*n as i64))
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                };
                self.pos += 1;
                Ok(Expr::Literal(value))
            }
            Some(Token::True) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(true)))
            }
            Some(Token::False) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Bool(false)))
            }
            Some(Token::Null) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Null))
            }
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expr::Not)
            }
            Some(other) => Err(ExprError::Parse(format!("unexpected token: {other:?}"))),
        }
    }
}
