//! Filter Expression Engine
//!
//! Evaluates jq-style filter expressions against a JSON document. Mapping
//! configs in the wild are jq programs, so the surface here is the jq subset
//! those configs actually use: identity, field and index access (with `?`),
//! pipes, literals, comparisons, `and`/`or`/`not` and the `//` alternative
//! operator. Generators, arithmetic and function definitions are out.
//!
//! A failing expression never aborts processing: [`first`] logs a warning
//! and yields `None`, which callers treat as a null result.

mod eval;
mod lexer;
mod parser;

use serde_json::Value;
use tracing::warn;

/// Comparison operators of the subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One step of a field/index access chain.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    Field { name: String, optional: bool },
    Index { index: i64, optional: bool },
}

/// Parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `.`
    Identity,
    /// String/number/boolean/null literal.
    Literal(Value),
    /// A base expression followed by access segments, e.g. `.a.b[0]?`.
    Path(Box<Expr>, Vec<PathSeg>),
    /// `lhs | rhs`
    Pipe(Box<Expr>, Box<Expr>),
    /// `lhs <op> rhs`
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    /// `lhs and rhs`
    And(Box<Expr>, Box<Expr>),
    /// `lhs or rhs`
    Or(Box<Expr>, Box<Expr>),
    /// `lhs // rhs`: rhs when lhs errors or yields `null`/`false`.
    Alt(Box<Expr>, Box<Expr>),
    /// The `not` builtin filter.
    Not,
}

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{0}")]
    Eval(String),
}

/// Parse an expression into its AST.
pub fn parse(expression: &str) -> Result<Expr, ExprError> {
    let tokens = lexer::tokenize(expression)?;
    parser::parse(&tokens)
}

/// Evaluate an already-parsed expression against a document.
pub fn eval(expr: &Expr, doc: &Value) -> Result<Value, ExprError> {
    eval::eval(expr, doc)
}

/// Evaluate `expression` against `doc`, returning the result or `None` when
/// the expression fails to parse or evaluate. Failures are logged at warning
/// level and never propagate.
pub fn first(expression: &str, doc: &Value) -> Option<Value> {
    match parse(expression).and_then(|expr| eval::eval(&expr, doc)) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(expression, error = %e, "filter expression failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "body": {
                "context": {"runId": "r1"},
                "payload": {
                    "status": "TRIGGERED",
                    "action": {"identifier": "Create"},
                    "properties": {"count": 3, "flag": true}
                },
                "items": ["a", "b", "c"]
            },
            "env": {"REGION": "eu"}
        })
    }

    #[test]
    fn test_identity() {
        assert_eq!(first(".", &doc()), Some(doc()));
    }

    #[test]
    fn test_field_access() {
        assert_eq!(
            first(".body.payload.status", &doc()),
            Some(json!("TRIGGERED"))
        );
        assert_eq!(
            first(".body.payload.action.identifier", &doc()),
            Some(json!("Create"))
        );
        assert_eq!(first(".env.REGION", &doc()), Some(json!("eu")));
    }

    #[test]
    fn test_missing_field_is_null() {
        assert_eq!(first(".body.payload.nope", &doc()), Some(Value::Null));
        assert_eq!(first(".body.a.b.c", &doc()), Some(Value::Null));
    }

    #[test]
    fn test_kebab_case_field() {
        let doc = json!({"payload": {"non-existing-field": 7}});
        assert_eq!(first(".payload.non-existing-field", &doc), Some(json!(7)));
    }

    #[test]
    fn test_quoted_field() {
        let doc = json!({"a key": {"b": 1}});
        assert_eq!(first(".\"a key\".b", &doc), Some(json!(1)));
        assert_eq!(first(".[\"a key\"].b", &doc), Some(json!(1)));
    }

    #[test]
    fn test_array_index() {
        assert_eq!(first(".body.items[0]", &doc()), Some(json!("a")));
        assert_eq!(first(".body.items[2]", &doc()), Some(json!("c")));
        assert_eq!(first(".body.items[-1]", &doc()), Some(json!("c")));
        assert_eq!(first(".body.items[9]", &doc()), Some(Value::Null));
    }

    #[test]
    fn test_index_on_non_array_errors() {
        assert_eq!(first(".body.payload.status[0]", &doc()), None);
        assert_eq!(first(".body.payload.status[0]?", &doc()), Some(Value::Null));
    }

    #[test]
    fn test_field_on_scalar_errors() {
        assert_eq!(first(".body.payload.status.foo", &doc()), None);
        assert_eq!(first(".body.payload.status.foo?", &doc()), Some(Value::Null));
    }

    #[test]
    fn test_literals() {
        assert_eq!(first("\"http://test.com\"", &doc()), Some(json!("http://test.com")));
        assert_eq!(first("42", &doc()), Some(json!(42)));
        assert_eq!(first("-1.5", &doc()), Some(json!(-1.5)));
        assert_eq!(first("true", &doc()), Some(json!(true)));
        assert_eq!(first("null", &doc()), Some(Value::Null));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            first(".body.payload.status == \"TRIGGERED\"", &doc()),
            Some(json!(true))
        );
        assert_eq!(
            first(".body.payload.status != \"TRIGGERED\"", &doc()),
            Some(json!(false))
        );
        assert_eq!(
            first(".body.payload.properties.count > 2", &doc()),
            Some(json!(true))
        );
        assert_eq!(
            first(".body.payload.properties.count <= 2", &doc()),
            Some(json!(false))
        );
    }

    #[test]
    fn test_boolean_operators() {
        assert_eq!(
            first(".body.payload.properties.flag and true", &doc()),
            Some(json!(true))
        );
        assert_eq!(first("false or .body.payload.properties.flag", &doc()), Some(json!(true)));
        assert_eq!(
            first(".body.payload.properties.flag | not", &doc()),
            Some(json!(false))
        );
        assert_eq!(first(".body.missing | not", &doc()), Some(json!(true)));
    }

    #[test]
    fn test_pipe() {
        assert_eq!(
            first(".body | .payload | .status", &doc()),
            Some(json!("TRIGGERED"))
        );
    }

    #[test]
    fn test_alternative() {
        assert_eq!(
            first(".body.missing // \"fallback\"", &doc()),
            Some(json!("fallback"))
        );
        assert_eq!(
            first(".body.payload.status // \"fallback\"", &doc()),
            Some(json!("TRIGGERED"))
        );
        // Errors on the left are swallowed by //.
        assert_eq!(
            first(".body.payload.status.deep // \"fallback\"", &doc()),
            Some(json!("fallback"))
        );
    }

    #[test]
    fn test_parenthesized() {
        assert_eq!(
            first("(.body.payload.status == \"TRIGGERED\") and true", &doc()),
            Some(json!(true))
        );
    }

    #[test]
    fn test_parse_error_yields_none() {
        assert_eq!(first(".body |", &doc()), None);
        assert_eq!(first("][", &doc()), None);
        assert_eq!(first("", &doc()), None);
    }

    #[test]
    fn test_enabled_style_predicates() {
        // The shapes mapping configs actually use for `enabled`.
        assert_eq!(
            first(".body.payload.status == \"TRIGGERED\"", &doc()),
            Some(json!(true))
        );
        assert_eq!(first(".body.payload.nothing", &doc()), Some(Value::Null));
    }
}
