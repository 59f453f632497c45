//! Expression context and evaluation for `%`-lines and `[expr]` substitution.
//!
//! Lines pulled from the feeder or the sender may carry assignment lists
//! (`%zsafe = zmax + 2`) and bracketed expressions (`G0 Z[zsafe]`). Both are
//! evaluated against a context populated from the shared (global) variable
//! map, the program's bounding box, the mirrored machine state, and the
//! modal group.
//!
//! The evaluator handles arithmetic over numbers (`+ - * /`, unary minus,
//! parentheses) and dotted identifier lookup. A bracketed expression that is
//! a bare identifier may also resolve to a string (e.g. `[modal.wcs]`).

use std::collections::HashMap;

use serde_json::Value;

use cncflow_core::{GcodeError, MachineModel, Result};

/// Evaluation context: dotted identifier -> JSON value
pub type Context = HashMap<String, Value>;

const BBOX_KEYS: [&str; 6] = ["xmin", "xmax", "ymin", "ymax", "zmin", "zmax"];

/// Populate the evaluation context for one line
///
/// Job-level entries (typically the program bounding box) override the
/// defaults; machine-derived entries are authoritative and added last.
pub fn build_context(
    shared: &HashMap<String, f64>,
    job: &Context,
    model: &MachineModel,
) -> Context {
    let mut ctx = Context::new();

    // Bounding box defaults to zero when the job does not carry one.
    for key in BBOX_KEYS {
        ctx.insert(key.to_string(), Value::from(0.0));
    }

    for (key, value) in job {
        // Coerce numeric strings so bbox values survive JSON round-trips.
        let coerced = match value {
            Value::String(s) => s
                .parse::<f64>()
                .map(Value::from)
                .unwrap_or_else(|_| value.clone()),
            other => other.clone(),
        };
        ctx.insert(key.clone(), coerced);
    }

    for (key, value) in shared {
        ctx.insert(format!("global.{}", key), Value::from(*value));
    }

    let mpos = &model.mpos;
    let wpos = &model.wpos;
    for (suffix, m, w) in [
        ("x", mpos.x, wpos.x),
        ("y", mpos.y, wpos.y),
        ("z", mpos.z, wpos.z),
        ("a", mpos.a, wpos.a),
        ("b", mpos.b, wpos.b),
        ("c", mpos.c, wpos.c),
    ] {
        ctx.insert(format!("mpos{}", suffix), Value::from(m));
        ctx.insert(format!("pos{}", suffix), Value::from(w));
    }

    let modal = &model.modal;
    ctx.insert("modal.motion".to_string(), Value::from(modal.motion.clone()));
    ctx.insert("modal.wcs".to_string(), Value::from(modal.wcs.clone()));
    ctx.insert("modal.plane".to_string(), Value::from(modal.plane.clone()));
    ctx.insert("modal.units".to_string(), Value::from(modal.units.clone()));
    ctx.insert(
        "modal.distance".to_string(),
        Value::from(modal.distance.clone()),
    );
    ctx.insert(
        "modal.feedrate".to_string(),
        Value::from(modal.feedrate.clone()),
    );
    ctx.insert("modal.path".to_string(), Value::from(modal.path.clone()));
    ctx.insert(
        "modal.spindle".to_string(),
        Value::from(modal.spindle.clone()),
    );
    // M7 and M8 on separate lines; a combined "M7M8" violates the modal group.
    ctx.insert(
        "modal.coolant".to_string(),
        Value::from(modal.coolant.join("\n")),
    );

    ctx.insert("tool".to_string(), Value::from(model.tool));

    ctx
}

/// Evaluate an expression to a JSON value
///
/// A bare identifier resolves to whatever the context holds (string or
/// number); anything else must evaluate numerically.
pub fn eval_value(expr: &str, ctx: &Context) -> Result<Value> {
    let trimmed = expr.trim();
    if is_identifier(trimmed) {
        if let Some(value) = ctx.get(trimmed) {
            return Ok(value.clone());
        }
    }
    evaluate(trimmed, ctx).map(Value::from)
}

/// Evaluate an arithmetic expression to a number
pub fn evaluate(expr: &str, ctx: &Context) -> Result<f64> {
    let mut parser = Parser {
        tokens: tokenize(expr, ctx)?,
        pos: 0,
        expr,
    };
    let value = parser.expression()?;
    if parser.pos != parser.tokens.len() {
        return Err(bad_expr(expr, "trailing input"));
    }
    Ok(value)
}

/// Replace every `[expr]` segment with its evaluated value
///
/// Segments that fail to evaluate are kept verbatim and logged; the firmware
/// will reject them with a proper status code if they matter.
pub fn translate(line: &str, ctx: &Context) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;

    while let Some(start) = rest.find('[') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find(']') {
            Some(end) => {
                let expr = &after[..end];
                match eval_value(expr, ctx) {
                    Ok(Value::String(s)) => out.push_str(&s),
                    Ok(value) => match value.as_f64() {
                        Some(n) => out.push_str(&format_number(n)),
                        None => {
                            tracing::warn!(expr, "Expression did not yield a number");
                            out.push('[');
                            out.push_str(expr);
                            out.push(']');
                        }
                    },
                    Err(e) => {
                        tracing::warn!(expr, error = %e, "Failed to evaluate expression");
                        out.push('[');
                        out.push_str(expr);
                        out.push(']');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated bracket; keep the tail untouched.
                out.push('[');
                rest = after;
                break;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Apply a comma-separated assignment list
///
/// `global.`-prefixed targets write through to the shared variable map and
/// persist across programs; everything else lands in the job context.
pub fn apply_assignments(
    list: &str,
    job: &mut Context,
    shared: &mut HashMap<String, f64>,
    model: &MachineModel,
) {
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((name, expr)) = part.split_once('=') else {
            tracing::warn!(line = part, "Malformed assignment, skipping");
            continue;
        };
        let name = name.trim();
        let expr = expr.trim();
        if !is_identifier(name) {
            tracing::warn!(name, "Invalid assignment target, skipping");
            continue;
        }

        let ctx = build_context(shared, job, model);
        match evaluate(expr, &ctx) {
            Ok(value) => {
                if let Some(global_key) = name.strip_prefix("global.") {
                    shared.insert(global_key.to_string(), value);
                } else {
                    job.insert(name.to_string(), Value::from(value));
                }
            }
            Err(e) => {
                tracing::warn!(name, expr, error = %e, "Failed to evaluate assignment");
            }
        }
    }
}

/// Format a number the way it appears in G-code: no trailing zeros
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let mut s = format!("{:.6}", n);
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        s
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn bad_expr(expr: &str, reason: &str) -> cncflow_core::Error {
    GcodeError::BadExpression {
        expr: expr.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expr: &str, ctx: &Context) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let bytes = expr.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let ch = bytes[i] as char;
        match ch {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c.is_ascii_digit() || c == '.' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let value = expr[start..i]
                    .parse::<f64>()
                    .map_err(|e| bad_expr(expr, &e.to_string()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let name = &expr[start..i];
                let value = ctx
                    .get(name)
                    .and_then(Value::as_f64)
                    .ok_or_else(|| bad_expr(expr, &format!("unknown variable '{}'", name)))?;
                tokens.push(Token::Number(value));
            }
            other => {
                return Err(bad_expr(expr, &format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    expr: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.advance();
                    value += self.term()?;
                }
                Token::Minus => {
                    self.advance();
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.advance();
                    value *= self.factor()?;
                }
                Token::Slash => {
                    self.advance();
                    value /= self.factor()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Minus) => Ok(-self.factor()?),
            Some(Token::LParen) => {
                let value = self.expression()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(bad_expr(self.expr, "missing closing parenthesis")),
                }
            }
            _ => Err(bad_expr(self.expr, "expected a value")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cncflow_core::Position;

    fn model() -> MachineModel {
        MachineModel {
            wpos: Position::new(1.0, 2.0, 3.0),
            mpos: Position::new(10.0, 20.0, 30.0),
            tool: 2,
            ..Default::default()
        }
    }

    #[test]
    fn arithmetic() {
        let ctx = Context::new();
        assert_eq!(evaluate("1 + 2 * 3", &ctx).unwrap(), 7.0);
        assert_eq!(evaluate("(1 + 2) * 3", &ctx).unwrap(), 9.0);
        assert_eq!(evaluate("-4 / 2", &ctx).unwrap(), -2.0);
    }

    #[test]
    fn variables_resolve_from_context() {
        let ctx = build_context(&HashMap::new(), &Context::new(), &model());
        assert_eq!(evaluate("posz + 1", &ctx).unwrap(), 4.0);
        assert_eq!(evaluate("mposx / 2", &ctx).unwrap(), 5.0);
        assert_eq!(evaluate("zmax", &ctx).unwrap(), 0.0);
    }

    #[test]
    fn unknown_variable_errors() {
        let ctx = Context::new();
        assert!(evaluate("nope + 1", &ctx).is_err());
    }

    #[test]
    fn translate_substitutes_brackets() {
        let mut job = Context::new();
        job.insert("zsafe".to_string(), Value::from(5.5));
        let ctx = build_context(&HashMap::new(), &job, &model());
        assert_eq!(translate("G0 Z[zsafe]", &ctx), "G0 Z5.5");
        assert_eq!(translate("G0 Z[zsafe + 0.5]", &ctx), "G0 Z6");
    }

    #[test]
    fn translate_string_identifier() {
        let ctx = build_context(&HashMap::new(), &Context::new(), &model());
        assert_eq!(translate("[modal.wcs]", &ctx), "G54");
    }

    #[test]
    fn translate_keeps_failed_expressions() {
        let ctx = Context::new();
        assert_eq!(translate("G0 X[oops]", &ctx), "G0 X[oops]");
    }

    #[test]
    fn coolant_words_emit_on_separate_lines() {
        let mut m = model();
        m.modal.coolant = vec!["M7".to_string(), "M8".to_string()];
        let ctx = build_context(&HashMap::new(), &Context::new(), &m);
        assert_eq!(translate("[modal.coolant]", &ctx), "M7\nM8");
    }

    #[test]
    fn assignments_update_job_and_shared() {
        let mut job = Context::new();
        let mut shared = HashMap::new();
        apply_assignments(
            "zsafe = zmax + 2, global.count = 3",
            &mut job,
            &mut shared,
            &model(),
        );
        assert_eq!(job.get("zsafe").and_then(Value::as_f64), Some(2.0));
        assert_eq!(shared.get("count"), Some(&3.0));
    }

    #[test]
    fn assignment_can_reference_earlier_assignment() {
        let mut job = Context::new();
        let mut shared = HashMap::new();
        apply_assignments("a = 2, b = a * 3", &mut job, &mut shared, &model());
        assert_eq!(job.get("b").and_then(Value::as_f64), Some(6.0));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.25), "3.25");
        assert_eq!(format_number(-0.5), "-0.5");
    }
}
