//! Arithmetic on untrusted input.
//!
//! Only digits, `+ - * / ( ) .` and spaces are accepted. Supported forms:
//! binary `+ - * / // **`, unary `+`/`-`, and parentheses, with the usual
//! precedence (`**` binds tighter than unary minus and is right
//! associative). Integer arithmetic stays integral except for `/`, which
//! always yields a float.

use std::fmt;

use async_trait::async_trait;

use crate::agent::tool::Tool;
use crate::error::ToolError;

/// Registry name of the calculator.
pub const CALCULATOR_TOOL: &str = "calculator";

const ALLOWED_CHARS: &str = "0123456789+-*/(). ";

/// Maximum expression length accepted.
const MAX_EXPRESSION_LEN: usize = 1_000;

/// Maximum parenthesis nesting.
const MAX_DEPTH: usize = 64;

/// Evaluates arithmetic expressions.
///
/// Problems are reported in the output text (`Error: ...` or
/// `Calculation error: ...`) rather than as tool failures, so the model
/// reads them as an observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        CALCULATOR_TOOL
    }

    fn description(&self) -> &str {
        "Useful for when you need to perform mathematical calculations. \
         Input should be a mathematical expression."
    }

    async fn run(&self, input: &str) -> Result<String, ToolError> {
        Ok(calculate(input))
    }
}

/// Evaluates `expression` and renders the result or the problem as text.
#[must_use]
pub fn calculate(expression: &str) -> String {
    if !expression.chars().all(|c| ALLOWED_CHARS.contains(c)) {
        return "Error: Expression contains illegal characters".to_string();
    }
    match evaluate(expression) {
        Ok(value) => value.to_string(),
        Err(e) => format!("Calculation error: {e}"),
    }
}

/// Evaluates an expression made of the allowed characters.
pub fn evaluate(expression: &str) -> Result<Number, CalcError> {
    if expression.len() > MAX_EXPRESSION_LEN {
        return Err(CalcError::TooLong);
    }
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != tokens.len() {
        return Err(CalcError::Syntax);
    }
    Ok(value)
}

/// A numeric result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Exact integer.
    Int(i64),
    /// Floating point.
    Float(f64),
}

impl Number {
    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Self::Int(i) => i == 0,
            Self::Float(f) => f == 0.0,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{v:.1}")
            }
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalcError {
    /// Malformed expression.
    Syntax,
    /// Division or modulo by zero.
    DivisionByZero,
    /// Zero raised to a negative power.
    ZeroNegativePower,
    /// Result is not a finite number.
    Overflow,
    /// Input longer than the accepted maximum.
    TooLong,
    /// Parentheses nested too deeply.
    TooDeep,
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Syntax => "invalid syntax",
            Self::DivisionByZero => "division by zero",
            Self::ZeroNegativePower => "0.0 cannot be raised to a negative power",
            Self::Overflow => "numerical result out of range",
            Self::TooLong => "expression too long",
            Self::TooDeep => "expression nested too deeply",
        })
    }
}

impl std::error::Error for CalcError {}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Power,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let two = bytes.get(i + 1).copied();
        match b {
            b' ' => i += 1,
            b'+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            b'-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            b'*' if two == Some(b'*') => {
                tokens.push(Token::Power);
                i += 2;
            }
            b'*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            b'/' if two == Some(b'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            b'/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            b'(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            b'0'..=b'9' | b'.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                tokens.push(Token::Num(parse_number(&input[start..i])?));
            }
            _ => return Err(CalcError::Syntax),
        }
    }
    Ok(tokens)
}

fn parse_number(text: &str) -> Result<Number, CalcError> {
    if text == "." || text.matches('.').count() > 1 {
        return Err(CalcError::Syntax);
    }
    if text.contains('.') {
        return text
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| CalcError::Syntax);
    }
    match text.parse::<i64>() {
        Ok(i) => Ok(Number::Int(i)),
        // Out of i64 range: fall back to a float
        Err(_) => text
            .parse::<f64>()
            .map(Number::Float)
            .map_err(|_| CalcError::Syntax),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
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

    /// expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Number, CalcError> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = apply(op, value, rhs)?;
        }
        Ok(value)
    }

    /// term := unary (('*' | '/' | '//') unary)*
    fn term(&mut self) -> Result<Number, CalcError> {
        let mut value = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = apply(op, value, rhs)?;
        }
        Ok(value)
    }

    /// unary := ('+' | '-') unary | power
    fn unary(&mut self) -> Result<Number, CalcError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            Some(Token::Minus) => {
                self.pos += 1;
                let value = self.nested(Self::unary)?;
                apply(Token::Minus, Number::Int(0), value)
            }
            _ => self.power(),
        }
    }

    /// power := atom ['**' unary]
    fn power(&mut self) -> Result<Number, CalcError> {
        let base = self.atom()?;
        if self.peek() == Some(Token::Power) {
            self.pos += 1;
            let exponent = self.nested(Self::unary)?;
            return apply(Token::Power, base, exponent);
        }
        Ok(base)
    }

    /// atom := number | '(' expr ')'
    fn atom(&mut self) -> Result<Number, CalcError> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.nested(Self::expr)?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(CalcError::Syntax),
                }
            }
            _ => Err(CalcError::Syntax),
        }
    }

    fn nested(
        &mut self,
        rule: fn(&mut Self) -> Result<Number, CalcError>,
    ) -> Result<Number, CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        let value = rule(self);
        self.depth -= 1;
        value
    }
}

fn apply(op: Token, lhs: Number, rhs: Number) -> Result<Number, CalcError> {
    use Number::{Float, Int};

    if matches!(op, Token::Slash | Token::DoubleSlash) && rhs.is_zero() {
        return Err(CalcError::DivisionByZero);
    }

    let value = match (op, lhs, rhs) {
        (Token::Plus, Int(a), Int(b)) => {
            a.checked_add(b).map_or_else(|| float(op, lhs, rhs), Int)
        }
        (Token::Minus, Int(a), Int(b)) => {
            a.checked_sub(b).map_or_else(|| float(op, lhs, rhs), Int)
        }
        (Token::Star, Int(a), Int(b)) => {
            a.checked_mul(b).map_or_else(|| float(op, lhs, rhs), Int)
        }
        (Token::DoubleSlash, Int(a), Int(b)) => {
            floor_div(a, b).map_or_else(|| float(op, lhs, rhs), Int)
        }
        (Token::Power, Int(a), Int(b)) if b >= 0 => u32::try_from(b)
            .ok()
            .and_then(|e| a.checked_pow(e))
            .map_or_else(|| float(op, lhs, rhs), Int),
        (Token::Power, _, _) if lhs.is_zero() && rhs.as_f64() < 0.0 => {
            return Err(CalcError::ZeroNegativePower);
        }
        _ => float(op, lhs, rhs),
    };

    match value {
        Float(f) if !f.is_finite() => Err(CalcError::Overflow),
        v => Ok(v),
    }
}

fn float(op: Token, lhs: Number, rhs: Number) -> Number {
    let (a, b) = (lhs.as_f64(), rhs.as_f64());
    Number::Float(match op {
        Token::Plus => a + b,
        Token::Minus => a - b,
        Token::Star => a * b,
        Token::Slash => a / b,
        Token::DoubleSlash => (a / b).floor(),
        Token::Power => a.powf(b),
        _ => f64::NAN,
    })
}

/// Integer division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("2 + 3 * 4", "14" ; "precedence")]
    #[test_case("(2 + 3) * 4", "20" ; "parentheses")]
    #[test_case("7 / 2", "3.5" ; "true division")]
    #[test_case("4 / 2", "2.0" ; "division yields float")]
    #[test_case("7 // 2", "3" ; "floor division")]
    #[test_case("-7 // 2", "-4" ; "floor division negative")]
    #[test_case("2 ** 3 ** 2", "512" ; "power right associative")]
    #[test_case("-2 ** 2", "-4" ; "power binds tighter than unary")]
    #[test_case("2 ** -1", "0.5" ; "negative exponent")]
    #[test_case("--3", "3" ; "double negation")]
    #[test_case("1.5 * 2", "3.0" ; "float times int")]
    #[test_case("0.1 + 0.2", "0.30000000000000004" ; "shortest float repr")]
    #[test_case(" 12 ", "12" ; "surrounding spaces")]
    fn test_calculate(expression: &str, expected: &str) {
        assert_eq!(calculate(expression), expected);
    }

    #[test_case("1 / 0", "Calculation error: division by zero" ; "division by zero")]
    #[test_case("5 // 0.0", "Calculation error: division by zero" ; "floor division by zero")]
    #[test_case("2 +", "Calculation error: invalid syntax" ; "dangling operator")]
    #[test_case("(1 + 2", "Calculation error: invalid syntax" ; "unclosed paren")]
    #[test_case("1 2", "Calculation error: invalid syntax" ; "juxtaposition")]
    #[test_case("1..2", "Calculation error: invalid syntax" ; "double dot")]
    #[test_case("", "Calculation error: invalid syntax" ; "empty")]
    #[test_case("0 ** -1", "Calculation error: 0.0 cannot be raised to a negative power" ; "zero negative power")]
    fn test_calculation_errors(expression: &str, expected: &str) {
        assert_eq!(calculate(expression), expected);
    }

    #[test_case("__import__('os')" ; "python escape")]
    #[test_case("2 ^ 3" ; "caret")]
    #[test_case("x + 1" ; "variable")]
    #[test_case("1e3" ; "exponent literal")]
    fn test_illegal_characters(expression: &str) {
        assert_eq!(calculate(expression), "Error: Expression contains illegal characters");
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() {
        assert_eq!(
            evaluate("9223372036854775807 + 1"),
            Ok(Number::Float(9_223_372_036_854_775_808.0))
        );
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let expression = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&expression), Err(CalcError::TooDeep));
    }

    #[test]
    fn test_huge_power_overflows() {
        assert_eq!(evaluate("10.0 ** 400"), Err(CalcError::Overflow));
    }

    #[tokio::test]
    async fn test_tool_reports_errors_as_output() {
        let tool = CalculatorTool;
        assert_eq!(tool.run("6 * 7").await.ok().as_deref(), Some("42"));
        assert_eq!(
            tool.run("1/0").await.ok().as_deref(),
            Some("Calculation error: division by zero")
        );
    }
}
