//! Pratt parser for predicate expressions.

use crate::algebra::AttrValue;
use crate::expr::ast::{BinOp, CmpOp, Expr, UnOp};
use crate::expr::token::{tokenize, Spanned, Token};
use crate::expr::ExprError;

// Binding powers: higher binds tighter. Left is checked against the
// minimum, right is passed to the recursive call.
mod bp {
    pub const OR: (u8, u8) = (1, 2);
    pub const AND: (u8, u8) = (3, 4);
    // Prefix `not` right binding power:
    pub const NOT_PREFIX: u8 = 5;
    // Comparisons chain at one level and do not associate:
    pub const CMP: (u8, u8) = (7, 8);
    pub const ADD: (u8, u8) = (9, 10);
    pub const MUL: (u8, u8) = (11, 12);
    // Prefix `-` right binding power:
    pub const NEG_PREFIX: u8 = 13;
}

/// Parses a predicate source string into an expression.
pub(crate) fn parse(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: src.len(),
    };
    let expr = parser.parse_bp(0)?;
    if let Some(extra) = parser.peek() {
        return Err(ExprError::parse(
            format!("unexpected token after expression: {:?}", extra.token),
            extra.offset,
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |s| s.offset)
    }

    fn parse_bp(&mut self, min_bp: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let Some(spanned) = self.peek() else { break };

            // Comparison chain: collect every adjacent comparison into
            // one non-associative node.
            if let Some(op) = cmp_op(&spanned.token) {
                if bp::CMP.0 < min_bp {
                    break;
                }
                let mut rest = Vec::new();
                let mut next_op = Some(op);
                while let Some(op) = next_op {
                    self.pos += 1;
                    let rhs = self.parse_bp(bp::CMP.1)?;
                    rest.push((op, rhs));
                    next_op = self.peek().and_then(|s| cmp_op(&s.token));
                }
                lhs = Expr::Compare {
                    first: Box::new(lhs),
                    rest,
                };
                continue;
            }

            let (op, l_bp, r_bp) = match spanned.token {
                Token::Or => (BinOp::Or, bp::OR.0, bp::OR.1),
                Token::And => (BinOp::And, bp::AND.0, bp::AND.1),
                Token::Plus => (BinOp::Add, bp::ADD.0, bp::ADD.1),
                Token::Minus => (BinOp::Sub, bp::ADD.0, bp::ADD.1),
                Token::Star => (BinOp::Mul, bp::MUL.0, bp::MUL.1),
                Token::Slash => (BinOp::Div, bp::MUL.0, bp::MUL.1),
                Token::Percent => (BinOp::Mod, bp::MUL.0, bp::MUL.1),
                _ => break,
            };
            if l_bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_bp(r_bp)?;
            lhs = Expr::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ExprError> {
        let offset = self.offset();
        let Some(spanned) = self.next() else {
            return Err(ExprError::parse("unexpected end of expression", offset));
        };

        match spanned.token {
            Token::Int(n) => Ok(Expr::Literal(AttrValue::Int(n))),
            Token::Str(s) => Ok(Expr::Literal(AttrValue::Text(s))),
            Token::True => Ok(Expr::Literal(AttrValue::Bool(true))),
            Token::False => Ok(Expr::Literal(AttrValue::Bool(false))),
            Token::Ident(name) => {
                if matches!(self.peek(), Some(s) if s.token == Token::LParen) {
                    self.pos += 1;
                    let args = self.parse_args()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Name(name))
                }
            }
            Token::Not => {
                let expr = self.parse_bp(bp::NOT_PREFIX)?;
                Ok(Expr::Unary {
                    op: UnOp::Not,
                    expr: Box::new(expr),
                })
            }
            Token::Minus => {
                let expr = self.parse_bp(bp::NEG_PREFIX)?;
                Ok(Expr::Unary {
                    op: UnOp::Neg,
                    expr: Box::new(expr),
                })
            }
            Token::LParen => {
                let expr = self.parse_bp(0)?;
                self.expect_rparen()?;
                Ok(expr)
            }
            other => Err(ExprError::parse(
                format!("unexpected token {other:?}"),
                spanned.offset,
            )),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(s) if s.token == Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_bp(0)?);
            match self.next() {
                Some(Spanned {
                    token: Token::Comma,
                    ..
                }) => {}
                Some(Spanned {
                    token: Token::RParen,
                    ..
                }) => break,
                Some(other) => {
                    return Err(ExprError::parse(
                        format!("expected ',' or ')', got {:?}", other.token),
                        other.offset,
                    ))
                }
                None => return Err(ExprError::parse("unterminated call", self.end)),
            }
        }
        Ok(args)
    }

    fn expect_rparen(&mut self) -> Result<(), ExprError> {
        match self.next() {
            Some(Spanned {
                token: Token::RParen,
                ..
            }) => Ok(()),
            Some(other) => Err(ExprError::parse(
                format!("expected ')', got {:?}", other.token),
                other.offset,
            )),
            None => Err(ExprError::parse("missing ')'", self.end)),
        }
    }
}

fn cmp_op(token: &Token) -> Option<CmpOp> {
    match token {
        Token::EqEq => Some(CmpOp::Eq),
        Token::Ne => Some(CmpOp::Ne),
        Token::Lt => Some(CmpOp::Lt),
        Token::Le => Some(CmpOp::Le),
        Token::Gt => Some(CmpOp::Gt),
        Token::Ge => Some(CmpOp::Ge),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_comparison_builds_one_node() {
        let expr = parse("0 <= mark <= 100").unwrap();
        match expr {
            Expr::Compare { first, rest } => {
                assert_eq!(*first, Expr::Literal(AttrValue::Int(0)));
                assert_eq!(rest.len(), 2);
                assert_eq!(rest[0].0, CmpOp::Le);
                assert_eq!(rest[0].1, Expr::Name("mark".into()));
                assert_eq!(rest[1].0, CmpOp::Le);
                assert_eq!(rest[1].1, Expr::Literal(AttrValue::Int(100)));
            }
            other => panic!("expected Compare, got {other:?}"),
        }
    }

    #[test]
    fn and_binds_looser_than_comparison() {
        let expr = parse("a == 1 and b == 2").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinOp::And, .. }));
    }

    #[test]
    fn or_binds_looser_than_and() {
        let expr = parse("a or b and c").unwrap();
        match expr {
            Expr::Binary { op, right, .. } => {
                assert_eq!(op, BinOp::Or);
                assert!(matches!(*right, Expr::Binary { op: BinOp::And, .. }));
            }
            other => panic!("expected Or at top, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        match expr {
            Expr::Binary { op, right, .. } => {
                assert_eq!(op, BinOp::Add);
                assert!(matches!(*right, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected Add at top, got {other:?}"),
        }
    }

    #[test]
    fn not_binds_looser_than_comparison() {
        // `not a == b` reads as `not (a == b)`.
        let expr = parse("not a == b").unwrap();
        match expr {
            Expr::Unary { op, expr } => {
                assert_eq!(op, UnOp::Not);
                assert!(matches!(*expr, Expr::Compare { .. }));
            }
            other => panic!("expected Not at top, got {other:?}"),
        }
    }

    #[test]
    fn parens_override_precedence() {
        let expr = parse("(1 + 2) * 3").unwrap();
        assert!(matches!(expr, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn call_with_arguments() {
        let expr = parse("SID('S1')").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                name: "SID".into(),
                args: vec![Expr::Literal(AttrValue::Text("S1".into()))],
            }
        );
    }

    #[test]
    fn call_with_no_arguments() {
        let expr = parse("now()").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                name: "now".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn unary_minus() {
        let expr = parse("-n + 1").unwrap();
        match expr {
            Expr::Binary { op: BinOp::Add, left, .. } => {
                assert!(matches!(*left, Expr::Unary { op: UnOp::Neg, .. }));
            }
            other => panic!("expected Add at top, got {other:?}"),
        }
    }

    #[test]
    fn trailing_tokens_rejected() {
        assert!(parse("1 2").is_err());
        assert!(parse("a ==").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("").is_err());
    }
}
