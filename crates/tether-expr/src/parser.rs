//! Recursive-descent / precedence-climbing expression parser.
//!
//! Primaries (literals, identifiers, parenthesized groups, postfix
//! member/index/call chains) parse by recursive descent; binary operators
//! climb the fixed precedence ladder in [`BinaryOp::precedence`]. Assignment
//! and `??` are right-associative; `? :` binds looser than `??` and tighter
//! than `=`. Lambda heads are recognized with a bounded speculative parse
//! (clone of the one-token-lookahead lexer), which keeps the grammar LL(1)
//! everywhere else.
//!
//! # Failure Modes
//!
//! | Failure | Behavior |
//! |---------|----------|
//! | Unrecognized character | `SyntaxError` at that byte |
//! | `A..B` | `SyntaxError` at the second dot, no partial tree |
//! | Duplicate lambda parameter | hard `SyntaxError` at the duplicate |
//! | Trailing tokens after a complete expression | `SyntaxError` at the extra token |

use std::sync::Arc;

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::lexer::{Lexer, SyntaxError};
use crate::token::{Token, TokenKind};

/// Parse a binding-expression string into an immutable tree.
pub fn parse(text: &str) -> Result<Arc<Expr>, SyntaxError> {
    let mut parser = Parser {
        lexer: Lexer::new(text),
    };
    let expr = parser.parse_expr()?;
    let trailing = parser.lexer.next_token()?;
    if trailing.kind != TokenKind::End {
        return Err(SyntaxError::new(
            trailing.position,
            format!("end of input (found {})", trailing.kind.describe()),
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    lexer: Lexer<'a>,
}

impl Parser<'_> {
    fn parse_expr(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        if let Some(lambda) = self.try_parse_lambda()? {
            return Ok(lambda);
        }
        self.parse_assignment()
    }

    /// Recognize `x =>` or `(a, b) =>` heads; restore the lexer otherwise.
    fn try_parse_lambda(&mut self) -> Result<Option<Arc<Expr>>, SyntaxError> {
        let snapshot = self.lexer.clone();
        let params = match self.lexer.peek()?.kind {
            TokenKind::Ident(_) => {
                let Token { kind, position } = self.lexer.next_token()?;
                let TokenKind::Ident(name) = kind else {
                    unreachable!("peeked identifier");
                };
                if self.lexer.peek()?.kind == TokenKind::Arrow {
                    self.lexer.next_token()?;
                    vec![(name, position)]
                } else {
                    self.lexer = snapshot;
                    return Ok(None);
                }
            }
            TokenKind::OpenParen => match self.try_parse_paren_params()? {
                Some(params) => params,
                None => {
                    self.lexer = snapshot;
                    return Ok(None);
                }
            },
            _ => return Ok(None),
        };
        // Duplicate parameter names are a hard failure once the head is
        // known to be a lambda.
        for (i, (name, position)) in params.iter().enumerate() {
            if params[..i].iter().any(|(prior, _)| prior == name) {
                return Err(SyntaxError::new(
                    *position,
                    format!("a unique lambda parameter name ('{name}' repeats)"),
                ));
            }
        }
        let body = self.parse_expr()?;
        Ok(Some(Arc::new(Expr::Lambda {
            params: params.into_iter().map(|(name, _)| name).collect(),
            body,
        })))
    }

    /// Attempt `( ident {, ident} ) =>`; `None` means "not a lambda head"
    /// and the caller restores the lexer.
    fn try_parse_paren_params(&mut self) -> Result<Option<Vec<(Arc<str>, usize)>>, SyntaxError> {
        self.lexer.next_token()?; // '('
        let mut params = Vec::new();
        if self.lexer.peek()?.kind == TokenKind::CloseParen {
            self.lexer.next_token()?;
        } else {
            loop {
                let token = self.lexer.next_token()?;
                let TokenKind::Ident(name) = token.kind else {
                    return Ok(None);
                };
                params.push((name, token.position));
                match self.lexer.next_token()?.kind {
                    TokenKind::Comma => {}
                    TokenKind::CloseParen => break,
                    _ => return Ok(None),
                }
            }
        }
        if self.lexer.peek()?.kind == TokenKind::Arrow {
            self.lexer.next_token()?;
            Ok(Some(params))
        } else {
            Ok(None)
        }
    }

    fn parse_assignment(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        let left = self.parse_conditional()?;
        if self.lexer.peek()?.kind == TokenKind::Assign {
            self.lexer.next_token()?;
            // Right-associative: `a = b = c` assigns c to b, then b to a.
            let right = self.parse_expr()?;
            return Ok(Arc::new(Expr::Binary {
                op: BinaryOp::Assign,
                left,
                right,
            }));
        }
        Ok(left)
    }

    fn parse_conditional(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        // Minimum precedence 2 pulls in everything down to `??`, so the
        // ternary condition may itself coalesce.
        let condition = self.parse_binary(BinaryOp::Coalesce.precedence())?;
        if self.lexer.peek()?.kind != TokenKind::Question {
            return Ok(condition);
        }
        self.lexer.next_token()?;
        let when_true = self.parse_expr()?;
        let colon = self.lexer.next_token()?;
        if colon.kind != TokenKind::Colon {
            return Err(SyntaxError::new(
                colon.position,
                format!("':' in conditional (found {})", colon.kind.describe()),
            ));
        }
        let when_false = self.parse_expr()?;
        Ok(Arc::new(Expr::Conditional {
            condition,
            when_true,
            when_false,
        }))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Arc<Expr>, SyntaxError> {
        let mut left = self.parse_unary()?;
        loop {
            let Some(op) = binary_op(&self.lexer.peek()?.kind) else {
                break;
            };
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.lexer.next_token()?;
            let next_min = if op.is_right_associative() {
                precedence
            } else {
                precedence + 1
            };
            let right = self.parse_binary(next_min)?;
            left = Arc::new(Expr::Binary { op, left, right });
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        let op = match self.lexer.peek()?.kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.lexer.next_token()?;
            let operand = self.parse_unary()?;
            return Ok(Arc::new(Expr::Unary { op, operand }));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        let mut current = self.parse_primary()?;
        // Sticky after the first `?.`: the rest of the chain short-circuits.
        let mut chain_optional = false;
        loop {
            match self.lexer.peek()?.kind {
                TokenKind::Dot => {
                    self.lexer.next_token()?;
                    current = self.parse_access(current, chain_optional)?;
                }
                TokenKind::QuestionDot => {
                    self.lexer.next_token()?;
                    chain_optional = true;
                    let guarded = Arc::new(Expr::NullConditional { target: current });
                    current = self.parse_access(guarded, true)?;
                }
                TokenKind::OpenBracket => {
                    self.lexer.next_token()?;
                    let args = self.parse_index_args()?;
                    current = Arc::new(Expr::Index {
                        target: current,
                        args,
                        optional: chain_optional,
                    });
                }
                _ => break,
            }
        }
        Ok(current)
    }

    /// Member or method access after a consumed `.`/`?.`.
    fn parse_access(
        &mut self,
        target: Arc<Expr>,
        optional: bool,
    ) -> Result<Arc<Expr>, SyntaxError> {
        let token = self.lexer.next_token()?;
        let TokenKind::Ident(name) = token.kind else {
            return Err(SyntaxError::new(
                token.position,
                format!("a member name (found {})", token.kind.describe()),
            ));
        };
        if self.lexer.peek()?.kind == TokenKind::OpenParen {
            self.lexer.next_token()?;
            let args = self.parse_call_args()?;
            return Ok(Arc::new(Expr::MethodCall {
                target: Some(target),
                name,
                args,
                optional,
            }));
        }
        Ok(Arc::new(Expr::Member {
            target,
            name,
            optional,
        }))
    }

    fn parse_call_args(&mut self) -> Result<Vec<Arc<Expr>>, SyntaxError> {
        let mut args = Vec::new();
        if self.lexer.peek()?.kind == TokenKind::CloseParen {
            self.lexer.next_token()?;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            let token = self.lexer.next_token()?;
            match token.kind {
                TokenKind::Comma => {}
                TokenKind::CloseParen => break,
                other => {
                    return Err(SyntaxError::new(
                        token.position,
                        format!("',' or ')' in argument list (found {})", other.describe()),
                    ));
                }
            }
        }
        Ok(args)
    }

    fn parse_index_args(&mut self) -> Result<Vec<Arc<Expr>>, SyntaxError> {
        let mut args = Vec::new();
        loop {
            args.push(self.parse_expr()?);
            let token = self.lexer.next_token()?;
            match token.kind {
                TokenKind::Comma => {}
                TokenKind::CloseBracket => break,
                other => {
                    return Err(SyntaxError::new(
                        token.position,
                        format!("',' or ']' in indexer (found {})", other.describe()),
                    ));
                }
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Arc<Expr>, SyntaxError> {
        let token = self.lexer.next_token()?;
        let expr = match token.kind {
            TokenKind::Int(i) => Expr::Constant(Literal::Int(i)),
            TokenKind::Float(f) => Expr::Constant(Literal::Float(f)),
            TokenKind::Str(s) => Expr::Constant(Literal::Str(s)),
            TokenKind::Char(c) => Expr::Constant(Literal::Str(Arc::from(c.to_string().as_str()))),
            TokenKind::True => Expr::Constant(Literal::Bool(true)),
            TokenKind::False => Expr::Constant(Literal::Bool(false)),
            TokenKind::Null => Expr::Constant(Literal::Null),
            TokenKind::Ident(name) => {
                if self.lexer.peek()?.kind == TokenKind::OpenParen {
                    self.lexer.next_token()?;
                    let args = self.parse_call_args()?;
                    Expr::MethodCall {
                        target: None,
                        name,
                        args,
                        optional: false,
                    }
                } else {
                    Expr::Parameter { name }
                }
            }
            TokenKind::OpenParen => {
                let inner = self.parse_expr()?;
                let close = self.lexer.next_token()?;
                if close.kind != TokenKind::CloseParen {
                    return Err(SyntaxError::new(
                        close.position,
                        format!("a closing ')' (found {})", close.kind.describe()),
                    ));
                }
                return Ok(inner);
            }
            other => {
                return Err(SyntaxError::new(
                    token.position,
                    format!("an expression (found {})", other.describe()),
                ));
            }
        };
        Ok(Arc::new(expr))
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    // Assignment is handled by `parse_assignment` so the climb never sees it.
    Some(match kind {
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Rem,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Shl => BinaryOp::Shl,
        TokenKind::Shr => BinaryOp::Shr,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::Ne,
        TokenKind::Amp => BinaryOp::BitAnd,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::Pipe => BinaryOp::BitOr,
        TokenKind::AmpAmp => BinaryOp::And,
        TokenKind::PipePipe => BinaryOp::Or,
        TokenKind::QuestionQuestion => BinaryOp::Coalesce,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str) -> Arc<Expr> {
        Arc::new(Expr::Parameter {
            name: Arc::from(name),
        })
    }

    fn int(i: i64) -> Arc<Expr> {
        Arc::new(Expr::Constant(Literal::Int(i)))
    }

    fn binary(op: BinaryOp, left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
        Arc::new(Expr::Binary { op, left, right })
    }

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            binary(
                BinaryOp::Add,
                int(1),
                binary(BinaryOp::Mul, int(2), int(3))
            )
        );
    }

    #[test]
    fn subtraction_is_left_associative() {
        let expr = parse("1 - 2 - 3").unwrap();
        assert_eq!(
            expr,
            binary(
                BinaryOp::Sub,
                binary(BinaryOp::Sub, int(1), int(2)),
                int(3)
            )
        );
    }

    #[test]
    fn coalescing_is_right_associative() {
        let expr = parse("a ?? b ?? c").unwrap();
        assert_eq!(
            expr,
            binary(
                BinaryOp::Coalesce,
                param("a"),
                binary(BinaryOp::Coalesce, param("b"), param("c"))
            )
        );
    }

    #[test]
    fn assignment_is_right_associative() {
        let expr = parse("a = b = c").unwrap();
        assert_eq!(
            expr,
            binary(
                BinaryOp::Assign,
                param("a"),
                binary(BinaryOp::Assign, param("b"), param("c"))
            )
        );
    }

    #[test]
    fn ternary_binds_looser_than_coalescing() {
        let expr = parse("a ?? b ? c : d").unwrap();
        assert_eq!(
            expr,
            Arc::new(Expr::Conditional {
                condition: binary(BinaryOp::Coalesce, param("a"), param("b")),
                when_true: param("c"),
                when_false: param("d"),
            })
        );
    }

    #[test]
    fn postfix_chain_shape() {
        // Scenario: A.B[0].C
        let expr = parse("A.B[0].C").unwrap();
        let b = Arc::new(Expr::Member {
            target: param("A"),
            name: Arc::from("B"),
            optional: false,
        });
        let indexed = Arc::new(Expr::Index {
            target: b,
            args: vec![int(0)],
            optional: false,
        });
        assert_eq!(
            expr,
            Arc::new(Expr::Member {
                target: indexed,
                name: Arc::from("C"),
                optional: false,
            })
        );
    }

    #[test]
    fn null_conditional_is_sticky() {
        let expr = parse("a?.b.c").unwrap();
        let Expr::Member {
            target, optional, ..
        } = &*expr
        else {
            panic!("expected member, got {expr:?}");
        };
        assert!(*optional, "access after ?. must stay optional");
        let Expr::Member {
            target: inner,
            optional: inner_optional,
            ..
        } = &**target
        else {
            panic!("expected inner member");
        };
        assert!(*inner_optional);
        assert!(matches!(&**inner, Expr::NullConditional { .. }));
    }

    #[test]
    fn lambda_single_parameter() {
        let expr = parse("x => x.Name").unwrap();
        let Expr::Lambda { params, body } = &*expr else {
            panic!("expected lambda");
        };
        assert_eq!(params.len(), 1);
        assert_eq!(&*params[0], "x");
        assert!(matches!(&**body, Expr::Member { .. }));
    }

    #[test]
    fn lambda_parameter_list() {
        let expr = parse("(a, b) => a + b").unwrap();
        let Expr::Lambda { params, .. } = &*expr else {
            panic!("expected lambda");
        };
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn duplicate_lambda_parameters_rejected() {
        let err = parse("(a, a) => a").unwrap_err();
        assert_eq!(err.position, 4);
        assert!(err.expected.contains("unique"));
    }

    #[test]
    fn parenthesized_expression_is_not_a_lambda() {
        let expr = parse("(a)").unwrap();
        assert_eq!(expr, param("a"));
    }

    #[test]
    fn double_dot_fails_at_second_dot() {
        // Scenario: malformed "A..B".
        let err = parse("A..B").unwrap_err();
        assert_eq!(err.position, 2);
    }

    #[test]
    fn trailing_tokens_rejected() {
        let err = parse("a b").unwrap_err();
        assert_eq!(err.position, 2);
        assert!(err.expected.contains("end of input"));
    }

    #[test]
    fn bare_and_dotted_calls() {
        let expr = parse("Foo(1, 2)").unwrap();
        let Expr::MethodCall { target, args, .. } = &*expr else {
            panic!("expected call");
        };
        assert!(target.is_none());
        assert_eq!(args.len(), 2);

        let expr = parse("a.Foo(b)").unwrap();
        let Expr::MethodCall { target, .. } = &*expr else {
            panic!("expected call");
        };
        assert_eq!(target.as_deref(), Some(&*param("a")));
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let expr = parse("-x * y").unwrap();
        assert_eq!(
            expr,
            binary(
                BinaryOp::Mul,
                Arc::new(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: param("x"),
                }),
                param("y")
            )
        );
    }

    #[test]
    fn parens_override_precedence() {
        let expr = parse("(1 + 2) * 3").unwrap();
        assert_eq!(
            expr,
            binary(
                BinaryOp::Mul,
                binary(BinaryOp::Add, int(1), int(2)),
                int(3)
            )
        );
    }

    #[test]
    fn literal_forms() {
        assert_eq!(
            parse("\"hi\"").unwrap(),
            Arc::new(Expr::Constant(Literal::Str(Arc::from("hi"))))
        );
        assert_eq!(
            parse("'x'").unwrap(),
            Arc::new(Expr::Constant(Literal::Str(Arc::from("x"))))
        );
        assert_eq!(
            parse("true").unwrap(),
            Arc::new(Expr::Constant(Literal::Bool(true)))
        );
        assert_eq!(
            parse("null").unwrap(),
            Arc::new(Expr::Constant(Literal::Null))
        );
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }
}
