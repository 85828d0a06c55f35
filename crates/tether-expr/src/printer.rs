//! Canonical expression printing.
//!
//! [`unparse`] renders a tree back to source text with the minimum
//! parentheses needed to reparse to a structurally equal tree. The output is
//! canonical: whitespace is normalized around binary operators and after
//! commas, and redundant grouping from the original source is dropped.

use std::fmt::Write;

use crate::ast::{BinaryOp, Expr, Literal};

/// Render `expr` to canonical source text.
#[must_use]
pub fn unparse(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, 0);
    out
}

/// Precedence on a doubled scale so the conditional operator can sit
/// strictly between assignment and coalescing.
fn prec(expr: &Expr) -> u8 {
    match expr {
        Expr::Lambda { .. } => 0,
        Expr::Binary {
            op: BinaryOp::Assign,
            ..
        } => 2,
        Expr::Conditional { .. } => 3,
        Expr::Binary { op, .. } => op.precedence() * 2,
        Expr::Unary { .. } => 26,
        _ => 28,
    }
}

fn write_expr(out: &mut String, expr: &Expr, min: u8) {
    if prec(expr) < min {
        out.push('(');
        write_expr(out, expr, 0);
        out.push(')');
        return;
    }
    match expr {
        Expr::Constant(literal) => write_literal(out, literal),
        Expr::Parameter { name } => out.push_str(name),
        Expr::Member {
            target,
            name,
            optional: _,
        } => {
            write_receiver(out, target);
            out.push_str(name);
        }
        Expr::Index { target, args, .. } => {
            write_expr(out, target, 28);
            out.push('[');
            write_args(out, args);
            out.push(']');
        }
        Expr::MethodCall {
            target, name, args, ..
        } => {
            if let Some(target) = target {
                write_receiver(out, target);
            }
            out.push_str(name);
            out.push('(');
            write_args(out, args);
            out.push(')');
        }
        Expr::Unary { op, operand } => {
            out.push_str(op.symbol());
            write_expr(out, operand, 26);
        }
        Expr::Binary { op, left, right } => {
            let p = prec(expr);
            let (left_min, right_min) = if op.is_right_associative() {
                (p + 1, p)
            } else {
                (p, p + 1)
            };
            write_expr(out, left, left_min);
            let _ = write!(out, " {} ", op.symbol());
            write_expr(out, right, right_min);
        }
        Expr::Conditional {
            condition,
            when_true,
            when_false,
        } => {
            write_expr(out, condition, 4);
            out.push_str(" ? ");
            write_expr(out, when_true, 0);
            out.push_str(" : ");
            write_expr(out, when_false, 0);
        }
        Expr::Lambda { params, body } => {
            if let [single] = params.as_slice() {
                out.push_str(single);
            } else {
                out.push('(');
                for (i, name) in params.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(name);
                }
                out.push(')');
            }
            out.push_str(" => ");
            write_expr(out, body, 0);
        }
        // A bare guard only appears as a receiver; `write_receiver` handles
        // that case, so this is just the value itself.
        Expr::NullConditional { target } => write_expr(out, target, 28),
    }
}

/// Print a postfix receiver followed by `.` or `?.`.
fn write_receiver(out: &mut String, target: &Expr) {
    if let Expr::NullConditional { target: inner } = target {
        write_expr(out, inner, 28);
        out.push_str("?.");
    } else {
        write_expr(out, target, 28);
        out.push('.');
    }
}

fn write_args(out: &mut String, args: &[std::sync::Arc<Expr>]) {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, arg, 0);
    }
}

fn write_literal(out: &mut String, literal: &Literal) {
    match literal {
        Literal::Null => out.push_str("null"),
        Literal::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Literal::Int(i) => {
            let _ = write!(out, "{i}");
        }
        // {:?} is the shortest representation that reparses to the same bits.
        Literal::Float(f) => {
            let _ = write!(out, "{f:?}");
        }
        Literal::Str(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    '\0' => out.push_str("\\0"),
                    other => out.push(other),
                }
            }
            out.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn canonical(src: &str) -> String {
        unparse(&parse(src).unwrap())
    }

    #[test]
    fn normalizes_whitespace() {
        assert_eq!(canonical("1+2*3"), "1 + 2 * 3");
        assert_eq!(canonical("a  ??b"), "a ?? b");
    }

    #[test]
    fn drops_redundant_parens() {
        assert_eq!(canonical("(a) + (b * c)"), "a + b * c");
        assert_eq!(canonical("((x))"), "x");
    }

    #[test]
    fn keeps_required_parens() {
        assert_eq!(canonical("(1 + 2) * 3"), "(1 + 2) * 3");
        assert_eq!(canonical("-(a + b)"), "-(a + b)");
        assert_eq!(canonical("(a ?? b) ?? c"), "(a ?? b) ?? c");
        assert_eq!(canonical("(a + b).Length"), "(a + b).Length");
    }

    #[test]
    fn postfix_chain_round_trips() {
        assert_eq!(canonical("A.B[0].C"), "A.B[0].C");
        assert_eq!(canonical("a.Foo(1, x).Bar"), "a.Foo(1, x).Bar");
    }

    #[test]
    fn null_conditional_round_trips() {
        assert_eq!(canonical("a?.b.c"), "a?.b.c");
        assert_eq!(canonical("a?.Foo()"), "a?.Foo()");
    }

    #[test]
    fn ternary_and_assignment() {
        assert_eq!(canonical("a ? b : c"), "a ? b : c");
        assert_eq!(canonical("x = a ?? b"), "x = a ?? b");
        assert_eq!(canonical("a ?? b ? c : d"), "a ?? b ? c : d");
    }

    #[test]
    fn lambda_forms() {
        assert_eq!(canonical("x=>x.Name"), "x => x.Name");
        assert_eq!(canonical("(a,b)=>a+b"), "(a, b) => a + b");
    }

    #[test]
    fn literal_forms() {
        assert_eq!(canonical("\"a\\\"b\""), "\"a\\\"b\"");
        assert_eq!(canonical("1.5"), "1.5");
        assert_eq!(canonical("2f"), "2.0");
        assert_eq!(canonical("null"), "null");
    }

    #[test]
    fn reparse_is_structurally_equal() {
        for src in [
            "A.B[0].C",
            "a ?? b ?? c",
            "x = y = z",
            "a?.b.c + 1",
            "(a + b) * -c",
            "cond ? x.Foo(1) : y[2]",
            "(a, b) => a.Name ?? b.Name",
        ] {
            let tree = parse(src).unwrap();
            let printed = unparse(&tree);
            let reparsed = parse(&printed).unwrap();
            assert_eq!(tree, reparsed, "round trip failed for {src:?} -> {printed:?}");
        }
    }
}
