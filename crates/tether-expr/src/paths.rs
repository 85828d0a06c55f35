//! Source-path extraction.
//!
//! A compiled expression re-evaluates when any of its observable inputs
//! change. [`source_paths`] walks a tree and returns the member/index chains
//! rooted at a free parameter, rendered as canonical path text
//! (`"A.B.C"`, `"Items[0].Name"`, `"a?.b"`). Chains broken by a method call
//! or a non-constant index fall back to their longest observable prefix, and
//! the breaking sub-expressions are scanned for chains of their own.
//!
//! Names bound by an enclosing lambda are not free and never produce paths.

use std::sync::Arc;

use crate::ast::{Expr, Literal};

/// Collect the distinct observable member chains of `expr`, in first-seen
/// order.
#[must_use]
pub fn source_paths(expr: &Expr) -> Vec<String> {
    let mut out = Vec::new();
    let mut bound = Vec::new();
    collect(expr, &mut bound, &mut out);
    out
}

fn collect(expr: &Expr, bound: &mut Vec<Arc<str>>, out: &mut Vec<String>) {
    if let Some(path) = render_chain(expr, bound) {
        if !out.contains(&path) {
            out.push(path);
        }
        return;
    }
    match expr {
        Expr::Constant(_) | Expr::Parameter { .. } => {}
        Expr::Member { target, .. } | Expr::NullConditional { target } => {
            collect(target, bound, out);
        }
        Expr::Index { target, args, .. } => {
            collect(target, bound, out);
            for arg in args {
                collect(arg, bound, out);
            }
        }
        Expr::MethodCall { target, args, .. } => {
            if let Some(target) = target {
                collect(target, bound, out);
            }
            for arg in args {
                collect(arg, bound, out);
            }
        }
        Expr::Unary { operand, .. } => collect(operand, bound, out),
        Expr::Binary { left, right, .. } => {
            collect(left, bound, out);
            collect(right, bound, out);
        }
        Expr::Conditional {
            condition,
            when_true,
            when_false,
        } => {
            collect(condition, bound, out);
            collect(when_true, bound, out);
            collect(when_false, bound, out);
        }
        Expr::Lambda { params, body } => {
            let depth = bound.len();
            bound.extend(params.iter().cloned());
            collect(body, bound, out);
            bound.truncate(depth);
        }
    }
}

/// Render a pure member/index chain, or `None` when `expr` is not one.
fn render_chain(expr: &Expr, bound: &[Arc<str>]) -> Option<String> {
    match expr {
        Expr::Parameter { name } => {
            if bound.iter().any(|b| b == name) {
                None
            } else {
                Some(name.to_string())
            }
        }
        Expr::NullConditional { target } => render_chain(target, bound),
        Expr::Member { target, name, .. } => {
            let mut path = render_chain(target, bound)?;
            path.push_str(if matches!(&**target, Expr::NullConditional { .. }) {
                "?."
            } else {
                "."
            });
            path.push_str(name);
            Some(path)
        }
        Expr::Index { target, args, .. } => {
            let mut path = render_chain(target, bound)?;
            path.push('[');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    path.push_str(", ");
                }
                match &**arg {
                    Expr::Constant(Literal::Int(v)) => {
                        path.push_str(&v.to_string());
                    }
                    Expr::Constant(Literal::Str(s)) => {
                        path.push('"');
                        path.push_str(s);
                        path.push('"');
                    }
                    _ => return None,
                }
            }
            path.push(']');
            Some(path)
        }
        _ => None,
    }
}
