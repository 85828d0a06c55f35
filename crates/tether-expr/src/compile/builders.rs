//! Core node builders.
//!
//! One builder per node family, all at priority 0 except assignment, which
//! outranks the general operator builder so it claims `=` nodes first.
//!
//! Semantics:
//! - mixed int/float arithmetic coerces to float
//! - `+` concatenates when either operand is a string
//! - `?.` yields `Null` for a null receiver and stays sticky down the chain
//! - `??` evaluates its right side only when the left is `Null`
//! - `&&`/`||` short-circuit and require booleans, as does `? :`
//! - `=` writes through member and index left-hand sides and yields the
//!   assigned value

use std::sync::Arc;

use tether_core::provider::{index_get, index_set};
use tether_core::{AccessError, MemberFlags, MemberProvider, Value};

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::compile::{BuildCtx, CompileError, EvaluationError, Evaluator, NodeCompiler};

pub(crate) fn default_set() -> Vec<Arc<dyn NodeCompiler>> {
    let mut set: Vec<Arc<dyn NodeCompiler>> = vec![
        Arc::new(AssignmentCompiler),
        Arc::new(ConstantCompiler),
        Arc::new(ParameterCompiler),
        Arc::new(AccessCompiler),
        Arc::new(CallCompiler),
        Arc::new(OperatorCompiler),
        Arc::new(LambdaGuard),
    ];
    set.sort_by_key(|b| std::cmp::Reverse(b.priority()));
    set
}

fn resolve_member(
    provider: &Arc<dyn MemberProvider>,
    owner: &Value,
    name: &Arc<str>,
    flags: MemberFlags,
) -> Result<Arc<tether_core::MemberDescriptor>, EvaluationError> {
    let type_name = owner.type_name();
    provider
        .try_get_member(&type_name, name, flags)
        .ok_or_else(|| {
            EvaluationError::Access(AccessError::MissingMember {
                type_name,
                member: Arc::clone(name),
            })
        })
}

struct ConstantCompiler;

impl NodeCompiler for ConstantCompiler {
    fn try_compile(
        &self,
        node: &Arc<Expr>,
        _ctx: &BuildCtx<'_>,
    ) -> Option<Result<Evaluator, CompileError>> {
        let Expr::Constant(literal) = &**node else {
            return None;
        };
        let value = match literal {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::Str(Arc::clone(s)),
        };
        Some(Ok(Arc::new(move |_args| Ok(value.clone()))))
    }
}

struct ParameterCompiler;

impl NodeCompiler for ParameterCompiler {
    fn try_compile(
        &self,
        node: &Arc<Expr>,
        ctx: &BuildCtx<'_>,
    ) -> Option<Result<Evaluator, CompileError>> {
        let Expr::Parameter { name } = &**node else {
            return None;
        };
        if let Some(index) = ctx.resolve(name) {
            return Some(Ok(Arc::new(move |args| args.parameter(index))));
        }
        // Free identifiers outside the scope resolve once, at compile time.
        if let Some(resolver) = &ctx.metadata.resolver {
            if let Some(value) = resolver.try_resolve(name) {
                return Some(Ok(Arc::new(move |_args| Ok(value.clone()))));
            }
        }
        Some(Err(CompileError::UnresolvedIdentifier {
            name: Arc::clone(name),
        }))
    }
}

/// Member reads, index reads, and null-conditional guards.
struct AccessCompiler;

impl NodeCompiler for AccessCompiler {
    fn try_compile(
        &self,
        node: &Arc<Expr>,
        ctx: &BuildCtx<'_>,
    ) -> Option<Result<Evaluator, CompileError>> {
        match &**node {
            // The guard is a receiver marker; evaluation is transparent and
            // the enclosing access's `optional` flag does the short-circuit.
            Expr::NullConditional { target } => Some(ctx.compile(target)),
            Expr::Member {
                target,
                name,
                optional,
            } => Some(compile_member_get(ctx, target, name, *optional)),
            Expr::Index {
                target,
                args,
                optional,
            } => Some(compile_index_get(ctx, target, args, *optional)),
            _ => None,
        }
    }
}

fn compile_member_get(
    ctx: &BuildCtx<'_>,
    target: &Arc<Expr>,
    name: &Arc<str>,
    optional: bool,
) -> Result<Evaluator, CompileError> {
    let target_eval = ctx.compile(target)?;
    let provider = ctx.provider();
    let name = Arc::clone(name);
    Ok(Arc::new(move |args| {
        let owner = target_eval(args)?;
        if owner.is_null() {
            return if optional {
                Ok(Value::Null)
            } else {
                Err(EvaluationError::NullReceiver {
                    member: Arc::clone(&name),
                })
            };
        }
        let member = resolve_member(&provider, &owner, &name, MemberFlags::instance_read())?;
        Ok(member.get(&owner, &[])?)
    }))
}

fn compile_index_get(
    ctx: &BuildCtx<'_>,
    target: &Arc<Expr>,
    args: &[Arc<Expr>],
    optional: bool,
) -> Result<Evaluator, CompileError> {
    let target_eval = ctx.compile(target)?;
    let arg_evals = compile_args(ctx, args)?;
    Ok(Arc::new(move |args| {
        let owner = target_eval(args)?;
        if owner.is_null() {
            return if optional {
                Ok(Value::Null)
            } else {
                Err(EvaluationError::NullReceiver {
                    member: Arc::from("Item"),
                })
            };
        }
        let index_args = eval_all(&arg_evals, args)?;
        Ok(index_get(&owner, &index_args)?)
    }))
}

/// Method calls. A bare call (`Foo(x)`) invokes on the first declared
/// parameter, the implicit root.
struct CallCompiler;

impl NodeCompiler for CallCompiler {
    fn try_compile(
        &self,
        node: &Arc<Expr>,
        ctx: &BuildCtx<'_>,
    ) -> Option<Result<Evaluator, CompileError>> {
        let Expr::MethodCall {
            target,
            name,
            args,
            optional,
        } = &**node
        else {
            return None;
        };
        Some(compile_call(ctx, target.as_ref(), name, args, *optional))
    }
}

fn compile_call(
    ctx: &BuildCtx<'_>,
    target: Option<&Arc<Expr>>,
    name: &Arc<str>,
    args: &[Arc<Expr>],
    optional: bool,
) -> Result<Evaluator, CompileError> {
    if args.iter().any(|a| matches!(&**a, Expr::Lambda { .. })) {
        return Err(CompileError::LambdaPosition);
    }
    let target_eval = match target {
        Some(target) => ctx.compile(target)?,
        None => {
            if ctx.arity() == 0 {
                return Err(CompileError::UnresolvedIdentifier {
                    name: Arc::clone(name),
                });
            }
            Arc::new(move |args: &crate::compile::EvalArgs<'_>| args.parameter(0)) as Evaluator
        }
    };
    let arg_evals = compile_args(ctx, args)?;
    let provider = ctx.provider();
    let name = Arc::clone(name);
    Ok(Arc::new(move |args| {
        let owner = target_eval(args)?;
        if owner.is_null() {
            return if optional {
                Ok(Value::Null)
            } else {
                Err(EvaluationError::NullReceiver {
                    member: Arc::clone(&name),
                })
            };
        }
        let call_args = eval_all(&arg_evals, args)?;
        let member = resolve_member(&provider, &owner, &name, MemberFlags::instance_method())?;
        Ok(member.invoke(&owner, &call_args)?)
    }))
}

struct OperatorCompiler;

impl NodeCompiler for OperatorCompiler {
    fn try_compile(
        &self,
        node: &Arc<Expr>,
        ctx: &BuildCtx<'_>,
    ) -> Option<Result<Evaluator, CompileError>> {
        match &**node {
            Expr::Unary { op, operand } => Some(compile_unary(ctx, *op, operand)),
            Expr::Binary { op, left, right } if *op != BinaryOp::Assign => {
                Some(compile_binary(ctx, *op, left, right))
            }
            Expr::Conditional {
                condition,
                when_true,
                when_false,
            } => Some(compile_conditional(ctx, condition, when_true, when_false)),
            _ => None,
        }
    }
}

fn compile_unary(
    ctx: &BuildCtx<'_>,
    op: UnaryOp,
    operand: &Arc<Expr>,
) -> Result<Evaluator, CompileError> {
    let operand = ctx.compile(operand)?;
    Ok(Arc::new(move |args| {
        let value = operand(args)?;
        match (op, &value) {
            (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.wrapping_neg())),
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Plus, Value::Int(_) | Value::Float(_)) => Ok(value),
            (UnaryOp::Neg | UnaryOp::Plus, other) => Err(EvaluationError::TypeMismatch {
                expected: "number",
                found: other.kind(),
            }),
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Not, other) => Err(EvaluationError::TypeMismatch {
                expected: "bool",
                found: other.kind(),
            }),
            (UnaryOp::BitNot, Value::Int(i)) => Ok(Value::Int(!i)),
            (UnaryOp::BitNot, other) => Err(EvaluationError::TypeMismatch {
                expected: "int",
                found: other.kind(),
            }),
        }
    }))
}

fn compile_binary(
    ctx: &BuildCtx<'_>,
    op: BinaryOp,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<Evaluator, CompileError> {
    let left = ctx.compile(left)?;
    let right = ctx.compile(right)?;
    // Lazy forms capture both closures; strict forms evaluate both up front.
    match op {
        BinaryOp::And => Ok(Arc::new(move |args| {
            if expect_bool(left(args)?)? {
                Ok(Value::Bool(expect_bool(right(args)?)?))
            } else {
                Ok(Value::Bool(false))
            }
        })),
        BinaryOp::Or => Ok(Arc::new(move |args| {
            if expect_bool(left(args)?)? {
                Ok(Value::Bool(true))
            } else {
                Ok(Value::Bool(expect_bool(right(args)?)?))
            }
        })),
        BinaryOp::Coalesce => Ok(Arc::new(move |args| {
            let value = left(args)?;
            if value.is_null() { right(args) } else { Ok(value) }
        })),
        _ => Ok(Arc::new(move |args| {
            strict_binary(op, left(args)?, right(args)?)
        })),
    }
}

fn strict_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvaluationError> {
    match op {
        BinaryOp::Add => {
            if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
                return Ok(Value::Str(Arc::from(format!("{left}{right}").as_str())));
            }
            numeric(&left, &right, |a, b| a.wrapping_add(b), |a, b| a + b)
        }
        BinaryOp::Sub => numeric(&left, &right, |a, b| a.wrapping_sub(b), |a, b| a - b),
        BinaryOp::Mul => numeric(&left, &right, |a, b| a.wrapping_mul(b), |a, b| a * b),
        BinaryOp::Div => match pair(&left, &right)? {
            NumericPair::Ints(_, 0) => Err(EvaluationError::DivideByZero),
            NumericPair::Ints(a, b) => Ok(Value::Int(a.wrapping_div(b))),
            NumericPair::Floats(a, b) => Ok(Value::Float(a / b)),
        },
        BinaryOp::Rem => match pair(&left, &right)? {
            NumericPair::Ints(_, 0) => Err(EvaluationError::DivideByZero),
            NumericPair::Ints(a, b) => Ok(Value::Int(a.wrapping_rem(b))),
            NumericPair::Floats(a, b) => Ok(Value::Float(a % b)),
        },
        BinaryOp::Shl => int_pair(&left, &right).map(|(a, b)| Value::Int(a.wrapping_shl(b as u32))),
        BinaryOp::Shr => int_pair(&left, &right).map(|(a, b)| Value::Int(a.wrapping_shr(b as u32))),
        BinaryOp::BitAnd => int_pair(&left, &right).map(|(a, b)| Value::Int(a & b)),
        BinaryOp::BitOr => int_pair(&left, &right).map(|(a, b)| Value::Int(a | b)),
        BinaryOp::BitXor => int_pair(&left, &right).map(|(a, b)| Value::Int(a ^ b)),
        BinaryOp::Eq => Ok(Value::Bool(left == right)),
        BinaryOp::Ne => Ok(Value::Bool(left != right)),
        BinaryOp::Lt => compare(&left, &right, |o| o.is_lt()),
        BinaryOp::Le => compare(&left, &right, |o| o.is_le()),
        BinaryOp::Gt => compare(&left, &right, |o| o.is_gt()),
        BinaryOp::Ge => compare(&left, &right, |o| o.is_ge()),
        BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce | BinaryOp::Assign => {
            unreachable!("handled by dedicated evaluators")
        }
    }
}

enum NumericPair {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn pair(left: &Value, right: &Value) -> Result<NumericPair, EvaluationError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(NumericPair::Ints(*a, *b)),
        (a, b) if a.is_numeric() && b.is_numeric() => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => Ok(NumericPair::Floats(a, b)),
            _ => Err(EvaluationError::TypeMismatch {
                expected: "number",
                found: left.kind(),
            }),
        },
        (a, b) => Err(EvaluationError::TypeMismatch {
            expected: "number",
            found: if a.is_numeric() { b.kind() } else { a.kind() },
        }),
    }
}

fn numeric(
    left: &Value,
    right: &Value,
    ints: impl Fn(i64, i64) -> i64,
    floats: impl Fn(f64, f64) -> f64,
) -> Result<Value, EvaluationError> {
    match pair(left, right)? {
        NumericPair::Ints(a, b) => Ok(Value::Int(ints(a, b))),
        NumericPair::Floats(a, b) => Ok(Value::Float(floats(a, b))),
    }
}

fn int_pair(left: &Value, right: &Value) -> Result<(i64, i64), EvaluationError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok((*a, *b)),
        (a, b) => Err(EvaluationError::TypeMismatch {
            expected: "int",
            found: if matches!(a, Value::Int(_)) {
                b.kind()
            } else {
                a.kind()
            },
        }),
    }
}

fn compare(
    left: &Value,
    right: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, EvaluationError> {
    let ordering = match pair(left, right)? {
        NumericPair::Ints(a, b) => a.cmp(&b),
        NumericPair::Floats(a, b) => {
            a.partial_cmp(&b).ok_or(EvaluationError::TypeMismatch {
                expected: "comparable number",
                found: left.kind(),
            })?
        }
    };
    Ok(Value::Bool(accept(ordering)))
}

fn expect_bool(value: Value) -> Result<bool, EvaluationError> {
    value.as_bool().ok_or(EvaluationError::TypeMismatch {
        expected: "bool",
        found: value.kind(),
    })
}

fn compile_conditional(
    ctx: &BuildCtx<'_>,
    condition: &Arc<Expr>,
    when_true: &Arc<Expr>,
    when_false: &Arc<Expr>,
) -> Result<Evaluator, CompileError> {
    let condition = ctx.compile(condition)?;
    let when_true = ctx.compile(when_true)?;
    let when_false = ctx.compile(when_false)?;
    Ok(Arc::new(move |args| {
        if expect_bool(condition(args)?)? {
            when_true(args)
        } else {
            when_false(args)
        }
    }))
}

/// `=` through member and index left-hand sides. Outranks the operator
/// builder so assignment nodes never reach it.
struct AssignmentCompiler;

impl NodeCompiler for AssignmentCompiler {
    fn priority(&self) -> i32 {
        10
    }

    fn try_compile(
        &self,
        node: &Arc<Expr>,
        ctx: &BuildCtx<'_>,
    ) -> Option<Result<Evaluator, CompileError>> {
        let Expr::Binary {
            op: BinaryOp::Assign,
            left,
            right,
        } = &**node
        else {
            return None;
        };
        Some(compile_assign(ctx, left, right))
    }
}

fn compile_assign(
    ctx: &BuildCtx<'_>,
    left: &Arc<Expr>,
    right: &Arc<Expr>,
) -> Result<Evaluator, CompileError> {
    let value_eval = ctx.compile(right)?;
    match &**left {
        Expr::Member {
            target,
            name,
            optional,
        } => {
            let target_eval = ctx.compile(target)?;
            let provider = ctx.provider();
            let name = Arc::clone(name);
            let optional = *optional;
            Ok(Arc::new(move |args| {
                let owner = target_eval(args)?;
                if owner.is_null() {
                    return if optional {
                        Ok(Value::Null)
                    } else {
                        Err(EvaluationError::NullReceiver {
                            member: Arc::clone(&name),
                        })
                    };
                }
                let value = value_eval(args)?;
                let member =
                    resolve_member(&provider, &owner, &name, MemberFlags::instance_write())?;
                member.set(&owner, &[], value.clone())?;
                Ok(value)
            }))
        }
        Expr::Index {
            target,
            args,
            optional,
        } => {
            let target_eval = ctx.compile(target)?;
            let arg_evals = compile_args(ctx, args)?;
            let optional = *optional;
            Ok(Arc::new(move |args| {
                let owner = target_eval(args)?;
                if owner.is_null() {
                    return if optional {
                        Ok(Value::Null)
                    } else {
                        Err(EvaluationError::NullReceiver {
                            member: Arc::from("Item"),
                        })
                    };
                }
                let index_args = eval_all(&arg_evals, args)?;
                let value = value_eval(args)?;
                index_set(&owner, &index_args, value.clone())?;
                Ok(value)
            }))
        }
        other => Err(CompileError::InvalidAssignTarget {
            kind: other.kind_name(),
        }),
    }
}

/// Rejects lambdas anywhere below the root.
struct LambdaGuard;

impl NodeCompiler for LambdaGuard {
    fn priority(&self) -> i32 {
        -10
    }

    fn try_compile(
        &self,
        node: &Arc<Expr>,
        _ctx: &BuildCtx<'_>,
    ) -> Option<Result<Evaluator, CompileError>> {
        matches!(&**node, Expr::Lambda { .. }).then_some(Err(CompileError::LambdaPosition))
    }
}

fn compile_args(ctx: &BuildCtx<'_>, args: &[Arc<Expr>]) -> Result<Vec<Evaluator>, CompileError> {
    args.iter().map(|arg| ctx.compile(arg)).collect()
}

fn eval_all(
    evals: &[Evaluator],
    args: &crate::compile::EvalArgs<'_>,
) -> Result<Vec<Value>, EvaluationError> {
    evals.iter().map(|eval| eval(args)).collect()
}
