//! Expression nodes and their `Check` implementation.

use std::rc::Rc;

use super::{resolve_type_spec, Check, TypeSpec};
use crate::environment::{Environment, Lvar, LvarKind};
use crate::error::{ProgramError, SemaResult, TypeError};
use crate::types::Type;

fn void() -> Type {
    Type::Raw("Void".to_string())
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Clone, Debug)]
pub struct Literal<Info> {
    pub value: LiteralValue,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct LvarRef<Info> {
    pub name: String,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct IvarRef<Info> {
    pub name: String,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct ConstRef<Info> {
    pub name: String,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct AssignLvar<Info> {
    pub name: String,
    pub value: Box<Expression<Info>>,
    pub is_var: bool,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct AssignIvar<Info> {
    pub name: String,
    pub value: Box<Expression<Info>>,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct If<Info> {
    pub cond: Box<Expression<Info>>,
    pub then_branch: Vec<Expression<Info>>,
    pub else_branch: Vec<Expression<Info>>,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct MethodCall<Info> {
    pub receiver: Box<Expression<Info>>,
    pub method_name: String,
    pub args: Vec<Expression<Info>>,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct ArrayExpr<Info> {
    pub elements: Vec<Expression<Info>>,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct ClassSpecialization<Info> {
    pub class_expr: Box<Expression<Info>>,
    pub type_args: Vec<Expression<Info>>,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct Return<Info> {
    pub value: Box<Expression<Info>>,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct Lambda<Info> {
    pub params: Vec<(String, TypeSpec)>,
    pub captures: Vec<String>,
    pub body: Vec<Expression<Info>>,
    pub info: Info,
}

#[derive(Clone, Debug)]
pub struct LambdaCall<Info> {
    pub target: Box<Expression<Info>>,
    pub args: Vec<Expression<Info>>,
    pub info: Info,
}

/// The closed, tagged-variant expression list, exhaustively.
#[derive(Clone, Debug)]
pub enum Expression<Info> {
    Literal(Literal<Info>),
    LvarRef(LvarRef<Info>),
    IvarRef(IvarRef<Info>),
    ConstRef(ConstRef<Info>),
    AssignLvar(AssignLvar<Info>),
    AssignIvar(AssignIvar<Info>),
    If(If<Info>),
    MethodCall(MethodCall<Info>),
    ArrayExpr(ArrayExpr<Info>),
    ClassSpecialization(ClassSpecialization<Info>),
    Return(Return<Info>),
    Lambda(Lambda<Info>),
    LambdaCall(LambdaCall<Info>),
}

impl<Info> Expression<Info> {
    pub fn info(&self) -> &Info {
        match self {
            Expression::Literal(n) => &n.info,
            Expression::LvarRef(n) => &n.info,
            Expression::IvarRef(n) => &n.info,
            Expression::ConstRef(n) => &n.info,
            Expression::AssignLvar(n) => &n.info,
            Expression::AssignIvar(n) => &n.info,
            Expression::If(n) => &n.info,
            Expression::MethodCall(n) => &n.info,
            Expression::ArrayExpr(n) => &n.info,
            Expression::ClassSpecialization(n) => &n.info,
            Expression::Return(n) => &n.info,
            Expression::Lambda(n) => &n.info,
            Expression::LambdaCall(n) => &n.info,
        }
    }
}

impl Check for Expression<()> {
    type Typed = Expression<Type>;

    fn check(self, env: &Environment) -> SemaResult<(Expression<Type>, Environment)> {
        match self {
            Expression::Literal(n) => {
                let ty = match n.value {
                    LiteralValue::Int(_) => Type::Raw("Int".to_string()),
                    LiteralValue::Float(_) => Type::Raw("Float".to_string()),
                    LiteralValue::Bool(_) => Type::Raw("Bool".to_string()),
                };
                Ok((Expression::Literal(Literal { value: n.value, info: ty }), env.clone()))
            }

            Expression::LvarRef(n) => {
                let lvar = env.find_lvar(&n.name, false)?.expect("present when allow_missing is false");
                Ok((Expression::LvarRef(LvarRef { name: n.name, info: lvar.type_ }), env.clone()))
            }

            Expression::IvarRef(n) => {
                let ty = env.find_ivar(&n.name)?;
                Ok((Expression::IvarRef(IvarRef { name: n.name, info: ty }), env.clone()))
            }

            Expression::ConstRef(n) => {
                let ty = env.find_const(&n.name)?;
                Ok((Expression::ConstRef(ConstRef { name: n.name, info: ty }), env.clone()))
            }

            Expression::AssignLvar(n) => check_assign_lvar(n, env),
            Expression::AssignIvar(n) => check_assign_ivar(n, env),
            Expression::If(n) => check_if(n, env),
            Expression::MethodCall(n) => check_method_call(n, env),
            Expression::ArrayExpr(n) => check_array(n, env),
            Expression::ClassSpecialization(n) => check_class_specialization(n, env),
            Expression::Return(n) => check_return(n, env),
            Expression::Lambda(n) => check_lambda(n, env),
            Expression::LambdaCall(n) => check_lambda_call(n, env),
        }
    }
}

fn check_assign_lvar(n: AssignLvar<()>, env: &Environment) -> SemaResult<(Expression<Type>, Environment)> {
    let (typed_value, env_after_value) = n.value.check(env)?;
    let value_ty = typed_value.info().clone();
    Environment::reject_void(&n.name, &value_ty)?;

    let existing = env_after_value.find_lvar(&n.name, true)?;
    let next_env = match existing {
        Some(lvar) => {
            if lvar.kind == LvarKind::Special {
                return Err(ProgramError::ImmutableCapture { name: n.name.clone() }.into());
            }
            if !lvar.is_reassignable() {
                return Err(ProgramError::ImmutableReassign { name: n.name.clone() }.into());
            }
            if !env_after_value.conforms_to(&value_ty, &lvar.type_) {
                return Err(TypeError::Mismatch { expected: lvar.type_, actual: value_ty.clone() }.into());
            }
            env_after_value.with_local(Lvar { name: n.name.clone(), type_: value_ty.clone(), kind: lvar.kind })
        }
        None => {
            let kind = if n.is_var { LvarKind::Var } else { LvarKind::Let };
            env_after_value.with_local(Lvar { name: n.name.clone(), type_: value_ty.clone(), kind })
        }
    };

    let node = Expression::AssignLvar(AssignLvar {
        name: n.name,
        value: Box::new(typed_value),
        is_var: n.is_var,
        info: value_ty,
    });
    Ok((node, next_env))
}

fn check_assign_ivar(n: AssignIvar<()>, env: &Environment) -> SemaResult<(Expression<Type>, Environment)> {
    let ivar_ty = env.find_ivar(&n.name)?;
    let (typed_value, env_after_value) = n.value.check(env)?;
    let value_ty = typed_value.info().clone();

    if value_ty != ivar_ty {
        return Err(TypeError::IvarTypeMismatch { ivar: n.name, declared: ivar_ty, actual: value_ty }.into());
    }

    let node = Expression::AssignIvar(AssignIvar { name: n.name, value: Box::new(typed_value), info: value_ty });
    Ok((node, env_after_value))
}

fn check_if(n: If<()>, env: &Environment) -> SemaResult<(Expression<Type>, Environment)> {
    let (typed_cond, env_after_cond) = n.cond.check(env)?;
    let cond_ty = typed_cond.info().clone();
    if cond_ty != Type::Raw("Bool".to_string()) {
        return Err(TypeError::NonBooleanCondition { actual: cond_ty }.into());
    }

    let (typed_then, then_ty, _) = super::check_sequence(n.then_branch, &env_after_cond)?;
    let (typed_else, else_ty, _) = super::check_sequence(n.else_branch, &env_after_cond)?;

    let void = void();
    let result_ty = match (then_ty == void, else_ty == void) {
        (true, true) => void,
        (false, false) if then_ty == else_ty => then_ty,
        (false, false) => {
            return Err(TypeError::BranchMismatch { then_ty, else_ty }.into());
        }
        (true, false) => else_ty,
        (false, true) => then_ty,
    };

    let node = Expression::If(If {
        cond: Box::new(typed_cond),
        then_branch: typed_then,
        else_branch: typed_else,
        info: result_ty,
    });
    Ok((node, env_after_cond))
}

fn check_method_call(n: MethodCall<()>, env: &Environment) -> SemaResult<(Expression<Type>, Environment)> {
    let mut current_env = env.clone();
    let mut typed_args = Vec::with_capacity(n.args.len());
    for arg in n.args {
        let (typed_arg, next_env) = arg.check(&current_env)?;
        typed_args.push(typed_arg);
        current_env = next_env;
    }

    let (typed_receiver, env_after_receiver) = n.receiver.check(&current_env)?;
    let receiver_ty = typed_receiver.info().clone();

    let method = env_after_receiver.find_method(&receiver_ty, &n.method_name)?;
    let (head, vararg, tail) = method.head_tail();

    let min_arity = head.len() + tail.len();
    if vararg.is_none() && typed_args.len() != min_arity {
        return Err(TypeError::ArityMismatch {
            method: n.method_name.clone(),
            expected: min_arity,
            actual: typed_args.len(),
        }
        .into());
    }
    if vararg.is_some() && typed_args.len() < min_arity {
        return Err(TypeError::ArityMismatch {
            method: n.method_name.clone(),
            expected: min_arity,
            actual: typed_args.len(),
        }
        .into());
    }

    let tail_start = typed_args.len() - tail.len();

    for (i, param) in head.iter().enumerate() {
        let actual = typed_args[i].info().clone();
        if !env_after_receiver.conforms_to(&actual, &param.type_spec) {
            return Err(TypeError::ArgumentMismatch {
                method: n.method_name.clone(),
                index: i,
                expected: param.type_spec.clone(),
                actual,
            }
            .into());
        }
    }

    for (offset, param) in tail.iter().enumerate() {
        let i = tail_start + offset;
        let actual = typed_args[i].info().clone();
        if !env_after_receiver.conforms_to(&actual, &param.type_spec) {
            return Err(TypeError::ArgumentMismatch {
                method: n.method_name.clone(),
                index: i,
                expected: param.type_spec.clone(),
                actual,
            }
            .into());
        }
    }

    if let Some(vararg_param) = vararg {
        let element_type = match &vararg_param.type_spec {
            Type::Spe(name, ts) if name == "Array" && ts.len() == 1 => ts[0].clone(),
            other => return Err(TypeError::VarargNotArray { declared: other.clone() }.into()),
        };
        for i in head.len()..tail_start {
            let actual = typed_args[i].info().clone();
            if actual != element_type {
                return Err(TypeError::VarargElementMismatch { expected: element_type, actual }.into());
            }
        }
        env_after_receiver.registry().specialize("Array", vec![element_type])?;
    }

    let node = Expression::MethodCall(MethodCall {
        receiver: Box::new(typed_receiver),
        method_name: n.method_name,
        args: typed_args,
        info: method.return_type.clone(),
    });
    Ok((node, env_after_receiver))
}

fn check_array(n: ArrayExpr<()>, env: &Environment) -> SemaResult<(Expression<Type>, Environment)> {
    if n.elements.is_empty() {
        return Err(TypeError::EmptyArrayLiteral.into());
    }

    let mut current_env = env.clone();
    let mut typed_elements = Vec::with_capacity(n.elements.len());
    for element in n.elements {
        let (typed_element, next_env) = element.check(&current_env)?;
        typed_elements.push(typed_element);
        current_env = next_env;
    }

    let element_type = typed_elements[0].info().clone();
    for elem in &typed_elements[1..] {
        let actual = elem.info().clone();
        if actual != element_type {
            return Err(TypeError::Mismatch { expected: element_type, actual }.into());
        }
    }

    current_env.registry().specialize("Array", vec![element_type.clone()])?;

    let node = Expression::ArrayExpr(ArrayExpr {
        elements: typed_elements,
        info: Type::Spe("Array".to_string(), vec![element_type]),
    });
    Ok((node, current_env))
}

fn check_class_specialization(
    n: ClassSpecialization<()>,
    env: &Environment,
) -> SemaResult<(Expression<Type>, Environment)> {
    let (typed_class_expr, env_after_class) = n.class_expr.check(env)?;
    let (name, _param_names) = match typed_class_expr.info() {
        Type::GenMeta(name, params) => (name.clone(), params.clone()),
        other => return Err(TypeError::ExpectedGenericMeta { actual: other.clone() }.into()),
    };

    let mut current_env = env_after_class;
    let mut typed_type_args = Vec::with_capacity(n.type_args.len());
    let mut instance_types = Vec::with_capacity(n.type_args.len());
    for arg in n.type_args {
        let (typed_arg, next_env) = arg.check(&current_env)?;
        let instance_ty = match typed_arg.info() {
            Type::Meta(t) => Type::Raw(t.clone()),
            other => return Err(TypeError::ExpectedClassConstant { actual: other.clone() }.into()),
        };
        instance_types.push(instance_ty);
        typed_type_args.push(typed_arg);
        current_env = next_env;
    }

    current_env.registry().specialize(&name, instance_types.clone())?;

    let node = Expression::ClassSpecialization(ClassSpecialization {
        class_expr: Box::new(typed_class_expr),
        type_args: typed_type_args,
        info: Type::SpeMeta(name, instance_types),
    });
    Ok((node, current_env))
}

fn check_return(n: Return<()>, env: &Environment) -> SemaResult<(Expression<Type>, Environment)> {
    let (typed_value, env_after_value) = n.value.check(env)?;
    let node = Expression::Return(Return { value: Box::new(typed_value), info: void() });
    Ok((node, env_after_value))
}

fn check_lambda(n: Lambda<()>, env: &Environment) -> SemaResult<(Expression<Type>, Environment)> {
    let mut body_env = env.clone();

    for name in &n.captures {
        let captured = env.find_lvar(name, false)?.expect("present when allow_missing is false");
        body_env = body_env.with_local(Lvar { name: name.clone(), type_: captured.type_, kind: LvarKind::Special });
    }

    let mut param_types = Vec::with_capacity(n.params.len());
    for (name, spec) in &n.params {
        let ty = resolve_type_spec(spec, &body_env)?;
        param_types.push(ty.clone());
        body_env = body_env.with_local(Lvar { name: name.clone(), type_: ty, kind: LvarKind::Param });
    }

    let (typed_body, body_ty, _) = super::check_sequence(n.body, &body_env)?;

    let mut type_args = param_types;
    type_args.push(body_ty);
    let lambda_ty = env.registry().specialize("Lambda", type_args)?.0.type_id();

    let node = Expression::Lambda(Lambda { params: n.params, captures: n.captures, body: typed_body, info: lambda_ty });
    Ok((node, env.clone()))
}

fn check_lambda_call(n: LambdaCall<()>, env: &Environment) -> SemaResult<(Expression<Type>, Environment)> {
    let (typed_target, env_after_target) = n.target.check(env)?;
    let signature = match typed_target.info() {
        Type::Spe(name, ts) if name == "Lambda" && !ts.is_empty() => ts.clone(),
        other => return Err(TypeError::NotCallable { actual: other.clone() }.into()),
    };
    let (param_types, return_type) = signature.split_at(signature.len() - 1);
    let return_type = return_type[0].clone();

    if n.args.len() != param_types.len() {
        return Err(TypeError::ArityMismatch {
            method: "call".to_string(),
            expected: param_types.len(),
            actual: n.args.len(),
        }
        .into());
    }

    let mut current_env = env_after_target;
    let mut typed_args = Vec::with_capacity(n.args.len());
    for (i, arg) in n.args.into_iter().enumerate() {
        let (typed_arg, next_env) = arg.check(&current_env)?;
        let actual = typed_arg.info().clone();
        if !next_env.conforms_to(&actual, &param_types[i]) {
            return Err(TypeError::ArgumentMismatch {
                method: "call".to_string(),
                index: i,
                expected: param_types[i].clone(),
                actual,
            }
            .into());
        }
        typed_args.push(typed_arg);
        current_env = next_env;
    }

    let node = Expression::LambdaCall(LambdaCall { target: Box::new(typed_target), args: typed_args, info: return_type });
    Ok((node, current_env))
}

/// Collect the declared-type of every `Return` reachable from `expr`
/// without descending into a nested `Lambda`'s body (each lambda
/// validates its own returns independently).
pub fn collect_returns(expr: &Expression<Type>, out: &mut Vec<Type>) {
    match expr {
        Expression::Return(n) => {
            out.push(n.value.info().clone());
            collect_returns(&n.value, out);
        }
        Expression::If(n) => {
            collect_returns(&n.cond, out);
            for s in &n.then_branch {
                collect_returns(s, out);
            }
            for s in &n.else_branch {
                collect_returns(s, out);
            }
        }
        Expression::MethodCall(n) => {
            collect_returns(&n.receiver, out);
            for a in &n.args {
                collect_returns(a, out);
            }
        }
        Expression::AssignLvar(n) => collect_returns(&n.value, out),
        Expression::AssignIvar(n) => collect_returns(&n.value, out),
        Expression::ArrayExpr(n) => {
            for e in &n.elements {
                collect_returns(e, out);
            }
        }
        Expression::ClassSpecialization(n) => {
            collect_returns(&n.class_expr, out);
            for a in &n.type_args {
                collect_returns(a, out);
            }
        }
        Expression::LambdaCall(n) => {
            collect_returns(&n.target, out);
            for a in &n.args {
                collect_returns(a, out);
            }
        }
        Expression::Literal(_)
        | Expression::LvarRef(_)
        | Expression::IvarRef(_)
        | Expression::ConstRef(_)
        | Expression::Lambda(_) => {}
    }
}
