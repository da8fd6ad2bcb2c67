//! Program tree and the `Check` ("add_type") protocol.
//!
//! Every node is generic over `Info`: `Info = ()` for the tree as supplied
//! by the parser, `Info = Type` for the tree this crate hands back. There
//! is no `check` method defined for an `Expression<Type>` — the method only
//! exists on `Expression<()>` — so re-checking an already-typed node is a
//! compile error rather than a runtime-checked invariant.

pub mod class;
pub mod expression;
pub mod method;

use crate::environment::Environment;
use crate::error::SemaResult;
use crate::types::Type;

pub use class::ClassDecl;
pub use expression::Expression;
pub use method::MethodDecl;

/// A type annotation as written by the parser: a bare class name, or a
/// generic application such as `Array<Int>`. Resolved against an
/// [`Environment`] via [`resolve_type_spec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeSpec {
    Named(String),
    Applied(String, Vec<TypeSpec>),
}

impl TypeSpec {
    pub fn named(name: impl Into<String>) -> Self {
        TypeSpec::Named(name.into())
    }

    pub fn applied(name: impl Into<String>, args: Vec<TypeSpec>) -> Self {
        TypeSpec::Applied(name.into(), args)
    }
}

/// Resolves a [`TypeSpec`] to a [`Type`], materializing generic
/// specializations on demand so that any `Spe(g, ts)` mentioned in a type
/// annotation is registered even if no expression ever constructs a value
/// of that type directly.
pub fn resolve_type_spec(spec: &TypeSpec, env: &Environment) -> SemaResult<Type> {
    match spec {
        TypeSpec::Named(name) => {
            if let Some(p) = env.find_typaram(name) {
                return Ok(p);
            }
            env.find_class(name)?;
            Ok(Type::Raw(name.clone()))
        }
        TypeSpec::Applied(name, arg_specs) => {
            let args = arg_specs
                .iter()
                .map(|a| resolve_type_spec(a, env))
                .collect::<SemaResult<Vec<_>>>()?;
            let (spe, _meta) = env.registry().specialize(name, args.clone())?;
            Ok(spe.type_id())
        }
    }
}

/// The root input to analysis. `classes` holds every top-level
/// class/generic-class declaration; `main` is the top-level statement
/// sequence.
pub struct UntypedProgram {
    pub classes: Vec<ClassDecl<()>>,
    pub main: Vec<Expression<()>>,
}

/// The output of analysis: the same tree with every type slot populated,
/// plus the registry (now containing every specialization discovered
/// along the way).
pub struct TypedProgram {
    pub classes: Vec<ClassDecl<Type>>,
    pub main: Vec<Expression<Type>>,
    pub main_type: Type,
}

/// One node in the `Check`/`add_type` protocol: consumes `self` by value,
/// returns its typed counterpart and the (possibly extended) environment
/// visible to the following sibling.
pub trait Check {
    type Typed;
    fn check(self, env: &Environment) -> SemaResult<(Self::Typed, Environment)>;
}

/// Thread `check` across a statement sequence left-to-right: the
/// environment extension from statement i is visible to statement i+1.
/// Returns the typed statements, the type of
/// the last one (or `Void` if the sequence is empty), and the environment
/// after the last statement — callers that must not leak branch-local
/// bindings (e.g. `If`) discard that last environment.
pub fn check_sequence(
    stmts: Vec<Expression<()>>,
    env: &Environment,
) -> SemaResult<(Vec<Expression<Type>>, Type, Environment)> {
    let mut current_env = env.clone();
    let mut typed = Vec::with_capacity(stmts.len());
    let mut last_type = Type::Raw("Void".to_string());

    for stmt in stmts {
        let (typed_stmt, next_env) = stmt.check(&current_env)?;
        last_type = typed_stmt.info().clone();
        typed.push(typed_stmt);
        current_env = next_env;
    }

    Ok((typed, last_type, current_env))
}

/// Recursively collect the declared-type of every `Return` node reachable
/// from a statement sequence, without descending into nested method/lambda
/// bodies (those validate their own returns independently). Always walks
/// `(stmts, declared_return)`, never the reverse.
pub fn collect_return_types(stmts: &[Expression<Type>], out: &mut Vec<Type>) {
    for stmt in stmts {
        expression::collect_returns(stmt, out);
    }
}
