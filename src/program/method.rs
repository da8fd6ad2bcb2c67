//! Method declarations and their checking.

use super::class::ParamDecl;
use super::{check_sequence, collect_return_types, resolve_type_spec, Expression, TypeSpec};
use crate::environment::{Environment, Lvar, LvarKind};
use crate::error::SemaResult;
use crate::registry::{Body, Method, Param};
use crate::types::Type;

/// Either the sentinel "create object" marker, recognized by the
/// standard-library manifest, or a real, parsed statement sequence.
#[derive(Clone, Debug)]
pub enum MethodBody<Info> {
    CreateObject,
    Statements(Vec<Expression<Info>>),
}

#[derive(Clone, Debug)]
pub struct MethodDecl<Info> {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub return_type: TypeSpec,
    pub body: MethodBody<Info>,
    pub info: Info,
}

impl<Info> MethodDecl<Info> {
    pub fn is_create_object_marker(&self) -> bool {
        matches!(self.body, MethodBody::CreateObject)
    }
}

/// Checks a method's parameters, return type, and body. Returns the
/// checked declaration (for the typed program tree) and the final
/// [`Method`] (for the registry).
pub fn check_method(decl: MethodDecl<()>, env: &Environment) -> SemaResult<(MethodDecl<Type>, Method)> {
    let mut params = Vec::with_capacity(decl.params.len());
    let mut method_env = env.clone();
    for p in &decl.params {
        let ty = resolve_type_spec(&p.type_spec, env)?;
        params.push(Param { name: p.name.clone(), type_spec: ty.clone(), is_vararg: p.is_vararg });
        method_env = method_env.with_local(Lvar { name: p.name.clone(), type_: ty, kind: LvarKind::Param });
    }
    let return_type = resolve_type_spec(&decl.return_type, env)?;

    let (checked_body, method_body) = match decl.body {
        MethodBody::CreateObject => (MethodBody::CreateObject, Body::CreateObject),
        MethodBody::Statements(stmts) => {
            let (typed_stmts, body_type, _) = check_sequence(stmts, &method_env)?;

            let void = Type::Raw("Void".to_string());
            if return_type != void {
                let last_is_return = matches!(typed_stmts.last(), Some(Expression::Return(_)));
                if !last_is_return && body_type != return_type {
                    return Err(crate::error::TypeError::ReturnMismatch {
                        declared: return_type.clone(),
                        actual: body_type,
                    }
                    .into());
                }
            }

            let mut returns = Vec::new();
            collect_return_types(&typed_stmts, &mut returns);
            for actual in returns {
                if actual != return_type {
                    return Err(crate::error::TypeError::ReturnMismatch {
                        declared: return_type.clone(),
                        actual,
                    }
                    .into());
                }
            }

            (MethodBody::Statements(typed_stmts.clone()), Body::Statements(typed_stmts))
        }
    };

    let method = Method { name: decl.name.clone(), params: params.clone(), return_type: return_type.clone(), body: method_body };
    let checked_decl = MethodDecl {
        name: decl.name,
        params: decl.params,
        return_type: decl.return_type,
        body: checked_body,
        info: method.signature(),
    };
    Ok((checked_decl, method))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::expression::{Literal, LiteralValue, Return};
    use crate::registry::{Class, Entry, Registry};
    use std::collections::HashMap;
    use std::rc::Rc;

    fn base_env() -> Environment {
        let reg = Registry::new();
        for name in ["Object", "Int", "Bool", "Float", "Void"] {
            reg.insert(
                name,
                Entry::Class(Rc::new(Class {
                    name: name.to_string(),
                    superclass_template: Type::NoParent,
                    ivars: vec![],
                    class_methods: HashMap::new(),
                    instance_methods: HashMap::new(),
                })),
            );
        }
        Environment::new(Rc::new(reg))
    }

    #[test]
    fn method_with_mismatched_last_statement_type_errors() {
        let env = base_env();
        let decl = MethodDecl {
            name: "foo".into(),
            params: vec![],
            return_type: TypeSpec::named("Int"),
            body: MethodBody::Statements(vec![Expression::Literal(Literal { value: LiteralValue::Bool(true), info: () })]),
            info: (),
        };
        assert!(check_method(decl, &env).is_err());
    }

    #[test]
    fn method_with_wrong_typed_return_anywhere_errors() {
        let env = base_env();
        let decl = MethodDecl {
            name: "foo".into(),
            params: vec![],
            return_type: TypeSpec::named("Int"),
            body: MethodBody::Statements(vec![Expression::Return(Return {
                value: Box::new(Expression::Literal(Literal { value: LiteralValue::Bool(true), info: () })),
                info: (),
            })]),
            info: (),
        };
        assert!(check_method(decl, &env).is_err());
    }

    #[test]
    fn method_records_its_signature_as_node_type() {
        let env = base_env();
        let decl = MethodDecl {
            name: "foo".into(),
            params: vec![],
            return_type: TypeSpec::named("Int"),
            body: MethodBody::Statements(vec![Expression::Literal(Literal { value: LiteralValue::Int(1), info: () })]),
            info: (),
        };
        let (checked, method) = check_method(decl, &env).unwrap();
        assert_eq!(checked.info, Type::Method("foo".into(), vec![], Box::new(Type::Raw("Int".into()))));
        assert_eq!(method.return_type, Type::Raw("Int".into()));
    }
}
