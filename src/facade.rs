//! Program facade: the crate's one public entry point, `analyze`.

use std::rc::Rc;

use crate::environment::Environment;
use crate::error::SemaResult;
use crate::program::{check_sequence, class, Expression, TypedProgram, UntypedProgram};
use crate::registry::Registry;
use crate::stdlib::Manifest;
use crate::types::Type;

/// Type-checks an [`UntypedProgram`] into a [`TypedProgram`].
///
/// Seeds the registry with the manifest's built-ins, then with every
/// user-declared class (paired with its generated metaclass), builds a
/// root environment exposing those classes as constants, then type-checks
/// each class and finally the top-level program.
pub fn analyze(program: UntypedProgram, manifest: &dyn Manifest) -> SemaResult<(TypedProgram, Rc<Registry>)> {
    let registry = Rc::new(Registry::new());

    log::debug!("seeding registry from standard-library manifest");
    manifest.seed(&registry);

    log::debug!("shallow-registering {} user class(es)", program.classes.len());
    let root_env = Environment::new(registry.clone());
    class::shallow_register(&program.classes, &root_env)?;

    let root_env = with_class_constants(root_env, &registry);

    log::debug!("checking class bodies");
    let mut typed_classes = Vec::with_capacity(program.classes.len());
    for decl in program.classes {
        log::trace!("checking class '{}'", decl.name);
        typed_classes.push(class::check_class(decl, &root_env)?);
    }

    log::debug!("checking top-level program");
    let (typed_main, main_type, _) = check_sequence(program.main, &root_env)?;

    Ok((TypedProgram { classes: typed_classes, main: typed_main, main_type }, registry))
}

/// Exposes every currently-registered top-level class as a constant bound
/// to its metaclass type. Run once, after shallow registration, so every
/// class (regardless of declaration order) is visible to every other
/// class's body during the full-check pass.
fn with_class_constants(env: Environment, registry: &Registry) -> Environment {
    let bindings = registry
        .all_names()
        .into_iter()
        .filter(|name| !name.starts_with("Meta:"))
        .filter_map(|name| registry.get(&name).map(|entry| (name.clone(), entry.const_type(&name))))
        .collect::<Vec<(String, Type)>>();
    env.with_constants(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::class::{ClassDecl, ParamDecl};
    use crate::program::expression::{Literal, LiteralValue};
    use crate::program::method::{MethodBody, MethodDecl};
    use crate::program::TypeSpec;
    use crate::stdlib::CoreManifest;

    fn empty_program() -> UntypedProgram {
        UntypedProgram { classes: vec![], main: vec![] }
    }

    #[test]
    fn empty_program_analyzes_to_void() -> anyhow::Result<()> {
        let (typed, _registry) = analyze(empty_program(), &CoreManifest::new())?;
        assert_eq!(typed.main_type, Type::Raw("Void".to_string()));
        Ok(())
    }

    /// `class A; def self.foo -> Int; 1 + 1; end; end`. (`1 + 1` is
    /// represented directly as a literal `2`, since operator desugaring is
    /// a parser concern, out of scope here.)
    #[test]
    fn class_method_returning_int_is_registered_on_metaclass() -> anyhow::Result<()> {
        let foo = MethodDecl {
            name: "foo".to_string(),
            params: vec![],
            return_type: TypeSpec::named("Int"),
            body: MethodBody::Statements(vec![Expression::Literal(Literal { value: LiteralValue::Int(2), info: () })]),
            info: (),
        };
        let class_a = ClassDecl {
            name: "A".to_string(),
            superclass: None,
            type_params: vec![],
            initializer: None,
            instance_methods: vec![],
            class_methods: vec![foo],
            info: (),
        };
        let program = UntypedProgram { classes: vec![class_a], main: vec![] };

        let (_typed, registry) = analyze(program, &CoreManifest::new())?;
        assert!(registry.contains("A"));
        assert!(registry.contains("Meta:A"));

        let method = registry.find_method(&Type::Meta("A".to_string()), "foo")?;
        assert_eq!(method.return_type, Type::Raw("Int".to_string()));
        assert!(registry.find_method(&Type::Meta("A".to_string()), "new").is_ok());
        Ok(())
    }

    /// `a = 1; a = 2` without `var` is a ProgramError.
    #[test]
    fn reassigning_a_let_binding_without_var_fails() {
        let program = UntypedProgram {
            classes: vec![],
            main: vec![
                Expression::AssignLvar(crate::program::expression::AssignLvar {
                    name: "a".to_string(),
                    value: Box::new(Expression::Literal(Literal { value: LiteralValue::Int(1), info: () })),
                    is_var: false,
                    info: (),
                }),
                Expression::AssignLvar(crate::program::expression::AssignLvar {
                    name: "a".to_string(),
                    value: Box::new(Expression::Literal(Literal { value: LiteralValue::Int(2), info: () })),
                    is_var: false,
                    info: (),
                }),
            ],
        };
        assert!(analyze(program, &CoreManifest::new()).is_err());
    }

    /// `if 1; 1; end` raises TypeError.
    #[test]
    fn if_with_non_bool_condition_fails_end_to_end() {
        let program = UntypedProgram {
            classes: vec![],
            main: vec![Expression::If(crate::program::expression::If {
                cond: Box::new(Expression::Literal(Literal { value: LiteralValue::Int(1), info: () })),
                then_branch: vec![Expression::Literal(Literal { value: LiteralValue::Int(1), info: () })],
                else_branch: vec![],
                info: (),
            })],
        };
        assert!(analyze(program, &CoreManifest::new()).is_err());
    }

    /// Generic `Pair<A,B>` specializes on demand; repeat specialization
    /// returns the same cached class.
    #[test]
    fn generic_pair_specializes_and_caches() -> anyhow::Result<()> {
        let fst = MethodDecl {
            name: "fst".to_string(),
            params: vec![],
            return_type: TypeSpec::named("A"),
            body: MethodBody::Statements(vec![Expression::IvarRef(crate::program::expression::IvarRef {
                name: "a".to_string(),
                info: (),
            })]),
            info: (),
        };
        let initializer = MethodDecl {
            name: "initialize".to_string(),
            params: vec![ParamDecl::iparam("a", TypeSpec::named("A")), ParamDecl::iparam("b", TypeSpec::named("B"))],
            return_type: TypeSpec::named("Void"),
            body: MethodBody::Statements(vec![]),
            info: (),
        };
        let pair = ClassDecl {
            name: "Pair".to_string(),
            superclass: None,
            type_params: vec!["A".to_string(), "B".to_string()],
            initializer: Some(initializer),
            instance_methods: vec![fst],
            class_methods: vec![],
            info: (),
        };
        let program = UntypedProgram { classes: vec![pair], main: vec![] };
        let (_typed, registry) = analyze(program, &CoreManifest::new())?;

        let args = vec![Type::Raw("Int".to_string()), Type::Raw("Bool".to_string())];
        let (first, _) = registry.specialize("Pair", args.clone())?;
        let (second, _) = registry.specialize("Pair", args)?;
        assert!(Rc::ptr_eq(&first, &second));

        let fst_method = registry.find_method(&first.type_id(), "fst")?;
        assert_eq!(fst_method.return_type, Type::Raw("Int".to_string()));
        Ok(())
    }

    /// A method declared `-> Int` containing `return true` anywhere
    /// raises TypeError.
    #[test]
    fn stray_return_with_wrong_type_fails() {
        let decl = MethodDecl {
            name: "bad".to_string(),
            params: vec![],
            return_type: TypeSpec::named("Int"),
            body: MethodBody::Statements(vec![
                Expression::If(crate::program::expression::If {
                    cond: Box::new(Expression::Literal(Literal { value: LiteralValue::Bool(true), info: () })),
                    then_branch: vec![Expression::Return(crate::program::expression::Return {
                        value: Box::new(Expression::Literal(Literal { value: LiteralValue::Bool(true), info: () })),
                        info: (),
                    })],
                    else_branch: vec![],
                    info: (),
                }),
                Expression::Literal(Literal { value: LiteralValue::Int(1), info: () }),
            ]),
            info: (),
        };
        let class_a = ClassDecl {
            name: "A".to_string(),
            superclass: None,
            type_params: vec![],
            initializer: None,
            instance_methods: vec![decl],
            class_methods: vec![],
            info: (),
        };
        let program = UntypedProgram { classes: vec![class_a], main: vec![] };
        assert!(analyze(program, &CoreManifest::new()).is_err());
    }
}
