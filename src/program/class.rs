//! Class- and method-declaration nodes and their checking, plus the
//! two-phase registration that lets classes reference each other before
//! either has a fully checked body: `shallow_register` registers every
//! name and signature first, and `check_class` validates bodies second.

use std::collections::HashMap;
use std::rc::Rc;

use super::method::{check_method, MethodDecl};
use super::{resolve_type_spec, TypeSpec};
use crate::environment::Environment;
use crate::error::{SemaResult, TypeError};
use crate::registry::{self, synthesize_metaclass, Class, Entry, GenericClass, Method, Param, TypeParameter};
use crate::types::Type;

/// A parameter as written by the parser. `is_iparam` marks an initializer
/// parameter that also declares an instance variable; it is only
/// meaningful on `initialize`.
#[derive(Clone, Debug)]
pub struct ParamDecl {
    pub name: String,
    pub type_spec: TypeSpec,
    pub is_vararg: bool,
    pub is_iparam: bool,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, type_spec: TypeSpec) -> Self {
        ParamDecl { name: name.into(), type_spec, is_vararg: false, is_iparam: false }
    }

    pub fn iparam(name: impl Into<String>, type_spec: TypeSpec) -> Self {
        ParamDecl { name: name.into(), type_spec, is_vararg: false, is_iparam: true }
    }
}

/// A class or generic-class declaration. `type_params` is empty for a
/// non-generic class.
#[derive(Clone, Debug)]
pub struct ClassDecl<Info> {
    pub name: String,
    pub superclass: Option<String>,
    pub type_params: Vec<String>,
    pub initializer: Option<MethodDecl<Info>>,
    pub instance_methods: Vec<MethodDecl<Info>>,
    pub class_methods: Vec<MethodDecl<Info>>,
    pub info: Info,
}

fn superclass_template(decl_name: &str, superclass: &Option<String>) -> Type {
    match superclass {
        Some(name) => Type::Raw(name.clone()),
        None if decl_name == "Object" => Type::NoParent,
        None => Type::Raw("Object".to_string()),
    }
}

fn typaram_bindings(type_params: &[String]) -> Vec<(String, Type)> {
    type_params.iter().map(|p| (p.clone(), Type::Param(p.clone()))).collect()
}

fn build_ivars(initializer: &Option<MethodDecl<()>>, env: &Environment) -> SemaResult<Vec<(String, Type)>> {
    let mut ivars = Vec::new();
    let Some(init) = initializer else { return Ok(ivars) };

    for param in &init.params {
        if !param.is_iparam {
            continue;
        }
        if ivars.iter().any(|(n, _): &(String, Type)| n == &param.name) {
            return Err(TypeError::DuplicateIvarName { name: param.name.clone() }.into());
        }
        let ty = resolve_type_spec(&param.type_spec, env)?;
        ivars.push((param.name.clone(), ty));
    }
    Ok(ivars)
}

fn build_signature_method(decl: &MethodDecl<()>, env: &Environment) -> SemaResult<Method> {
    let mut vararg_count = 0;
    let mut params = Vec::with_capacity(decl.params.len());
    for p in &decl.params {
        let ty = resolve_type_spec(&p.type_spec, env)?;
        if p.is_vararg {
            vararg_count += 1;
            if !matches!(&ty, Type::Spe(n, ts) if n == "Array" && ts.len() == 1) {
                return Err(TypeError::VarargTypeNotArray { method: decl.name.clone(), declared: ty }.into());
            }
        }
        params.push(Param { name: p.name.clone(), type_spec: ty, is_vararg: p.is_vararg });
    }
    if vararg_count > 1 {
        return Err(TypeError::MultipleVarargs { method: decl.name.clone() }.into());
    }
    let return_type = resolve_type_spec(&decl.return_type, env)?;
    let body = if decl.is_create_object_marker() { registry::Body::CreateObject } else { registry::Body::Statements(vec![]) };
    Ok(Method { name: decl.name.clone(), params, return_type, body })
}

fn method_map(decls: &[MethodDecl<()>], env: &Environment) -> SemaResult<HashMap<String, Rc<Method>>> {
    let mut map = HashMap::new();
    for decl in decls {
        map.insert(decl.name.clone(), Rc::new(build_signature_method(decl, env)?));
    }
    Ok(map)
}

/// Phase one: register every class under its final name with fully
/// resolved signatures, before any method body is type-checked. This is
/// what lets class `A`'s method call class `B`'s method regardless of
/// declaration order.
pub fn shallow_register(decls: &[ClassDecl<()>], root_env: &Environment) -> SemaResult<()> {
    for decl in decls {
        let class_env = if decl.type_params.is_empty() {
            root_env.clone()
        } else {
            root_env.with_typarams(typaram_bindings(&decl.type_params))
        };

        let ivars = build_ivars(&decl.initializer, &class_env)?;
        let mut instance_methods = method_map(&decl.instance_methods, &class_env)?;
        if let Some(init) = &decl.initializer {
            instance_methods.insert(init.name.clone(), Rc::new(build_signature_method(init, &class_env)?));
        }
        let class_methods = method_map(&decl.class_methods, &class_env)?;

        let base = Class {
            name: decl.name.clone(),
            superclass_template: superclass_template(&decl.name, &decl.superclass),
            ivars,
            class_methods,
            instance_methods,
        };

        if decl.type_params.is_empty() {
            let initializer_sig = base.instance_methods.get("initialize").map(|m| (**m).clone());
            let meta = synthesize_metaclass(&base, initializer_sig.as_ref());
            root_env.registry().insert(decl.name.clone(), Entry::Class(Rc::new(base)));
            root_env.registry().insert(format!("Meta:{}", decl.name), Entry::Meta(Rc::new(meta)));
        } else {
            // A single `Entry::Generic` carries both the class's own method
            // cache (`specializations`) and its metaclass's (`meta_specializations`,
            // see `Registry::specialize_meta_by_name`) — there is no separate
            // "Meta:<name>" registry slot for a *generic* class, unlike a
            // concrete one.
            let type_params: Vec<TypeParameter> = decl.type_params.iter().map(|n| TypeParameter { name: n.clone() }).collect();
            let generic = Rc::new(GenericClass {
                base,
                type_params,
                specializations: Default::default(),
                meta_specializations: Default::default(),
            });
            root_env.registry().insert(decl.name.clone(), Entry::Generic(generic));
        }
    }
    Ok(())
}

/// Phase two: fully check every ivar and method body, then re-register
/// the class with checked method bodies and compute the class's own node
/// type.
pub fn check_class(decl: ClassDecl<()>, root_env: &Environment) -> SemaResult<ClassDecl<Type>> {
    let is_generic = !decl.type_params.is_empty();

    // `self` inside an *instance* method body is always the plain class
    // name, generic or not — type parameters are resolved separately via
    // `typarams`, not by parameterizing `sk_self` itself. `self` inside a
    // *class* method body (declared on the companion metaclass) is the
    // metaclass-shaped type, which for a generic class is `GenMeta`.
    let instance_self_type = Type::Raw(decl.name.clone());
    let class_self_type = if is_generic {
        Type::GenMeta(decl.name.clone(), decl.type_params.clone())
    } else {
        Type::Meta(decl.name.clone())
    };
    // The declaration's own exposed type.
    let decl_type = if is_generic { class_self_type.clone() } else { instance_self_type.clone() };

    let base_env = if is_generic {
        root_env.with_typarams(typaram_bindings(&decl.type_params))
    } else {
        root_env.clone()
    };
    let instance_env = base_env.with_self(instance_self_type);
    let class_env = base_env.with_self(class_self_type);

    let mut checked_initializer = None;
    let mut instance_methods = HashMap::new();
    if let Some(init) = decl.initializer {
        let (checked, method) = check_method(init, &instance_env)?;
        instance_methods.insert(method.name.clone(), Rc::new(method));
        checked_initializer = Some(checked);
    }

    let mut checked_instance_methods = Vec::with_capacity(decl.instance_methods.len());
    for m in decl.instance_methods {
        let (checked, method) = check_method(m, &instance_env)?;
        instance_methods.insert(method.name.clone(), Rc::new(method));
        checked_instance_methods.push(checked);
    }

    let mut checked_class_methods = Vec::with_capacity(decl.class_methods.len());
    let mut class_methods = HashMap::new();
    for m in decl.class_methods {
        let (checked, method) = check_method(m, &class_env)?;
        class_methods.insert(method.name.clone(), Rc::new(method));
        checked_class_methods.push(checked);
    }

    let ivars = build_ivars_checked(&root_env.registry().get(&decl.name), &decl.name)?;

    let base = Class {
        name: decl.name.clone(),
        superclass_template: superclass_template(&decl.name, &decl.superclass),
        ivars,
        class_methods,
        instance_methods,
    };

    if is_generic {
        let type_params: Vec<TypeParameter> = decl.type_params.iter().map(|n| TypeParameter { name: n.clone() }).collect();
        // Preserve any specializations already materialized against the
        // shallow signature by another class's body checked earlier in this
        // pass (method *signatures* don't change between shallow and full
        // registration, only bodies do, so the cached keys stay valid).
        if let Some(Entry::Generic(existing)) = root_env.registry().get(&decl.name) {
            root_env.registry().insert(
                decl.name.clone(),
                Entry::Generic(Rc::new(GenericClass {
                    base,
                    type_params,
                    specializations: existing.specializations.clone(),
                    meta_specializations: existing.meta_specializations.clone(),
                })),
            );
        }
    } else {
        let initializer = base.instance_methods.get("initialize").map(|m| (**m).clone());
        let meta = synthesize_metaclass(&base, initializer.as_ref());
        root_env.registry().insert(decl.name.clone(), Entry::Class(Rc::new(base)));
        root_env.registry().insert(format!("Meta:{}", decl.name), Entry::Meta(Rc::new(meta)));
    }

    Ok(ClassDecl {
        name: decl.name,
        superclass: decl.superclass,
        type_params: decl.type_params,
        initializer: checked_initializer,
        instance_methods: checked_instance_methods,
        class_methods: checked_class_methods,
        info: decl_type,
    })
}

fn build_ivars_checked(entry: &Option<Entry>, class_name: &str) -> SemaResult<Vec<(String, Type)>> {
    match entry {
        Some(Entry::Class(c)) => Ok(c.ivars.clone()),
        Some(Entry::Generic(g)) => Ok(g.base.ivars.clone()),
        _ => Err(crate::error::NameError::UndefinedClass { name: class_name.to_string() }.into()),
    }
}

