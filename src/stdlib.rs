//! Standard-library manifest: the facade's only external collaborator
//! besides the input program tree. Modeled as a trait rather
//! than a hard-coded constant so a host can supply a richer prelude without
//! touching the semantic core; [`CoreManifest`] is the default, minimal
//! implementation used by this crate's own tests and by any caller that
//! doesn't need more.

use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::registry::{Body, Class, Entry, GenericClass, Method, Param, Registry, TypeParameter};
use crate::types::Type;

/// The names `CoreManifest::seed` installs, in seeding order. Kept as a
/// `Lazy` static (rather than re-allocated per call) since callers that
/// validate a host's richer manifest against this baseline (e.g. "does it
/// at least cover the core set?") need the list without re-seeding a
/// throwaway registry first.
pub static CORE_CLASS_NAMES: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["Object", "Int", "Float", "Bool", "Void", "Array", "Lambda"]);

/// Supplies the built-in classes every program can assume exist:
/// minimally `Object`, `Int`, `Float`, `Bool`, `Void`, `Array<T>`, and the
/// anonymous-function class.
pub trait Manifest {
    /// Register every built-in class (and its metaclass) into `registry`.
    /// Called once, before any user class is seeded.
    fn seed(&self, registry: &Registry);
}

/// The minimal manifest this crate ships: `Object`, `Int`, `Float`, `Bool`,
/// `Void`, the generic `Array<T>`, and `Lambda` (the anonymous-function
/// class, generic over its parameter types and return type — see
/// `DESIGN.md` for how `Lambda`'s type argument list is laid out, and why
/// it carries no registry-backed `call` method).
#[derive(Default)]
pub struct CoreManifest;

impl CoreManifest {
    pub fn new() -> Self {
        CoreManifest
    }
}

fn leaf_class(name: &str, superclass_template: Type) -> Class {
    Class { name: name.to_string(), superclass_template, ivars: vec![], class_methods: HashMap::new(), instance_methods: HashMap::new() }
}

fn install_class(registry: &Registry, class: Class) {
    let meta = crate::registry::synthesize_metaclass(&class, None);
    registry.insert(class.name.clone(), Entry::Class(Rc::new(class)));
    registry.insert(format!("Meta:{}", meta.name.trim_start_matches("Meta:")), Entry::Meta(Rc::new(meta)));
}

impl Manifest for CoreManifest {
    fn seed(&self, registry: &Registry) {
        install_class(registry, leaf_class("Object", Type::NoParent));
        for name in ["Int", "Float", "Bool", "Void"] {
            install_class(registry, leaf_class(name, Type::Raw("Object".to_string())));
        }

        let mut array_methods = HashMap::new();
        array_methods.insert(
            "length".to_string(),
            Rc::new(Method { name: "length".to_string(), params: vec![], return_type: Type::Raw("Int".to_string()), body: Body::Statements(vec![]) }),
        );
        array_methods.insert(
            "get".to_string(),
            Rc::new(Method {
                name: "get".to_string(),
                params: vec![Param::new("index", Type::Raw("Int".to_string()))],
                return_type: Type::Param("T".to_string()),
                body: Body::Statements(vec![]),
            }),
        );
        array_methods.insert(
            "push".to_string(),
            Rc::new(Method {
                name: "push".to_string(),
                params: vec![Param::new("value", Type::Param("T".to_string()))],
                return_type: Type::Raw("Void".to_string()),
                body: Body::Statements(vec![]),
            }),
        );
        let array_base = Class {
            name: "Array".to_string(),
            superclass_template: Type::Raw("Object".to_string()),
            ivars: vec![],
            class_methods: HashMap::new(),
            instance_methods: array_methods,
        };
        registry.insert(
            "Array",
            Entry::Generic(Rc::new(GenericClass {
                base: array_base,
                type_params: vec![TypeParameter { name: "T".to_string() }],
                specializations: Default::default(),
                meta_specializations: Default::default(),
            })),
        );

        // No instance methods here on purpose: a lambda's arity varies per
        // literal (zero or more parameters plus a return type), but a
        // `GenericClass`'s `type_params`/method substitution is fixed-arity.
        // `check_lambda`/`check_lambda_call` materialize and read a lambda's
        // `Spe("Lambda", [param_types.., return_type])` type directly
        // instead of going through a registered `call` method, so
        // `find_method("call")` on a `Lambda` receiver is intentionally
        // unsupported.
        let lambda_base = Class {
            name: "Lambda".to_string(),
            superclass_template: Type::Raw("Object".to_string()),
            ivars: vec![],
            class_methods: HashMap::new(),
            instance_methods: HashMap::new(),
        };
        registry.insert(
            "Lambda",
            Entry::Generic(Rc::new(GenericClass {
                base: lambda_base,
                type_params: vec![],
                specializations: Default::default(),
                meta_specializations: Default::default(),
            })),
        );
    }
}

/// Produces the sentinel value method checking recognizes as "this method
/// body is not user code, skip body validation" — carried by every
/// synthetic `new`.
pub fn create_object_marker() -> Body {
    Body::CreateObject
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Entry;

    #[test]
    fn core_manifest_seeds_every_declared_core_class_name() {
        let registry = Registry::new();
        CoreManifest::new().seed(&registry);
        for name in CORE_CLASS_NAMES.iter() {
            assert!(registry.contains(name), "missing core class {name}");
        }
    }

    #[test]
    fn core_manifest_seeds_object_and_array() {
        let registry = Registry::new();
        CoreManifest::new().seed(&registry);

        assert!(matches!(registry.get("Object"), Some(Entry::Class(_))));
        assert!(matches!(registry.get("Meta:Object"), Some(Entry::Meta(_))));
        assert!(matches!(registry.get("Array"), Some(Entry::Generic(_))));
        assert!(matches!(registry.get("Lambda"), Some(Entry::Generic(_))));
    }

    #[test]
    fn array_specializes_on_demand() {
        let registry = Registry::new();
        CoreManifest::new().seed(&registry);

        let (spe, _meta) = registry.specialize("Array", vec![Type::Raw("Int".to_string())]).unwrap();
        assert_eq!(spe.name(), "Array<Int>");
        assert!(registry.contains("Array<Int>"));
    }

    #[test]
    fn lambda_specializes_at_any_arity_but_exposes_no_call_method() {
        let registry = Registry::new();
        CoreManifest::new().seed(&registry);

        let nullary = registry.specialize("Lambda", vec![Type::Raw("Int".to_string())]).unwrap().0;
        let binary = registry
            .specialize(
                "Lambda",
                vec![Type::Raw("Int".to_string()), Type::Raw("Bool".to_string()), Type::Raw("Void".to_string())],
            )
            .unwrap()
            .0;
        assert_eq!(nullary.name(), "Lambda<Int>");
        assert_eq!(binary.name(), "Lambda<Int,Bool,Void>");

        assert!(registry.find_method(&nullary.type_id(), "call").is_err());
    }
}
