//! Class registry and on-demand specialization engine.
//!
//! The registry is the one genuinely mutable piece of state in the whole
//! analysis: a single `HashMap` behind a `RefCell`, shared (not copied)
//! across every clone of an [`crate::environment::Environment`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{NameError, SemaError, SemaResult};
use crate::types::Type;

/// A single initializer or instance/class-method parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub type_spec: Type,
    pub is_vararg: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, type_spec: Type) -> Self {
        Param { name: name.into(), type_spec, is_vararg: false }
    }
}

/// The sentinel "create object" body recognized by the stdlib manifest, or
/// a real, parsed method body. The body's statements are not interpreted by
/// this crate (that is an evaluator's job, out of scope here); only
/// `Return` nodes inside a real body are inspected, to validate return
/// types.
#[derive(Clone, Debug)]
pub enum Body {
    CreateObject,
    Statements(Vec<crate::program::Expression<Type>>),
}

#[derive(Clone, Debug)]
pub struct Method {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Body,
}

impl Method {
    pub fn signature(&self) -> Type {
        Type::Method(
            self.name.clone(),
            self.params.iter().map(|p| p.type_spec.clone()).collect(),
            Box::new(self.return_type.clone()),
        )
    }

    /// Head params: those before a vararg (or all, if none). Tail params:
    /// those after. A vararg reserves exactly one parameter slot.
    pub fn head_tail(&self) -> (&[Param], Option<&Param>, &[Param]) {
        match self.params.iter().position(|p| p.is_vararg) {
            Some(i) => (&self.params[..i], Some(&self.params[i]), &self.params[i + 1..]),
            None => (&self.params[..], None, &[]),
        }
    }

    fn substituted(&self, map: &HashMap<String, Type>) -> Method {
        Method {
            name: self.name.clone(),
            params: self
                .params
                .iter()
                .map(|p| Param {
                    name: p.name.clone(),
                    type_spec: p.type_spec.substitute(map),
                    is_vararg: p.is_vararg,
                })
                .collect(),
            return_type: self.return_type.substitute(map),
            body: self.body.clone(),
        }
    }
}

/// An unspecialized user class (and its synthesized metaclass, registered
/// under `"Meta:" + name`).
#[derive(Clone, Debug)]
pub struct Class {
    pub name: String,
    pub superclass_template: Type,
    pub ivars: Vec<(String, Type)>,
    pub class_methods: HashMap<String, Rc<Method>>,
    pub instance_methods: HashMap<String, Rc<Method>>,
}

impl Class {
    fn find_instance_method(&self, name: &str) -> Option<Rc<Method>> {
        self.instance_methods.get(name).cloned()
    }

    fn find_class_method(&self, name: &str) -> Option<Rc<Method>> {
        self.class_methods.get(name).cloned()
    }
}

/// An ordered type parameter of a generic class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeParameter {
    pub name: String,
}

/// A generic user class: a [`Class`] plus type parameters and a cache of
/// demand-materialized specializations.
#[derive(Debug)]
pub struct GenericClass {
    pub base: Class,
    pub type_params: Vec<TypeParameter>,
    pub specializations: RefCell<HashMap<String, Rc<SpecializedClass>>>,
    pub meta_specializations: RefCell<HashMap<String, Rc<SpecializedMetaClass>>>,
}

/// A concrete class produced by applying type arguments to a
/// [`GenericClass`].
#[derive(Debug)]
pub struct SpecializedClass {
    pub generic_name: String,
    pub type_arguments: Vec<Type>,
    methods_cache: RefCell<HashMap<String, Rc<Method>>>,
}

impl SpecializedClass {
    pub fn name(&self) -> String {
        format!(
            "{}<{}>",
            self.generic_name,
            self.type_arguments
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",")
        )
    }

    pub fn type_id(&self) -> Type {
        Type::Spe(self.generic_name.clone(), self.type_arguments.clone())
    }
}

/// The metaclass of a [`SpecializedClass`]. Unlike the plain metaclass of
/// a non-generic class, `new` is materialized lazily here rather than
/// preinstalled, because its parameter/return types depend on the type
/// arguments.
#[derive(Debug)]
pub struct SpecializedMetaClass {
    pub generic_name: String,
    pub type_arguments: Vec<Type>,
    methods_cache: RefCell<HashMap<String, Rc<Method>>>,
    new_cache: RefCell<Option<Rc<Method>>>,
}

impl SpecializedMetaClass {
    pub fn name(&self) -> String {
        format!("Meta:{}", SpecializedClass {
            generic_name: self.generic_name.clone(),
            type_arguments: self.type_arguments.clone(),
            methods_cache: RefCell::default(),
        }.name())
    }

    pub fn type_id(&self) -> Type {
        Type::SpeMeta(self.generic_name.clone(), self.type_arguments.clone())
    }
}

/// One slot in the registry. Every specialization, once materialized, is
/// inserted here immediately under its concrete name — there is no
/// separate "flatten" pass at the end of analysis; the registry reaches
/// its final, closed state continuously rather than as a final step.
#[derive(Clone, Debug)]
pub enum Entry {
    Class(Rc<Class>),
    Meta(Rc<Class>),
    Generic(Rc<GenericClass>),
    Specialized(Rc<SpecializedClass>),
    SpecializedMeta(Rc<SpecializedMetaClass>),
}

impl Entry {
    /// The type value this entry denotes when referenced as a constant,
    /// i.e. the metaclass-shaped type.
    pub fn const_type(&self, name: &str) -> Type {
        match self {
            Entry::Class(_) | Entry::Specialized(_) => Type::Meta(name.trim_start_matches("Meta:").to_string()),
            Entry::Generic(g) => Type::GenMeta(
                g.base.name.clone(),
                g.type_params.iter().map(|p| p.name.clone()).collect(),
            ),
            Entry::Meta(_) | Entry::SpecializedMeta(_) => {
                unreachable!("metaclass entries are not referenced as constants directly")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: RefCell<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn insert(&self, name: impl Into<String>, entry: Entry) {
        self.entries.borrow_mut().insert(name.into(), entry);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.borrow().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Entry> {
        self.entries.borrow().get(name).cloned()
    }

    /// Resolves a bare name to its registered entry.
    pub fn find_class(&self, name: &str) -> SemaResult<Entry> {
        self.get(name).ok_or_else(|| {
            SemaError::Name(NameError::UndefinedClass { name: name.to_string() })
        })
    }

    pub fn find_meta_class(&self, name: &str) -> SemaResult<Entry> {
        self.find_class(&format!("Meta:{name}"))
    }

    pub fn all_names(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Walk `superclass_template` from `name` up to `__noparent__`,
    /// returning true if `sup_name` is reached.
    pub fn is_transitive_subclass(&self, name: &str, sup_name: &str) -> bool {
        let mut current = name.to_string();
        loop {
            if current == sup_name {
                return true;
            }
            let Some(Entry::Class(class)) = self.get(&current) else {
                return false;
            };
            match &class.superclass_template {
                Type::Raw(parent) => current = parent.clone(),
                Type::NoParent => return false,
                _ => return false,
            }
        }
    }

    /// Checks whether `sub` conforms to `sup`.
    pub fn conforms_to(&self, sub: &Type, sup: &Type) -> bool {
        if sub == sup {
            return true;
        }
        match (sub, sup) {
            (Type::Raw(s), Type::Raw(p)) => self.is_transitive_subclass(s, p),
            _ => false,
        }
    }

    /// Find an instance method (for a `Raw`/`Spe` receiver) or a class
    /// method (for a `Meta`/`GenMeta`/`SpeMeta` receiver). Method search
    /// climbs the superclass chain, so single inheritance
    /// (`superclass_template`) is observable through inherited methods.
    pub fn find_method(&self, receiver: &Type, method_name: &str) -> SemaResult<Rc<Method>> {
        let not_found = || {
            SemaError::Name(NameError::UndefinedMethod {
                receiver: receiver.clone(),
                method: method_name.to_string(),
            })
        };

        match receiver {
            Type::Raw(name) => self.find_instance_method_chain(name, method_name).ok_or_else(not_found),
            Type::Spe(generic_name, type_args) => {
                let spe = self.specialize_class_by_name(generic_name, type_args)?;
                self.specialized_method(&spe, method_name).ok_or_else(not_found)
            }
            Type::Meta(name) => self
                .find_class_method_chain(name, method_name)
                .ok_or_else(not_found),
            Type::GenMeta(name, _) => {
                let Some(Entry::Generic(g)) = self.get(name) else {
                    return Err(not_found());
                };
                g.base.find_class_method(method_name).ok_or_else(not_found)
            }
            Type::SpeMeta(generic_name, type_args) => {
                let meta = self.specialize_meta_by_name(generic_name, type_args)?;
                self.specialized_meta_method(&meta, method_name).ok_or_else(not_found)
            }
            _ => Err(not_found()),
        }
    }

    fn find_instance_method_chain(&self, class_name: &str, method: &str) -> Option<Rc<Method>> {
        let mut current = class_name.to_string();
        loop {
            let class = match self.get(&current) {
                Some(Entry::Class(class)) => class,
                // A generic class referring to itself by its own bare name
                // (e.g. a method calling a sibling method on `self` from
                // inside its own unspecialized body).
                Some(Entry::Generic(g)) => Rc::new(g.base.clone()),
                _ => return None,
            };
            if let Some(m) = class.find_instance_method(method) {
                return Some(m);
            }
            match &class.superclass_template {
                Type::Raw(parent) => current = parent.clone(),
                _ => return None,
            }
        }
    }

    fn find_class_method_chain(&self, class_name: &str, method: &str) -> Option<Rc<Method>> {
        let mut current = class_name.to_string();
        loop {
            let Some(Entry::Meta(meta)) = self.get(&format!("Meta:{current}")) else {
                return None;
            };
            if let Some(m) = meta.find_instance_method(method) {
                return Some(m);
            }
            let Some(Entry::Class(class)) = self.get(&current) else {
                return None;
            };
            match &class.superclass_template {
                Type::Raw(parent) => current = parent.clone(),
                _ => return None,
            }
        }
    }

    fn specialized_method(&self, spe: &Rc<SpecializedClass>, method: &str) -> Option<Rc<Method>> {
        if let Some(m) = spe.methods_cache.borrow().get(method).cloned() {
            return Some(m);
        }
        let Some(Entry::Generic(g)) = self.get(&spe.generic_name) else {
            return None;
        };
        let raw = g.base.find_instance_method(method)?;
        let map = param_map(&g.type_params, &spe.type_arguments);
        let specialized = Rc::new(raw.substituted(&map));
        spe.methods_cache
            .borrow_mut()
            .insert(method.to_string(), specialized.clone());
        Some(specialized)
    }

    fn specialized_meta_method(
        &self,
        meta: &Rc<SpecializedMetaClass>,
        method: &str,
    ) -> Option<Rc<Method>> {
        if method == "new" {
            return self.specialized_new(meta);
        }
        if let Some(m) = meta.methods_cache.borrow().get(method).cloned() {
            return Some(m);
        }
        let Some(Entry::Generic(g)) = self.get(&meta.generic_name) else {
            return None;
        };
        let raw = g.base.find_class_method(method)?;
        let map = param_map(&g.type_params, &meta.type_arguments);
        let specialized = Rc::new(raw.substituted(&map));
        meta.methods_cache
            .borrow_mut()
            .insert(method.to_string(), specialized.clone());
        Some(specialized)
    }

    fn specialized_new(&self, meta: &Rc<SpecializedMetaClass>) -> Option<Rc<Method>> {
        if let Some(m) = meta.new_cache.borrow().clone() {
            return Some(m);
        }
        let Some(Entry::Generic(g)) = self.get(&meta.generic_name) else {
            return None;
        };
        let initializer = g.base.find_instance_method("initialize")?;
        let map = param_map(&g.type_params, &meta.type_arguments);
        let new_method = Rc::new(Method {
            name: "new".to_string(),
            params: initializer
                .params
                .iter()
                .map(|p| Param {
                    name: p.name.clone(),
                    type_spec: p.type_spec.substitute(&map),
                    is_vararg: p.is_vararg,
                })
                .collect(),
            return_type: Type::Spe(g.base.name.clone(), meta.type_arguments.clone()),
            body: Body::CreateObject,
        });
        *meta.new_cache.borrow_mut() = Some(new_method.clone());
        Some(new_method)
    }

    /// Materialize (or fetch the cached) specialization of a generic class
    /// at `type_args`. Also ensures the companion [`SpecializedMetaClass`]
    /// exists.
    pub fn specialize(
        &self,
        generic_name: &str,
        type_args: Vec<Type>,
    ) -> SemaResult<(Rc<SpecializedClass>, Rc<SpecializedMetaClass>)> {
        let class = self.specialize_class_by_name(generic_name, &type_args)?;
        let meta = self.specialize_meta_by_name(generic_name, &type_args)?;
        Ok((class, meta))
    }

    fn specialize_class_by_name(
        &self,
        generic_name: &str,
        type_args: &[Type],
    ) -> SemaResult<Rc<SpecializedClass>> {
        let Some(Entry::Generic(g)) = self.get(generic_name) else {
            return Err(NameError::UndefinedClass { name: generic_name.to_string() }.into());
        };

        let key = key_for(type_args);
        if let Some(existing) = g.specializations.borrow().get(&key).cloned() {
            return Ok(existing);
        }

        let specialized = Rc::new(SpecializedClass {
            generic_name: generic_name.to_string(),
            type_arguments: type_args.to_vec(),
            methods_cache: RefCell::default(),
        });

        g.specializations
            .borrow_mut()
            .insert(key, specialized.clone());
        self.insert(specialized.name(), Entry::Specialized(specialized.clone()));

        Ok(specialized)
    }

    fn specialize_meta_by_name(
        &self,
        generic_name: &str,
        type_args: &[Type],
    ) -> SemaResult<Rc<SpecializedMetaClass>> {
        let Some(Entry::Generic(g)) = self.get(generic_name) else {
            return Err(NameError::UndefinedClass { name: generic_name.to_string() }.into());
        };

        let key = key_for(type_args);
        if let Some(existing) = g.meta_specializations.borrow().get(&key).cloned() {
            return Ok(existing);
        }

        let meta = Rc::new(SpecializedMetaClass {
            generic_name: generic_name.to_string(),
            type_arguments: type_args.to_vec(),
            methods_cache: RefCell::default(),
            new_cache: RefCell::default(),
        });

        g.meta_specializations
            .borrow_mut()
            .insert(key, meta.clone());
        self.insert(meta.name(), Entry::SpecializedMeta(meta.clone()));

        Ok(meta)
    }
}

fn key_for(type_args: &[Type]) -> String {
    type_args.iter().map(Type::to_key).collect::<Vec<_>>().join(",")
}

fn param_map(type_params: &[TypeParameter], type_args: &[Type]) -> HashMap<String, Type> {
    type_params
        .iter()
        .zip(type_args.iter())
        .map(|(p, a)| (p.name.clone(), a.clone()))
        .collect()
}

/// Build the companion metaclass for a freshly declared class: a
/// metaclass named `"Meta:" + name`, whose superclass is the superclass's
/// metaclass (or `__noparent__` for the root `Object`), carrying
/// `class_methods` as instance methods plus a synthetic `new`.
pub fn synthesize_metaclass(class: &Class, initializer: Option<&Method>) -> Class {
    let superclass_template = match &class.superclass_template {
        Type::Raw(parent) => Type::Raw(format!("Meta:{parent}")),
        Type::NoParent => Type::NoParent,
        other => other.clone(),
    };

    let mut instance_methods = class.class_methods.clone();

    let new_params = initializer
        .map(|init| init.params.clone())
        .unwrap_or_default();

    instance_methods.insert(
        "new".to_string(),
        Rc::new(Method {
            name: "new".to_string(),
            params: new_params,
            return_type: Type::Raw(class.name.clone()),
            body: Body::CreateObject,
        }),
    );

    Class {
        name: format!("Meta:{}", class.name),
        superclass_template,
        ivars: vec![],
        class_methods: HashMap::new(),
        instance_methods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_class() -> Class {
        Class {
            name: "Object".into(),
            superclass_template: Type::NoParent,
            ivars: vec![],
            class_methods: HashMap::new(),
            instance_methods: HashMap::new(),
        }
    }

    #[test]
    fn seeding_registers_class_and_metaclass() {
        let reg = Registry::new();
        let object = object_class();
        let meta = synthesize_metaclass(&object, None);
        reg.insert("Object", Entry::Class(Rc::new(object)));
        reg.insert("Meta:Object", Entry::Meta(Rc::new(meta)));

        assert!(reg.find_class("Object").is_ok());
        assert!(reg.find_meta_class("Object").is_ok());
        assert!(matches!(
            reg.find_meta_class("Object").unwrap(),
            Entry::Meta(_)
        ));
    }

    #[test]
    fn conforms_to_walks_superclass_chain() {
        let reg = Registry::new();
        reg.insert("Object", Entry::Class(Rc::new(object_class())));
        reg.insert(
            "A",
            Entry::Class(Rc::new(Class {
                name: "A".into(),
                superclass_template: Type::Raw("Object".into()),
                ivars: vec![],
                class_methods: HashMap::new(),
                instance_methods: HashMap::new(),
            })),
        );
        reg.insert(
            "B",
            Entry::Class(Rc::new(Class {
                name: "B".into(),
                superclass_template: Type::Raw("A".into()),
                ivars: vec![],
                class_methods: HashMap::new(),
                instance_methods: HashMap::new(),
            })),
        );

        assert!(reg.conforms_to(&Type::Raw("B".into()), &Type::Raw("Object".into())));
        assert!(reg.conforms_to(&Type::Raw("B".into()), &Type::Raw("A".into())));
        assert!(!reg.conforms_to(&Type::Raw("Object".into()), &Type::Raw("B".into())));
    }

    #[test]
    fn specialize_caches_by_type_argument_key() {
        let reg = Registry::new();
        let generic = GenericClass {
            base: Class {
                name: "Pair".into(),
                superclass_template: Type::Raw("Object".into()),
                ivars: vec![("a".into(), Type::Param("A".into()))],
                class_methods: HashMap::new(),
                instance_methods: {
                    let mut m = HashMap::new();
                    m.insert(
                        "fst".to_string(),
                        Rc::new(Method {
                            name: "fst".into(),
                            params: vec![],
                            return_type: Type::Param("A".into()),
                            body: Body::Statements(vec![]),
                        }),
                    );
                    m
                },
            },
            type_params: vec![TypeParameter { name: "A".into() }, TypeParameter { name: "B".into() }],
            specializations: RefCell::default(),
            meta_specializations: RefCell::default(),
        };
        reg.insert("Pair", Entry::Generic(Rc::new(generic)));

        let args = vec![Type::Raw("Int".into()), Type::Raw("Bool".into())];
        let (first, _) = reg.specialize("Pair", args.clone()).unwrap();
        let (second, _) = reg.specialize("Pair", args).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "Pair<Int,Bool>");
        assert!(reg.contains("Pair<Int,Bool>"));

        let fst = reg
            .find_method(&Type::Spe("Pair".into(), vec![Type::Raw("Int".into()), Type::Raw("Bool".into())]), "fst")
            .unwrap();
        assert_eq!(fst.return_type, Type::Raw("Int".into()));
    }
}
