//! The name-resolution environment: an immutable record threaded through
//! the whole traversal. Every slot except `classes` is a persistent
//! `im::HashMap`, so extending it is a cheap structurally-shared clone
//! rather than a deep copy, which lets a child scope extend a binding set
//! without the parent scope ever observing the change.

use im::HashMap as PersistentMap;
use std::rc::Rc;

use crate::error::{NameError, ProgramError, SemaError, SemaResult};
use crate::registry::{Entry, Registry};
use crate::types::Type;

/// The binding kind of a local variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LvarKind {
    /// Write-once (`let`).
    Let,
    /// Reassignable (`var`).
    Var,
    /// A method parameter — reassignable only in the sense a `var` is; the
    /// distinction is kept so diagnostics can say "parameter" instead of
    /// "variable".
    Param,
    /// A name bound by the runtime itself (e.g. a captured lambda variable)
    /// rather than by user assignment.
    Special,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lvar {
    pub name: String,
    pub type_: Type,
    pub kind: LvarKind,
}

impl Lvar {
    /// `Special` (captured lambda variables) is excluded: captures are
    /// read-only regardless of how the captured binding behaves at its
    /// original definition site.
    pub fn is_reassignable(&self) -> bool {
        matches!(self.kind, LvarKind::Var | LvarKind::Param)
    }
}

/// Name-resolution record: the shared class registry, plus per-scope
/// constant/local-variable/type-parameter tables and the current `self`
/// receiver type, if any.
#[derive(Clone, Debug)]
pub struct Environment {
    classes: Rc<Registry>,
    constants: PersistentMap<String, Type>,
    local_vars: PersistentMap<String, Lvar>,
    sk_self: Option<Type>,
    typarams: PersistentMap<String, Type>,
}

impl Environment {
    pub fn new(classes: Rc<Registry>) -> Self {
        Environment {
            classes,
            constants: PersistentMap::new(),
            local_vars: PersistentMap::new(),
            sk_self: None,
            typarams: PersistentMap::new(),
        }
    }

    pub fn registry(&self) -> &Rc<Registry> {
        &self.classes
    }

    pub fn sk_self(&self) -> Option<&Type> {
        self.sk_self.as_ref()
    }

    // Each `with_*` method returns a new `Environment` with one slot
    // extended, leaving `self` untouched. One method per slot rather than a
    // single generic `merge(slot, delta)` dispatcher, since Rust has no
    // ergonomic "symbolic slot name" to dispatch on and each slot has a
    // distinct value type.

    pub fn with_constants(&self, delta: impl IntoIterator<Item = (String, Type)>) -> Self {
        let mut next = self.clone();
        for (k, v) in delta {
            next.constants.insert(k, v);
        }
        next
    }

    pub fn with_locals(&self, delta: impl IntoIterator<Item = (String, Lvar)>) -> Self {
        let mut next = self.clone();
        for lvar in delta {
            next.local_vars.insert(lvar.0, lvar.1);
        }
        next
    }

    pub fn with_local(&self, lvar: Lvar) -> Self {
        self.with_locals([(lvar.name.clone(), lvar)])
    }

    pub fn with_self(&self, self_type: Type) -> Self {
        let mut next = self.clone();
        next.sk_self = Some(self_type);
        next
    }

    pub fn with_typarams(&self, delta: impl IntoIterator<Item = (String, Type)>) -> Self {
        let mut next = self.clone();
        for (k, v) in delta {
            next.typarams.insert(k, v);
        }
        next
    }

    /// Looks up a local variable by name. `allow_missing` distinguishes a
    /// fresh binding (first assignment) from a reassignment at the call
    /// site in `AssignLvar`.
    pub fn find_lvar(&self, name: &str, allow_missing: bool) -> SemaResult<Option<Lvar>> {
        match self.local_vars.get(name) {
            Some(lvar) => Ok(Some(lvar.clone())),
            None if allow_missing => Ok(None),
            None => Err(NameError::UndefinedLocal { name: name.to_string() }.into()),
        }
    }

    /// A type parameter is visible exactly like a local constant binding
    /// while inside its owning generic class's body; checked before
    /// falling through to `find_const` so a type parameter can shadow an
    /// unrelated class of the same name.
    pub fn find_typaram(&self, name: &str) -> Option<Type> {
        self.typarams.get(name).cloned()
    }

    /// Resolves an instance-variable reference against the current `self`
    /// receiver's class.
    pub fn find_ivar(&self, name: &str) -> SemaResult<Type> {
        let self_type = self
            .sk_self
            .as_ref()
            .ok_or_else(|| NameError::IvarOutsideClass { name: name.to_string() })?;

        let class_name = self_type
            .receiver_class_name()
            .map(str::to_string)
            .unwrap_or_else(|| self_type.to_string());

        let ivars = match self.classes.get(&class_name) {
            Some(Entry::Class(c)) => c.ivars.clone(),
            Some(Entry::Generic(g)) => g.base.ivars.clone(),
            _ => return Err(NameError::IvarOutsideClass { name: name.to_string() }.into()),
        };

        ivars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| {
                NameError::UndefinedIvar { class: class_name.clone(), name: name.to_string() }.into()
            })
    }

    /// Resolves a bare name as a constant. Checks type parameters first
    /// (see [`Environment::find_typaram`]), then the constant table.
    pub fn find_const(&self, name: &str) -> SemaResult<Type> {
        if let Some(p) = self.find_typaram(name) {
            return Ok(p);
        }
        self.constants
            .get(name)
            .cloned()
            .ok_or_else(|| NameError::UndefinedConst { name: name.to_string() }.into())
    }

    /// Resolves a bare name to its registered class entry.
    pub fn find_class(&self, name: &str) -> SemaResult<Entry> {
        self.classes.find_class(name)
    }

    /// Resolves a bare name to its registered metaclass entry.
    pub fn find_meta_class(&self, name: &str) -> SemaResult<Entry> {
        self.classes.find_meta_class(name)
    }

    /// Resolves a method by receiver type and name, climbing the
    /// superclass chain as needed.
    pub fn find_method(&self, receiver_type: &Type, method_name: &str) -> SemaResult<Rc<crate::registry::Method>> {
        self.classes.find_method(receiver_type, method_name)
    }

    /// Checks whether `sub` conforms to `sup`. Type-parameter and
    /// metaclass variants conform only by equality; `Registry::conforms_to`
    /// already falls back to equality for anything that isn't a `Raw`/`Raw`
    /// pair.
    pub fn conforms_to(&self, sub: &Type, sup: &Type) -> bool {
        self.classes.conforms_to(sub, sup)
    }

    /// Convenience used by `AssignLvar`/`AssignIvar`: rejects binding a
    /// `Void`-typed expression.
    pub fn reject_void(name: &str, ty: &Type) -> SemaResult<()> {
        if *ty == Type::Raw("Void".to_string()) {
            Err(ProgramError::VoidAssignment { name: name.to_string() }.into())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Class;
    use std::collections::HashMap;

    fn env_with_object_and_point() -> Environment {
        let reg = Registry::new();
        reg.insert(
            "Object",
            Entry::Class(Rc::new(Class {
                name: "Object".into(),
                superclass_template: Type::NoParent,
                ivars: vec![],
                class_methods: HashMap::new(),
                instance_methods: HashMap::new(),
            })),
        );
        reg.insert(
            "Point",
            Entry::Class(Rc::new(Class {
                name: "Point".into(),
                superclass_template: Type::Raw("Object".into()),
                ivars: vec![("x".into(), Type::Raw("Int".into()))],
                class_methods: HashMap::new(),
                instance_methods: HashMap::new(),
            })),
        );
        Environment::new(Rc::new(reg))
    }

    #[test]
    fn find_lvar_errors_when_missing_and_not_allowed() {
        let env = env_with_object_and_point();
        let err = env.find_lvar("a", false).unwrap_err();
        assert!(matches!(err, SemaError::Name(NameError::UndefinedLocal { .. })));
    }

    #[test]
    fn find_lvar_returns_none_when_missing_and_allowed() {
        let env = env_with_object_and_point();
        assert_eq!(env.find_lvar("a", true).unwrap(), None);
    }

    #[test]
    fn with_local_does_not_mutate_parent_environment() {
        let env = env_with_object_and_point();
        let child = env.with_local(Lvar { name: "a".into(), type_: Type::Raw("Int".into()), kind: LvarKind::Let });

        assert!(child.find_lvar("a", false).is_ok());
        assert!(env.find_lvar("a", true).unwrap().is_none());
    }

    #[test]
    fn find_ivar_requires_sk_self() {
        let env = env_with_object_and_point();
        let err = env.find_ivar("x").unwrap_err();
        assert!(matches!(err, SemaError::Name(NameError::IvarOutsideClass { .. })));
    }

    #[test]
    fn find_ivar_resolves_declared_ivar_inside_class_body() {
        let env = env_with_object_and_point().with_self(Type::Raw("Point".into()));
        assert_eq!(env.find_ivar("x").unwrap(), Type::Raw("Int".into()));
        assert!(env.find_ivar("y").is_err());
    }

    #[test]
    fn typaram_shadows_same_named_constant() {
        let env = env_with_object_and_point()
            .with_constants([("T".to_string(), Type::Meta("Point".to_string()))])
            .with_typarams([("T".to_string(), Type::Param("T".to_string()))]);
        assert_eq!(env.find_const("T").unwrap(), Type::Param("T".to_string()));
    }

    #[test]
    fn conforms_to_delegates_to_registry() {
        let env = env_with_object_and_point();
        assert!(env.conforms_to(&Type::Raw("Point".into()), &Type::Raw("Object".into())));
        assert!(!env.conforms_to(&Type::Raw("Object".into()), &Type::Raw("Point".into())));
    }
}
