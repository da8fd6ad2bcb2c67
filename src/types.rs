//! Canonical semantic type representation used throughout name resolution,
//! type checking and specialization. The algebra is intentionally closed:
//! every kind of value this checker ever reasons about — a plain class, a
//! metaclass, a generic specialization, a type parameter, a method
//! signature — has exactly one variant, and nothing outside this enum
//! stands in for a type.

use std::collections::HashMap;
use std::fmt;

/// A resolved semantic type.
///
/// Structural equality (`PartialEq`) compares the full tree of variants;
/// there is no implicit coercion between variants anywhere in this crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Type {
    /// Nominal, non-generic class `n`.
    Raw(String),
    /// The metaclass of `Raw(n)` — the type of `n` used as a value (a class constant).
    Meta(String),
    /// The metaclass of an unspecialized generic class, carrying its parameter names.
    GenMeta(String, Vec<String>),
    /// Generic class `n` specialized at the given type arguments.
    Spe(String, Vec<Type>),
    /// The metaclass of `Spe(n, ts)`.
    SpeMeta(String, Vec<Type>),
    /// A free type parameter, only meaningful within its owning generic class's body.
    Param(String),
    /// A method signature: name, parameter types, return type.
    Method(String, Vec<Type>, Box<Type>),
    /// Pseudo-type marking the absence of a superclass (the root of every chain).
    NoParent,
}

impl Type {
    /// Canonical string form of a type, used as a map key when caching
    /// specializations. Two structurally-equal types always produce the
    /// same key and vice versa.
    pub fn to_key(&self) -> String {
        match self {
            Type::Raw(n) => format!("Raw:{n}"),
            Type::Meta(n) => format!("Meta:{n}"),
            Type::GenMeta(n, ps) => format!("GenMeta:{n}<{}>", ps.join(",")),
            Type::Spe(n, ts) => format!(
                "Spe:{n}<{}>",
                ts.iter().map(Type::to_key).collect::<Vec<_>>().join(",")
            ),
            Type::SpeMeta(n, ts) => format!(
                "SpeMeta:{n}<{}>",
                ts.iter().map(Type::to_key).collect::<Vec<_>>().join(",")
            ),
            Type::Param(p) => format!("Param:{p}"),
            Type::Method(n, ps, r) => format!(
                "Method:{n}({}) -> {}",
                ps.iter().map(Type::to_key).collect::<Vec<_>>().join(","),
                r.to_key()
            ),
            Type::NoParent => "__noparent__".to_string(),
        }
    }

    /// Replace every free `Param(p)` occurring in `self` with `map[p]`,
    /// recursing into the type argument lists of `Spe`/`SpeMeta` and into
    /// `Method` parameter/return positions. `GenMeta`'s parameter *names*
    /// are not types and are left untouched.
    pub fn substitute(&self, map: &HashMap<String, Type>) -> Type {
        match self {
            Type::Param(p) => map.get(p).cloned().unwrap_or_else(|| self.clone()),
            Type::Spe(n, ts) => Type::Spe(n.clone(), ts.iter().map(|t| t.substitute(map)).collect()),
            Type::SpeMeta(n, ts) => {
                Type::SpeMeta(n.clone(), ts.iter().map(|t| t.substitute(map)).collect())
            }
            Type::Method(n, ps, r) => Type::Method(
                n.clone(),
                ps.iter().map(|t| t.substitute(map)).collect(),
                Box::new(r.substitute(map)),
            ),
            Type::Raw(_) | Type::Meta(_) | Type::GenMeta(_, _) | Type::NoParent => self.clone(),
        }
    }

    /// The nominal class name this type refers to as a receiver, if any.
    /// Used by [`crate::environment::Environment::find_method`] to decide
    /// between instance and class-method (metaclass) dispatch.
    pub fn receiver_class_name(&self) -> Option<&str> {
        match self {
            Type::Raw(n) | Type::Spe(n, _) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Raw(n) => write!(f, "{n}"),
            Type::Meta(n) => write!(f, "Meta:{n}"),
            Type::GenMeta(n, ps) => write!(f, "Meta:{n}<{}>", ps.join(",")),
            Type::Spe(n, ts) => write!(
                f,
                "{n}<{}>",
                ts.iter().map(Type::to_string).collect::<Vec<_>>().join(",")
            ),
            Type::SpeMeta(n, ts) => write!(
                f,
                "Meta:{n}<{}>",
                ts.iter().map(Type::to_string).collect::<Vec<_>>().join(",")
            ),
            Type::Param(p) => write!(f, "{p}"),
            Type::Method(n, ps, r) => write!(
                f,
                "{n}({}) -> {r}",
                ps.iter().map(Type::to_string).collect::<Vec<_>>().join(",")
            ),
            Type::NoParent => write!(f, "<no parent>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_key_is_stable_and_structural() {
        let a = Type::Spe("Array".into(), vec![Type::Raw("Int".into())]);
        let b = Type::Spe("Array".into(), vec![Type::Raw("Int".into())]);
        let c = Type::Spe("Array".into(), vec![Type::Raw("Bool".into())]);
        assert_eq!(a.to_key(), b.to_key());
        assert_ne!(a.to_key(), c.to_key());
    }

    #[test]
    fn substitute_replaces_free_params_only() {
        let mut map = HashMap::new();
        map.insert("T".to_string(), Type::Raw("Int".into()));

        let t = Type::Spe("Pair".into(), vec![Type::Param("T".into()), Type::Raw("Bool".into())]);
        assert_eq!(
            t.substitute(&map),
            Type::Spe("Pair".into(), vec![Type::Raw("Int".into()), Type::Raw("Bool".into())])
        );
    }

    #[test]
    fn substitute_is_idempotent_when_map_covers_only_free_params() {
        let mut map = HashMap::new();
        map.insert("T".to_string(), Type::Raw("Int".into()));

        let t = Type::Method(
            "fst".into(),
            vec![],
            Box::new(Type::Param("T".into())),
        );

        let once = t.substitute(&map);
        let twice = once.substitute(&map);
        assert_eq!(once, twice);
    }

    #[test]
    fn gen_meta_parameter_names_are_not_types_and_survive_substitution() {
        let map = HashMap::new();
        let t = Type::GenMeta("Pair".into(), vec!["A".into(), "B".into()]);
        assert_eq!(t.substitute(&map), t);
    }
}
