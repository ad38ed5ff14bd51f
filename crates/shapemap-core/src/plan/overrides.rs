//! Per-field override rules
//!
//! ```
//! use shapemap_core::plan::Overrides;
//! # struct Order { price: i64, qty: i64, code: String }
//! # struct Line;
//! let rules = Overrides::<Order, Line>::new()
//!     .from_field("reference", "code")
//!     .compute("total", |o: &Order| o.price * o.qty)
//!     .exclude("audit");
//! assert!(!rules.is_empty());
//! ```
//!
//! Rules are plain data once captured. Their identity ([`OverridesId`]) is
//! structural: two rule sets built by the same code produce the same id, even
//! when their closures capture different values. Mappers are cached per id
//! and always run the closures supplied with the current call.

use crate::error::{Result, ShapeError};
use crate::shape::short_type_name;
use crate::value::{FieldType, Value, ValueType};
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Computes an override value from the whole (type-erased) source instance
pub type ComputeFn = Arc<dyn Fn(&dyn Any) -> Result<Value> + Send + Sync>;

/// Structural identity of a rule set; `OverridesId::NONE` means no rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct OverridesId(u64);

impl OverridesId {
    pub const NONE: OverridesId = OverridesId(0);

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OverridesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One captured rule
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideRule {
    /// Bind the target field from a differently named source field
    Field { target: Arc<str>, source: Arc<str> },
    /// Bind the target field from function number `index` of the rule set
    Compute {
        target: Arc<str>,
        ty: FieldType,
        index: usize,
    },
}

impl OverrideRule {
    pub fn target(&self) -> &str {
        match self {
            OverrideRule::Field { target, .. } | OverrideRule::Compute { target, .. } => target,
        }
    }
}

/// The functions of a rule set, in rule order
#[derive(Clone, Default)]
pub struct OverrideFns(Arc<[ComputeFn]>);

impl OverrideFns {
    pub fn get(&self, index: usize) -> Option<&ComputeFn> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for OverrideFns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OverrideFns({})", self.0.len())
    }
}

/// The type-independent part of a rule set, consumed by the planner
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub id: OverridesId,
    pub rules: Vec<OverrideRule>,
    pub excluded: Vec<Arc<str>>,
}

impl RuleSet {
    pub fn rule_for(&self, target: &str) -> Option<&OverrideRule> {
        self.rules.iter().find(|r| r.target() == target)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.iter().any(|e| &**e == name)
    }
}

/// Override rules for mapping `S` into `T`
pub struct Overrides<S, T> {
    rules: Vec<OverrideRule>,
    excluded: Vec<Arc<str>>,
    fns: Vec<ComputeFn>,
    hasher: DefaultHasher,
    _shapes: PhantomData<fn(&S) -> T>,
}

impl<S: Any, T> Overrides<S, T> {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            excluded: Vec::new(),
            fns: Vec::new(),
            hasher: DefaultHasher::new(),
            _shapes: PhantomData,
        }
    }

    /// Bind `target` from the source field `source`
    pub fn from_field(mut self, target: &str, source: &str) -> Self {
        ("field", target, source).hash(&mut self.hasher);
        self.rules.push(OverrideRule::Field {
            target: target.into(),
            source: source.into(),
        });
        self
    }

    /// Bind `target` from a function of the source.
    ///
    /// The closure's return type is the binding's declared source type;
    /// returning [`Value`] leaves it undeclared and conversion happens per call.
    pub fn compute<V, F>(self, target: &str, f: F) -> Self
    where
        V: ValueType,
        F: Fn(&S) -> V + Send + Sync + 'static,
    {
        self.try_compute(target, move |s: &S| Ok(f(s)))
    }

    /// Like [`compute`](Self::compute) for functions that can fail
    pub fn try_compute<V, F>(mut self, target: &str, f: F) -> Self
    where
        V: ValueType,
        F: Fn(&S) -> Result<V> + Send + Sync + 'static,
    {
        let ty = V::field_type();
        ("compute", target, &ty, TypeId::of::<F>()).hash(&mut self.hasher);

        let expected = short_type_name::<S>();
        let erased: ComputeFn = Arc::new(move |instance: &dyn Any| {
            let source = instance
                .downcast_ref::<S>()
                .ok_or_else(|| ShapeError::InstanceMismatch {
                    expected: expected.clone(),
                })?;
            f(source).map(ValueType::into_value)
        });

        self.rules.push(OverrideRule::Compute {
            target: target.into(),
            ty,
            index: self.fns.len(),
        });
        self.fns.push(erased);
        self
    }

    /// Never bind `name`, whatever the other rules say
    pub fn exclude(mut self, name: &str) -> Self {
        ("exclude", name).hash(&mut self.hasher);
        self.excluded.push(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.excluded.is_empty()
    }

    pub fn id(&self) -> OverridesId {
        if self.is_empty() {
            return OverridesId::NONE;
        }
        // 0 is reserved for the empty set
        OverridesId(self.hasher.finish().max(1))
    }

    pub fn rules(&self) -> &[OverrideRule] {
        &self.rules
    }

    pub fn excluded(&self) -> &[Arc<str>] {
        &self.excluded
    }

    pub fn functions(&self) -> OverrideFns {
        OverrideFns(self.fns.clone().into())
    }

    pub fn rule_set(&self) -> RuleSet {
        RuleSet {
            id: self.id(),
            rules: self.rules.clone(),
            excluded: self.excluded.clone(),
        }
    }
}

impl<S: Any, T> Default for Overrides<S, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, T> fmt::Debug for Overrides<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overrides")
            .field("rules", &self.rules)
            .field("excluded", &self.excluded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SemType;

    struct Src {
        a: i64,
    }

    fn rules_with_factor(factor: i64) -> Overrides<Src, ()> {
        Overrides::new().compute("b", move |s: &Src| s.a * factor)
    }

    #[test]
    fn test_empty_rules_have_no_id() {
        let rules = Overrides::<Src, ()>::new();
        assert_eq!(rules.id(), OverridesId::NONE);
        assert!(rules.functions().is_empty());
    }

    #[test]
    fn test_same_call_site_same_id() {
        let two = rules_with_factor(2);
        let three = rules_with_factor(3);
        assert_eq!(two.id(), three.id());
        assert_ne!(two.id(), OverridesId::NONE);

        let value = (two.functions().get(0).unwrap())(&Src { a: 5 }).unwrap();
        assert_eq!(value, Value::I64(10));
        let value = (three.functions().get(0).unwrap())(&Src { a: 5 }).unwrap();
        assert_eq!(value, Value::I64(15));
    }

    #[test]
    fn test_different_rules_different_ids() {
        let a = Overrides::<Src, ()>::new().from_field("x", "a");
        let b = Overrides::<Src, ()>::new().from_field("y", "a");
        let c = Overrides::<Src, ()>::new().from_field("x", "a").exclude("z");
        let d = Overrides::<Src, ()>::new().compute("b", |s: &Src| s.a);
        let e = Overrides::<Src, ()>::new().compute("b", |s: &Src| s.a);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
        // distinct closure expressions
        assert_ne!(d.id(), e.id());
    }

    #[test]
    fn test_compute_records_declared_type() {
        let rules = Overrides::<Src, ()>::new()
            .compute("n", |s: &Src| Some(s.a))
            .compute("d", |_: &Src| Value::Null);
        let set = rules.rule_set();
        match set.rule_for("n").unwrap() {
            OverrideRule::Compute { ty, index, .. } => {
                assert_eq!(*ty, FieldType::nullable(SemType::I64));
                assert_eq!(*index, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        match set.rule_for("d").unwrap() {
            OverrideRule::Compute { ty, .. } => assert_eq!(*ty, FieldType::any()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_compute_checks_instance_type() {
        let rules = rules_with_factor(1);
        let f = rules.functions();
        assert!((f.get(0).unwrap())(&"not a source").is_err());
    }
}
