//! Incremental target construction
//!
//! A builder collects `name -> value` pairs and then runs them through an
//! ordinary mapper whose source is an [`ArraySourceShape`]: a synthetic shape
//! that hands out an array index to every field name the planner asks for.
//! The resulting name-to-index table is fixed once the plan exists, so
//! [`TargetBuilder::add`] is a hash lookup plus a store, and names the target
//! does not accept are ignored.
//!
//! ```
//! use shapemap_core::shape::{Describe, ShapeBuilder};
//! use shapemap_core::Engine;
//!
//! #[derive(Default)]
//! struct Point { x: i64, y: i64 }
//!
//! impl Describe for Point {
//!     fn describe(shape: &mut ShapeBuilder<Self>) {
//!         shape
//!             .field("x", |p: &Point| p.x, |p, v| p.x = v)
//!             .field("y", |p: &Point| p.y, |p, v| p.y = v)
//!             .default_constructor(Point::default);
//!     }
//! }
//!
//! let engine = Engine::new();
//! let points = engine.string_target_builder::<Point>().unwrap();
//! let p = points.instance().add("x", "3").add("y", "4").add("z", "5").build().unwrap();
//! assert_eq!((p.x, p.y), (3, 4));
//! ```

use crate::error::{Result, ShapeError};
use crate::mapper::MapperInstance;
use crate::plan::{BindingPlan, OverrideFns, ValueSource};
use crate::shape::{BatchAccess, GroupReader, GroupWriter, ReadableField, ShapeId, SourceShape};
use crate::tier::TierKind;
use crate::value::{FieldType, SemType, Value};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Instance type of an [`ArraySourceShape`]
#[derive(Debug, Clone, Default)]
pub struct ArrayValues(Vec<Value>);

impl ArrayValues {
    /// Value at `index`; out of range reads as null
    pub fn get(&self, index: usize) -> Value {
        self.0.get(index).cloned().unwrap_or_default()
    }
}

fn values_of(instance: &dyn Any) -> std::result::Result<&ArrayValues, ShapeError> {
    instance
        .downcast_ref::<ArrayValues>()
        .ok_or_else(|| ShapeError::InstanceMismatch {
            expected: "ArrayValues".to_string(),
        })
}

/// Synthetic source shape: every name is readable, each at its own index
pub struct ArraySourceShape {
    id: ShapeId,
    ty: FieldType,
    names: Mutex<HashMap<Arc<str>, usize>>,
}

impl ArraySourceShape {
    /// Fields typed `Any`; conversions happen per value
    pub fn dynamic() -> Self {
        Self::new(FieldType::any(), 0)
    }

    /// Fields typed `Option<String>`; conversions resolve statically
    pub fn strings() -> Self {
        Self::new(FieldType::nullable(SemType::String), 1)
    }

    fn new(ty: FieldType, variant: u64) -> Self {
        Self {
            id: ShapeId::of::<ArrayValues>(format!("Builder[{}]", ty), variant),
            ty,
            names: Mutex::new(HashMap::new()),
        }
    }

    fn index(&self, name: &str) -> usize {
        let mut names = self.names.lock();
        let next = names.len();
        *names.entry(name.into()).or_insert(next)
    }
}

impl SourceShape for ArraySourceShape {
    fn id(&self) -> &ShapeId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<ReadableField> {
        let index = self.index(name);
        Some(ReadableField {
            name: name.into(),
            ty: self.ty.clone(),
            read: Arc::new(move |instance: &dyn Any| Ok(values_of(instance)?.get(index))),
            batch_slot: Some(index),
        })
    }

    fn batch(&self) -> Option<Arc<dyn BatchAccess>> {
        Some(Arc::new(ArrayBatch))
    }
}

struct ArrayBatch;

impl BatchAccess for ArrayBatch {
    fn group_reader(&self, slots: &[usize]) -> Option<GroupReader> {
        let slots = slots.to_vec();
        Some(Arc::new(move |instance: &dyn Any, buffer: &mut Vec<Value>| {
            let values = values_of(instance)?;
            buffer.extend(slots.iter().map(|&i| values.get(i)));
            Ok(())
        }))
    }

    fn group_writer(&self, _slots: &[usize]) -> Option<GroupWriter> {
        None
    }
}

/// Name to index table recovered from a builder plan
#[derive(Debug)]
struct Layout {
    names: HashMap<Arc<str>, usize>,
    width: usize,
}

impl Layout {
    fn from_plan(plan: &BindingPlan) -> Self {
        let names: HashMap<Arc<str>, usize> = plan
            .bindings()
            .filter_map(|b| match &b.source {
                ValueSource::Field {
                    name,
                    batch_slot: Some(index),
                    ..
                } => Some((name.clone(), *index)),
                _ => None,
            })
            .collect();
        let width = names.values().map(|i| i + 1).max().unwrap_or(0);
        Self { names, width }
    }
}

/// Shared core of both builder flavors
struct Factory<T> {
    mapper: Arc<MapperInstance>,
    layout: Arc<Layout>,
    _target: PhantomData<fn() -> T>,
}

impl<T: Any> Factory<T> {
    fn new(mapper: Arc<MapperInstance>) -> Self {
        let layout = Arc::new(Layout::from_plan(mapper.plan()));
        Self {
            mapper,
            layout,
            _target: PhantomData,
        }
    }

    fn values(&self) -> Filling<T> {
        Filling {
            mapper: self.mapper.clone(),
            layout: self.layout.clone(),
            values: vec![Value::Null; self.layout.width],
            _target: PhantomData,
        }
    }

    fn fields(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.layout.names.keys().map(|n| &**n).collect();
        names.sort_unstable();
        names
    }
}

impl<T> Clone for Factory<T> {
    fn clone(&self) -> Self {
        Self {
            mapper: self.mapper.clone(),
            layout: self.layout.clone(),
            _target: PhantomData,
        }
    }
}

struct Filling<T> {
    mapper: Arc<MapperInstance>,
    layout: Arc<Layout>,
    values: Vec<Value>,
    _target: PhantomData<fn() -> T>,
}

impl<T: Any> Filling<T> {
    fn put(&mut self, name: &str, value: Value) {
        if let Some(&index) = self.layout.names.get(name) {
            self.values[index] = value;
        }
    }

    fn build(self) -> Result<T> {
        let source = ArrayValues(self.values);
        let boxed = self.mapper.transform(&source, &OverrideFns::default())?;
        crate::mapper::downcast_target(boxed, self.mapper.plan())
    }
}

/// Hands out [`TargetBuilder`]s for `T`
pub struct TargetBuilderFactory<T> {
    inner: Factory<T>,
}

impl<T: Any> TargetBuilderFactory<T> {
    pub(crate) fn new(mapper: Arc<MapperInstance>) -> Self {
        Self {
            inner: Factory::new(mapper),
        }
    }

    pub fn instance(&self) -> TargetBuilder<T> {
        TargetBuilder {
            filling: self.inner.values(),
        }
    }

    /// Names `add` does not ignore, sorted
    pub fn fields(&self) -> Vec<&str> {
        self.inner.fields()
    }

    pub fn active_tier(&self) -> TierKind {
        self.inner.mapper.active_tier()
    }
}

impl<T> Clone for TargetBuilderFactory<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Values of any type, converted per value when built
pub struct TargetBuilder<T> {
    filling: Filling<T>,
}

impl<T: Any> TargetBuilder<T> {
    /// Set `name`; a later add of the same name replaces the value
    pub fn add(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.filling.put(name, value.into());
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.filling.put(name, value.into());
        self
    }

    pub fn build(self) -> Result<T> {
        self.filling.build()
    }
}

/// Hands out [`StringTargetBuilder`]s for `T`
pub struct StringTargetBuilderFactory<T> {
    inner: Factory<T>,
}

impl<T: Any> StringTargetBuilderFactory<T> {
    pub(crate) fn new(mapper: Arc<MapperInstance>) -> Self {
        Self {
            inner: Factory::new(mapper),
        }
    }

    pub fn instance(&self) -> StringTargetBuilder<T> {
        StringTargetBuilder {
            filling: self.inner.values(),
        }
    }

    pub fn fields(&self) -> Vec<&str> {
        self.inner.fields()
    }

    pub fn active_tier(&self) -> TierKind {
        self.inner.mapper.active_tier()
    }
}

impl<T> Clone for StringTargetBuilderFactory<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Textual values, parsed into the target's field types
pub struct StringTargetBuilder<T> {
    filling: Filling<T>,
}

impl<T: Any> StringTargetBuilder<T> {
    pub fn add(mut self, name: &str, value: impl Into<String>) -> Self {
        self.filling.put(name, Value::String(value.into()));
        self
    }

    /// `None` reads as null and goes through the null policy
    pub fn add_optional(mut self, name: &str, value: Option<String>) -> Self {
        self.filling.put(name, Value::from(value));
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.filling.put(name, Value::String(value.into()));
        self
    }

    pub fn build(self) -> Result<T> {
        self.filling.build()
    }
}
