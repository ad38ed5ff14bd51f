//! Shape introspection
//!
//! A shape is the structural description of a type: the fields that can be
//! read, the fields that can be written, and how an instance is constructed.
//! Instances travel through the engine type-erased (`&dyn Any`); every
//! accessor checks the concrete type on entry.
//!
//! Three introspectors ship with the crate:
//!
//! - [`Introspect<T>`](builder::Introspect) for Rust types implementing [`Describe`](builder::Describe)
//! - [`RecordSchema`](record::RecordSchema) for dynamic, schema-described records
//! - [`MapShape`](map::MapShape) for open name/value maps (source only)
//!
//! Copyright (c) 2025 Shapemap Team
//! Licensed under the Apache-2.0 license

pub mod builder;
pub mod map;
pub mod record;
pub mod registry;

use crate::config::VisibilityPolicy;
use crate::error::ShapeError;
use crate::value::{FieldType, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

pub use builder::{Describe, Introspect, ShapeBuilder};
pub use map::{MapShape, ValueMap};
pub use record::{Record, RecordField, RecordSchema};
pub use registry::ShapeRegistry;

/// Reads one field from a type-erased instance
pub type ReadFn = Arc<dyn Fn(&dyn Any) -> Result<Value, ShapeError> + Send + Sync>;

/// Writes one field on a type-erased instance
pub type WriteFn = Arc<dyn Fn(&mut dyn Any, Value) -> Result<(), ShapeError> + Send + Sync>;

/// Builds an instance from constructor arguments
pub type ConstructFn =
    Arc<dyn Fn(&mut CtorArgs) -> Result<Box<dyn Any + Send>, ShapeError> + Send + Sync>;

/// Reads a fixed group of fields in one pass, appending to the buffer in group order
pub type GroupReader = Arc<dyn Fn(&dyn Any, &mut Vec<Value>) -> Result<(), ShapeError> + Send + Sync>;

/// Writes a fixed group of fields in one pass; values arrive in group order
pub type GroupWriter = Arc<dyn Fn(&mut dyn Any, Vec<Value>) -> Result<(), ShapeError> + Send + Sync>;

/// Identity of a shape for caching
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeId {
    name: Arc<str>,
    instance: TypeId,
    variant: u64,
}

impl ShapeId {
    /// Identity of a shape whose instances are of type `T`.
    ///
    /// `variant` tells apart shapes sharing one instance type (record schemas).
    pub fn of<T: Any>(name: impl Into<Arc<str>>, variant: u64) -> Self {
        Self {
            name: name.into(),
            instance: TypeId::of::<T>(),
            variant,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_type(&self) -> TypeId {
        self.instance
    }

    pub fn variant(&self) -> u64 {
        self.variant
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Declared access level of a field or accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Internal,
    Protected,
    Private,
}

/// A readable field
#[derive(Clone)]
pub struct ReadableField {
    pub name: Arc<str>,
    pub ty: FieldType,
    pub read: ReadFn,
    /// Position in the shape's batch table, if the shape offers batched access
    pub batch_slot: Option<usize>,
}

/// A writable field
#[derive(Clone)]
pub struct WritableField {
    pub name: Arc<str>,
    pub ty: FieldType,
    pub write: WriteFn,
    pub batch_slot: Option<usize>,
}

impl fmt::Debug for ReadableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadableField")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("batch_slot", &self.batch_slot)
            .finish()
    }
}

impl fmt::Debug for WritableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WritableField")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("batch_slot", &self.batch_slot)
            .finish()
    }
}

/// How a constructor slot behaves when nothing binds to it
#[derive(Clone)]
pub enum SlotKind {
    /// Must be bound at plan time
    Required,
    /// May be left unbound; the constructor supplies its own default
    Optional,
    /// May be left unbound; the declared default is materialized by conservative construction
    Defaulted(Arc<dyn Fn() -> Value + Send + Sync>),
}

/// One positional constructor parameter
#[derive(Clone)]
pub struct Slot {
    pub name: Arc<str>,
    pub ty: FieldType,
    pub kind: SlotKind,
}

impl Slot {
    pub fn required<V: ValueType>(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ty: V::field_type(),
            kind: SlotKind::Required,
        }
    }

    pub fn optional<V: ValueType>(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            ty: V::field_type(),
            kind: SlotKind::Optional,
        }
    }

    pub fn with_default<V: ValueType + Clone + Sync>(name: impl Into<Arc<str>>, default: V) -> Self {
        Self {
            name: name.into(),
            ty: V::field_type(),
            kind: SlotKind::Defaulted(Arc::new(move || default.clone().into_value())),
        }
    }

    /// Slot with an explicit type, used by dynamic shapes
    pub fn dynamic(name: impl Into<Arc<str>>, ty: FieldType, kind: SlotKind) -> Self {
        Self {
            name: name.into(),
            ty,
            kind,
        }
    }

    pub fn is_optional(&self) -> bool {
        !matches!(self.kind, SlotKind::Required)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SlotKind::Required => "required",
            SlotKind::Optional => "optional",
            SlotKind::Defaulted(_) => "defaulted",
        };
        f.debug_struct("Slot")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("kind", &kind)
            .finish()
    }
}

/// A constructor: ordered slots plus the function that consumes them
#[derive(Clone)]
pub struct Constructor {
    pub slots: Arc<[Slot]>,
    pub construct: ConstructFn,
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor").field("slots", &self.slots).finish()
    }
}

/// Arguments handed to a constructor.
///
/// Values are positional. A set bit in the defaults mask marks a slot that
/// was left unbound and must take the constructor's own default; this is the
/// marker used by synthetic construction.
pub struct CtorArgs {
    slots: Arc<[Slot]>,
    values: Vec<Option<Value>>,
    defaults_mask: u64,
}

impl CtorArgs {
    pub fn new(slots: Arc<[Slot]>) -> Self {
        let values = vec![None; slots.len()];
        Self {
            slots,
            values,
            defaults_mask: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = Some(value);
        }
    }

    /// Flag slot `index` as unbound
    pub fn mark_default(&mut self, index: usize) {
        if index < 64 {
            self.defaults_mask |= 1 << index;
        }
    }

    pub fn clear_default(&mut self, index: usize) {
        if index < 64 {
            self.defaults_mask &= !(1 << index);
        }
    }

    pub fn defaults_mask(&self) -> u64 {
        self.defaults_mask
    }

    pub fn uses_default(&self, name: &str) -> bool {
        self.position(name)
            .map(|i| i < 64 && self.defaults_mask & (1 << i) != 0)
            .unwrap_or(false)
    }

    /// Take a supplied argument; fails when the slot carries no value
    pub fn take<V: ValueType>(&mut self, name: &str) -> Result<V, ShapeError> {
        let index = self.index_of(name)?;
        match self.values[index].take() {
            Some(value) => convert_arg(name, value),
            None => Err(ShapeError::MissingArgument {
                name: name.to_string(),
            }),
        }
    }

    /// Take a supplied argument, or `default` when the slot was left unbound
    pub fn take_or<V: ValueType>(&mut self, name: &str, default: V) -> Result<V, ShapeError> {
        self.take_or_else(name, || default)
    }

    pub fn take_or_else<V: ValueType>(
        &mut self,
        name: &str,
        default: impl FnOnce() -> V,
    ) -> Result<V, ShapeError> {
        let index = self.index_of(name)?;
        match self.values[index].take() {
            Some(value) => convert_arg(name, value),
            None => Ok(default()),
        }
    }

    pub(crate) fn slots(&self) -> &Arc<[Slot]> {
        &self.slots
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| &*s.name == name)
    }

    fn index_of(&self, name: &str) -> Result<usize, ShapeError> {
        self.position(name).ok_or_else(|| ShapeError::UnknownSlot {
            name: name.to_string(),
        })
    }
}

fn convert_arg<V: ValueType>(name: &str, value: Value) -> Result<V, ShapeError> {
    let found = value.type_label();
    V::from_value(value).map_err(|_| ShapeError::TypeMismatch {
        field: name.to_string(),
        expected: V::field_type().to_string(),
        found,
    })
}

/// Batched access to a fixed set of fields through one type check
pub trait BatchAccess: Send + Sync {
    /// Reader for the given batch slots, in order
    fn group_reader(&self, slots: &[usize]) -> Option<GroupReader>;

    /// Writer for the given batch slots, in order
    fn group_writer(&self, slots: &[usize]) -> Option<GroupWriter>;
}

/// Resolves a field name to a reader for open shapes
pub type OpenFieldFn = Arc<dyn Fn(&str) -> Option<ReadableField> + Send + Sync>;

/// The structural description of a type
#[derive(Clone)]
pub struct ShapeDescriptor {
    id: ShapeId,
    readable: Vec<ReadableField>,
    writable: Vec<WritableField>,
    constructor: Option<Constructor>,
    batch: Option<Arc<dyn BatchAccess>>,
    open: Option<OpenFieldFn>,
}

impl ShapeDescriptor {
    pub fn new(id: ShapeId) -> Self {
        Self {
            id,
            readable: Vec::new(),
            writable: Vec::new(),
            constructor: None,
            batch: None,
            open: None,
        }
    }

    pub fn with_readable(mut self, fields: Vec<ReadableField>) -> Self {
        self.readable = fields;
        self
    }

    pub fn with_writable(mut self, fields: Vec<WritableField>) -> Self {
        self.writable = fields;
        self
    }

    pub fn with_constructor(mut self, constructor: Constructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn with_batch(mut self, batch: Arc<dyn BatchAccess>) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Make every name readable through `resolve`
    pub fn with_open_fields(mut self, resolve: OpenFieldFn) -> Self {
        self.open = Some(resolve);
        self
    }

    pub fn id(&self) -> &ShapeId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    pub fn readable(&self) -> &[ReadableField] {
        &self.readable
    }

    pub fn writable(&self) -> &[WritableField] {
        &self.writable
    }

    pub fn reader(&self, name: &str) -> Option<&ReadableField> {
        self.readable.iter().find(|f| &*f.name == name)
    }

    pub fn writer(&self, name: &str) -> Option<&WritableField> {
        self.writable.iter().find(|f| &*f.name == name)
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    pub fn batch_access(&self) -> Option<&Arc<dyn BatchAccess>> {
        self.batch.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Whether `name` is a constructor slot or a writable field
    pub fn accepts(&self, name: &str) -> bool {
        self.writer(name).is_some()
            || self
                .constructor
                .as_ref()
                .map(|c| c.slots.iter().any(|s| &*s.name == name))
                .unwrap_or(false)
    }
}

impl fmt::Debug for ShapeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeDescriptor")
            .field("id", &self.id)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .field("constructor", &self.constructor)
            .field("batched", &self.batch.is_some())
            .field("open", &self.open.is_some())
            .finish()
    }
}

/// Describes one type. Must be deterministic: the registry caches the result per shape id.
pub trait ShapeIntrospector: Send + Sync {
    fn shape_id(&self) -> ShapeId;

    fn describe(&self, policy: &VisibilityPolicy) -> Result<ShapeDescriptor, ShapeError>;
}

/// What the binding planner needs from a source shape
pub trait SourceShape: Send + Sync {
    fn id(&self) -> &ShapeId;

    /// Reader for `name`, if the shape exposes it
    fn field(&self, name: &str) -> Option<ReadableField>;

    fn batch(&self) -> Option<Arc<dyn BatchAccess>>;
}

impl SourceShape for ShapeDescriptor {
    fn id(&self) -> &ShapeId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<ReadableField> {
        if let Some(field) = self.reader(name) {
            return Some(field.clone());
        }
        self.open.as_ref().and_then(|resolve| resolve(name))
    }

    fn batch(&self) -> Option<Arc<dyn BatchAccess>> {
        self.batch.clone()
    }
}

/// Short, human-readable name of a Rust type
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    match full.find('<') {
        Some(generic) => {
            let (head, tail) = full.split_at(generic);
            format!("{}{}", head.rsplit("::").next().unwrap_or(head), tail)
        }
        None => full.rsplit("::").next().unwrap_or(full).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> Arc<[Slot]> {
        vec![
            Slot::required::<String>("name"),
            Slot::with_default("age", 18i64),
        ]
        .into()
    }

    #[test]
    fn test_ctor_args_take() {
        let mut args = CtorArgs::new(slots());
        args.set(0, Value::from("Ann"));
        args.mark_default(1);

        assert!(args.uses_default("age"));
        assert!(!args.uses_default("name"));
        assert_eq!(args.defaults_mask(), 0b10);
        assert_eq!(args.take::<String>("name").unwrap(), "Ann");
        assert_eq!(args.take_or::<i64>("age", 21).unwrap(), 21);
    }

    #[test]
    fn test_ctor_args_errors() {
        let mut args = CtorArgs::new(slots());
        assert!(matches!(
            args.take::<String>("name"),
            Err(ShapeError::MissingArgument { .. })
        ));
        assert!(matches!(
            args.take::<String>("nope"),
            Err(ShapeError::UnknownSlot { .. })
        ));
        args.set(1, Value::from("old"));
        assert!(matches!(
            args.take::<i64>("age"),
            Err(ShapeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<String>(), "String");
        assert_eq!(short_type_name::<Option<i64>>(), "Option<i64>");
    }
}
