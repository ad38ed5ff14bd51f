//! Shape declaration for Rust types
//!
//! A type takes part in mapping by implementing [`Describe`], declaring its
//! fields, accessors and constructor on a [`ShapeBuilder`]:
//!
//! ```
//! use shapemap_core::shape::{Describe, ShapeBuilder, Slot};
//!
//! pub struct Person {
//!     pub name: String,
//!     pub age: i64,
//! }
//!
//! impl Describe for Person {
//!     fn describe(shape: &mut ShapeBuilder<Self>) {
//!         shape
//!             .field("name", |p: &Person| p.name.clone(), |p, v| p.name = v)
//!             .field("age", |p: &Person| p.age, |p, v| p.age = v)
//!             .constructor(
//!                 [Slot::required::<String>("name"), Slot::with_default("age", 0i64)],
//!                 |args| Ok(Person { name: args.take("name")?, age: args.take_or("age", 0)? }),
//!             );
//!     }
//! }
//! ```
//!
//! Fields declared under a non-eligible visibility are reached through
//! accessor methods instead: `getX`, `x` or `isX` (booleans) for reading,
//! `setX` or `x` for writing. An accessor is only used when its type equals
//! the field's declared type.
//!
//! Copyright (c) 2025 Shapemap Team
//! Licensed under the Apache-2.0 license

use super::{
    short_type_name, BatchAccess, Constructor, CtorArgs, GroupReader, GroupWriter, ReadableField,
    ShapeDescriptor, ShapeId, ShapeIntrospector, Slot, Visibility, WritableField,
};
use crate::config::VisibilityPolicy;
use crate::error::{ConversionError, ShapeError};
use crate::value::{FieldType, SemType, Value, ValueType};
use std::any::Any;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

type TypedGet<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
type TypedSet<T> = Arc<dyn Fn(&mut T, Value) -> Result<(), ConversionError> + Send + Sync>;
type TypedConstruct<T> = Arc<dyn Fn(&mut CtorArgs) -> Result<T, ShapeError> + Send + Sync>;

/// Types that can describe their own shape
pub trait Describe: Any + Send + Sized {
    fn describe(shape: &mut ShapeBuilder<Self>);
}

struct DeclaredField<T> {
    name: Arc<str>,
    visibility: Visibility,
    ty: FieldType,
    get: Option<TypedGet<T>>,
    set: Option<TypedSet<T>>,
}

struct Accessor<F> {
    name: String,
    visibility: Visibility,
    ty: FieldType,
    func: F,
}

/// Collects the declarations of a type `T`
pub struct ShapeBuilder<T> {
    section: Visibility,
    fields: Vec<DeclaredField<T>>,
    getters: Vec<Accessor<TypedGet<T>>>,
    setters: Vec<Accessor<TypedSet<T>>>,
    constructor: Option<(Vec<Slot>, TypedConstruct<T>)>,
}

impl<T: Any + Send> ShapeBuilder<T> {
    pub fn new() -> Self {
        Self {
            section: Visibility::Public,
            fields: Vec::new(),
            getters: Vec::new(),
            setters: Vec::new(),
            constructor: None,
        }
    }

    /// Visibility applied to the declarations that follow
    pub fn visibility(&mut self, visibility: Visibility) -> &mut Self {
        self.section = visibility;
        self
    }

    /// Declare a readable and writable field
    pub fn field<V, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        V: ValueType,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.fields.push(DeclaredField {
            name: name.into(),
            visibility: self.section,
            ty: V::field_type(),
            get: Some(typed_get(get)),
            set: Some(typed_set(set)),
        });
        self
    }

    /// Declare a field that can be read but never written
    pub fn readonly<V, G>(&mut self, name: &str, get: G) -> &mut Self
    where
        V: ValueType,
        G: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.fields.push(DeclaredField {
            name: name.into(),
            visibility: self.section,
            ty: V::field_type(),
            get: Some(typed_get(get)),
            set: None,
        });
        self
    }

    /// Declare a field with no direct accessor; it is reachable only through getters and setters
    pub fn hidden<V: ValueType>(&mut self, name: &str) -> &mut Self {
        self.fields.push(DeclaredField {
            name: name.into(),
            visibility: Visibility::Private,
            ty: V::field_type(),
            get: None,
            set: None,
        });
        self
    }

    /// Declare a getter method, e.g. `getName` or `isActive`
    pub fn getter<V, G>(&mut self, method: &str, get: G) -> &mut Self
    where
        V: ValueType,
        G: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.getters.push(Accessor {
            name: method.to_string(),
            visibility: self.section,
            ty: V::field_type(),
            func: typed_get(get),
        });
        self
    }

    /// Declare a setter method, e.g. `setName`
    pub fn setter<V, S>(&mut self, method: &str, set: S) -> &mut Self
    where
        V: ValueType,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.setters.push(Accessor {
            name: method.to_string(),
            visibility: self.section,
            ty: V::field_type(),
            func: typed_set(set),
        });
        self
    }

    /// Declare the constructor
    pub fn constructor<F>(&mut self, slots: impl IntoIterator<Item = Slot>, construct: F) -> &mut Self
    where
        F: Fn(&mut CtorArgs) -> Result<T, ShapeError> + Send + Sync + 'static,
    {
        self.constructor = Some((slots.into_iter().collect(), Arc::new(construct)));
        self
    }

    /// Declare a constructor without parameters
    pub fn default_constructor<F>(&mut self, construct: F) -> &mut Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.constructor(Vec::new(), move |_| Ok(construct()))
    }

    /// Resolve accessors against `policy` and erase the instance type
    pub fn finish(self, policy: &VisibilityPolicy) -> Result<ShapeDescriptor, ShapeError> {
        let shape_name = short_type_name::<T>();
        self.check_duplicates()?;

        let mut batch_getters: Vec<TypedGet<T>> = Vec::new();
        let mut batch_setters: Vec<(Arc<str>, TypedSet<T>)> = Vec::new();
        let mut readable = Vec::new();
        let mut writable = Vec::new();

        for field in &self.fields {
            if let Some(get) = self.resolve_getter(field, policy) {
                readable.push(ReadableField {
                    name: field.name.clone(),
                    ty: field.ty.clone(),
                    read: erase_get::<T>(get.clone(), &shape_name),
                    batch_slot: Some(batch_getters.len()),
                });
                batch_getters.push(get);
            }
            if let Some(set) = self.resolve_setter(field, policy) {
                writable.push(WritableField {
                    name: field.name.clone(),
                    ty: field.ty.clone(),
                    write: erase_set::<T>(set.clone(), field.name.clone(), &shape_name),
                    batch_slot: Some(batch_setters.len()),
                });
                batch_setters.push((field.name.clone(), set));
            }
        }

        let id = ShapeId::of::<T>(shape_name.as_str(), 0);
        let mut descriptor = ShapeDescriptor::new(id)
            .with_readable(readable)
            .with_writable(writable)
            .with_batch(Arc::new(TypedBatch {
                shape_name: shape_name.clone(),
                getters: batch_getters.into(),
                setters: batch_setters.into(),
            }));

        if let Some((slots, construct)) = self.constructor {
            descriptor = descriptor.with_constructor(Constructor {
                slots: slots.into(),
                construct: Arc::new(move |args: &mut CtorArgs| {
                    construct(args).map(|t| Box::new(t) as Box<dyn Any + Send>)
                }),
            });
        }

        Ok(descriptor)
    }

    fn check_duplicates(&self) -> Result<(), ShapeError> {
        let mut seen = HashSet::new();
        for name in self.fields.iter().map(|f| &*f.name) {
            if !seen.insert(name) {
                return Err(ShapeError::Duplicate {
                    name: name.to_string(),
                });
            }
        }
        if let Some((slots, _)) = &self.constructor {
            let mut seen = HashSet::new();
            for name in slots.iter().map(|s| &*s.name) {
                if !seen.insert(name) {
                    return Err(ShapeError::Duplicate {
                        name: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn resolve_getter(&self, field: &DeclaredField<T>, policy: &VisibilityPolicy) -> Option<TypedGet<T>> {
        if policy.allows(field.visibility) {
            if let Some(get) = &field.get {
                return Some(get.clone());
            }
        }
        let capitalized = capitalize(&field.name);
        let mut candidates = vec![format!("get{}", capitalized), field.name.to_string()];
        if field.ty.ty == SemType::Bool {
            candidates.push(format!("is{}", capitalized));
        }
        candidates.iter().find_map(|candidate| {
            self.getters
                .iter()
                .find(|a| &a.name == candidate && a.ty == field.ty && policy.allows(a.visibility))
                .map(|a| a.func.clone())
        })
    }

    fn resolve_setter(&self, field: &DeclaredField<T>, policy: &VisibilityPolicy) -> Option<TypedSet<T>> {
        if policy.allows(field.visibility) {
            if let Some(set) = &field.set {
                return Some(set.clone());
            }
            // readable-only fields stay read-only even when setters exist
            if field.get.is_some() {
                return None;
            }
        }
        let candidates = [format!("set{}", capitalize(&field.name)), field.name.to_string()];
        candidates.iter().find_map(|candidate| {
            self.setters
                .iter()
                .find(|a| &a.name == candidate && a.ty == field.ty && policy.allows(a.visibility))
                .map(|a| a.func.clone())
        })
    }
}

impl<T: Any + Send> Default for ShapeBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn typed_get<T, V, G>(get: G) -> TypedGet<T>
where
    V: ValueType,
    G: Fn(&T) -> V + Send + Sync + 'static,
{
    Arc::new(move |t: &T| get(t).into_value())
}

fn typed_set<T, V, S>(set: S) -> TypedSet<T>
where
    V: ValueType,
    S: Fn(&mut T, V) + Send + Sync + 'static,
{
    Arc::new(move |t: &mut T, value: Value| {
        set(t, V::from_value(value)?);
        Ok(())
    })
}

fn erase_get<T: Any>(get: TypedGet<T>, shape_name: &str) -> super::ReadFn {
    let expected = shape_name.to_string();
    Arc::new(move |instance: &dyn Any| {
        instance
            .downcast_ref::<T>()
            .map(|t| get(t))
            .ok_or_else(|| ShapeError::InstanceMismatch {
                expected: expected.clone(),
            })
    })
}

fn erase_set<T: Any>(set: TypedSet<T>, field: Arc<str>, shape_name: &str) -> super::WriteFn {
    let expected = shape_name.to_string();
    Arc::new(move |instance: &mut dyn Any, value: Value| {
        let found = value.type_label();
        let target = instance
            .downcast_mut::<T>()
            .ok_or_else(|| ShapeError::InstanceMismatch {
                expected: expected.clone(),
            })?;
        set(target, value).map_err(|e| ShapeError::TypeMismatch {
            field: field.to_string(),
            expected: e.to_string(),
            found,
        })
    })
}

/// Batched access for a described type: one downcast, then typed accessors
struct TypedBatch<T> {
    shape_name: String,
    getters: Arc<[TypedGet<T>]>,
    setters: Arc<[(Arc<str>, TypedSet<T>)]>,
}

impl<T: Any + Send> BatchAccess for TypedBatch<T> {
    fn group_reader(&self, slots: &[usize]) -> Option<GroupReader> {
        let getters: Vec<TypedGet<T>> = slots
            .iter()
            .map(|&i| self.getters.get(i).cloned())
            .collect::<Option<_>>()?;
        let expected = self.shape_name.clone();
        Some(Arc::new(move |instance: &dyn Any, out: &mut Vec<Value>| {
            let t = instance
                .downcast_ref::<T>()
                .ok_or_else(|| ShapeError::InstanceMismatch {
                    expected: expected.clone(),
                })?;
            out.extend(getters.iter().map(|get| get(t)));
            Ok(())
        }))
    }

    fn group_writer(&self, slots: &[usize]) -> Option<GroupWriter> {
        let setters: Vec<(Arc<str>, TypedSet<T>)> = slots
            .iter()
            .map(|&i| self.setters.get(i).cloned())
            .collect::<Option<_>>()?;
        let expected = self.shape_name.clone();
        Some(Arc::new(move |instance: &mut dyn Any, values: Vec<Value>| {
            let t = instance
                .downcast_mut::<T>()
                .ok_or_else(|| ShapeError::InstanceMismatch {
                    expected: expected.clone(),
                })?;
            for ((name, set), value) in setters.iter().zip(values) {
                let found = value.type_label();
                set(t, value).map_err(|e| ShapeError::TypeMismatch {
                    field: name.to_string(),
                    expected: e.to_string(),
                    found,
                })?;
            }
            Ok(())
        }))
    }
}

/// Introspector for a [`Describe`] type
pub struct Introspect<T>(PhantomData<fn() -> T>);

impl<T: Describe> Introspect<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Describe> Default for Introspect<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Describe> ShapeIntrospector for Introspect<T> {
    fn shape_id(&self) -> ShapeId {
        ShapeId::of::<T>(short_type_name::<T>(), 0)
    }

    fn describe(&self, policy: &VisibilityPolicy) -> Result<ShapeDescriptor, ShapeError> {
        let mut builder = ShapeBuilder::<T>::new();
        T::describe(&mut builder);
        builder.finish(policy)
    }
}
