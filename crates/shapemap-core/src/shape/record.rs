//! Dynamic records described by a schema
//!
//! A [`RecordSchema`] declares named, typed fields. Fields marked `required`
//! become mandatory constructor slots, fields with a `default` become optional
//! slots, and every field is writable. Schemas deserialize from TOML, YAML or
//! JSON:
//!
//! ```toml
//! name = "Person"
//! fields = [
//!     { name = "id", type = "i64", required = true },
//!     { name = "name", type = "string" },
//!     { name = "nickname", type = "string", nullable = true },
//!     { name = "country", type = "string", default = "LT" },
//! ]
//! ```
//!
//! Copyright (c) 2025 Shapemap Team
//! Licensed under the Apache-2.0 license

use super::{
    BatchAccess, ConstructFn, Constructor, CtorArgs, GroupReader, GroupWriter, ReadableField, ShapeDescriptor,
    ShapeId, ShapeIntrospector, Slot, SlotKind, WritableField,
};
use crate::config::VisibilityPolicy;
use crate::error::ShapeError;
use crate::value::{FieldType, SemType, Value};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One field of a record schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    #[serde(flatten)]
    pub ty: FieldType,
    /// Must be bound when a record is constructed
    #[serde(default)]
    pub required: bool,
    /// Used when construction leaves the field unbound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaDef {
    name: String,
    fields: Vec<RecordField>,
}

/// Named, typed field list shared by all records built from it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaDef", into = "SchemaDef")]
pub struct RecordSchema {
    name: Arc<str>,
    fields: Vec<RecordField>,
    defaults: Vec<Option<Value>>,
    index: HashMap<String, usize>,
    fingerprint: u64,
}

impl RecordSchema {
    pub fn new(name: impl Into<String>, fields: Vec<RecordField>) -> Result<Self, ShapeError> {
        let name = name.into();
        let mut index = HashMap::with_capacity(fields.len());
        let mut defaults = Vec::with_capacity(fields.len());
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);

        for (i, field) in fields.iter().enumerate() {
            if index.insert(field.name.clone(), i).is_some() {
                return Err(ShapeError::Duplicate {
                    name: field.name.clone(),
                });
            }
            let default = match &field.default {
                Some(json) => Some(Value::from_json(json, &field.ty).map_err(|e| {
                    ShapeError::TypeMismatch {
                        field: field.name.clone(),
                        expected: field.ty.to_string(),
                        found: e.to_string(),
                    }
                })?),
                None => None,
            };
            field.name.hash(&mut hasher);
            field.ty.hash(&mut hasher);
            field.required.hash(&mut hasher);
            default.as_ref().map(|v| v.to_string()).hash(&mut hasher);
            defaults.push(default);
        }

        Ok(Self {
            name: name.into(),
            fields,
            defaults,
            index,
            fingerprint: hasher.finish(),
        })
    }

    /// Start a schema in code
    pub fn builder(name: impl Into<String>) -> RecordSchemaBuilder {
        RecordSchemaBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[RecordField] {
        &self.fields
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn check(&self, record: &Record) -> Result<(), ShapeError> {
        if record.schema.fingerprint == self.fingerprint {
            Ok(())
        } else {
            Err(ShapeError::SchemaMismatch {
                expected: self.name.to_string(),
                found: record.schema.name.to_string(),
            })
        }
    }
}

impl TryFrom<SchemaDef> for RecordSchema {
    type Error = ShapeError;

    fn try_from(def: SchemaDef) -> Result<Self, Self::Error> {
        RecordSchema::new(def.name, def.fields)
    }
}

impl From<RecordSchema> for SchemaDef {
    fn from(schema: RecordSchema) -> Self {
        SchemaDef {
            name: schema.name.to_string(),
            fields: schema.fields,
        }
    }
}

/// Fluent schema construction
pub struct RecordSchemaBuilder {
    name: String,
    fields: Vec<RecordField>,
}

impl RecordSchemaBuilder {
    /// Optional, writable field
    pub fn field(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.push(RecordField {
            name: name.to_string(),
            ty,
            required: false,
            default: None,
        });
        self
    }

    /// Mandatory constructor field
    pub fn required(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.push(RecordField {
            name: name.to_string(),
            ty,
            required: true,
            default: None,
        });
        self
    }

    /// Optional constructor field with a default
    pub fn with_default(mut self, name: &str, ty: FieldType, default: Value) -> Self {
        self.fields.push(RecordField {
            name: name.to_string(),
            ty,
            required: false,
            default: Some(default.to_json()),
        });
        self
    }

    pub fn build(self) -> Result<Arc<RecordSchema>, ShapeError> {
        RecordSchema::new(self.name, self.fields).map(Arc::new)
    }
}

/// An instance of a record schema
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<RecordSchema>,
    values: Vec<Value>,
}

impl PartialEq for RecordSchema {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Record {
    /// A record with every field null
    pub fn new(schema: Arc<RecordSchema>) -> Self {
        let values = vec![Value::Null; schema.fields.len()];
        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    /// Set a field; the value must have the field's declared type
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ShapeError> {
        let i = self.schema.index_of(name).ok_or_else(|| ShapeError::UnknownSlot {
            name: name.to_string(),
        })?;
        let value = value.into();
        check_conforms(&self.schema.fields[i], &value)?;
        self.values[i] = value;
        Ok(())
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, ShapeError> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Build from a JSON object; keys not in the schema are ignored
    pub fn from_json(schema: Arc<RecordSchema>, json: &serde_json::Value) -> Result<Self, ShapeError> {
        let object = json.as_object().ok_or_else(|| ShapeError::TypeMismatch {
            field: schema.name.to_string(),
            expected: "object".to_string(),
            found: json.to_string(),
        })?;
        let mut record = Record::new(schema);
        for (i, field) in record.schema.clone().fields.iter().enumerate() {
            if let Some(raw) = object.get(&field.name) {
                record.values[i] =
                    Value::from_json(raw, &field.ty).map_err(|e| ShapeError::TypeMismatch {
                        field: field.name.clone(),
                        expected: field.ty.to_string(),
                        found: e.to_string(),
                    })?;
            }
        }
        Ok(record)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .schema
            .fields
            .iter()
            .zip(&self.values)
            .map(|(f, v)| (f.name.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

fn check_conforms(field: &RecordField, value: &Value) -> Result<(), ShapeError> {
    let ok = match value.sem_type() {
        None => field.ty.nullable || field.ty.ty == SemType::Any,
        Some(ty) => field.ty.ty == SemType::Any || ty == field.ty.ty,
    };
    if ok {
        Ok(())
    } else {
        Err(ShapeError::TypeMismatch {
            field: field.name.clone(),
            expected: field.ty.to_string(),
            found: value.type_label(),
        })
    }
}

fn record_ref<'a>(schema: &RecordSchema, instance: &'a dyn Any) -> Result<&'a Record, ShapeError> {
    let record = instance
        .downcast_ref::<Record>()
        .ok_or_else(|| ShapeError::InstanceMismatch {
            expected: schema.name.to_string(),
        })?;
    schema.check(record)?;
    Ok(record)
}

fn record_mut<'a>(schema: &RecordSchema, instance: &'a mut dyn Any) -> Result<&'a mut Record, ShapeError> {
    let record = instance
        .downcast_mut::<Record>()
        .ok_or_else(|| ShapeError::InstanceMismatch {
            expected: schema.name.to_string(),
        })?;
    schema.check(record)?;
    Ok(record)
}

struct RecordBatch {
    schema: Arc<RecordSchema>,
}

impl BatchAccess for RecordBatch {
    fn group_reader(&self, slots: &[usize]) -> Option<GroupReader> {
        if slots.iter().any(|&i| i >= self.schema.fields.len()) {
            return None;
        }
        let schema = self.schema.clone();
        let slots = slots.to_vec();
        Some(Arc::new(move |instance: &dyn Any, out: &mut Vec<Value>| {
            let record = record_ref(&schema, instance)?;
            out.extend(slots.iter().map(|&i| record.values[i].clone()));
            Ok(())
        }))
    }

    fn group_writer(&self, slots: &[usize]) -> Option<GroupWriter> {
        if slots.iter().any(|&i| i >= self.schema.fields.len()) {
            return None;
        }
        let schema = self.schema.clone();
        let slots = slots.to_vec();
        Some(Arc::new(move |instance: &mut dyn Any, values: Vec<Value>| {
            let record = record_mut(&schema, instance)?;
            for (&i, value) in slots.iter().zip(values) {
                check_conforms(&schema.fields[i], &value)?;
                record.values[i] = value;
            }
            Ok(())
        }))
    }
}

impl ShapeIntrospector for Arc<RecordSchema> {
    fn shape_id(&self) -> ShapeId {
        ShapeId::of::<Record>(self.name.clone(), self.fingerprint)
    }

    /// Record fields are all public; the visibility policy does not apply.
    fn describe(&self, _policy: &VisibilityPolicy) -> Result<ShapeDescriptor, ShapeError> {
        let mut readable = Vec::with_capacity(self.fields.len());
        let mut writable = Vec::with_capacity(self.fields.len());
        let mut slots = Vec::new();

        for (i, field) in self.fields.iter().enumerate() {
            let name: Arc<str> = field.name.as_str().into();
            let schema = self.clone();
            readable.push(ReadableField {
                name: name.clone(),
                ty: field.ty.clone(),
                read: Arc::new(move |instance: &dyn Any| {
                    record_ref(&schema, instance).map(|r| r.values[i].clone())
                }),
                batch_slot: Some(i),
            });

            let schema = self.clone();
            writable.push(WritableField {
                name: name.clone(),
                ty: field.ty.clone(),
                write: Arc::new(move |instance: &mut dyn Any, value: Value| {
                    let record = record_mut(&schema, instance)?;
                    check_conforms(&schema.fields[i], &value)?;
                    record.values[i] = value;
                    Ok(())
                }),
                batch_slot: Some(i),
            });

            if field.required {
                slots.push(Slot::dynamic(name, field.ty.clone(), SlotKind::Required));
            } else if let Some(default) = self.defaults[i].clone() {
                slots.push(Slot::dynamic(
                    name,
                    field.ty.clone(),
                    SlotKind::Defaulted(Arc::new(move || default.clone())),
                ));
            }
        }

        let schema = self.clone();
        let construct: ConstructFn = Arc::new(move |args: &mut CtorArgs| {
            let mut record = Record::new(schema.clone());
            let slots = args.slots().clone();
            for slot in slots.iter() {
                let i = schema.index_of(&slot.name).ok_or_else(|| ShapeError::UnknownSlot {
                    name: slot.name.to_string(),
                })?;
                let value: Value = match &schema.defaults[i] {
                    Some(default) => args.take_or(&slot.name, default.clone())?,
                    None => args.take(&slot.name)?,
                };
                check_conforms(&schema.fields[i], &value)?;
                record.values[i] = value;
            }
            Ok(Box::new(record) as Box<dyn Any + Send>)
        });

        Ok(ShapeDescriptor::new(self.shape_id())
            .with_readable(readable)
            .with_writable(writable)
            .with_constructor(Constructor {
                slots: slots.into(),
                construct,
            })
            .with_batch(Arc::new(RecordBatch {
                schema: self.clone(),
            })))
    }
}
