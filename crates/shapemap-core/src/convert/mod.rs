//! Type conversion resolution
//!
//! Given a (source type, target type) pair the resolver returns a
//! [`ConversionFunction`], marks the pair dynamic, or reports it incompatible.
//! Rules are tried in order:
//!
//! 1. identical types (or an `Any` target) resolve to the identity
//! 2. the injected [`ConverterRegistry`]
//! 3. wrapper unwrap / wrap / unwrap-both, each retried through rules 1–2
//!
//! A source declared `Any` is resolved at call time from the runtime type of
//! each value. Null handling is a separate policy: see [`NullHandling`].
//!
//! Copyright (c) 2025 Shapemap Team
//! Licensed under the Apache-2.0 license

pub mod standard;

use crate::config::{MapperConfig, NullPolicy, WrapperPolicy};
use crate::error::{ConversionError, Error, Result};
use crate::value::{FieldType, SemType, Value, WrapperType};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

pub use standard::StandardConverters;

/// Converts one non-null value
pub type ConvertFn = Arc<dyn Fn(Value) -> std::result::Result<Value, ConversionError> + Send + Sync>;

/// A resolved conversion; null always passes through untouched
#[derive(Clone)]
pub enum ConversionFunction {
    Identity,
    Convert { description: Arc<str>, func: ConvertFn },
}

impl ConversionFunction {
    pub fn new<F>(description: impl Into<Arc<str>>, func: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, ConversionError> + Send + Sync + 'static,
    {
        ConversionFunction::Convert {
            description: description.into(),
            func: Arc::new(func),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, ConversionFunction::Identity)
    }

    pub fn description(&self) -> &str {
        match self {
            ConversionFunction::Identity => "identity",
            ConversionFunction::Convert { description, .. } => description,
        }
    }

    pub fn apply(&self, value: Value) -> std::result::Result<Value, ConversionError> {
        match self {
            _ if value.is_null() => Ok(value),
            ConversionFunction::Identity => Ok(value),
            ConversionFunction::Convert { func, .. } => func(value),
        }
    }

    /// Run `self`, then `next`
    pub fn then(self, next: ConversionFunction) -> ConversionFunction {
        match (self, next) {
            (ConversionFunction::Identity, next) => next,
            (first, ConversionFunction::Identity) => first,
            (
                ConversionFunction::Convert {
                    description: first_desc,
                    func: first,
                },
                ConversionFunction::Convert {
                    description: next_desc,
                    func: next,
                },
            ) => ConversionFunction::new(format!("{}, {}", first_desc, next_desc), move |v| {
                let mid = first(v)?;
                if mid.is_null() {
                    return Ok(mid);
                }
                next(mid)
            }),
        }
    }

    fn unwrap(wrapper: &WrapperType) -> ConversionFunction {
        let name = wrapper.name.clone();
        ConversionFunction::new(format!("unwrap {}", name), move |value| match value {
            Value::Wrapped(w) if w.type_name == name => Ok(w.inner),
            other => Err(ConversionError::WrapperMismatch {
                expected: name.to_string(),
                found: other.type_label(),
            }),
        })
    }

    fn wrap(wrapper: &WrapperType) -> ConversionFunction {
        let name = wrapper.name.clone();
        ConversionFunction::new(format!("wrap {}", name), move |value| {
            Ok(Value::wrapped(name.clone(), value))
        })
    }
}

impl fmt::Debug for ConversionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConversionFunction({})", self.description())
    }
}

/// Externally supplied direct converters
pub trait ConverterRegistry: Send + Sync {
    /// Converter from `source` to `target`, if the registry knows one
    fn get_converter(&self, source: &SemType, target: &SemType) -> Option<ConversionFunction>;
}

/// A registry that knows no conversions
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConverters;

impl ConverterRegistry for NoConverters {
    fn get_converter(&self, _source: &SemType, _target: &SemType) -> Option<ConversionFunction> {
        None
    }
}

/// Plan-time resolution of one binding
#[derive(Debug, Clone)]
pub enum Resolution {
    Static(ConversionFunction),
    /// Resolved per value at call time
    Dynamic,
}

/// What a null turns into for a given target field
#[derive(Debug, Clone, PartialEq)]
pub enum NullHandling {
    /// Target is nullable
    Keep,
    /// Replace with a zero value
    Substitute(Value),
    /// Null is an error
    Reject,
}

impl NullHandling {
    pub fn for_target(policy: &NullPolicy, target: &FieldType) -> Self {
        if target.nullable || target.ty == SemType::Any {
            return NullHandling::Keep;
        }
        let zero = match target.ty {
            SemType::I32 if policy.numbers => Value::I32(0),
            SemType::I64 if policy.numbers => Value::I64(0),
            SemType::U64 if policy.numbers => Value::U64(0),
            SemType::F64 if policy.numbers => Value::F64(0.0),
            SemType::Bool if policy.booleans => Value::Bool(false),
            SemType::String if policy.strings => Value::String(String::new()),
            SemType::Char if policy.chars => Value::Char('\0'),
            _ => return NullHandling::Reject,
        };
        NullHandling::Substitute(zero)
    }

    /// Apply to a converted value
    pub fn apply(&self, value: Value, field: &str, target: &FieldType) -> Result<Value> {
        if !value.is_null() {
            return Ok(value);
        }
        match self {
            NullHandling::Keep => Ok(value),
            NullHandling::Substitute(zero) => Ok(zero.clone()),
            NullHandling::Reject => Err(Error::UnexpectedNull {
                field: field.to_string(),
                target_type: target.to_string(),
            }),
        }
    }
}

/// Resolves and caches conversions between semantic types
pub struct ConversionResolver {
    registry: Arc<dyn ConverterRegistry>,
    wrappers: WrapperPolicy,
    null_policy: NullPolicy,
    cache: DashMap<(SemType, SemType), Option<ConversionFunction>>,
}

impl ConversionResolver {
    pub fn new(registry: Arc<dyn ConverterRegistry>, config: &MapperConfig) -> Self {
        Self {
            registry,
            wrappers: config.wrappers,
            null_policy: config.null_policy,
            cache: DashMap::new(),
        }
    }

    /// Resolve a binding between two declared field types
    pub fn resolve(&self, source: &FieldType, target: &FieldType, field: &str) -> Result<Resolution> {
        if source.ty == SemType::Any && target.ty != SemType::Any {
            return Ok(Resolution::Dynamic);
        }
        match self.lookup(&source.ty, &target.ty) {
            Some(conversion) => Ok(Resolution::Static(conversion)),
            None => Err(Error::UnsupportedConversion {
                source_type: source.to_string(),
                target_type: target.to_string(),
                field: field.to_string(),
            }),
        }
    }

    pub fn null_handling(&self, target: &FieldType) -> NullHandling {
        NullHandling::for_target(&self.null_policy, target)
    }

    /// Convert a value whose type is only known now
    pub fn convert_dynamic(&self, value: Value, target: &FieldType, field: &str) -> Result<Value> {
        let Some(runtime) = value.sem_type() else {
            return Ok(value);
        };
        match self.lookup(&runtime, &target.ty) {
            Some(conversion) => conversion.apply(value).map_err(|source| Error::Conversion {
                field: field.to_string(),
                source,
            }),
            None => Err(Error::UnsupportedConversion {
                source_type: runtime.to_string(),
                target_type: target.to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// Cached lookup through all rules
    pub fn lookup(&self, source: &SemType, target: &SemType) -> Option<ConversionFunction> {
        let key = (source.clone(), target.clone());
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }
        let resolved = self.lookup_uncached(source, target);
        self.cache.insert(key, resolved.clone());
        resolved
    }

    pub fn cached_pairs(&self) -> usize {
        self.cache.len()
    }

    fn base(&self, source: &SemType, target: &SemType) -> Option<ConversionFunction> {
        if source == target || *target == SemType::Any {
            return Some(ConversionFunction::Identity);
        }
        if *source == SemType::Any {
            return None;
        }
        self.registry.get_converter(source, target)
    }

    fn lookup_uncached(&self, source: &SemType, target: &SemType) -> Option<ConversionFunction> {
        if let Some(direct) = self.base(source, target) {
            return Some(direct);
        }

        let source_wrapper = source.as_wrapper();
        let target_wrapper = target.as_wrapper();

        if self.wrappers.unwrap_source {
            if let Some(sw) = source_wrapper {
                if let Some(inner) = self.base(&sw.inner, target) {
                    return Some(ConversionFunction::unwrap(sw).then(inner));
                }
            }
        }

        if self.wrappers.wrap_target {
            if let Some(tw) = target_wrapper {
                // everything converts to text; only an exact match may wrap into a string wrapper
                let allowed = tw.inner != SemType::String || *source == SemType::String;
                if allowed {
                    if let Some(inner) = self.base(source, &tw.inner) {
                        return Some(inner.then(ConversionFunction::wrap(tw)));
                    }
                }
            }
        }

        if self.wrappers.unwrap_both {
            if let (Some(sw), Some(tw)) = (source_wrapper, target_wrapper) {
                if let Some(inner) = self.base(&sw.inner, &tw.inner) {
                    return Some(
                        ConversionFunction::unwrap(sw)
                            .then(inner)
                            .then(ConversionFunction::wrap(tw)),
                    );
                }
            }
        }

        None
    }
}
