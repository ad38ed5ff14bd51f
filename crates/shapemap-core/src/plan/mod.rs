//! Binding plans
//!
//! A [`BindingPlan`] is the immutable answer to "where does every target slot
//! and field get its value from" for one (source shape, target shape, rules)
//! triple. The [`BindingPlanner`] builds it once; every execution tier runs
//! the same plan.
//!
//! Precedence for each target name: override rule, then a same-named source
//! field, then the slot's own default (optional slots) or nothing (fields).
//! An excluded name is never bound. Every conversion is resolved here, except
//! for sources whose type is only known per value.
//!
//! Copyright (c) 2025 Shapemap Team
//! Licensed under the Apache-2.0 license

pub mod overrides;

use crate::convert::{ConversionResolver, NullHandling, Resolution};
use crate::error::{Error, Result};
use crate::shape::{
    BatchAccess, Constructor, ReadFn, ReadableField, ShapeDescriptor, ShapeId, SourceShape, WriteFn,
};
use crate::value::{FieldType, Value};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use overrides::{ComputeFn, OverrideFns, OverrideRule, Overrides, OverridesId, RuleSet};

/// What a plan produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// Construct a new target
    Transform,
    /// Write into an existing target; constructor slots are ignored
    Copy,
}

/// Where a binding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingOrigin {
    /// Same-named source field
    Auto,
    /// Override rule
    Manual,
    /// Unbound optional slot
    Default,
}

/// Where a bound value is read from
#[derive(Clone)]
pub enum ValueSource {
    Field {
        name: Arc<str>,
        read: ReadFn,
        batch_slot: Option<usize>,
    },
    Compute {
        index: usize,
    },
}

/// One resolved binding
#[derive(Clone)]
pub struct Binding {
    pub target: Arc<str>,
    pub target_type: FieldType,
    pub source: ValueSource,
    pub source_type: FieldType,
    pub origin: BindingOrigin,
    pub conversion: Resolution,
    pub nulls: NullHandling,
}

impl Binding {
    pub fn is_dynamic(&self) -> bool {
        matches!(self.conversion, Resolution::Dynamic)
    }

    pub fn involves_wrapper(&self) -> bool {
        self.source_type.involves_wrapper() || self.target_type.involves_wrapper()
    }

    /// Source field name for field-backed bindings
    pub fn source_field(&self) -> Option<&str> {
        match &self.source {
            ValueSource::Field { name, .. } => Some(name),
            ValueSource::Compute { .. } => None,
        }
    }

    /// Read the raw value from the source instance
    pub fn read(&self, source: &dyn Any, fns: &OverrideFns) -> Result<Value> {
        match &self.source {
            ValueSource::Field { read, .. } => Ok(read(source)?),
            ValueSource::Compute { index } => {
                let compute = fns
                    .get(*index)
                    .ok_or_else(|| missing_function(&self.target, *index, fns))?;
                compute(source)
            }
        }
    }

    /// Convert a raw value and apply the null policy
    pub fn finish(&self, raw: Value, resolver: &ConversionResolver) -> Result<Value> {
        let converted = if raw.is_null() {
            raw
        } else {
            match &self.conversion {
                Resolution::Static(conversion) => {
                    conversion.apply(raw).map_err(|source| Error::Conversion {
                        field: self.target.to_string(),
                        source,
                    })?
                }
                Resolution::Dynamic => resolver.convert_dynamic(raw, &self.target_type, &self.target)?,
            }
        };
        self.nulls.apply(converted, &self.target, &self.target_type)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("target", &self.target)
            .field("origin", &self.origin)
            .field("source", &self.source_field())
            .field("conversion", &self.conversion)
            .finish()
    }
}

/// A constructor slot's binding
#[derive(Debug, Clone)]
pub enum SlotBinding {
    Bound(Binding),
    /// Left to the slot's default
    Default,
}

/// A binding into a writable target field
#[derive(Clone)]
pub struct PropertyBinding {
    pub binding: Binding,
    pub write: WriteFn,
    pub batch_slot: Option<usize>,
}

impl fmt::Debug for PropertyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.binding.fmt(f)
    }
}

/// Immutable result of planning
pub struct BindingPlan {
    source: ShapeId,
    target: ShapeId,
    overrides: OverridesId,
    kind: PlanKind,
    constructor: Option<Constructor>,
    slots: Vec<SlotBinding>,
    auto: Vec<PropertyBinding>,
    manual: Vec<PropertyBinding>,
    source_batch: Option<Arc<dyn BatchAccess>>,
    target_batch: Option<Arc<dyn BatchAccess>>,
    resolver: Arc<ConversionResolver>,
}

impl BindingPlan {
    pub fn source_id(&self) -> &ShapeId {
        &self.source
    }

    pub fn target_id(&self) -> &ShapeId {
        &self.target
    }

    pub fn overrides_id(&self) -> OverridesId {
        self.overrides
    }

    pub fn kind(&self) -> PlanKind {
        self.kind
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    /// Constructor slot bindings, in slot order
    pub fn slot_bindings(&self) -> &[SlotBinding] {
        &self.slots
    }

    pub fn auto_bindings(&self) -> &[PropertyBinding] {
        &self.auto
    }

    pub fn manual_bindings(&self) -> &[PropertyBinding] {
        &self.manual
    }

    /// Auto bindings, then manual bindings
    pub fn property_bindings(&self) -> impl Iterator<Item = &PropertyBinding> {
        self.auto.iter().chain(self.manual.iter())
    }

    /// Every bound binding, constructor slots first
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.slots
            .iter()
            .filter_map(|s| match s {
                SlotBinding::Bound(b) => Some(b),
                SlotBinding::Default => None,
            })
            .chain(self.property_bindings().map(|p| &p.binding))
    }

    pub fn source_batch(&self) -> Option<&Arc<dyn BatchAccess>> {
        self.source_batch.as_ref()
    }

    pub fn target_batch(&self) -> Option<&Arc<dyn BatchAccess>> {
        self.target_batch.as_ref()
    }

    pub fn resolver(&self) -> &Arc<ConversionResolver> {
        &self.resolver
    }

    /// No dynamic conversions and no wrapper-typed fields
    pub fn is_fully_static(&self) -> bool {
        self.bindings().all(|b| !b.is_dynamic() && !b.involves_wrapper())
    }

    pub fn summary(&self) -> PlanSummary {
        let slots = match &self.constructor {
            Some(ctor) => ctor
                .slots
                .iter()
                .zip(&self.slots)
                .map(|(slot, binding)| match binding {
                    SlotBinding::Bound(b) => BindingSummary::from(b),
                    SlotBinding::Default => BindingSummary {
                        target: slot.name.to_string(),
                        target_type: slot.ty.to_string(),
                        origin: BindingOrigin::Default,
                        source: None,
                        conversion: "default".to_string(),
                        dynamic: false,
                    },
                })
                .collect(),
            None => Vec::new(),
        };
        PlanSummary {
            source: self.source.name().to_string(),
            target: self.target.name().to_string(),
            overrides: self.overrides,
            kind: self.kind,
            constructor: slots,
            auto: self.auto.iter().map(|p| BindingSummary::from(&p.binding)).collect(),
            manual: self.manual.iter().map(|p| BindingSummary::from(&p.binding)).collect(),
        }
    }
}

impl fmt::Debug for BindingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingPlan")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("overrides", &self.overrides)
            .field("kind", &self.kind)
            .field("slots", &self.slots)
            .field("auto", &self.auto)
            .field("manual", &self.manual)
            .finish()
    }
}

/// Serializable description of a plan
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub source: String,
    pub target: String,
    pub overrides: OverridesId,
    pub kind: PlanKind,
    pub constructor: Vec<BindingSummary>,
    pub auto: Vec<BindingSummary>,
    pub manual: Vec<BindingSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BindingSummary {
    pub target: String,
    pub target_type: String,
    pub origin: BindingOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub conversion: String,
    pub dynamic: bool,
}

impl From<&Binding> for BindingSummary {
    fn from(b: &Binding) -> Self {
        let conversion = match &b.conversion {
            Resolution::Static(c) => c.description().to_string(),
            Resolution::Dynamic => "runtime".to_string(),
        };
        Self {
            target: b.target.to_string(),
            target_type: b.target_type.to_string(),
            origin: b.origin,
            source: match &b.source {
                ValueSource::Field { name, .. } => Some(name.to_string()),
                ValueSource::Compute { .. } => Some("<function>".to_string()),
            },
            conversion,
            dynamic: b.is_dynamic(),
        }
    }
}

/// Builds binding plans
pub struct BindingPlanner {
    resolver: Arc<ConversionResolver>,
}

impl BindingPlanner {
    pub fn new(resolver: Arc<ConversionResolver>) -> Self {
        Self { resolver }
    }

    pub fn plan(
        &self,
        source: &dyn SourceShape,
        target: &ShapeDescriptor,
        rules: &RuleSet,
        kind: PlanKind,
    ) -> Result<BindingPlan> {
        self.check_rules(source, target, rules)?;

        let constructor = match kind {
            PlanKind::Transform => Some(target.constructor().cloned().ok_or_else(|| {
                Error::TargetConstruction {
                    target_shape: target.name().to_string(),
                    message: "shape declares no constructor".to_string(),
                    source: None,
                }
            })?),
            PlanKind::Copy => None,
        };

        let mut slots = Vec::new();
        if let Some(ctor) = &constructor {
            for slot in ctor.slots.iter() {
                let bound = if rules.is_excluded(&slot.name) {
                    None
                } else {
                    self.bind(source, &slot.name, &slot.ty, rules)?
                };
                match bound {
                    Some(binding) => slots.push(SlotBinding::Bound(binding)),
                    None if slot.is_optional() => slots.push(SlotBinding::Default),
                    None => {
                        return Err(Error::MissingBinding {
                            target_shape: target.name().to_string(),
                            field: slot.name.to_string(),
                        })
                    }
                }
            }
        }

        let mut auto = Vec::new();
        let mut manual = Vec::new();
        for field in target.writable() {
            let consumed = constructor
                .as_ref()
                .map(|c| c.slots.iter().any(|s| s.name == field.name))
                .unwrap_or(false);
            if consumed || rules.is_excluded(&field.name) {
                continue;
            }
            if let Some(binding) = self.bind(source, &field.name, &field.ty, rules)? {
                let property = PropertyBinding {
                    binding,
                    write: field.write.clone(),
                    batch_slot: field.batch_slot,
                };
                match property.binding.origin {
                    BindingOrigin::Manual => manual.push(property),
                    _ => auto.push(property),
                }
            }
        }

        let plan = BindingPlan {
            source: source.id().clone(),
            target: target.id().clone(),
            overrides: rules.id,
            kind,
            constructor,
            slots,
            auto,
            manual,
            source_batch: source.batch(),
            target_batch: target.batch_access().cloned(),
            resolver: self.resolver.clone(),
        };

        tracing::debug!(
            source = %plan.source,
            target = %plan.target,
            overrides = %plan.overrides,
            kind = ?plan.kind,
            slots = plan.slots.len(),
            auto = plan.auto.len(),
            manual = plan.manual.len(),
            fully_static = plan.is_fully_static(),
            "Planned bindings"
        );
        Ok(plan)
    }

    /// Every rule must name a target field; field rules must name a source field
    fn check_rules(&self, source: &dyn SourceShape, target: &ShapeDescriptor, rules: &RuleSet) -> Result<()> {
        for rule in &rules.rules {
            if !target.accepts(rule.target()) {
                return Err(Error::UnknownField {
                    shape: target.name().to_string(),
                    field: rule.target().to_string(),
                });
            }
            if let OverrideRule::Field { source: name, .. } = rule {
                if source.field(name).is_none() {
                    return Err(Error::UnknownField {
                        shape: source.id().name().to_string(),
                        field: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn bind(
        &self,
        source: &dyn SourceShape,
        target: &Arc<str>,
        target_type: &FieldType,
        rules: &RuleSet,
    ) -> Result<Option<Binding>> {
        let (value_source, source_type, origin) = match rules.rule_for(target) {
            Some(OverrideRule::Compute { ty, index, .. }) => {
                (ValueSource::Compute { index: *index }, ty.clone(), BindingOrigin::Manual)
            }
            Some(OverrideRule::Field { source: name, .. }) => match source.field(name) {
                Some(field) => field_source(field, BindingOrigin::Manual),
                None => return Ok(None),
            },
            None => match source.field(target) {
                Some(field) => field_source(field, BindingOrigin::Auto),
                None => return Ok(None),
            },
        };

        let conversion = self.resolver.resolve(&source_type, target_type, target)?;
        Ok(Some(Binding {
            target: target.clone(),
            target_type: target_type.clone(),
            source: value_source,
            source_type,
            origin,
            conversion,
            nulls: self.resolver.null_handling(target_type),
        }))
    }
}

pub(crate) fn missing_function(target: &str, index: usize, fns: &OverrideFns) -> Error {
    Error::Internal {
        message: format!("override function {} for '{}' was not supplied", index, target),
        source: anyhow::anyhow!("override set has {} functions", fns.len()),
    }
}

fn field_source(field: ReadableField, origin: BindingOrigin) -> (ValueSource, FieldType, BindingOrigin) {
    (
        ValueSource::Field {
            name: field.name,
            read: field.read,
            batch_slot: field.batch_slot,
        },
        field.ty,
        origin,
    )
}
