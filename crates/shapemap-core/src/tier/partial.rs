//! Batched field access
//!
//! Every binding that reads a plain field of the source goes through one group
//! reader, every property binding that writes a plain field of the target goes
//! through one group writer. Wrapper-typed fields, computed values and open
//! fields keep the per-field generic path.
//!
//! Values are evaluated in plan order, so the first failing binding is the
//! same one the interpreted tier reports. Batched values reach the target in
//! one group write after the last binding has been evaluated.

use super::{compile_failure, require_creator, ExecutionTier, ObjectCreator, TierKind};
use crate::error::{Error, Result};
use crate::plan::{Binding, BindingPlan, OverrideFns, SlotBinding, ValueSource};
use crate::shape::{GroupReader, GroupWriter, WriteFn};
use crate::value::Value;
use std::any::Any;
use std::sync::Arc;

/// A binding plus where its raw value comes from
struct Step {
    binding: Binding,
    /// Position in the batched read buffer
    buffered: Option<usize>,
}

impl Step {
    fn eval(&self, source: &dyn Any, buffer: &mut [Value], fns: &OverrideFns, plan: &BindingPlan) -> Result<Value> {
        let raw = match self.buffered {
            Some(i) => std::mem::take(&mut buffer[i]),
            None => self.binding.read(source, fns)?,
        };
        self.binding.finish(raw, plan.resolver())
    }
}

/// One property write, batched or through the field's own writer
enum WriteStep {
    Batched(Step),
    Generic(Step, WriteFn),
}

pub struct PartialTier {
    plan: Arc<BindingPlan>,
    creator: Option<Arc<ObjectCreator>>,
    reader: Option<GroupReader>,
    read_count: usize,
    slots: Vec<Option<Step>>,
    writes: Vec<WriteStep>,
    batched_count: usize,
    writer: Option<GroupWriter>,
}

fn batchable(binding: &Binding) -> bool {
    !binding.involves_wrapper()
}

impl PartialTier {
    pub fn compile(plan: &Arc<BindingPlan>, creator: Option<Arc<ObjectCreator>>) -> Result<Self> {
        let mut read_slots = Vec::new();
        let mut step = |binding: &Binding| {
            let buffered = match (&binding.source, plan.source_batch()) {
                (ValueSource::Field { batch_slot: Some(slot), .. }, Some(_)) if batchable(binding) => {
                    read_slots.push(*slot);
                    Some(read_slots.len() - 1)
                }
                _ => None,
            };
            Step {
                binding: binding.clone(),
                buffered,
            }
        };

        let slots: Vec<Option<Step>> = plan
            .slot_bindings()
            .iter()
            .map(|s| match s {
                SlotBinding::Bound(b) => Some(step(b)),
                SlotBinding::Default => None,
            })
            .collect();

        let mut write_slots = Vec::new();
        let mut writes = Vec::new();
        for property in plan.property_bindings() {
            let s = step(&property.binding);
            match (property.batch_slot, plan.target_batch()) {
                (Some(slot), Some(_)) if batchable(&property.binding) => {
                    write_slots.push(slot);
                    writes.push(WriteStep::Batched(s));
                }
                _ => writes.push(WriteStep::Generic(s, property.write.clone())),
            }
        }

        if read_slots.is_empty() && write_slots.is_empty() {
            return Err(compile_failure(
                TierKind::PartiallySpecialized,
                "no field access can be batched",
            ));
        }

        let reader = match (read_slots.is_empty(), plan.source_batch()) {
            (false, Some(batch)) => Some(batch.group_reader(&read_slots).ok_or_else(|| {
                compile_failure(TierKind::PartiallySpecialized, "source refused a batched reader")
            })?),
            _ => None,
        };
        let writer = match (write_slots.is_empty(), plan.target_batch()) {
            (false, Some(batch)) => Some(batch.group_writer(&write_slots).ok_or_else(|| {
                compile_failure(TierKind::PartiallySpecialized, "target refused a batched writer")
            })?),
            _ => None,
        };

        Ok(Self {
            plan: plan.clone(),
            creator,
            reader,
            read_count: read_slots.len(),
            slots,
            writes,
            batched_count: write_slots.len(),
            writer,
        })
    }

    fn read_batch(&self, source: &dyn Any) -> Result<Vec<Value>> {
        let mut buffer = Vec::with_capacity(self.read_count);
        if let Some(reader) = &self.reader {
            reader(source, &mut buffer)?;
        }
        if buffer.len() != self.read_count {
            return Err(Error::Internal {
                message: "batched reader returned the wrong number of values".to_string(),
                source: anyhow::anyhow!("expected {}, got {}", self.read_count, buffer.len()),
            });
        }
        Ok(buffer)
    }

    fn write(&self, source: &dyn Any, target: &mut dyn Any, buffer: &mut [Value], fns: &OverrideFns) -> Result<()> {
        let mut batched = Vec::with_capacity(self.batched_count);
        for entry in &self.writes {
            match entry {
                WriteStep::Batched(step) => batched.push(step.eval(source, buffer, fns, &self.plan)?),
                WriteStep::Generic(step, write) => {
                    let value = step.eval(source, buffer, fns, &self.plan)?;
                    write(target, value)?;
                }
            }
        }
        if let Some(writer) = &self.writer {
            writer(target, batched)?;
        }
        Ok(())
    }
}

impl ExecutionTier for PartialTier {
    fn kind(&self) -> TierKind {
        TierKind::PartiallySpecialized
    }

    fn transform(&self, source: &dyn Any, fns: &OverrideFns) -> Result<Box<dyn Any + Send>> {
        let creator = require_creator(&self.creator, &self.plan)?;
        let mut buffer = self.read_batch(source)?;

        let mut values = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            values.push(match slot {
                Some(step) => Some(step.eval(source, &mut buffer, fns, &self.plan)?),
                None => None,
            });
        }

        let mut target = creator.create(values)?;
        self.write(source, target.as_mut(), &mut buffer, fns)?;
        Ok(target)
    }

    fn copy_into(&self, source: &dyn Any, target: &mut dyn Any, fns: &OverrideFns) -> Result<()> {
        let mut buffer = self.read_batch(source)?;
        self.write(source, target, &mut buffer, fns)
    }
}
