//! Fully specialized tier
//!
//! Every binding is fused once into a closure that reads, converts, applies
//! the null policy and writes, picking the narrowest closure for its case
//! (identity conversions skip the converter, nullable targets skip the null
//! check). The fused writes run as one flat list, and construction plus writes
//! form a single program.

use super::{compile_failure, ExecutionTier, ObjectCreator, TierKind};
use crate::convert::{NullHandling, Resolution};
use crate::error::{Error, Result};
use crate::plan::{missing_function, Binding, BindingPlan, OverrideFns, PlanKind, SlotBinding, ValueSource};
use crate::shape::WriteFn;
use crate::value::Value;
use std::any::Any;
use std::sync::Arc;

type FusedValue = Arc<dyn Fn(&dyn Any, &OverrideFns) -> Result<Value> + Send + Sync>;
type Program = Box<dyn Fn(&dyn Any, &OverrideFns) -> Result<Box<dyn Any + Send>> + Send + Sync>;

/// Property writes in plan order
#[derive(Clone)]
struct FusedWrites(Arc<[(FusedValue, WriteFn)]>);

impl FusedWrites {
    fn run(&self, source: &dyn Any, target: &mut dyn Any, fns: &OverrideFns) -> Result<()> {
        for (value, write) in self.0.iter() {
            write(target, value(source, fns)?)?;
        }
        Ok(())
    }
}

pub struct FullTier {
    program: Option<Program>,
    copy: FusedWrites,
}

impl FullTier {
    pub fn compile(plan: &Arc<BindingPlan>, creator: Option<Arc<ObjectCreator>>) -> Result<Self> {
        if !plan.is_fully_static() {
            return Err(compile_failure(
                TierKind::FullySpecialized,
                "plan has wrapper-typed or runtime-converted bindings",
            ));
        }

        let copy = FusedWrites(
            plan.property_bindings()
                .map(|property| Ok((fuse(&property.binding)?, property.write.clone())))
                .collect::<Result<Arc<[_]>>>()?,
        );

        let program = match plan.kind() {
            PlanKind::Copy => None,
            PlanKind::Transform => {
                let creator = creator.ok_or_else(|| {
                    compile_failure(TierKind::FullySpecialized, "transform plan without an object creator")
                })?;
                let slots = plan
                    .slot_bindings()
                    .iter()
                    .map(|s| match s {
                        SlotBinding::Bound(b) => fuse(b).map(Some),
                        SlotBinding::Default => Ok(None),
                    })
                    .collect::<Result<Vec<Option<FusedValue>>>>()?;
                let writes = copy.clone();
                let program: Program = Box::new(move |source, fns| {
                    let mut values = Vec::with_capacity(slots.len());
                    for slot in &slots {
                        values.push(match slot {
                            Some(value) => Some(value(source, fns)?),
                            None => None,
                        });
                    }
                    let mut target = creator.create(values)?;
                    writes.run(source, target.as_mut(), fns)?;
                    Ok(target)
                });
                Some(program)
            }
        };

        Ok(Self { program, copy })
    }
}

fn fuse(binding: &Binding) -> Result<FusedValue> {
    let read: FusedValue = match &binding.source {
        ValueSource::Field { read, .. } => {
            let read = read.clone();
            Arc::new(move |source, _| Ok(read(source)?))
        }
        ValueSource::Compute { index } => {
            let index = *index;
            let target = binding.target.clone();
            Arc::new(move |source, fns| {
                let compute = fns
                    .get(index)
                    .ok_or_else(|| missing_function(&target, index, fns))?;
                compute(source)
            })
        }
    };

    let conversion = match &binding.conversion {
        Resolution::Static(conversion) => conversion.clone(),
        Resolution::Dynamic => {
            return Err(compile_failure(
                TierKind::FullySpecialized,
                format!("binding '{}' converts at runtime", binding.target),
            ))
        }
    };

    let field = binding.target.clone();
    let ty = binding.target_type.clone();
    Ok(match (conversion.is_identity(), binding.nulls.clone()) {
        (true, NullHandling::Keep) => read,
        (true, nulls) => Arc::new(move |source, fns| nulls.apply(read(source, fns)?, &field, &ty)),
        (false, NullHandling::Keep) => Arc::new(move |source, fns| {
            conversion
                .apply(read(source, fns)?)
                .map_err(|source| Error::Conversion {
                    field: field.to_string(),
                    source,
                })
        }),
        (false, nulls) => Arc::new(move |source, fns| {
            let converted = conversion
                .apply(read(source, fns)?)
                .map_err(|source| Error::Conversion {
                    field: field.to_string(),
                    source,
                })?;
            nulls.apply(converted, &field, &ty)
        }),
    })
}

impl ExecutionTier for FullTier {
    fn kind(&self) -> TierKind {
        TierKind::FullySpecialized
    }

    fn transform(&self, source: &dyn Any, fns: &OverrideFns) -> Result<Box<dyn Any + Send>> {
        match &self.program {
            Some(program) => program(source, fns),
            None => Err(Error::TargetConstruction {
                target_shape: "copy plan".to_string(),
                message: "plan does not construct targets".to_string(),
                source: None,
            }),
        }
    }

    fn copy_into(&self, source: &dyn Any, target: &mut dyn Any, fns: &OverrideFns) -> Result<()> {
        self.copy.run(source, target, fns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MapperConfig, NullPolicy};
    use crate::convert::{ConversionResolver, StandardConverters};
    use crate::plan::{BindingPlanner, Overrides};
    use crate::shape::{Describe, Introspect, ShapeIntrospector};
    use crate::tier::fixtures::*;

    #[test]
    fn test_runs_compute_overrides_with_supplied_functions() {
        let plan = plan(
            &Overrides::<Person, Profile>::new().compute("rank", |p: &Person| i64::from(p.age)),
            PlanKind::Transform,
        );
        let creator = ObjectCreator::for_plan(&plan, &MapperConfig::default()).map(Arc::new);
        let tier = FullTier::compile(&plan, creator).unwrap();

        // functions come from the call, not from planning
        let offset = 100i64;
        let fresh = Overrides::<Person, Profile>::new().compute("rank", move |p: &Person| i64::from(p.age) + offset);
        let profile = tier
            .transform(&ann(), &fresh.functions())
            .unwrap()
            .downcast::<Profile>()
            .unwrap();
        assert_eq!(profile.rank, 130);

        let err = tier.transform(&ann(), &OverrideFns::default()).err().unwrap();
        assert!(matches!(err, Error::Internal { .. }));
    }

    fn strict_plan<S: Describe, T: Describe>() -> Arc<BindingPlan> {
        let config = MapperConfig {
            null_policy: NullPolicy::strict(),
            ..MapperConfig::default()
        };
        let resolver = Arc::new(ConversionResolver::new(Arc::new(StandardConverters), &config));
        let source = Introspect::<S>::new().describe(&config.visibility).unwrap();
        let target = Introspect::<T>::new().describe(&config.visibility).unwrap();
        Arc::new(
            BindingPlanner::new(resolver)
                .plan(&source, &target, &Default::default(), PlanKind::Copy)
                .unwrap(),
        )
    }

    #[test]
    fn test_strict_nulls_are_rejected() {
        let tier = FullTier::compile(&strict_plan::<Person, Profile>(), None).unwrap();
        let mut target = Profile::default();
        let err = tier
            .copy_into(&ann(), &mut target, &OverrideFns::default())
            .unwrap_err();
        match err {
            Error::UnexpectedNull { field, .. } => assert_eq!(field, "email"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
