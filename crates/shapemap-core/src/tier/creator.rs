//! Target construction strategies
//!
//! Synthetic construction hands the constructor only the bound arguments plus
//! a bitmask marking every slot left to its default. Conservative construction
//! materializes declared defaults up front and sets no mask. The creator starts
//! synthetic. A synthetic failure is retried conservatively; only when that
//! retry succeeds does the creator stay conservative for the rest of its life.

use crate::config::MapperConfig;
use crate::error::{Error, Result, ShapeError};
use crate::plan::BindingPlan;
use crate::shape::{Constructor, CtorArgs, SlotKind};
use crate::value::Value;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};

/// Slots beyond this count cannot be flagged in the defaults mask
const MASK_BITS: usize = 64;

/// Builds target instances for one plan
pub struct ObjectCreator {
    target_name: String,
    constructor: Constructor,
    synthetic: AtomicBool,
}

impl ObjectCreator {
    /// `None` when the plan does not construct targets
    pub fn for_plan(plan: &BindingPlan, config: &MapperConfig) -> Option<Self> {
        let constructor = plan.constructor()?.clone();
        let synthetic = !config.disable_synthetic_construction && constructor.slots.len() <= MASK_BITS;
        Some(Self {
            target_name: plan.target_id().name().to_string(),
            constructor,
            synthetic: AtomicBool::new(synthetic),
        })
    }

    pub fn uses_synthetic(&self) -> bool {
        self.synthetic.load(Ordering::Relaxed)
    }

    pub fn slot_count(&self) -> usize {
        self.constructor.slots.len()
    }

    /// Construct from per-slot values; `None` leaves a slot to its default
    pub fn create(&self, values: Vec<Option<Value>>) -> Result<Box<dyn Any + Send>> {
        let unbound = values.iter().any(Option::is_none);
        if !unbound {
            // nothing to default: both strategies coincide
            return self.construct(self.conservative_args(values));
        }

        if !self.uses_synthetic() {
            return self.construct(self.conservative_args(values));
        }

        let synthetic_error = match (self.constructor.construct)(&mut self.synthetic_args(values.clone())) {
            Ok(target) => return Ok(target),
            Err(e) => e,
        };
        // a failure both strategies share says nothing about the defaults mask
        let target = self.construct(self.conservative_args(values))?;
        if self.synthetic.swap(false, Ordering::Relaxed) {
            tracing::debug!(
                target_shape = %self.target_name,
                error = %synthetic_error,
                "Synthetic construction failed, using conservative construction"
            );
        }
        Ok(target)
    }

    fn construct(&self, mut args: CtorArgs) -> Result<Box<dyn Any + Send>> {
        (self.constructor.construct)(&mut args).map_err(|e| self.failure(e))
    }

    fn synthetic_args(&self, values: Vec<Option<Value>>) -> CtorArgs {
        let mut args = CtorArgs::new(self.constructor.slots.clone());
        for (i, value) in values.into_iter().enumerate() {
            match value {
                Some(value) => args.set(i, value),
                None => args.mark_default(i),
            }
        }
        args
    }

    fn conservative_args(&self, values: Vec<Option<Value>>) -> CtorArgs {
        let mut args = CtorArgs::new(self.constructor.slots.clone());
        for (i, value) in values.into_iter().enumerate() {
            match value {
                Some(value) => args.set(i, value),
                None => {
                    if let Some(SlotKind::Defaulted(default)) = self.constructor.slots.get(i).map(|s| &s.kind) {
                        args.set(i, default());
                    }
                }
            }
        }
        args
    }

    fn failure(&self, source: ShapeError) -> Error {
        Error::TargetConstruction {
            target_shape: self.target_name.clone(),
            message: source.to_string(),
            source: Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Overrides, PlanKind};
    use crate::shape::{Describe, ShapeBuilder, Slot};
    use crate::tier::fixtures::{plan, Person};

    /// Insists on every argument being present, so synthetic construction fails
    #[derive(Debug, Default)]
    struct Strict {
        name: String,
        level: i64,
    }

    impl Describe for Strict {
        fn describe(shape: &mut ShapeBuilder<Self>) {
            shape
                .readonly("name", |s: &Strict| s.name.clone())
                .readonly("level", |s: &Strict| s.level)
                .constructor(
                    [Slot::required::<String>("name"), Slot::with_default("level", 3i64)],
                    |args| {
                        Ok(Strict {
                            name: args.take("name")?,
                            level: args.take("level")?,
                        })
                    },
                );
        }
    }

    fn values() -> Vec<Option<Value>> {
        vec![Some(Value::from("Ann")), None]
    }

    #[test]
    fn test_synthetic_failure_falls_back_once() {
        let plan = plan(&Overrides::<Person, Strict>::new(), PlanKind::Transform);
        let creator = ObjectCreator::for_plan(&plan, &MapperConfig::default()).unwrap();
        assert!(creator.uses_synthetic());

        let built = creator.create(values()).unwrap().downcast::<Strict>().unwrap();
        assert_eq!(built.level, 3);
        assert!(!creator.uses_synthetic());

        let again = creator.create(values()).unwrap().downcast::<Strict>().unwrap();
        assert_eq!(again.name, "Ann");
    }

    #[test]
    fn test_config_disables_synthetic() {
        let plan = plan(&Overrides::<Person, Strict>::new(), PlanKind::Transform);
        let config = MapperConfig {
            disable_synthetic_construction: true,
            ..MapperConfig::default()
        };
        let creator = ObjectCreator::for_plan(&plan, &config).unwrap();
        assert!(!creator.uses_synthetic());
        assert!(creator.create(values()).is_ok());
    }

    #[test]
    fn test_failure_on_both_strategies() {
        let plan = plan(&Overrides::<Person, Strict>::new(), PlanKind::Transform);
        let creator = ObjectCreator::for_plan(&plan, &MapperConfig::default()).unwrap();
        let err = creator.create(vec![None, None]).err().unwrap();
        assert!(creator.uses_synthetic());
        match err {
            Error::TargetConstruction { target_shape, source, .. } => {
                assert_eq!(target_shape, "Strict");
                assert!(matches!(source, Some(ShapeError::MissingArgument { .. })));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    /// Honors the defaults mask, but rejects a blank name on either path
    #[derive(Debug, Default)]
    struct Named {
        name: String,
        level: i64,
    }

    impl Describe for Named {
        fn describe(shape: &mut ShapeBuilder<Self>) {
            shape
                .readonly("name", |n: &Named| n.name.clone())
                .readonly("level", |n: &Named| n.level)
                .constructor(
                    [Slot::required::<String>("name"), Slot::with_default("level", 3i64)],
                    |args| {
                        let name: String = args.take("name")?;
                        if name.is_empty() {
                            return Err(ShapeError::Custom {
                                message: "name must not be blank".to_string(),
                            });
                        }
                        Ok(Named {
                            name,
                            level: args.take_or("level", 3)?,
                        })
                    },
                );
        }
    }

    #[test]
    fn test_shared_failure_keeps_synthetic() {
        let plan = plan(&Overrides::<Person, Named>::new(), PlanKind::Transform);
        let creator = ObjectCreator::for_plan(&plan, &MapperConfig::default()).unwrap();

        let err = creator.create(vec![Some(Value::from("")), None]).err().unwrap();
        assert!(matches!(
            err,
            Error::TargetConstruction {
                source: Some(ShapeError::Custom { .. }),
                ..
            }
        ));
        assert!(creator.uses_synthetic());

        let built = creator.create(values()).unwrap().downcast::<Named>().unwrap();
        assert_eq!(built.level, 3);
        assert!(creator.uses_synthetic());
    }

    #[test]
    fn test_copy_plans_have_no_creator() {
        let plan = plan(&Overrides::<Person, Person>::new(), PlanKind::Copy);
        assert!(ObjectCreator::for_plan(&plan, &MapperConfig::default()).is_none());
    }
}
