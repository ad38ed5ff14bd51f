//! The generic tier: walks the plan binding by binding

use super::{require_creator, ExecutionTier, ObjectCreator, TierKind};
use crate::error::Result;
use crate::plan::{BindingPlan, OverrideFns, SlotBinding};
use std::any::Any;
use std::sync::Arc;

pub struct InterpretedTier {
    plan: Arc<BindingPlan>,
    creator: Option<Arc<ObjectCreator>>,
}

impl InterpretedTier {
    pub fn new(plan: Arc<BindingPlan>, creator: Option<Arc<ObjectCreator>>) -> Self {
        Self { plan, creator }
    }
}

impl ExecutionTier for InterpretedTier {
    fn kind(&self) -> TierKind {
        TierKind::Interpreted
    }

    fn transform(&self, source: &dyn Any, fns: &OverrideFns) -> Result<Box<dyn Any + Send>> {
        let creator = require_creator(&self.creator, &self.plan)?;
        let resolver = self.plan.resolver();

        let mut values = Vec::with_capacity(self.plan.slot_bindings().len());
        for slot in self.plan.slot_bindings() {
            values.push(match slot {
                SlotBinding::Bound(binding) => Some(binding.finish(binding.read(source, fns)?, resolver)?),
                SlotBinding::Default => None,
            });
        }

        let mut target = creator.create(values)?;
        self.copy_into(source, target.as_mut(), fns)?;
        Ok(target)
    }

    fn copy_into(&self, source: &dyn Any, target: &mut dyn Any, fns: &OverrideFns) -> Result<()> {
        let resolver = self.plan.resolver();
        for property in self.plan.property_bindings() {
            let value = property
                .binding
                .finish(property.binding.read(source, fns)?, resolver)?;
            (property.write)(target, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapperConfig;
    use crate::error::Error;
    use crate::plan::{Overrides, PlanKind};
    use crate::tier::fixtures::*;

    fn tier<S: crate::shape::Describe, T: crate::shape::Describe>(
        rules: &Overrides<S, T>,
        kind: PlanKind,
    ) -> InterpretedTier {
        let plan = plan(rules, kind);
        let creator = ObjectCreator::for_plan(&plan, &MapperConfig::default()).map(Arc::new);
        InterpretedTier::new(plan, creator)
    }

    #[test]
    fn test_transform_with_slot_default() {
        let rules = Overrides::<Person, Profile>::new();
        let profile = tier(&rules, PlanKind::Transform)
            .transform(&ann(), &rules.functions())
            .unwrap()
            .downcast::<Profile>()
            .unwrap();
        assert_eq!(profile.name, "Ann");
        assert_eq!(profile.age, 30);
        assert_eq!(profile.rank, 7);
        assert_eq!(profile.email, "");
    }

    #[test]
    fn test_copy_into_existing() {
        let rules = Overrides::<Person, Person>::new().exclude("score");
        let mut target = Person {
            score: 9.0,
            ..Person::default()
        };
        tier(&rules, PlanKind::Copy)
            .copy_into(&ann(), &mut target, &rules.functions())
            .unwrap();
        assert_eq!(target.name, "Ann");
        assert_eq!(target.age, 30);
        assert_eq!(target.score, 9.0);
    }

    #[test]
    fn test_wrong_source_instance() {
        let rules = Overrides::<Person, Profile>::new();
        let err = tier(&rules, PlanKind::Transform)
            .transform(&42u8, &rules.functions())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Shape { .. }));
    }

    #[test]
    fn test_copy_plan_cannot_transform() {
        let rules = Overrides::<Person, Person>::new();
        let err = tier(&rules, PlanKind::Copy)
            .transform(&ann(), &rules.functions())
            .err()
            .unwrap();
        assert!(matches!(err, Error::TargetConstruction { .. }));
    }
}
