//! Execution tiers
//!
//! Three interchangeable ways of running one [`BindingPlan`]. They differ only
//! in speed:
//!
//! - [`InterpretedTier`] walks the plan entry by entry through the generic
//!   accessors. Always available.
//! - [`PartialTier`] reads and writes every plain field through one batched
//!   accessor group per side, and routes the rest through the generic path.
//! - [`FullTier`] fuses reading, conversion, null handling and writing of every
//!   binding into closures prepared once, leaving no per-field dispatch at
//!   call time. Only for plans whose conversions are all static and free of
//!   wrapper types.
//!
//! Copyright (c) 2025 Shapemap Team
//! Licensed under the Apache-2.0 license

pub mod creator;
pub mod full;
pub mod interpreted;
pub mod partial;

use crate::config::MapperConfig;
use crate::error::{Error, Result};
use crate::plan::{BindingPlan, OverrideFns};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use creator::ObjectCreator;
pub use full::FullTier;
pub use interpreted::InterpretedTier;
pub use partial::PartialTier;

/// Execution tiers in upgrade order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Interpreted,
    PartiallySpecialized,
    FullySpecialized,
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierKind::Interpreted => write!(f, "interpreted"),
            TierKind::PartiallySpecialized => write!(f, "partially_specialized"),
            TierKind::FullySpecialized => write!(f, "fully_specialized"),
        }
    }
}

/// One implementation of "run a plan against a source"
pub trait ExecutionTier: Send + Sync {
    fn kind(&self) -> TierKind;

    /// Build a new target from `source`
    fn transform(&self, source: &dyn Any, fns: &OverrideFns) -> Result<Box<dyn Any + Send>>;

    /// Write every property binding into an existing target
    fn copy_into(&self, source: &dyn Any, target: &mut dyn Any, fns: &OverrideFns) -> Result<()>;
}

/// Builds specialized tiers for a plan
pub struct TierCompiler;

impl TierCompiler {
    /// The best tier the plan and configuration allow
    pub fn compile(
        plan: &Arc<BindingPlan>,
        creator: Option<Arc<ObjectCreator>>,
        config: &MapperConfig,
    ) -> Result<Box<dyn ExecutionTier>> {
        if !config.disable_full_compile {
            match FullTier::compile(plan, creator.clone()) {
                Ok(tier) => return Ok(Box::new(tier)),
                Err(e) => tracing::debug!(
                    source = %plan.source_id(),
                    target = %plan.target_id(),
                    error = %e,
                    "Full specialization not applicable"
                ),
            }
        }
        Ok(Box::new(PartialTier::compile(plan, creator)?))
    }

    /// Exactly the requested tier
    pub fn compile_kind(
        kind: TierKind,
        plan: &Arc<BindingPlan>,
        creator: Option<Arc<ObjectCreator>>,
    ) -> Result<Box<dyn ExecutionTier>> {
        Ok(match kind {
            TierKind::Interpreted => Box::new(InterpretedTier::new(plan.clone(), creator)),
            TierKind::PartiallySpecialized => Box::new(PartialTier::compile(plan, creator)?),
            TierKind::FullySpecialized => Box::new(FullTier::compile(plan, creator)?),
        })
    }
}

pub(crate) fn require_creator<'a>(
    creator: &'a Option<Arc<ObjectCreator>>,
    plan: &BindingPlan,
) -> Result<&'a ObjectCreator> {
    creator.as_deref().ok_or_else(|| Error::TargetConstruction {
        target_shape: plan.target_id().name().to_string(),
        message: "plan does not construct targets".to_string(),
        source: None,
    })
}

pub(crate) fn compile_failure(tier: TierKind, message: impl Into<String>) -> Error {
    Error::CompileFailure {
        tier,
        message: message.into(),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shapes shared by the tier tests

    use crate::config::MapperConfig;
    use crate::convert::{ConversionResolver, StandardConverters};
    use crate::plan::{BindingPlan, BindingPlanner, Overrides, PlanKind};
    use crate::shape::{Describe, Introspect, ShapeBuilder, ShapeIntrospector, Slot};
    use crate::value_wrapper;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    pub struct Tag(pub String);
    value_wrapper!(Tag, String);

    #[derive(Debug, Clone, Default)]
    pub struct Person {
        pub name: String,
        pub age: i32,
        pub email: Option<String>,
        pub score: f64,
    }

    impl Describe for Person {
        fn describe(shape: &mut ShapeBuilder<Self>) {
            shape
                .field("name", |p: &Person| p.name.clone(), |p, v| p.name = v)
                .field("age", |p: &Person| p.age, |p, v| p.age = v)
                .field("email", |p: &Person| p.email.clone(), |p, v| p.email = v)
                .field("score", |p: &Person| p.score, |p, v| p.score = v)
                .default_constructor(Person::default);
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Profile {
        pub name: String,
        pub age: i64,
        pub email: String,
        pub score: String,
        pub rank: i64,
    }

    impl Describe for Profile {
        fn describe(shape: &mut ShapeBuilder<Self>) {
            shape
                .field("name", |p: &Profile| p.name.clone(), |p, v| p.name = v)
                .field("age", |p: &Profile| p.age, |p, v| p.age = v)
                .field("email", |p: &Profile| p.email.clone(), |p, v| p.email = v)
                .field("score", |p: &Profile| p.score.clone(), |p, v| p.score = v)
                .field("rank", |p: &Profile| p.rank, |p, v| p.rank = v)
                .constructor(
                    [Slot::required::<String>("name"), Slot::with_default("rank", 7i64)],
                    |args| {
                        Ok(Profile {
                            name: args.take("name")?,
                            rank: args.take_or("rank", 7)?,
                            ..Profile::default()
                        })
                    },
                );
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Tagged {
        pub name: String,
        pub tag: Option<Tag>,
    }

    impl Describe for Tagged {
        fn describe(shape: &mut ShapeBuilder<Self>) {
            shape
                .field("name", |t: &Tagged| t.name.clone(), |t, v| t.name = v)
                .field("tag", |t: &Tagged| t.tag.clone(), |t, v| t.tag = v)
                .default_constructor(Tagged::default);
        }
    }

    pub fn ann() -> Person {
        Person {
            name: "Ann".into(),
            age: 30,
            email: None,
            score: 1.5,
        }
    }

    pub fn plan<S: Describe, T: Describe>(rules: &Overrides<S, T>, kind: PlanKind) -> Arc<BindingPlan> {
        let config = MapperConfig::default();
        let resolver = Arc::new(ConversionResolver::new(Arc::new(StandardConverters), &config));
        let source = Introspect::<S>::new().describe(&config.visibility).unwrap();
        let target = Introspect::<T>::new().describe(&config.visibility).unwrap();
        Arc::new(
            BindingPlanner::new(resolver)
                .plan(&source, &target, &rules.rule_set(), kind)
                .unwrap(),
        )
    }
}
