//! Mapper instances
//!
//! A [`MapperInstance`] owns one immutable [`BindingPlan`] and the tier that
//! currently executes it. Every call bumps an invocation counter; once the
//! counter exceeds `start_compile_after_iterations`, one upgrade is handed to
//! the [`CompileScheduler`]. The compiled tier is swapped in atomically, so
//! callers keep running on the old tier until the swap and never block on it.
//!
//! Tiers only ever move up. A failed or rejected upgrade is logged and the
//! instance stays where it is for the rest of its life.
//!
//! Copyright (c) 2025 Shapemap Team
//! Licensed under the Apache-2.0 license

pub mod cache;
pub mod scheduler;

use crate::config::MapperConfig;
use crate::error::{Error, Result};
use crate::plan::{BindingPlan, OverrideFns, Overrides};
use crate::shape::short_type_name;
use crate::tier::{ExecutionTier, InterpretedTier, ObjectCreator, TierCompiler, TierKind};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub use cache::{CapacityLimit, EvictionPolicy, MapperCache, MapperKey, Unbounded};
pub use scheduler::{CompileScheduler, CompileTask, SubmitError};

/// Where an instance is in its upgrade lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeState {
    /// Threshold not reached yet
    Idle,
    /// Handed to the scheduler
    Scheduled,
    /// A compiled tier was installed
    Upgraded,
    /// Compilation failed; not retried
    Failed,
    /// The scheduler refused the task; not retried
    Rejected,
    /// Compilation is switched off by configuration
    Disabled,
}

/// One plan plus the tier running it
pub struct MapperInstance {
    plan: Arc<BindingPlan>,
    creator: Option<Arc<ObjectCreator>>,
    active: ArcSwap<Box<dyn ExecutionTier>>,
    invocations: AtomicU64,
    requested: AtomicBool,
    upgrade: Mutex<UpgradeState>,
    scheduler: Arc<CompileScheduler>,
    config: Arc<MapperConfig>,
    this: Weak<MapperInstance>,
}

impl MapperInstance {
    pub fn new(plan: Arc<BindingPlan>, config: Arc<MapperConfig>, scheduler: Arc<CompileScheduler>) -> Arc<Self> {
        let creator = ObjectCreator::for_plan(&plan, &config).map(Arc::new);
        let initial: Box<dyn ExecutionTier> = Box::new(InterpretedTier::new(plan.clone(), creator.clone()));
        let state = if config.disable_compile {
            UpgradeState::Disabled
        } else {
            UpgradeState::Idle
        };

        Arc::new_cyclic(|this| Self {
            plan,
            creator,
            active: ArcSwap::from_pointee(initial),
            invocations: AtomicU64::new(0),
            requested: AtomicBool::new(config.disable_compile),
            upgrade: Mutex::new(state),
            scheduler,
            config,
            this: this.clone(),
        })
    }

    pub fn plan(&self) -> &Arc<BindingPlan> {
        &self.plan
    }

    pub fn active_tier(&self) -> TierKind {
        self.active.load().kind()
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn upgrade_state(&self) -> UpgradeState {
        *self.upgrade.lock()
    }

    /// Build a new target from a type-erased source
    pub fn transform(&self, source: &dyn Any, fns: &OverrideFns) -> Result<Box<dyn Any + Send>> {
        self.record_invocation();
        self.active.load().transform(source, fns)
    }

    /// Write the plan's property bindings into an existing target
    pub fn copy_into(&self, source: &dyn Any, target: &mut dyn Any, fns: &OverrideFns) -> Result<()> {
        self.record_invocation();
        self.active.load().copy_into(source, target, fns)
    }

    /// Compile `kind` on the calling thread and install it if it is higher
    /// than the active tier. Returns the tier active afterwards.
    pub fn specialize(&self, kind: TierKind) -> Result<TierKind> {
        let tier = TierCompiler::compile_kind(kind, &self.plan, self.creator.clone())?;
        let _state = self.upgrade.lock();
        self.install(tier);
        Ok(self.active_tier())
    }

    fn record_invocation(&self) {
        let count = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        if count > self.config.start_compile_after_iterations && !self.requested.swap(true, Ordering::AcqRel) {
            self.schedule_upgrade();
        }
    }

    fn schedule_upgrade(&self) {
        let mut state = self.upgrade.lock();
        if *state != UpgradeState::Idle {
            return;
        }

        let this = self.this.clone();
        let task: CompileTask = Box::new(move || {
            if let Some(instance) = this.upgrade() {
                instance.run_upgrade();
            }
        });

        match self.scheduler.submit(task) {
            Ok(()) => {
                *state = UpgradeState::Scheduled;
                tracing::debug!(
                    source = %self.plan.source_id(),
                    target = %self.plan.target_id(),
                    invocations = self.invocations(),
                    "Scheduled mapper upgrade"
                );
            }
            Err(e) => {
                *state = UpgradeState::Rejected;
                log::warn!(
                    "Mapper upgrade for {} -> {} not scheduled: {}",
                    self.plan.source_id(),
                    self.plan.target_id(),
                    e
                );
            }
        }
    }

    fn run_upgrade(&self) {
        let compiled = TierCompiler::compile(&self.plan, self.creator.clone(), &self.config);

        let mut state = self.upgrade.lock();
        match compiled {
            Ok(tier) => {
                self.install(tier);
                *state = UpgradeState::Upgraded;
            }
            Err(e) => {
                *state = UpgradeState::Failed;
                tracing::debug!(
                    source = %self.plan.source_id(),
                    target = %self.plan.target_id(),
                    error = %e,
                    "Mapper upgrade failed, staying on current tier"
                );
            }
        }
    }

    /// Callers hold the upgrade lock
    fn install(&self, tier: Box<dyn ExecutionTier>) {
        let from = self.active_tier();
        let to = tier.kind();
        if to <= from {
            return;
        }
        self.active.store(Arc::new(tier));
        tracing::info!(
            source = %self.plan.source_id(),
            target = %self.plan.target_id(),
            %from,
            %to,
            "Mapper upgraded"
        );
    }
}

impl std::fmt::Debug for MapperInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperInstance")
            .field("source", self.plan.source_id())
            .field("target", self.plan.target_id())
            .field("tier", &self.active_tier())
            .field("invocations", &self.invocations())
            .finish()
    }
}

pub(crate) fn downcast_target<T: Any>(boxed: Box<dyn Any + Send>, plan: &BindingPlan) -> Result<T> {
    boxed.downcast::<T>().map(|b| *b).map_err(|_| Error::TargetConstruction {
        target_shape: plan.target_id().name().to_string(),
        message: format!("constructor did not produce a {}", short_type_name::<T>()),
        source: None,
    })
}

/// Typed handle on a transforming mapper instance
pub struct AutoMapper<S, T> {
    instance: Arc<MapperInstance>,
    fns: OverrideFns,
    _types: PhantomData<fn(&S) -> T>,
}

impl<S: Any, T: Any> AutoMapper<S, T> {
    pub(crate) fn new(instance: Arc<MapperInstance>, fns: OverrideFns) -> Self {
        Self {
            instance,
            fns,
            _types: PhantomData,
        }
    }

    pub fn transform(&self, source: &S) -> Result<T> {
        let boxed = self.instance.transform(source, &self.fns)?;
        downcast_target(boxed, self.instance.plan())
    }

    /// Transform with the functions of `overrides`, which must describe the
    /// same rules this mapper was planned from
    pub fn transform_with(&self, source: &S, overrides: &Overrides<S, T>) -> Result<T> {
        if overrides.id() != self.instance.plan().overrides_id() {
            return Err(Error::configuration(format!(
                "override rules {} do not match the mapper's rules {}",
                overrides.id(),
                self.instance.plan().overrides_id()
            )));
        }
        let boxed = self.instance.transform(source, &overrides.functions())?;
        downcast_target(boxed, self.instance.plan())
    }

    pub fn active_tier(&self) -> TierKind {
        self.instance.active_tier()
    }

    pub fn plan(&self) -> &Arc<BindingPlan> {
        self.instance.plan()
    }

    pub fn instance(&self) -> &Arc<MapperInstance> {
        &self.instance
    }

    /// Whether both handles run the same cached instance
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }

    pub fn specialize(&self, kind: TierKind) -> Result<TierKind> {
        self.instance.specialize(kind)
    }
}

impl<S, T> Clone for AutoMapper<S, T> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            fns: self.fns.clone(),
            _types: PhantomData,
        }
    }
}

/// Typed handle on a copying mapper instance
pub struct FieldCopier<S, T> {
    instance: Arc<MapperInstance>,
    fns: OverrideFns,
    _types: PhantomData<fn(&S, &mut T)>,
}

impl<S: Any, T: Any> FieldCopier<S, T> {
    pub(crate) fn new(instance: Arc<MapperInstance>, fns: OverrideFns) -> Self {
        Self {
            instance,
            fns,
            _types: PhantomData,
        }
    }

    /// Overwrite the bound fields of `target`; unbound fields keep their values
    pub fn copy_fields(&self, source: &S, target: &mut T) -> Result<()> {
        self.instance.copy_into(source, target, &self.fns)
    }

    pub fn active_tier(&self) -> TierKind {
        self.instance.active_tier()
    }

    pub fn plan(&self) -> &Arc<BindingPlan> {
        self.instance.plan()
    }

    pub fn specialize(&self, kind: TierKind) -> Result<TierKind> {
        self.instance.specialize(kind)
    }
}

impl<S, T> Clone for FieldCopier<S, T> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            fns: self.fns.clone(),
            _types: PhantomData,
        }
    }
}
