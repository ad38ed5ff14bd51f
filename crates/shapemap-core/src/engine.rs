//! The engine: entry point tying shapes, plans, tiers and the cache together
//!
//! An [`Engine`] owns everything that outlives a single mapper: the shape
//! registry, the conversion resolver, the mapper cache and the compile pool.
//! There is no process-wide instance; construct one and share it.
//!
//! ```
//! use shapemap_core::shape::{Describe, ShapeBuilder, Slot};
//! use shapemap_core::{Engine, Overrides};
//!
//! struct Order { price: i64, qty: i64 }
//! struct Line { total: i64 }
//!
//! impl Describe for Order {
//!     fn describe(shape: &mut ShapeBuilder<Self>) {
//!         shape
//!             .field("price", |o: &Order| o.price, |o, v| o.price = v)
//!             .field("qty", |o: &Order| o.qty, |o, v| o.qty = v);
//!     }
//! }
//!
//! impl Describe for Line {
//!     fn describe(shape: &mut ShapeBuilder<Self>) {
//!         shape.constructor([Slot::required::<i64>("total")], |args| {
//!             Ok(Line { total: args.take("total")? })
//!         });
//!     }
//! }
//!
//! let engine = Engine::new();
//! let rules = Overrides::<Order, Line>::new().compute("total", |o: &Order| o.price * o.qty);
//! let line = engine.transform_with(&Order { price: 3, qty: 4 }, &rules).unwrap();
//! assert_eq!(line.total, 12);
//! ```
//!
//! Copyright (c) 2025 Shapemap Team
//! Licensed under the Apache-2.0 license

use crate::config::MapperConfig;
use crate::convert::{ConversionResolver, ConverterRegistry, StandardConverters};
use crate::error::{Error, Result, ShapeError};
use crate::mapper::{
    AutoMapper, CompileScheduler, EvictionPolicy, FieldCopier, MapperCache, MapperInstance, MapperKey,
    Unbounded,
};
use crate::plan::{BindingPlanner, Overrides, PlanKind, RuleSet};
use crate::shape::{
    short_type_name, Describe, Introspect, MapShape, ShapeDescriptor, ShapeIntrospector, ShapeRegistry,
    SourceShape, ValueMap,
};
use crate::target_builder::{ArraySourceShape, StringTargetBuilderFactory, TargetBuilderFactory};
use std::any::{Any, TypeId};
use std::sync::Arc;

/// Builder for [`Engine`]
pub struct EngineBuilder {
    config: MapperConfig,
    converters: Arc<dyn ConverterRegistry>,
    eviction: Box<dyn EvictionPolicy>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: MapperConfig::default(),
            converters: Arc::new(StandardConverters),
            eviction: Box::new(Unbounded),
        }
    }

    pub fn config(mut self, config: MapperConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the standard converter registry
    pub fn converters(mut self, converters: Arc<dyn ConverterRegistry>) -> Self {
        self.converters = converters;
        self
    }

    pub fn eviction(mut self, eviction: Box<dyn EvictionPolicy>) -> Self {
        self.eviction = eviction;
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        Ok(Engine::assemble(self))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Engine {
    config: Arc<MapperConfig>,
    shapes: ShapeRegistry,
    planner: BindingPlanner,
    cache: MapperCache,
    scheduler: Arc<CompileScheduler>,
}

impl Engine {
    /// Engine with the default configuration
    pub fn new() -> Self {
        Self::assemble(EngineBuilder::new())
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn assemble(builder: EngineBuilder) -> Self {
        let EngineBuilder {
            config,
            converters,
            eviction,
        } = builder;
        let resolver = Arc::new(ConversionResolver::new(converters, &config));
        Self {
            shapes: ShapeRegistry::new(config.visibility.clone()),
            planner: BindingPlanner::new(resolver),
            cache: MapperCache::new(eviction),
            scheduler: Arc::new(CompileScheduler::new(config.scheduler.clone())),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn cache(&self) -> &MapperCache {
        &self.cache
    }

    pub fn shapes(&self) -> &ShapeRegistry {
        &self.shapes
    }

    /// Describe a shape through the engine's registry
    pub fn describe(&self, introspector: &dyn ShapeIntrospector) -> Result<Arc<ShapeDescriptor>> {
        self.shapes.describe(introspector)
    }

    /// Cached mapper from `S` to `T`
    pub fn auto_mapper<S: Describe, T: Describe>(&self, overrides: &Overrides<S, T>) -> Result<AutoMapper<S, T>> {
        self.mapper_between(&Introspect::<S>::new(), &Introspect::<T>::new(), overrides)
    }

    /// Cached mapper between two explicitly described shapes whose instances are `S` and `T`
    pub fn mapper_between<S: Any, T: Any>(
        &self,
        source: &dyn ShapeIntrospector,
        target: &dyn ShapeIntrospector,
        overrides: &Overrides<S, T>,
    ) -> Result<AutoMapper<S, T>> {
        check_instance_type::<S>(source)?;
        check_instance_type::<T>(target)?;
        let source = self.describe(source)?;
        let target = self.describe(target)?;
        let instance = self.instance(&*source, &target, overrides.rule_set(), PlanKind::Transform)?;
        Ok(AutoMapper::new(instance, overrides.functions()))
    }

    /// Cached mapper from an open [`ValueMap`] into `T`
    pub fn map_mapper<T: Describe>(&self, overrides: &Overrides<ValueMap, T>) -> Result<AutoMapper<ValueMap, T>> {
        self.mapper_between(&MapShape, &Introspect::<T>::new(), overrides)
    }

    pub fn transform<S: Describe, T: Describe>(&self, source: &S) -> Result<T> {
        self.auto_mapper::<S, T>(&Overrides::new())?.transform(source)
    }

    /// Transform with override rules; the closures of `overrides` are the
    /// ones evaluated, even when the mapper was cached by an earlier call
    pub fn transform_with<S: Describe, T: Describe>(&self, source: &S, overrides: &Overrides<S, T>) -> Result<T> {
        self.auto_mapper(overrides)?.transform(source)
    }

    /// Cached in-place copier from `S` to `T`
    pub fn field_copier<S: Describe, T: Describe>(&self, overrides: &Overrides<S, T>) -> Result<FieldCopier<S, T>> {
        self.copier_between(&Introspect::<S>::new(), &Introspect::<T>::new(), overrides)
    }

    pub fn copier_between<S: Any, T: Any>(
        &self,
        source: &dyn ShapeIntrospector,
        target: &dyn ShapeIntrospector,
        overrides: &Overrides<S, T>,
    ) -> Result<FieldCopier<S, T>> {
        check_instance_type::<S>(source)?;
        check_instance_type::<T>(target)?;
        let source = self.describe(source)?;
        let target = self.describe(target)?;
        let instance = self.instance(&*source, &target, overrides.rule_set(), PlanKind::Copy)?;
        Ok(FieldCopier::new(instance, overrides.functions()))
    }

    /// Copy the fields of `source` into `target`, skipping every name `overrides` excludes
    pub fn copy_fields<S: Describe, T: Describe>(
        &self,
        source: &S,
        target: &mut T,
        overrides: &Overrides<S, T>,
    ) -> Result<()> {
        self.field_copier(overrides)?.copy_fields(source, target)
    }

    /// Builder factory for `T` taking values of any type
    pub fn target_builder<T: Describe>(&self) -> Result<TargetBuilderFactory<T>> {
        let target = self.describe(&Introspect::<T>::new())?;
        let instance = self.instance(&ArraySourceShape::dynamic(), &target, RuleSet::default(), PlanKind::Transform)?;
        Ok(TargetBuilderFactory::new(instance))
    }

    /// Builder factory for `T` taking textual values
    pub fn string_target_builder<T: Describe>(&self) -> Result<StringTargetBuilderFactory<T>> {
        let target = self.describe(&Introspect::<T>::new())?;
        let instance = self.instance(&ArraySourceShape::strings(), &target, RuleSet::default(), PlanKind::Transform)?;
        Ok(StringTargetBuilderFactory::new(instance))
    }

    /// Stop the compile pool; mappers keep their current tier
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    fn instance(
        &self,
        source: &dyn SourceShape,
        target: &ShapeDescriptor,
        rules: RuleSet,
        kind: PlanKind,
    ) -> Result<Arc<MapperInstance>> {
        let key = MapperKey {
            source: source.id().clone(),
            target: target.id().clone(),
            overrides: rules.id,
            kind,
        };
        self.cache.get_or_create(key, || {
            let plan = self.planner.plan(source, target, &rules, kind)?;
            Ok(MapperInstance::new(
                Arc::new(plan),
                self.config.clone(),
                self.scheduler.clone(),
            ))
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // mappers handed out keep working on whatever tier they reached
        self.scheduler.shutdown();
    }
}

fn check_instance_type<T: Any>(introspector: &dyn ShapeIntrospector) -> Result<()> {
    let id = introspector.shape_id();
    if id.instance_type() != TypeId::of::<T>() {
        return Err(Error::Shape {
            source: ShapeError::InstanceMismatch {
                expected: format!("{} (shape {})", short_type_name::<T>(), id),
            },
        });
    }
    Ok(())
}
