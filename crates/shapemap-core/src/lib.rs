//! Shapemap Core - structural object transformation with self-upgrading mappers
//!
//! This crate maps instances of one shape onto another shape by field name,
//! with explicit override rules where names or types differ.
//!
//! # Main Components
//!
//! - **Shapes**: structural descriptions of Rust types, dynamic records and open maps
//! - **Conversion**: a resolver that finds a converter path between two field types
//! - **Binding plans**: the immutable "where does every target value come from" answer
//! - **Tiers**: three interchangeable executors of a plan, interpreted to fully specialized
//! - **Mappers**: cached plan executors that upgrade their tier in the background
//!
//! # Example
//!
//! ```
//! use shapemap_core::shape::{Describe, ShapeBuilder};
//! use shapemap_core::{Engine, Result};
//!
//! #[derive(Default)]
//! struct User { name: String, age: i32 }
//!
//! #[derive(Default)]
//! struct UserDto { name: String, age: i64 }
//!
//! impl Describe for User {
//!     fn describe(shape: &mut ShapeBuilder<Self>) {
//!         shape
//!             .field("name", |u: &User| u.name.clone(), |u, v| u.name = v)
//!             .field("age", |u: &User| u.age, |u, v| u.age = v);
//!     }
//! }
//!
//! impl Describe for UserDto {
//!     fn describe(shape: &mut ShapeBuilder<Self>) {
//!         shape
//!             .field("name", |u: &UserDto| u.name.clone(), |u, v| u.name = v)
//!             .field("age", |u: &UserDto| u.age, |u, v| u.age = v)
//!             .default_constructor(UserDto::default);
//!     }
//! }
//!
//! fn example() -> Result<()> {
//!     let engine = Engine::new();
//!     let dto: UserDto = engine.transform(&User { name: "Ann".into(), age: 30 })?;
//!     assert_eq!(dto.name, "Ann");
//!     assert_eq!(dto.age, 30);
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod plan;
pub mod shape;
pub mod target_builder;
pub mod tier;
pub mod value;

// Re-export main types for convenience
pub use config::{MapperConfig, NullPolicy, SchedulerConfig, VisibilityPolicy, WrapperPolicy};
pub use convert::{ConversionFunction, ConversionResolver, ConverterRegistry, StandardConverters};
pub use engine::{Engine, EngineBuilder};
pub use error::{ConversionError, Error, Result, ShapeError};
pub use mapper::{
    AutoMapper, CapacityLimit, EvictionPolicy, FieldCopier, MapperCache, MapperInstance, Unbounded, UpgradeState,
};
pub use plan::{BindingPlan, Overrides, OverridesId, PlanKind, PlanSummary};
pub use shape::{
    Describe, Introspect, Record, RecordSchema, ShapeBuilder, ShapeIntrospector, Slot, ValueMap, Visibility,
};
pub use target_builder::{StringTargetBuilder, StringTargetBuilderFactory, TargetBuilder, TargetBuilderFactory};
pub use tier::TierKind;
pub use value::{FieldType, SemType, Value, ValueType};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
