//! Per-engine cache of shape descriptors

use super::{ShapeDescriptor, ShapeId, ShapeIntrospector};
use crate::config::VisibilityPolicy;
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;

/// Describes each shape once and hands out the shared descriptor afterwards
pub struct ShapeRegistry {
    policy: VisibilityPolicy,
    shapes: DashMap<ShapeId, Arc<ShapeDescriptor>>,
}

impl ShapeRegistry {
    pub fn new(policy: VisibilityPolicy) -> Self {
        Self {
            policy,
            shapes: DashMap::new(),
        }
    }

    pub fn describe(&self, introspector: &dyn ShapeIntrospector) -> Result<Arc<ShapeDescriptor>> {
        let id = introspector.shape_id();
        if let Some(shape) = self.shapes.get(&id) {
            return Ok(shape.clone());
        }

        // introspection is deterministic, a racing duplicate is simply dropped
        let described = Arc::new(introspector.describe(&self.policy)?);
        tracing::debug!(
            shape = %id,
            readable = described.readable().len(),
            writable = described.writable().len(),
            constructible = described.constructor().is_some(),
            "Described shape"
        );
        Ok(self.shapes.entry(id).or_insert(described).clone())
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Describe, Introspect, MapShape, ShapeBuilder};

    struct Point {
        x: i64,
    }

    impl Describe for Point {
        fn describe(shape: &mut ShapeBuilder<Self>) {
            shape.field("x", |p: &Point| p.x, |p, v| p.x = v);
        }
    }

    #[test]
    fn test_describes_once() {
        let registry = ShapeRegistry::new(VisibilityPolicy::default());
        let a = registry.describe(&Introspect::<Point>::new()).unwrap();
        let b = registry.describe(&Introspect::<Point>::new()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        registry.describe(&MapShape).unwrap();
        assert_eq!(registry.len(), 2);
    }
}
