//! Open name/value maps as source shapes
//!
//! Every name is readable from a [`ValueMap`] with the declared type `Any`,
//! so conversions are resolved from runtime values. An absent key reads as
//! null. Maps cannot be mapping targets.

use super::{ReadableField, ShapeDescriptor, ShapeId, ShapeIntrospector};
use crate::config::VisibilityPolicy;
use crate::error::ShapeError;
use crate::value::{FieldType, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A flat name/value map
pub type ValueMap = HashMap<String, Value>;

/// Introspector for [`ValueMap`]
#[derive(Debug, Default, Clone, Copy)]
pub struct MapShape;

impl ShapeIntrospector for MapShape {
    fn shape_id(&self) -> ShapeId {
        ShapeId::of::<ValueMap>("ValueMap", 0)
    }

    fn describe(&self, _policy: &VisibilityPolicy) -> Result<ShapeDescriptor, ShapeError> {
        Ok(ShapeDescriptor::new(self.shape_id()).with_open_fields(Arc::new(|name: &str| {
            let key = name.to_string();
            Some(ReadableField {
                name: name.into(),
                ty: FieldType::any(),
                read: Arc::new(move |instance: &dyn Any| {
                    let map = instance.downcast_ref::<ValueMap>().ok_or_else(|| {
                        ShapeError::InstanceMismatch {
                            expected: "ValueMap".to_string(),
                        }
                    })?;
                    Ok(map.get(&key).cloned().unwrap_or(Value::Null))
                }),
                batch_slot: None,
            })
        })))
    }
}
