use super::{VariantError, VariantMap};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Converts a typed value to and from a variant map.
///
/// Serializers are stateless capability objects; one instance can serve every value of `T`.
pub trait VariantSerializer<T>: Send + Sync {
    fn serialize(&self, value: &T) -> anyhow::Result<VariantMap>;

    fn deserialize(&self, map: &VariantMap) -> anyhow::Result<T>;
}

/// An opaque value paired with the map form its serializer produced for it.
///
/// The map is computed once at construction, so serializer failures surface
/// where the object is wrapped and never later.
#[derive(Clone)]
pub struct TypedObject {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    serialized: Arc<VariantMap>,
}

impl TypedObject {
    pub(crate) fn new<T>(value: T, serializer: &dyn VariantSerializer<T>) -> Result<Self, VariantError>
    where
        T: Any + Send + Sync,
    {
        let serialized = serializer
            .serialize(&value)
            .map_err(|e| VariantError::Serialization(e.to_string()))?;

        Ok(Self {
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
            serialized: Arc::new(serialized),
        })
    }

    /// Rust type name of the wrapped value
    pub fn type_name(&self) -> &str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Map form produced by the serializer at construction
    pub fn as_map(&self) -> &VariantMap {
        &self.serialized
    }
}

impl PartialEq for TypedObject {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.serialized == other.serialized
    }
}

impl fmt::Debug for TypedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedObject")
            .field("type_name", &self.type_name)
            .field("serialized", &self.serialized)
            .finish()
    }
}
