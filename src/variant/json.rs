// Bridging between Variant and serde_json::Value.
//
// Rule bundles and cached documents arrive as JSON; everything past the
// loader works on Variants only.

use super::{Variant, VariantMap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

impl From<&Value> for Variant {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Variant::Null,
            Value::Bool(b) => Variant::Boolean(*b),
            Value::Number(n) => number_to_variant(n),
            Value::String(s) => Variant::String(s.clone()),
            Value::Array(items) => Variant::List(items.iter().map(Variant::from).collect()),
            Value::Object(obj) => Variant::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Variant::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for Variant {
    fn from(value: Value) -> Self {
        Variant::from(&value)
    }
}

/// Integers that fit 32 bits become `Integer`, wider ones `Long`, and
/// anything beyond `i64` falls back to `Double`.
fn number_to_variant(n: &Number) -> Variant {
    if let Some(i) = n.as_i64() {
        match i32::try_from(i) {
            Ok(small) => Variant::Integer(small),
            Err(_) => Variant::Long(i),
        }
    } else {
        Variant::Double(n.as_f64().unwrap_or(f64::NAN))
    }
}

impl Variant {
    /// JSON form of this variant. Typed objects serialize as their map;
    /// non-finite doubles become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Variant::Null => Value::Null,
            Variant::Boolean(b) => Value::Bool(*b),
            Variant::Integer(i) => Value::from(*i),
            Variant::Long(l) => Value::from(*l),
            Variant::Double(d) => Number::from_f64(*d).map_or(Value::Null, Value::Number),
            Variant::String(s) => Value::String(s.clone()),
            Variant::Map(m) => map_to_json(m),
            Variant::List(items) => Value::Array(items.iter().map(Variant::to_json).collect()),
            Variant::Object(obj) => map_to_json(obj.as_map()),
        }
    }
}

fn map_to_json(map: &VariantMap) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

impl Serialize for Variant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Variant::Null => serializer.serialize_unit(),
            Variant::Boolean(b) => serializer.serialize_bool(*b),
            Variant::Integer(i) => serializer.serialize_i32(*i),
            Variant::Long(l) => serializer.serialize_i64(*l),
            Variant::Double(d) => serializer.serialize_f64(*d),
            Variant::String(s) => serializer.serialize_str(s),
            Variant::Map(m) => m.serialize(serializer),
            Variant::List(items) => items.serialize(serializer),
            Variant::Object(obj) => obj.as_map().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Variant {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Variant::from)
    }
}
