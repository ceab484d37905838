use std::any::Any;
use std::collections::HashMap;
use std::fmt;

mod error;
mod json;
mod typed;

pub use error::VariantError;
pub use typed::{TypedObject, VariantSerializer};

/// String-keyed map of variants; the payload type of every event
pub type VariantMap = HashMap<String, Variant>;

/// Kind tag of a [`Variant`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Null,
    Boolean,
    Integer,
    Long,
    Double,
    String,
    Map,
    List,
    TypedObject,
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariantKind::Null => "null",
            VariantKind::Boolean => "boolean",
            VariantKind::Integer => "integer",
            VariantKind::Long => "long",
            VariantKind::Double => "double",
            VariantKind::String => "string",
            VariantKind::Map => "map",
            VariantKind::List => "list",
            VariantKind::TypedObject => "typed object",
        };
        f.write_str(name)
    }
}

/// Variant is the dynamically-typed value exchanged between modules.
///
/// Equality is structural and kind-sensitive: `Integer(1)`, `Long(1)`,
/// `Double(1.0)` and `String("1")` are four distinct values. Cross-kind
/// conversions exist only as the named `convert_to_*` methods.
#[derive(Clone, Debug)]
pub enum Variant {
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Double(f64),
    String(String),
    Map(VariantMap),
    List(Vec<Variant>),
    Object(TypedObject),
}

impl Variant {
    pub fn from_boolean(value: bool) -> Self {
        Variant::Boolean(value)
    }

    pub fn from_integer(value: i32) -> Self {
        Variant::Integer(value)
    }

    pub fn from_long(value: i64) -> Self {
        Variant::Long(value)
    }

    pub fn from_double(value: f64) -> Self {
        Variant::Double(value)
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Variant::String(value.into())
    }

    pub fn from_map(value: VariantMap) -> Self {
        Variant::Map(value)
    }

    pub fn from_list(value: Vec<Variant>) -> Self {
        Variant::List(value)
    }

    /// Wrap a typed value using its serializer.
    ///
    /// Fails with `MissingSerializer` when no serializer is given, and with
    /// `Serialization` when the serializer rejects the value.
    pub fn from_typed_object<T>(
        value: T,
        serializer: Option<&dyn VariantSerializer<T>>,
    ) -> Result<Self, VariantError>
    where
        T: Any + Send + Sync,
    {
        let serializer = serializer.ok_or(VariantError::MissingSerializer)?;
        TypedObject::new(value, serializer).map(Variant::Object)
    }

    pub fn kind(&self) -> VariantKind {
        match self {
            Variant::Null => VariantKind::Null,
            Variant::Boolean(_) => VariantKind::Boolean,
            Variant::Integer(_) => VariantKind::Integer,
            Variant::Long(_) => VariantKind::Long,
            Variant::Double(_) => VariantKind::Double,
            Variant::String(_) => VariantKind::String,
            Variant::Map(_) => VariantKind::Map,
            Variant::List(_) => VariantKind::List,
            Variant::Object(_) => VariantKind::TypedObject,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    fn mismatch(&self, expected: VariantKind) -> VariantError {
        VariantError::KindMismatch {
            expected,
            actual: self.kind(),
        }
    }

    fn not_convertible(&self, to: VariantKind) -> VariantError {
        VariantError::NotConvertible {
            from: self.kind(),
            to,
        }
    }

    pub fn get_boolean(&self) -> Result<bool, VariantError> {
        match self {
            Variant::Boolean(b) => Ok(*b),
            _ => Err(self.mismatch(VariantKind::Boolean)),
        }
    }

    pub fn get_integer(&self) -> Result<i32, VariantError> {
        match self {
            Variant::Integer(i) => Ok(*i),
            _ => Err(self.mismatch(VariantKind::Integer)),
        }
    }

    pub fn get_long(&self) -> Result<i64, VariantError> {
        match self {
            Variant::Long(l) => Ok(*l),
            _ => Err(self.mismatch(VariantKind::Long)),
        }
    }

    pub fn get_double(&self) -> Result<f64, VariantError> {
        match self {
            Variant::Double(d) => Ok(*d),
            _ => Err(self.mismatch(VariantKind::Double)),
        }
    }

    pub fn get_string(&self) -> Result<&str, VariantError> {
        match self {
            Variant::String(s) => Ok(s),
            _ => Err(self.mismatch(VariantKind::String)),
        }
    }

    pub fn get_map(&self) -> Result<&VariantMap, VariantError> {
        match self {
            Variant::Map(m) => Ok(m),
            _ => Err(self.mismatch(VariantKind::Map)),
        }
    }

    pub fn get_list(&self) -> Result<&[Variant], VariantError> {
        match self {
            Variant::List(l) => Ok(l),
            _ => Err(self.mismatch(VariantKind::List)),
        }
    }

    /// Recover a typed value.
    ///
    /// A typed object holding `T` is cloned out directly; a typed object of
    /// another type or a plain map goes through `serializer.deserialize`.
    pub fn get_typed_object<T>(&self, serializer: &dyn VariantSerializer<T>) -> Result<T, VariantError>
    where
        T: Any + Clone,
    {
        let map = match self {
            Variant::Object(obj) => {
                if let Some(value) = obj.downcast_ref::<T>() {
                    return Ok(value.clone());
                }
                obj.as_map()
            }
            Variant::Map(m) => m,
            _ => return Err(self.mismatch(VariantKind::TypedObject)),
        };

        serializer
            .deserialize(map)
            .map_err(|e| VariantError::Serialization(e.to_string()))
    }

    /// Numeric widening: booleans become 1.0/0.0, integers widen exactly,
    /// strings must be a complete decimal numeral.
    pub fn convert_to_double(&self) -> Result<f64, VariantError> {
        match self {
            Variant::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Variant::Integer(i) => Ok(f64::from(*i)),
            Variant::Long(l) => Ok(*l as f64),
            Variant::Double(d) => Ok(*d),
            Variant::String(s) => {
                parse_numeral(s).ok_or_else(|| self.not_convertible(VariantKind::Double))
            }
            _ => Err(self.not_convertible(VariantKind::Double)),
        }
    }

    /// Textual form without quoting; null and containers do not convert.
    pub fn convert_to_string(&self) -> Result<String, VariantError> {
        match self {
            Variant::Boolean(b) => Ok(b.to_string()),
            Variant::Integer(i) => Ok(i.to_string()),
            Variant::Long(l) => Ok(l.to_string()),
            Variant::Double(d) => Ok(format_double(*d)),
            Variant::String(s) => Ok(s.clone()),
            _ => Err(self.not_convertible(VariantKind::String)),
        }
    }

    /// Maps convert to themselves, typed objects to their serialized form.
    pub fn convert_to_map(&self) -> Result<VariantMap, VariantError> {
        match self {
            Variant::Map(m) => Ok(m.clone()),
            Variant::Object(obj) => Ok(obj.as_map().clone()),
            _ => Err(self.not_convertible(VariantKind::Map)),
        }
    }
}

/// Parse a string that is entirely a decimal numeral.
///
/// Rejects partial numerals ("5hello"), blanks, and the textual
/// infinities/NaN that `f64::from_str` would otherwise accept.
fn parse_numeral(s: &str) -> Option<f64> {
    if !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return None;
    }
    s.parse::<f64>().ok()
}

fn format_double(d: f64) -> String {
    if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{:.1}", d)
    } else {
        d.to_string()
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Null, Variant::Null) => true,
            (Variant::Boolean(a), Variant::Boolean(b)) => a == b,
            (Variant::Integer(a), Variant::Integer(b)) => a == b,
            (Variant::Long(a), Variant::Long(b)) => a == b,
            // NaN equals NaN so equality stays reflexive
            (Variant::Double(a), Variant::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Variant::String(a), Variant::String(b)) => a == b,
            (Variant::Map(a), Variant::Map(b)) => a == b,
            (Variant::List(a), Variant::List(b)) => a == b,
            (Variant::Object(a), Variant::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Variant {
    /// Log-oriented form: strings are quoted, map keys are sorted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => f.write_str("null"),
            Variant::Boolean(b) => write!(f, "{}", b),
            Variant::Integer(i) => write!(f, "{}", i),
            Variant::Long(l) => write!(f, "{}", l),
            Variant::Double(d) => f.write_str(&format_double(*d)),
            Variant::String(s) => write!(f, "\"{}\"", s),
            Variant::Map(m) => write_map(f, m),
            Variant::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Variant::Object(obj) => {
                write!(f, "{}", obj.type_name())?;
                write_map(f, obj.as_map())
            }
        }
    }
}

fn write_map(f: &mut fmt::Formatter<'_>, map: &VariantMap) -> fmt::Result {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    f.write_str("{")?;
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "\"{}\":{}", key, map[key])?;
    }
    f.write_str("}")
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Variant::Boolean(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Variant::Integer(value)
    }
}

impl From<i64> for Variant {
    fn from(value: i64) -> Self {
        Variant::Long(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Variant::Double(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(value)
    }
}

impl From<VariantMap> for Variant {
    fn from(value: VariantMap) -> Self {
        Variant::Map(value)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(value: Vec<Variant>) -> Self {
        Variant::List(value)
    }
}
