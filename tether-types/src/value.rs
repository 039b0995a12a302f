use smartstring::alias::String as SmartString;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Value stored in a node property or layout-data slot
///
/// The engine never interprets these; it only compares them to decide
/// whether a change has to be sent to the client.
#[derive(Clone)]
pub enum PropertyValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(SmartString),
    Json(Arc<serde_json::Value>),
    /// Host-defined payload, compared by identity only
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl PropertyValue {
    pub fn json(value: serde_json::Value) -> Self {
        PropertyValue::Json(Arc::new(value))
    }

    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        PropertyValue::Opaque(Arc::new(value))
    }

    /// Compare values for change detection
    /// Opaque payloads compare by reference only
    pub fn eq_value(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyValue::Nil, PropertyValue::Nil) => true,
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a == b,
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a == b,
            (PropertyValue::Float(a), PropertyValue::Float(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (PropertyValue::String(a), PropertyValue::String(b)) => a == b,
            (PropertyValue::Json(a), PropertyValue::Json(b)) => Arc::ptr_eq(a, b) || a == b,
            (PropertyValue::Opaque(a), PropertyValue::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, PropertyValue::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Nil => Some(false),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            PropertyValue::Opaque(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Convert to JSON for renderers that serialize property values
    ///
    /// Opaque payloads have no JSON form and map to `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Nil | PropertyValue::Opaque(_) => serde_json::Value::Null,
            PropertyValue::Bool(b) => serde_json::Value::Bool(*b),
            PropertyValue::Int(i) => serde_json::Value::from(*i),
            PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PropertyValue::String(s) => serde_json::Value::String(s.to_string()),
            PropertyValue::Json(value) => value.as_ref().clone(),
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        self.eq_value(other)
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Nil => write!(f, "Nil"),
            PropertyValue::Bool(b) => write!(f, "Bool({b})"),
            PropertyValue::Int(i) => write!(f, "Int({i})"),
            PropertyValue::Float(x) => write!(f, "Float({x})"),
            PropertyValue::String(s) => write!(f, "String({s:?})"),
            PropertyValue::Json(value) => write!(f, "Json({value})"),
            PropertyValue::Opaque(value) => write!(f, "Opaque({:p})", Arc::as_ptr(value)),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.into())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value.into())
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropertyValue::Nil)
    }
}
