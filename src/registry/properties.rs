//! Typed dynamic properties of graph elements.
//!
//! Every element declares its properties up front; values are stored behind
//! a lock so the control API can read and write them while the element is
//! processing buffers.

use crate::error::{MlError, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Declared type of a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    Bool,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    /// Enumeration with `(value, nick)` pairs.
    Enum(&'static [(i32, &'static str)]),
}

impl PropertyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::Bool => "bool",
            PropertyKind::Int32 => "int32",
            PropertyKind::UInt32 => "uint32",
            PropertyKind::Int64 => "int64",
            PropertyKind::UInt64 => "uint64",
            PropertyKind::Double => "double",
            PropertyKind::String => "string",
            PropertyKind::Enum(_) => "enum",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    Enum(i32),
}

impl PropertyValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int32(_) => "int32",
            PropertyValue::UInt32(_) => "uint32",
            PropertyValue::Int64(_) => "int64",
            PropertyValue::UInt64(_) => "uint64",
            PropertyValue::Double(_) => "double",
            PropertyValue::String(_) => "string",
            PropertyValue::Enum(_) => "enum",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int32(v) => write!(f, "{}", v),
            PropertyValue::UInt32(v) => write!(f, "{}", v),
            PropertyValue::Int64(v) => write!(f, "{}", v),
            PropertyValue::UInt64(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::String(v) => f.write_str(v),
            PropertyValue::Enum(v) => write!(f, "{}", v),
        }
    }
}

/// Schema for one element property.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub default: PropertyValue,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl PropertySpec {
    pub fn new(name: &'static str, kind: PropertyKind, default: PropertyValue) -> Self {
        Self {
            name,
            kind,
            default,
            min: None,
            max: None,
        }
    }

    pub fn bool(name: &'static str, default: bool) -> Self {
        Self::new(name, PropertyKind::Bool, PropertyValue::Bool(default))
    }

    pub fn int32(name: &'static str, default: i32) -> Self {
        Self::new(name, PropertyKind::Int32, PropertyValue::Int32(default))
    }

    pub fn uint32(name: &'static str, default: u32) -> Self {
        Self::new(name, PropertyKind::UInt32, PropertyValue::UInt32(default))
    }

    pub fn int64(name: &'static str, default: i64) -> Self {
        Self::new(name, PropertyKind::Int64, PropertyValue::Int64(default))
    }

    pub fn uint64(name: &'static str, default: u64) -> Self {
        Self::new(name, PropertyKind::UInt64, PropertyValue::UInt64(default))
    }

    pub fn double(name: &'static str, default: f64) -> Self {
        Self::new(name, PropertyKind::Double, PropertyValue::Double(default))
    }

    pub fn string(name: &'static str, default: &str) -> Self {
        Self::new(name, PropertyKind::String, PropertyValue::String(default.to_string()))
    }

    pub fn enumeration(name: &'static str, values: &'static [(i32, &'static str)], default: i32) -> Self {
        Self::new(name, PropertyKind::Enum(values), PropertyValue::Enum(default))
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    fn check_range(&self, v: f64) -> Result<()> {
        if self.min.map_or(false, |m| v < m) || self.max.map_or(false, |m| v > m) {
            return Err(MlError::invalid(format!(
                "value {} out of range for property '{}'",
                v, self.name
            )));
        }
        Ok(())
    }

    /// Coerce `value` into this property's type.
    ///
    /// Only exact matches are accepted, with one relaxation: enum properties
    /// take signed or unsigned 32-bit values, provided the number is one of
    /// the declared enum values.
    pub fn coerce(&self, value: PropertyValue) -> Result<PropertyValue> {
        let mismatch = |v: &PropertyValue| {
            MlError::invalid(format!(
                "property '{}' is {}, not {}",
                self.name,
                self.kind.name(),
                v.kind_name()
            ))
        };
        let coerced = match (&self.kind, value) {
            (PropertyKind::Bool, v @ PropertyValue::Bool(_)) => v,
            (PropertyKind::Int32, PropertyValue::Int32(v)) => {
                self.check_range(v as f64)?;
                PropertyValue::Int32(v)
            }
            (PropertyKind::UInt32, PropertyValue::UInt32(v)) => {
                self.check_range(v as f64)?;
                PropertyValue::UInt32(v)
            }
            (PropertyKind::Int64, PropertyValue::Int64(v)) => {
                self.check_range(v as f64)?;
                PropertyValue::Int64(v)
            }
            (PropertyKind::UInt64, PropertyValue::UInt64(v)) => {
                self.check_range(v as f64)?;
                PropertyValue::UInt64(v)
            }
            (PropertyKind::Double, PropertyValue::Double(v)) => {
                self.check_range(v)?;
                PropertyValue::Double(v)
            }
            (PropertyKind::String, v @ PropertyValue::String(_)) => v,
            (PropertyKind::Enum(values), v) => {
                let raw = match v {
                    PropertyValue::Enum(e) | PropertyValue::Int32(e) => e,
                    PropertyValue::UInt32(u) => {
                        i32::try_from(u).map_err(|_| MlError::invalid("enum value out of range"))?
                    }
                    other => return Err(mismatch(&other)),
                };
                if !values.iter().any(|(val, _)| *val == raw) {
                    return Err(MlError::invalid(format!(
                        "{} is not a valid value for enum property '{}'",
                        raw, self.name
                    )));
                }
                PropertyValue::Enum(raw)
            }
            (_, other) => return Err(mismatch(&other)),
        };
        Ok(coerced)
    }

    /// Parse a value written in a graph description.
    pub fn parse(&self, text: &str) -> Result<PropertyValue> {
        let bad = || {
            MlError::invalid(format!(
                "cannot parse '{}' as {} for property '{}'",
                text,
                self.kind.name(),
                self.name
            ))
        };
        let value = match &self.kind {
            PropertyKind::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => PropertyValue::Bool(true),
                "false" | "0" | "no" => PropertyValue::Bool(false),
                _ => return Err(bad()),
            },
            PropertyKind::Int32 => PropertyValue::Int32(text.parse().map_err(|_| bad())?),
            PropertyKind::UInt32 => PropertyValue::UInt32(text.parse().map_err(|_| bad())?),
            PropertyKind::Int64 => PropertyValue::Int64(text.parse().map_err(|_| bad())?),
            PropertyKind::UInt64 => PropertyValue::UInt64(text.parse().map_err(|_| bad())?),
            PropertyKind::Double => PropertyValue::Double(text.parse().map_err(|_| bad())?),
            PropertyKind::String => PropertyValue::String(text.to_string()),
            PropertyKind::Enum(values) => {
                let found = values
                    .iter()
                    .find(|(_, nick)| nick.eq_ignore_ascii_case(text))
                    .map(|(v, _)| *v);
                match found {
                    Some(v) => PropertyValue::Enum(v),
                    None => PropertyValue::Enum(text.parse().map_err(|_| bad())?),
                }
            }
        };
        self.coerce(value)
    }
}

/// Live property values of one element.
pub struct PropertyStore {
    specs: Vec<PropertySpec>,
    values: Mutex<HashMap<&'static str, PropertyValue>>,
}

impl PropertyStore {
    pub fn new(specs: Vec<PropertySpec>) -> Self {
        let values = specs.iter().map(|s| (s.name, s.default.clone())).collect();
        Self {
            specs,
            values: Mutex::new(values),
        }
    }

    /// Look up a property; `_` and `-` are interchangeable in names.
    pub fn spec(&self, name: &str) -> Result<&PropertySpec> {
        let wanted = name.replace('_', "-");
        self.specs
            .iter()
            .find(|s| s.name == wanted)
            .ok_or_else(|| MlError::invalid(format!("no property named '{}'", name)))
    }

    pub fn specs(&self) -> &[PropertySpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Result<PropertyValue> {
        let spec = self.spec(name)?;
        let values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        Ok(values
            .get(spec.name)
            .cloned()
            .unwrap_or_else(|| spec.default.clone()))
    }

    pub fn set(&self, name: &str, value: PropertyValue) -> Result<()> {
        let spec = self.spec(name)?;
        let value = spec.coerce(value)?;
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(spec.name, value);
        Ok(())
    }

    pub fn set_from_str(&self, name: &str, text: &str) -> Result<()> {
        let spec = self.spec(name)?;
        let value = spec.parse(text)?;
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        values.insert(spec.name, value);
        Ok(())
    }

    // Convenience readers for element code. Missing or mistyped properties
    // fall back to the type's zero value; element specs guarantee presence.

    pub fn bool(&self, name: &str) -> bool {
        matches!(self.get(name), Ok(PropertyValue::Bool(true)))
    }

    pub fn int32(&self, name: &str) -> i32 {
        match self.get(name) {
            Ok(PropertyValue::Int32(v)) | Ok(PropertyValue::Enum(v)) => v,
            _ => 0,
        }
    }

    pub fn uint32(&self, name: &str) -> u32 {
        match self.get(name) {
            Ok(PropertyValue::UInt32(v)) => v,
            _ => 0,
        }
    }

    pub fn uint64(&self, name: &str) -> u64 {
        match self.get(name) {
            Ok(PropertyValue::UInt64(v)) => v,
            _ => 0,
        }
    }

    pub fn string(&self, name: &str) -> String {
        match self.get(name) {
            Ok(PropertyValue::String(v)) => v,
            _ => String::new(),
        }
    }
}
