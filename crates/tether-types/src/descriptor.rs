//! Serializable descriptions of engine-side values.
//!
//! Every non-scalar value that crosses the boundary is represented by
//! exactly one descriptor variant. Scalars (nil, booleans, numbers,
//! strings) are passed by value and never described.
//!
//! # Wire shape
//!
//! Descriptors serialize to plain JSON objects. Every wrapped value's JSON
//! carries its registry identifier in the reserved [`REMOTE_ID_FIELD`]
//! field; the engine-side marshaller detects "this is a remote reference"
//! by the presence of that field when arguments come back in.
//!
//! Optional fields ([`ArgumentDescriptor`] bounds, method data types) are
//! omitted entirely when absent — absence is meaningful and must not decay
//! into a zero value across a round trip.

use crate::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved JSON field carrying the registry identifier of a wrapped value.
pub const REMOTE_ID_FIELD: &str = "__remote_id";

/// The fixed `instanceof` tag for function descriptors.
pub const FUNCTION_TYPE: &str = "Function";

/// The fixed `instanceof` tag for enumerator descriptors.
pub const ENUMERATOR_TYPE: &str = "Enumerator";

/// A serializable description of a non-scalar engine value.
///
/// Exactly one variant per value kind. The untagged representation keeps
/// the wire shape flat; variants are distinguished by their required
/// fields (`arguments` for functions, `properties`/`methods` for objects,
/// the minimal shape for enumerators).
///
/// # Example
///
/// ```
/// use tether_types::{Descriptor, EnumeratorDescriptor, ObjectId};
///
/// let d = Descriptor::Enumerator(EnumeratorDescriptor::new("timers", ObjectId(4)));
/// let json = serde_json::to_string(&d).unwrap();
/// assert!(json.contains("\"__remote_id\":4"));
///
/// let back: Descriptor = serde_json::from_str(&json).unwrap();
/// assert_eq!(back.id(), ObjectId(4));
/// assert!(back.is_enumerator());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Descriptor {
    /// A callable value.
    Function(FunctionDescriptor),
    /// A fully introspected object.
    Object(ObjectDescriptor),
    /// A value that supports indexing but not introspection.
    Enumerator(EnumeratorDescriptor),
}

impl Descriptor {
    /// The identifier of the registry entry backing this descriptor.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        match self {
            Self::Function(d) => d.id,
            Self::Object(d) => d.id,
            Self::Enumerator(d) => d.id,
        }
    }

    /// The descriptor's name (property name, global name, or type name —
    /// whatever context produced it).
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Function(d) => &d.name,
            Self::Object(d) => &d.name,
            Self::Enumerator(d) => &d.name,
        }
    }

    /// The declared "instance-of" type name.
    #[must_use]
    pub fn instance_of(&self) -> &str {
        match self {
            Self::Function(d) => &d.instance_of,
            Self::Object(d) => &d.instance_of,
            Self::Enumerator(d) => &d.instance_of,
        }
    }

    /// Returns `true` for the minimal enumerator fallback shape.
    #[must_use]
    pub fn is_enumerator(&self) -> bool {
        matches!(self, Self::Enumerator(_))
    }

    /// Looks up a method by name (objects only).
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        match self {
            Self::Object(d) => d.methods.get(name),
            _ => None,
        }
    }

    /// Whether the name is a known property or method of this value.
    ///
    /// Enumerators expose no member list; callers treat every name as
    /// potentially present on them.
    #[must_use]
    pub fn has_member(&self, name: &str) -> bool {
        match self {
            Self::Object(d) => {
                d.properties.iter().any(|p| p == name) || d.methods.contains_key(name)
            }
            _ => false,
        }
    }
}

/// Description of a fully introspected object.
///
/// Property names and method descriptors come from the engine's
/// reflection facility. Each method's descriptor carries its own
/// identifier, which is what makes bound calls addressable: the control
/// side calls the method's id with the object's id as receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Name from the context that produced the descriptor.
    pub name: String,
    /// Registry identifier of the described object.
    #[serde(rename = "__remote_id")]
    pub id: ObjectId,
    /// Human-readable description, empty unless the object provides one.
    #[serde(default)]
    pub description: String,
    /// Help text, empty unless the object provides one.
    #[serde(default)]
    pub help: String,
    /// Declared type name.
    #[serde(rename = "instanceof")]
    pub instance_of: String,
    /// Names of data properties.
    pub properties: Vec<String>,
    /// Method name → method descriptor.
    pub methods: BTreeMap<String, MethodDescriptor>,
}

/// Description of a callable value.
///
/// Description and help stay empty unless later enriched; the argument
/// list comes from reflection when the engine can provide it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    /// Name of the callable as known to the scope that produced it.
    pub name: String,
    /// Registry identifier of the callable.
    #[serde(rename = "__remote_id")]
    pub id: ObjectId,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Help text.
    #[serde(default)]
    pub help: String,
    /// Always [`FUNCTION_TYPE`].
    #[serde(rename = "instanceof")]
    pub instance_of: String,
    /// Declared arguments, possibly empty.
    pub arguments: Vec<ArgumentDescriptor>,
}

impl FunctionDescriptor {
    /// Creates a function descriptor with no reflected arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            id,
            description: String::new(),
            help: String::new(),
            instance_of: FUNCTION_TYPE.to_string(),
            arguments: Vec::new(),
        }
    }
}

/// Minimal description for values that support indexing but not full
/// introspection.
///
/// This is the fallback shape: the descriptor builder never refuses to
/// describe a value, it degrades to this instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumeratorDescriptor {
    /// Name from the context that produced the descriptor.
    pub name: String,
    /// Registry identifier of the described value.
    #[serde(rename = "__remote_id")]
    pub id: ObjectId,
    /// Always [`ENUMERATOR_TYPE`].
    #[serde(rename = "instanceof")]
    pub instance_of: String,
}

impl EnumeratorDescriptor {
    /// Creates an enumerator descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            id,
            instance_of: ENUMERATOR_TYPE.to_string(),
        }
    }
}

/// Description of one method on an object.
///
/// Carries its own registry identifier: the method's function value is
/// registered alongside the owning object, so the control side can invoke
/// it with any receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Method name.
    pub name: String,
    /// Registry identifier of the method's function value.
    #[serde(rename = "__remote_id")]
    pub id: ObjectId,
    /// Declared return data type, if reflection provides one.
    #[serde(rename = "dataType", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Declared default value, if any.
    #[serde(rename = "defaultValue", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Help text.
    #[serde(default)]
    pub help: String,
    /// Declared arguments, possibly empty.
    pub arguments: Vec<ArgumentDescriptor>,
}

impl MethodDescriptor {
    /// Creates a method descriptor with no reflected metadata.
    #[must_use]
    pub fn new(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            id,
            data_type: None,
            default_value: None,
            description: String::new(),
            help: String::new(),
            arguments: Vec::new(),
        }
    }
}

/// Description of one declared argument of a callable.
///
/// Everything except the name is optional, and absence round-trips as
/// absence — an argument without bounds stays without bounds instead of
/// gaining `0` ones.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArgumentDescriptor {
    /// Argument name.
    pub name: String,
    /// Declared data type.
    #[serde(rename = "dataType", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Declared default value.
    #[serde(rename = "defaultValue", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Help text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Numeric lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Numeric upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ArgumentDescriptor {
    /// Creates an argument descriptor carrying only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
