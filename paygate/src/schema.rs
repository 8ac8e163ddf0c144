//! Typed endpoint schemas for discoverable payment requirements.
//!
//! An [`EndpointSchema`] is attached to a payment requirement's
//! `outputSchema` field so that clients (and bazaar-style indexers) can learn
//! how to call a paid endpoint before paying for it.
//!
//! ```
//! use paygate::schema::{BodyType, EndpointSchema, FieldDef, InputSchema, SchemaNode};
//!
//! let schema = EndpointSchema::new()
//!     .with_input(
//!         InputSchema::http("POST")
//!             .with_body_type(BodyType::Json)
//!             .with_body_field("prompt", FieldDef::field("string", true, "Prompt text")),
//!     )
//!     .with_output(SchemaNode::object().with_property("answer", SchemaNode::string()));
//! assert!(schema.input.is_some());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a field is required.
///
/// Serialized untagged: either a plain boolean or the list of sibling field
/// names whose presence makes this field required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Required {
    /// Unconditionally required (or not).
    Always(bool),
    /// Required when any of the named fields is present.
    When(Vec<String>),
}

/// Description of one input field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field type (`string`, `integer`, `boolean`, `object`, `array`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub field_type: String,
    /// Requirement rule. Omitted when the field is optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Required>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Allowed values.
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
    /// Nested fields of an object.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, FieldDef>,
}

impl FieldDef {
    /// A plain field.
    pub fn field(field_type: impl Into<String>, required: bool, description: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            required: required.then_some(Required::Always(true)),
            description: description.into(),
            ..Self::default()
        }
    }

    /// A string field restricted to `values`.
    pub fn enum_field<I, S>(values: I, required: bool, description: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: values.into_iter().map(Into::into).collect(),
            ..Self::field("string", required, description)
        }
    }

    /// An object field with nested properties.
    pub fn object_field<I, K>(properties: I, required: bool, description: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, Self)>,
        K: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Self::field("object", required, description)
        }
    }

    /// A field that becomes required when any of `required_when` is present.
    pub fn conditional_field<I, S>(
        field_type: impl Into<String>,
        required_when: I,
        description: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: Some(Required::When(
                required_when.into_iter().map(Into::into).collect(),
            )),
            ..Self::field(field_type, false, description)
        }
    }

    /// Returns `true` if the field is unconditionally required.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        matches!(self.required, Some(Required::Always(true)))
    }
}

/// Encoding of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyType {
    /// `application/json`
    Json,
    /// `application/x-www-form-urlencoded`
    FormData,
    /// `multipart/form-data`
    MultipartFormData,
    /// Plain text.
    Text,
    /// Raw bytes.
    Binary,
}

/// How an endpoint expects to be called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSchema {
    /// Transport kind. Always `"http"` for schemas built here.
    #[serde(rename = "type")]
    pub kind: String,
    /// HTTP method.
    pub method: String,
    /// Body encoding, if the endpoint takes a body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_type: Option<BodyType>,
    /// Accepted query parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query_params: BTreeMap<String, FieldDef>,
    /// Accepted body fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub body_fields: BTreeMap<String, FieldDef>,
    /// Expected request headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header_fields: BTreeMap<String, FieldDef>,
}

impl InputSchema {
    /// Starts an HTTP input schema for `method`.
    pub fn http(method: impl Into<String>) -> Self {
        Self {
            kind: "http".to_owned(),
            method: method.into(),
            body_type: None,
            query_params: BTreeMap::new(),
            body_fields: BTreeMap::new(),
            header_fields: BTreeMap::new(),
        }
    }

    /// Sets the body encoding.
    #[must_use]
    pub const fn with_body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = Some(body_type);
        self
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query_param(mut self, name: impl Into<String>, field: FieldDef) -> Self {
        self.query_params.insert(name.into(), field);
        self
    }

    /// Adds a body field.
    #[must_use]
    pub fn with_body_field(mut self, name: impl Into<String>, field: FieldDef) -> Self {
        self.body_fields.insert(name.into(), field);
        self
    }

    /// Adds a header field.
    #[must_use]
    pub fn with_header_field(mut self, name: impl Into<String>, field: FieldDef) -> Self {
        self.header_fields.insert(name.into(), field);
        self
    }
}

/// A recursive, JSON-Schema-like description of a response body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaNode {
    /// Node type (`object`, `array`, `string`, `number`, `integer`, `boolean`).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Format hint such as `date-time` or `uri`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Object properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaNode>,
    /// Names of required object properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Array element schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaNode>>,
    /// Allowed values.
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<serde_json::Value>,
}

impl SchemaNode {
    /// A node of the given type.
    pub fn of_type(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Self::default()
        }
    }

    /// An empty object node.
    #[must_use]
    pub fn object() -> Self {
        Self::of_type("object")
    }

    /// A string node.
    #[must_use]
    pub fn string() -> Self {
        Self::of_type("string")
    }

    /// A number node.
    #[must_use]
    pub fn number() -> Self {
        Self::of_type("number")
    }

    /// An integer node.
    #[must_use]
    pub fn integer() -> Self {
        Self::of_type("integer")
    }

    /// A boolean node.
    #[must_use]
    pub fn boolean() -> Self {
        Self::of_type("boolean")
    }

    /// An array of `items`.
    #[must_use]
    pub fn array(items: Self) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of_type("array")
        }
    }

    /// Adds an optional property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, node: Self) -> Self {
        self.properties.insert(name.into(), node);
        self
    }

    /// Adds a property and marks it required.
    #[must_use]
    pub fn with_required_property(mut self, name: impl Into<String>, node: Self) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, node);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the format hint.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Input and output description of a paid endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSchema {
    /// How to call the endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputSchema>,
    /// What the endpoint returns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<SchemaNode>,
}

impl EndpointSchema {
    /// An empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the input description.
    #[must_use]
    pub fn with_input(mut self, input: InputSchema) -> Self {
        self.input = Some(input);
        self
    }

    /// Sets the output description.
    #[must_use]
    pub fn with_output(mut self, output: SchemaNode) -> Self {
        self.output = Some(output);
        self
    }
}
