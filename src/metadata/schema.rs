//! Iceberg schema/type model
//!
//! The in-core representation of an Iceberg schema, serialized using
//! Iceberg's canonical `type` names. Field IDs are never renumbered once
//! assigned. `Type` hand-rolls its `Serialize`/`Deserialize` impls
//! (via a `serde_json::Value` intermediate) because primitives, decimals,
//! and nested kinds each shape the JSON differently.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

/// An Iceberg primitive or nested type.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
    Date,
    Time,
    Timestamp,
    Timestamptz,
    Binary,
    Uuid,
    Decimal { precision: u32, scale: u32 },
    Fixed(u64),
    Struct(Vec<NestedField>),
    List {
        element_id: i32,
        element_required: bool,
        element: Box<Type>,
    },
    Map {
        key_id: i32,
        key: Box<Type>,
        value_id: i32,
        value_required: bool,
        value: Box<Type>,
    },
}

impl Type {
    pub fn boolean() -> Self {
        Type::Boolean
    }
    pub fn int() -> Self {
        Type::Int
    }
    pub fn long() -> Self {
        Type::Long
    }
    pub fn string() -> Self {
        Type::String
    }
    pub fn timestamptz() -> Self {
        Type::Timestamptz
    }
    pub fn decimal(precision: u32, scale: u32) -> Self {
        Type::Decimal { precision, scale }
    }
    pub fn fixed(len: u64) -> Self {
        Type::Fixed(len)
    }

    /// Render the canonical Iceberg `type` string for primitive-like types.
    pub fn canonical_name(&self) -> String {
        match self {
            Type::Boolean => "boolean".to_string(),
            Type::Int => "int".to_string(),
            Type::Long => "long".to_string(),
            Type::Float => "float".to_string(),
            Type::Double => "double".to_string(),
            Type::String => "string".to_string(),
            Type::Date => "date".to_string(),
            Type::Time => "time".to_string(),
            Type::Timestamp => "timestamp".to_string(),
            Type::Timestamptz => "timestamptz".to_string(),
            Type::Binary => "binary".to_string(),
            Type::Uuid => "uuid".to_string(),
            Type::Decimal { precision, scale } => format!("decimal({precision},{scale})"),
            Type::Fixed(n) => format!("fixed[{n}]"),
            Type::Struct(_) => "struct".to_string(),
            Type::List { .. } => "list".to_string(),
            Type::Map { .. } => "map".to_string(),
        }
    }

    /// Highest field id anywhere beneath this type (0 for pure primitives).
    pub fn max_field_id(&self) -> i32 {
        match self {
            Type::Struct(fields) => fields
                .iter()
                .map(|f| f.id.max(f.field_type.max_field_id()))
                .max()
                .unwrap_or(0),
            Type::List {
                element_id,
                element,
                ..
            } => (*element_id).max(element.max_field_id()),
            Type::Map {
                key_id,
                key,
                value_id,
                value,
                ..
            } => (*key_id)
                .max(*value_id)
                .max(key.max_field_id())
                .max(value.max_field_id()),
            _ => 0,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Type::Struct(fields) => json!({
                "type": "struct",
                "fields": fields,
            }),
            Type::List {
                element_id,
                element_required,
                element,
            } => json!({
                "type": "list",
                "element-id": element_id,
                "element-required": element_required,
                "element": element.to_value(),
            }),
            Type::Map {
                key_id,
                key,
                value_id,
                value_required,
                value,
            } => json!({
                "type": "map",
                "key-id": key_id,
                "key": key.to_value(),
                "value-id": value_id,
                "value-required": value_required,
                "value": value.to_value(),
            }),
            primitive => Value::String(primitive.canonical_name()),
        }
    }

    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Self::primitive_from_str(s),
            Value::Object(_) => {
                let kind = value
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or("nested type object missing 'type'")?;
                match kind {
                    "struct" => {
                        let fields: Vec<NestedField> = serde_json::from_value(
                            value.get("fields").cloned().unwrap_or(Value::Array(vec![])),
                        )
                        .map_err(|e| e.to_string())?;
                        Ok(Type::Struct(fields))
                    }
                    "list" => {
                        let element_id = value
                            .get("element-id")
                            .and_then(Value::as_i64)
                            .ok_or("list missing element-id")? as i32;
                        let element_required = value
                            .get("element-required")
                            .and_then(Value::as_bool)
                            .unwrap_or(true);
                        let element = Box::new(Self::from_value(
                            value.get("element").ok_or("list missing element")?,
                        )?);
                        Ok(Type::List {
                            element_id,
                            element_required,
                            element,
                        })
                    }
                    "map" => {
                        let key_id = value
                            .get("key-id")
                            .and_then(Value::as_i64)
                            .ok_or("map missing key-id")? as i32;
                        let value_id = value
                            .get("value-id")
                            .and_then(Value::as_i64)
                            .ok_or("map missing value-id")? as i32;
                        let value_required = value
                            .get("value-required")
                            .and_then(Value::as_bool)
                            .unwrap_or(true);
                        let key = Box::new(Self::from_value(
                            value.get("key").ok_or("map missing key")?,
                        )?);
                        let val = Box::new(Self::from_value(
                            value.get("value").ok_or("map missing value")?,
                        )?);
                        Ok(Type::Map {
                            key_id,
                            key,
                            value_id,
                            value_required,
                            value: val,
                        })
                    }
                    other => Err(format!("unknown nested type: {other}")),
                }
            }
            other => Err(format!("invalid type representation: {other}")),
        }
    }

    fn primitive_from_str(s: &str) -> Result<Self, String> {
        if let Some(rest) = s.strip_prefix("decimal(").and_then(|r| r.strip_suffix(')')) {
            let mut parts = rest.split(',');
            let precision: u32 = parts
                .next()
                .ok_or("malformed decimal")?
                .trim()
                .parse()
                .map_err(|_| "malformed decimal precision")?;
            let scale: u32 = parts
                .next()
                .ok_or("malformed decimal")?
                .trim()
                .parse()
                .map_err(|_| "malformed decimal scale")?;
            return Ok(Type::Decimal { precision, scale });
        }
        if let Some(rest) = s.strip_prefix("fixed[").and_then(|r| r.strip_suffix(']')) {
            let len: u64 = rest.parse().map_err(|_| "malformed fixed length")?;
            return Ok(Type::Fixed(len));
        }
        Ok(match s {
            "boolean" => Type::Boolean,
            "int" => Type::Int,
            "long" => Type::Long,
            "float" => Type::Float,
            "double" => Type::Double,
            "string" => Type::String,
            "date" => Type::Date,
            "time" => Type::Time,
            "timestamp" => Type::Timestamp,
            "timestamptz" => Type::Timestamptz,
            "binary" => Type::Binary,
            "uuid" => Type::Uuid,
            other => return Err(format!("unknown primitive type: {other}")),
        })
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Type::from_value(&value).map_err(serde::de::Error::custom)
    }
}

/// A single field in a schema or struct, carrying its Iceberg field id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedField {
    pub id: i32,
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub field_type: Type,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl NestedField {
    pub fn required(id: i32, name: impl Into<String>, field_type: Type) -> Self {
        Self {
            id,
            name: name.into(),
            required: true,
            field_type,
            doc: None,
        }
    }

    pub fn optional(id: i32, name: impl Into<String>, field_type: Type) -> Self {
        Self {
            id,
            name: name.into(),
            required: false,
            field_type,
            doc: None,
        }
    }
}

/// A schema: an ordered list of top-level fields plus its own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "schema-id")]
    pub schema_id: i32,
    #[serde(
        rename = "identifier-field-ids",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub identifier_field_ids: Vec<i32>,
    #[serde(rename = "type", default = "struct_tag")]
    pub type_name: String,
    pub fields: Vec<NestedField>,
}

fn struct_tag() -> String {
    "struct".to_string()
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Highest field id used anywhere in the schema, including nested
    /// struct/list/map field ids. Used to derive `last-column-id`.
    pub fn max_field_id(&self) -> i32 {
        self.fields
            .iter()
            .map(|f| f.id.max(f.field_type.max_field_id()))
            .max()
            .unwrap_or(0)
    }
}

#[derive(Default)]
pub struct SchemaBuilder {
    schema_id: i32,
    fields: Vec<NestedField>,
}

impl SchemaBuilder {
    pub fn with_schema_id(mut self, id: i32) -> Self {
        self.schema_id = id;
        self
    }

    pub fn with_fields(mut self, fields: Vec<NestedField>) -> Self {
        self.fields = fields;
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            schema_id: self.schema_id,
            identifier_field_ids: Vec::new(),
            type_name: struct_tag(),
            fields: self.fields,
        }
    }
}

/// A partition spec. The default spec is empty with `spec-id` 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSpec {
    #[serde(rename = "spec-id")]
    pub spec_id: i32,
    pub fields: Vec<PartitionField>,
}

impl PartitionSpec {
    pub fn unpartitioned() -> Self {
        Self {
            spec_id: 0,
            fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionField {
    #[serde(rename = "source-id")]
    pub source_id: i32,
    #[serde(rename = "field-id")]
    pub field_id: i32,
    pub name: String,
    pub transform: String,
}

/// A sort order. The default order is unsorted with `order-id` 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortOrder {
    #[serde(rename = "order-id")]
    pub order_id: i32,
    pub fields: Vec<SortField>,
}

impl SortOrder {
    pub fn unsorted() -> Self {
        Self {
            order_id: 0,
            fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    #[serde(rename = "source-id")]
    pub source_id: i32,
    pub transform: String,
    pub direction: String,
    #[serde(rename = "null-order")]
    pub null_order: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_names_match_spec() {
        assert_eq!(Type::long().canonical_name(), "long");
        assert_eq!(Type::string().canonical_name(), "string");
        assert_eq!(Type::decimal(10, 2).canonical_name(), "decimal(10,2)");
        assert_eq!(Type::fixed(16).canonical_name(), "fixed[16]");
    }

    #[test]
    fn primitive_round_trips_through_json() {
        for ty in [Type::long(), Type::string(), Type::decimal(10, 2), Type::fixed(16)] {
            let json = serde_json::to_string(&ty).unwrap();
            let back: Type = serde_json::from_str(&json).unwrap();
            assert_eq!(ty, back);
        }
    }

    #[test]
    fn nested_struct_round_trips() {
        let ty = Type::Struct(vec![
            NestedField::required(10, "a", Type::int()),
            NestedField::optional(11, "b", Type::string()),
        ]);
        let json = serde_json::to_string(&ty).unwrap();
        let back: Type = serde_json::from_str(&json).unwrap();
        assert_eq!(ty, back);
        assert_eq!(ty.max_field_id(), 11);
    }

    #[test]
    fn schema_max_field_id_from_builder() {
        let schema = Schema::builder()
            .with_schema_id(0)
            .with_fields(vec![
                NestedField::required(1, "id", Type::long()),
                NestedField::optional(2, "name", Type::string()),
            ])
            .build();
        assert_eq!(schema.max_field_id(), 2);
    }

    #[test]
    fn unpartitioned_spec_is_spec_id_zero() {
        assert_eq!(PartitionSpec::unpartitioned().spec_id, 0);
        assert_eq!(SortOrder::unsorted().order_id, 0);
    }
}
