//! BigQuery standard SQL data types
//!
//! Routine arguments and return values carry a data type that nests through
//! arrays and structs. Users write the flat schema form
//! ([`DataTypeConfig`]); it's validated into the [`SqlDataType`] sum type and
//! only then rendered to the API's JSON. Nesting deeper than
//! [`MAX_TYPE_DEPTH`] is rejected in both directions.

use super::wire_enum::wire_enum;
use crate::error::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// BigQuery's own limit on nested types
pub const MAX_TYPE_DEPTH: usize = 15;

wire_enum! {
    pub enum TypeKind {
        TypeKindUnspecified => "TYPE_KIND_UNSPECIFIED",
        Int64 => "INT64",
        Bool => "BOOL",
        Float64 => "FLOAT64",
        String => "STRING",
        Bytes => "BYTES",
        Timestamp => "TIMESTAMP",
        Date => "DATE",
        Time => "TIME",
        Datetime => "DATETIME",
        Geography => "GEOGRAPHY",
        Numeric => "NUMERIC",
        Array => "ARRAY",
        Struct => "STRUCT",
    }
}

/// Data type as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataTypeConfig {
    pub type_kind: TypeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_element_type: Option<Box<DataTypeConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struct_type: Option<StructTypeConfig>,
}

impl DataTypeConfig {
    pub fn scalar(type_kind: TypeKind) -> Self {
        Self {
            type_kind,
            array_element_type: None,
            struct_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructTypeConfig {
    pub fields: Vec<StructFieldConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructFieldConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<Box<DataTypeConfig>>,
}

/// Validated data type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlDataType {
    Scalar(TypeKind),
    Array(Box<SqlDataType>),
    Struct(Vec<SqlField>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlField {
    pub name: Option<String>,
    pub field_type: Option<SqlDataType>,
}

impl SqlDataType {
    /// Validate a configured type. `field` names the config field for errors.
    pub fn from_config(config: &DataTypeConfig, field: &str) -> Result<Self> {
        Self::from_config_at(config, field, 1)
    }

    fn from_config_at(config: &DataTypeConfig, field: &str, depth: usize) -> Result<Self> {
        if depth > MAX_TYPE_DEPTH {
            return Err(ProviderError::expand(
                field,
                format!("data type nests deeper than {MAX_TYPE_DEPTH} levels"),
            ));
        }

        match &config.type_kind {
            TypeKind::Array => {
                if config.struct_type.is_some() {
                    return Err(ProviderError::expand(field, "ARRAY type can't have struct_type"));
                }
                let element = config.array_element_type.as_deref().ok_or_else(|| {
                    ProviderError::expand(field, "ARRAY type requires array_element_type")
                })?;
                Ok(Self::Array(Box::new(Self::from_config_at(element, field, depth + 1)?)))
            },
            TypeKind::Struct => {
                if config.array_element_type.is_some() {
                    return Err(ProviderError::expand(
                        field,
                        "STRUCT type can't have array_element_type",
                    ));
                }
                let struct_type = config.struct_type.as_ref().ok_or_else(|| {
                    ProviderError::expand(field, "STRUCT type requires struct_type")
                })?;
                let fields = struct_type
                    .fields
                    .iter()
                    .map(|f| {
                        Ok(SqlField {
                            name: f.name.clone(),
                            field_type: f
                                .field_type
                                .as_deref()
                                .map(|t| Self::from_config_at(t, field, depth + 1))
                                .transpose()?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Struct(fields))
            },
            kind => {
                kind.validate(field)?;
                if config.array_element_type.is_some() || config.struct_type.is_some() {
                    return Err(ProviderError::expand(
                        field,
                        format!("{kind} type can't have array_element_type or struct_type"),
                    ));
                }
                Ok(Self::Scalar(kind.clone()))
            },
        }
    }

    pub fn type_kind(&self) -> TypeKind {
        match self {
            Self::Scalar(kind) => kind.clone(),
            Self::Array(_) => TypeKind::Array,
            Self::Struct(_) => TypeKind::Struct,
        }
    }

    /// API representation (`StandardSqlDataType`)
    pub fn to_wire(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("typeKind".to_string(), json!(self.type_kind()));
        match self {
            Self::Scalar(_) => {},
            Self::Array(element) => {
                obj.insert("arrayElementType".to_string(), element.to_wire());
            },
            Self::Struct(fields) => {
                let fields: Vec<Value> = fields
                    .iter()
                    .map(|f| {
                        let mut field = Map::new();
                        if let Some(name) = &f.name {
                            field.insert("name".to_string(), json!(name));
                        }
                        if let Some(t) = &f.field_type {
                            field.insert("type".to_string(), t.to_wire());
                        }
                        Value::Object(field)
                    })
                    .collect();
                obj.insert("structType".to_string(), json!({ "fields": fields }));
            },
        }
        Value::Object(obj)
    }

    /// Parse the API representation. Type kinds this crate doesn't know are
    /// kept as scalars.
    pub fn from_wire(v: &Value, field: &str) -> Result<Self> {
        Self::from_wire_at(v, field, 1)
    }

    fn from_wire_at(v: &Value, field: &str, depth: usize) -> Result<Self> {
        if depth > MAX_TYPE_DEPTH {
            return Err(ProviderError::flatten(
                field,
                format!("data type nests deeper than {MAX_TYPE_DEPTH} levels"),
            ));
        }

        let kind: TypeKind = match v.get("typeKind") {
            Some(kind) => serde_json::from_value(kind.clone())
                .map_err(|e| ProviderError::flatten(field, e.to_string()))?,
            None => TypeKind::TypeKindUnspecified,
        };

        match kind {
            TypeKind::Array => {
                let element = v
                    .get("arrayElementType")
                    .ok_or_else(|| ProviderError::flatten(field, "ARRAY without arrayElementType"))?;
                Ok(Self::Array(Box::new(Self::from_wire_at(element, field, depth + 1)?)))
            },
            TypeKind::Struct => {
                let fields = v
                    .get("structType")
                    .and_then(|s| s.get("fields"))
                    .and_then(|f| f.as_array())
                    .map(|fields| fields.as_slice())
                    .unwrap_or_default();
                let fields = fields
                    .iter()
                    .map(|f| {
                        Ok(SqlField {
                            name: f.get("name").and_then(|n| n.as_str()).map(|n| n.to_string()),
                            field_type: f
                                .get("type")
                                .map(|t| Self::from_wire_at(t, field, depth + 1))
                                .transpose()?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Struct(fields))
            },
            kind => Ok(Self::Scalar(kind)),
        }
    }

    /// Back to the configuration form
    pub fn to_config(&self) -> DataTypeConfig {
        match self {
            Self::Scalar(kind) => DataTypeConfig::scalar(kind.clone()),
            Self::Array(element) => DataTypeConfig {
                type_kind: TypeKind::Array,
                array_element_type: Some(Box::new(element.to_config())),
                struct_type: None,
            },
            Self::Struct(fields) => DataTypeConfig {
                type_kind: TypeKind::Struct,
                array_element_type: None,
                struct_type: Some(StructTypeConfig {
                    fields: fields
                        .iter()
                        .map(|f| StructFieldConfig {
                            name: f.name.clone(),
                            field_type: f.field_type.as_ref().map(|t| Box::new(t.to_config())),
                        })
                        .collect(),
                }),
            },
        }
    }
}
