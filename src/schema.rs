//! Schema context consumed by the semantic compiler.
//!
//! A [`SchemaContext`] describes the base table of a formula: its columns,
//! the many-to-one relationships reachable with `name_rel.field`, and the
//! one-to-many (inverse) relationships that aggregate functions fold over.
//! Lookups of columns and relationships are case-insensitive; the original
//! spelling is kept for SQL generation.
//!
//! Contexts are usually built in code or loaded from JSON:
//!
//! ```
//! use formula_sql::{DataType, SchemaContext};
//!
//! let schema = SchemaContext::from_json_str(r#"{
//!     "tableName": "transactions",
//!     "columnList": { "amount": "number", "created_date": "date" },
//!     "relationshipInfo": {
//!         "merchant": {
//!             "tableName": "merchant",
//!             "joinColumn": "merchant_id",
//!             "columnList": { "name": "string" }
//!         }
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(schema.columns.get("AMOUNT").unwrap().data_type, DataType::Number);
//! assert!(schema.relationships.get("Merchant").is_some());
//! ```

use std::fmt;

use indexmap::IndexMap;

use crate::types::DataType;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Name as spelled in the schema
    pub name: String,
    pub data_type: DataType,
}

/// Columns of one table, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    columns: IndexMap<String, Column>,
}

impl ColumnMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data_type: DataType) {
        let name = name.into();
        self.columns
            .insert(name.to_ascii_lowercase(), Column { name, data_type });
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.get(&name.to_ascii_lowercase())
    }

    /// Column names in schema order, original spelling.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.values().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, DataType)> for ColumnMap {
    fn from_iter<I: IntoIterator<Item = (S, DataType)>>(iter: I) -> Self {
        let mut map = ColumnMap::new();
        for (name, ty) in iter {
            map.insert(name, ty);
        }
        map
    }
}

/// A relationship from the current table to another table.
///
/// For a direct (many-to-one) relationship, `join_column` lives on the
/// source table and points at the target's `id`. For an inverse
/// (one-to-many) relationship, `join_column` lives on the target table and
/// points back at the source's `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipInfo {
    /// Relationship name as spelled in the schema
    pub name: String,
    pub table_name: String,
    pub join_column: String,
    pub columns: ColumnMap,
    /// Direct relationships of the target table
    pub relationships: RelationshipMap,
    /// Inverse relationships of the target table, for multi-level aggregates
    pub inverse_relationships: RelationshipMap,
}

impl RelationshipInfo {
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        join_column: impl Into<String>,
    ) -> Self {
        RelationshipInfo {
            name: name.into(),
            table_name: table_name.into(),
            join_column: join_column.into(),
            columns: ColumnMap::new(),
            relationships: RelationshipMap::new(),
            inverse_relationships: RelationshipMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.insert(name, data_type);
        self
    }

    pub fn with_relationship(mut self, relationship: RelationshipInfo) -> Self {
        self.relationships.insert(relationship);
        self
    }

    pub fn with_inverse_relationship(mut self, relationship: RelationshipInfo) -> Self {
        self.inverse_relationships.insert(relationship);
        self
    }
}

/// Relationships keyed by name, looked up case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipMap {
    entries: IndexMap<String, RelationshipInfo>,
}

impl RelationshipMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, relationship: RelationshipInfo) {
        self.entries
            .insert(relationship.name.to_ascii_lowercase(), relationship);
    }

    pub fn get(&self, name: &str) -> Option<&RelationshipInfo> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|r| r.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationshipInfo> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything the compiler knows about the table a formula runs against.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaContext {
    pub table_name: String,
    pub columns: ColumnMap,
    pub relationships: RelationshipMap,
    pub inverse_relationships: RelationshipMap,
}

impl SchemaContext {
    pub fn new(table_name: impl Into<String>) -> Self {
        SchemaContext {
            table_name: table_name.into(),
            columns: ColumnMap::new(),
            relationships: RelationshipMap::new(),
            inverse_relationships: RelationshipMap::new(),
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.columns.insert(name, data_type);
        self
    }

    pub fn with_relationship(mut self, relationship: RelationshipInfo) -> Self {
        self.relationships.insert(relationship);
        self
    }

    pub fn with_inverse_relationship(mut self, relationship: RelationshipInfo) -> Self {
        self.inverse_relationships.insert(relationship);
        self
    }

    /// Parse a schema from its JSON text.
    pub fn from_json_str(input: &str) -> Result<Self, SchemaError> {
        let value: serde_json::Value = serde_json::from_str(input)?;
        Self::from_json(&value)
    }

    /// Build a schema from an already parsed JSON document.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, SchemaError> {
        let object = expect_object(value, "$")?;
        Ok(SchemaContext {
            table_name: required_string(object, "$", "tableName")?,
            columns: read_columns(object, "$")?,
            relationships: read_relationships(object, "$", "relationshipInfo")?,
            inverse_relationships: read_relationships(object, "$", "inverseRelationshipInfo")?,
        })
    }
}

/// Errors raised while loading a schema from JSON.
#[derive(Debug)]
pub enum SchemaError {
    /// The input is not valid JSON
    Json(serde_json::Error),

    /// A required key is absent
    MissingField { path: String, field: String },

    /// A key holds the wrong kind of JSON value
    InvalidValue { path: String, expected: String },

    /// A column declares a type the compiler does not know
    UnknownColumnType {
        path: String,
        column: String,
        type_name: String,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Json(e) => write!(f, "Invalid schema JSON: {}", e),
            SchemaError::MissingField { path, field } => {
                write!(f, "Missing field '{}' at {}", field, path)
            }
            SchemaError::InvalidValue { path, expected } => {
                write!(f, "Expected {} at {}", expected, path)
            }
            SchemaError::UnknownColumnType {
                path,
                column,
                type_name,
            } => write!(
                f,
                "Unknown type '{}' for column '{}' at {}",
                type_name, column, path
            ),
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchemaError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(e: serde_json::Error) -> Self {
        SchemaError::Json(e)
    }
}

type JsonObject = serde_json::Map<String, serde_json::Value>;

fn expect_object<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> Result<&'a JsonObject, SchemaError> {
    value.as_object().ok_or_else(|| SchemaError::InvalidValue {
        path: path.to_string(),
        expected: "an object".to_string(),
    })
}

fn required_string(object: &JsonObject, path: &str, field: &str) -> Result<String, SchemaError> {
    match object.get(field) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(SchemaError::InvalidValue {
            path: format!("{}.{}", path, field),
            expected: "a string".to_string(),
        }),
        None => Err(SchemaError::MissingField {
            path: path.to_string(),
            field: field.to_string(),
        }),
    }
}

fn read_columns(object: &JsonObject, path: &str) -> Result<ColumnMap, SchemaError> {
    let mut columns = ColumnMap::new();
    let Some(value) = object.get("columnList") else {
        return Ok(columns);
    };

    let list_path = format!("{}.columnList", path);
    for (name, ty) in expect_object(value, &list_path)? {
        let type_name = ty.as_str().ok_or_else(|| SchemaError::InvalidValue {
            path: format!("{}.{}", list_path, name),
            expected: "a type name".to_string(),
        })?;
        let data_type = DataType::parse(type_name).ok_or_else(|| SchemaError::UnknownColumnType {
            path: list_path.clone(),
            column: name.clone(),
            type_name: type_name.to_string(),
        })?;
        columns.insert(name.clone(), data_type);
    }
    Ok(columns)
}

fn read_relationships(
    object: &JsonObject,
    path: &str,
    field: &str,
) -> Result<RelationshipMap, SchemaError> {
    let mut relationships = RelationshipMap::new();
    let Some(value) = object.get(field) else {
        return Ok(relationships);
    };

    let map_path = format!("{}.{}", path, field);
    for (name, info) in expect_object(value, &map_path)? {
        let info_path = format!("{}.{}", map_path, name);
        let info_object = expect_object(info, &info_path)?;
        relationships.insert(RelationshipInfo {
            name: name.clone(),
            table_name: required_string(info_object, &info_path, "tableName")?,
            join_column: required_string(info_object, &info_path, "joinColumn")?,
            columns: read_columns(info_object, &info_path)?,
            relationships: read_relationships(info_object, &info_path, "relationshipInfo")?,
            inverse_relationships: read_relationships(
                info_object,
                &info_path,
                "inverseRelationshipInfo",
            )?,
        });
    }
    Ok(relationships)
}
