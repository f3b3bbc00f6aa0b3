use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Serialization format of a dataset's raw data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    #[default]
    Unknown,
    Csv,
    Json,
}

impl DataFormat {
    /// Conventional file extension (without the dot).
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for DataFormat {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(TypeError::UnknownFormat(other.to_string())),
        }
    }
}

/// Format-specific reading/writing options.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// CSV: the first row holds column names rather than data.
    pub header_row: bool,
    /// JSON: rows are arrays of values rather than objects keyed by field name.
    pub array_entries: bool,
}

/// Value type of a column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Unknown,
    String,
    Integer,
    Float,
    Boolean,
}

impl FieldType {
    /// Widen two observed types to one that holds both.
    pub fn widen(self, other: FieldType) -> FieldType {
        use FieldType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Unknown, b) => b,
            (a, Unknown) => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => String,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
        };
        f.write_str(s)
    }
}

/// A named, typed column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: String::new(),
        }
    }
}

/// Ordered column list of a tabular dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// Structural description of a dataset's raw data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Structure {
    pub format: DataFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_config: Option<FormatConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    /// Size of the raw data in bytes.
    pub length: u64,
    /// Number of data rows.
    pub entries: u64,
}

impl Structure {
    /// Overwrite fields of `self` with the set fields of `other`.
    pub fn assign(&mut self, other: &Structure) {
        if other.format != DataFormat::Unknown {
            self.format = other.format;
        }
        if other.format_config.is_some() {
            self.format_config = other.format_config.clone();
        }
        if other.schema.is_some() {
            self.schema = other.schema.clone();
        }
        if other.length != 0 {
            self.length = other.length;
        }
        if other.entries != 0 {
            self.entries = other.entries;
        }
    }

    /// Whether the CSV data carries a header row.
    pub fn header_row(&self) -> bool {
        self.format_config.as_ref().is_some_and(|c| c.header_row)
    }
}
