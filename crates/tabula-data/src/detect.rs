use std::path::Path;

use serde_json::Value;
use tabula_types::{DataFormat, Field, FieldType, FormatConfig, Schema, Structure};
use tracing::debug;

use crate::error::{DataError, DataResult};
use crate::rows::{cell_type, csv_records};

/// Detect a data format from a file name's extension.
pub fn extension_data_format(filename: &str) -> DataResult<DataFormat> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .ok_or(DataError::NoExtension)?;
    ext.parse()
        .map_err(|_| DataError::UnsupportedFormat(ext.to_string()))
}

/// Infer a structure from a file name and its contents.
pub fn structure_from_filename(filename: &str, data: &[u8]) -> DataResult<Structure> {
    let format = extension_data_format(filename)?;
    structure_from_bytes(format, data)
}

/// Infer a structure (schema, format options, sizes) from raw data.
pub fn structure_from_bytes(format: DataFormat, data: &[u8]) -> DataResult<Structure> {
    let mut st = match format {
        DataFormat::Csv => csv_structure(data)?,
        DataFormat::Json => json_structure(data)?,
        DataFormat::Unknown => return Err(DataError::UnsupportedFormat(format.to_string())),
    };
    st.length = data.len() as u64;
    debug!(
        format = %format,
        fields = st.schema.as_ref().map_or(0, |s| s.fields.len()),
        entries = st.entries,
        "inferred structure"
    );
    Ok(st)
}

/// Lower-case a column title and replace anything outside `[a-z0-9_]` with `_`.
fn field_name(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// The first row is a header when every cell is a non-empty, non-numeric string.
fn is_header_row(record: &csv::StringRecord) -> bool {
    !record.is_empty()
        && record
            .iter()
            .all(|cell| matches!(cell_type(cell), FieldType::String | FieldType::Boolean))
}

fn csv_structure(data: &[u8]) -> DataResult<Structure> {
    let records = csv_records(data)?;
    let first = records
        .first()
        .ok_or_else(|| DataError::InvalidData("error reading first row of csv: EOF".into()))?;
    let header_row = is_header_row(first);

    let mut fields: Vec<Field> = if header_row {
        first
            .iter()
            .map(|title| Field::new(field_name(title), FieldType::Unknown))
            .collect()
    } else {
        (1..=first.len())
            .map(|i| Field::new(format!("field_{i}"), FieldType::Unknown))
            .collect()
    };

    let body = if header_row { &records[1..] } else { &records[..] };
    for record in body {
        for (field, cell) in fields.iter_mut().zip(record.iter()) {
            field.field_type = field.field_type.widen(cell_type(cell));
        }
    }
    finish_types(&mut fields);

    Ok(Structure {
        format: DataFormat::Csv,
        format_config: Some(FormatConfig {
            header_row,
            array_entries: false,
        }),
        schema: Some(Schema { fields }),
        entries: body.len() as u64,
        ..Default::default()
    })
}

fn value_type(value: &Value) -> FieldType {
    match value {
        Value::Null => FieldType::Unknown,
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Integer,
        Value::Number(_) => FieldType::Float,
        _ => FieldType::String,
    }
}

fn json_structure(data: &[u8]) -> DataResult<Structure> {
    let entries = match serde_json::from_slice::<Value>(data) {
        Ok(Value::Array(entries)) => entries,
        Ok(_) => return Err(DataError::InvalidData("json data must be an array".into())),
        Err(e) => return Err(DataError::InvalidData(format!("error reading json: {e}"))),
    };

    let array_entries = matches!(entries.first(), Some(Value::Array(_)));
    let mut fields: Vec<Field> = Vec::new();
    for entry in &entries {
        match entry {
            Value::Array(values) => {
                while fields.len() < values.len() {
                    fields.push(Field::new(format!("field_{}", fields.len() + 1), FieldType::Unknown));
                }
                for (field, v) in fields.iter_mut().zip(values) {
                    field.field_type = field.field_type.widen(value_type(v));
                }
            }
            Value::Object(map) => {
                for (key, v) in map {
                    let idx = match fields.iter().position(|f| &f.name == key) {
                        Some(i) => i,
                        None => {
                            fields.push(Field::new(key.clone(), FieldType::Unknown));
                            fields.len() - 1
                        }
                    };
                    fields[idx].field_type = fields[idx].field_type.widen(value_type(v));
                }
            }
            other => {
                return Err(DataError::InvalidData(format!(
                    "json entries must be arrays or objects, got {other}"
                )))
            }
        }
    }
    finish_types(&mut fields);

    Ok(Structure {
        format: DataFormat::Json,
        format_config: Some(FormatConfig {
            header_row: false,
            array_entries,
        }),
        schema: Some(Schema { fields }),
        entries: entries.len() as u64,
        ..Default::default()
    })
}

/// Columns that never held a value are typed as strings.
fn finish_types(fields: &mut [Field]) {
    for field in fields {
        if field.field_type == FieldType::Unknown {
            field.field_type = FieldType::String;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_detection() {
        assert_eq!(extension_data_format("data.csv").unwrap(), DataFormat::Csv);
        assert_eq!(extension_data_format("/tmp/x/DATA.JSON").unwrap(), DataFormat::Json);
        assert_eq!(extension_data_format("data"), Err(DataError::NoExtension));
        assert_eq!(extension_data_format(""), Err(DataError::NoExtension));
        assert_eq!(
            extension_data_format("sheet.xlsx"),
            Err(DataError::UnsupportedFormat("xlsx".into()))
        );
        assert_eq!(
            DataError::NoExtension.to_string(),
            "no file extension provided"
        );
    }

    #[test]
    fn csv_with_header() {
        let st = structure_from_bytes(
            DataFormat::Csv,
            b"rank,probability_of_automation,soc_code,job_title\n702,\"0.99\",\"41-9041\",\"Telemarketers\"\n",
        )
        .unwrap();
        assert!(st.header_row());
        assert_eq!(st.entries, 1);
        let fields = st.schema.unwrap().fields;
        let types: Vec<_> = fields.iter().map(|f| (f.name.as_str(), f.field_type)).collect();
        assert_eq!(
            types,
            vec![
                ("rank", FieldType::Integer),
                ("probability_of_automation", FieldType::Float),
                ("soc_code", FieldType::String),
                ("job_title", FieldType::String),
            ]
        );
    }

    #[test]
    fn csv_header_names_are_normalized() {
        let st = structure_from_bytes(DataFormat::Csv, b"\ncolA, col B\n1,2\n").unwrap();
        let names: Vec<_> = st.schema.unwrap().fields.into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["cola", "col_b"]);
    }

    #[test]
    fn csv_without_header() {
        let st = structure_from_bytes(DataFormat::Csv, b"1,a\n2,b\n").unwrap();
        assert!(!st.header_row());
        assert_eq!(st.entries, 2);
        let fields = st.schema.unwrap().fields;
        assert_eq!(fields[0].name, "field_1");
        assert_eq!(fields[0].field_type, FieldType::Integer);
        assert_eq!(fields[1].field_type, FieldType::String);
    }

    #[test]
    fn empty_csv_is_invalid() {
        let err = structure_from_bytes(DataFormat::Csv, b"\n\n").unwrap_err();
        assert_eq!(err.to_string(), "error reading first row of csv: EOF");
    }

    #[test]
    fn json_objects() {
        let st = structure_from_bytes(DataFormat::Json, br#"[{"a":1,"b":"x"},{"a":1.5,"c":true}]"#)
            .unwrap();
        let cfg = st.format_config.clone().unwrap();
        assert!(!cfg.array_entries);
        let fields = st.schema.unwrap().fields;
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].field_type, FieldType::Float);
        assert_eq!(fields[2].field_type, FieldType::Boolean);
    }

    #[test]
    fn json_arrays() {
        let st = structure_from_bytes(DataFormat::Json, br#"[[1,"a"],[2,"b",null]]"#).unwrap();
        assert!(st.format_config.unwrap().array_entries);
        assert_eq!(st.schema.unwrap().fields.len(), 3);
        assert_eq!(st.entries, 2);
    }

    #[test]
    fn json_must_be_array() {
        assert!(structure_from_bytes(DataFormat::Json, br#"{"a":1}"#).is_err());
        assert!(structure_from_bytes(DataFormat::Json, b"not json").is_err());
    }
}
