use std::collections::HashSet;

use serde_json::Value;
use tabula_types::{DataFormat, Structure};

use crate::error::{DataError, DataResult};
use crate::rows::{csv_records, each_row};

/// Check that `data` is well formed for `format`.
///
/// CSV needs at least one record and the same number of columns on every
/// line. JSON must be an array whose entries are all arrays or all objects.
pub fn data_format(format: DataFormat, data: &[u8]) -> DataResult<()> {
    match format {
        DataFormat::Csv => {
            let records = csv_records(data)?;
            let first = records
                .first()
                .ok_or_else(|| DataError::InvalidData("error reading first row of csv: EOF".into()))?;
            let width = first.len();
            for (line, record) in records.iter().enumerate().skip(1) {
                if record.len() != width {
                    return Err(DataError::InvalidData(format!(
                        "error: inconsistent column length on line {line} of length {} (rather than {width}). ensure all csv columns same length",
                        record.len()
                    )));
                }
            }
            Ok(())
        }
        DataFormat::Json => {
            let entries = match serde_json::from_slice::<Value>(data) {
                Ok(Value::Array(entries)) => entries,
                Ok(_) => return Err(DataError::InvalidData("json data must be an array".into())),
                Err(e) => return Err(DataError::InvalidData(format!("error reading json: {e}"))),
            };
            let arrays = entries.iter().filter(|e| e.is_array()).count();
            let objects = entries.iter().filter(|e| e.is_object()).count();
            if arrays + objects != entries.len() {
                return Err(DataError::InvalidData(
                    "json entries must be arrays or objects".into(),
                ));
            }
            if arrays > 0 && objects > 0 {
                return Err(DataError::InvalidData(
                    "json entries must not mix arrays and objects".into(),
                ));
            }
            Ok(())
        }
        DataFormat::Unknown => Err(DataError::UnsupportedFormat(format.to_string())),
    }
}

/// Check that a structure has a usable schema with unique, non-empty field names.
pub fn structure(st: &Structure) -> DataResult<()> {
    let schema = st
        .schema
        .as_ref()
        .ok_or_else(|| DataError::InvalidStructure("error: structure has no schema".into()))?;
    if schema.fields.is_empty() {
        return Err(DataError::InvalidStructure(
            "error: schema has no fields".into(),
        ));
    }
    let mut seen = HashSet::new();
    for (i, field) in schema.fields.iter().enumerate() {
        if field.name.is_empty() {
            return Err(DataError::InvalidStructure(format!(
                "error: field {i} has no name"
            )));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(DataError::InvalidStructure(format!(
                "error: cannot use the same name, '{}' more than once",
                field.name
            )));
        }
    }
    Ok(())
}

/// Check every row of `data` against the schema of `st`.
pub fn data(st: &Structure, data: &[u8]) -> DataResult<()> {
    each_row(st, data, |_, _| Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::structure_from_bytes;
    use tabula_types::{Field, FieldType, Schema};

    #[test]
    fn csv_inconsistent_columns() {
        let data = b"\n\"colA\",\"colB\",\"colC\",\"colD\"\n1,2,3,4\n1,2,3";
        let err = data_format(DataFormat::Csv, data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "error: inconsistent column length on line 2 of length 3 (rather than 4). ensure all csv columns same length"
        );
    }

    #[test]
    fn csv_garbage_is_rejected() {
        let data = b"\nasdlkfasd,,\nfm as\nf;lajsmf \na\n's;f a'\nsdlfj asdf";
        assert!(data_format(DataFormat::Csv, data).is_err());
        assert!(data_format(DataFormat::Csv, b"").is_err());
    }

    #[test]
    fn csv_ok() {
        data_format(DataFormat::Csv, b"a,b\n1,2\n3,4\n").unwrap();
    }

    #[test]
    fn json_shapes() {
        data_format(DataFormat::Json, b"[[1,2],[3,4]]").unwrap();
        data_format(DataFormat::Json, br#"[{"a":1}]"#).unwrap();
        data_format(DataFormat::Json, b"[]").unwrap();
        assert!(data_format(DataFormat::Json, br#"[[1],{"a":1}]"#).is_err());
        assert!(data_format(DataFormat::Json, b"[1,2]").is_err());
        assert!(data_format(DataFormat::Json, b"{}").is_err());
    }

    #[test]
    fn duplicate_field_names() {
        let st = structure_from_bytes(DataFormat::Csv, b"\ncolA, colB, colB, colC\n1,2,3,4\n1,2,3,4")
            .unwrap();
        assert_eq!(
            structure(&st).unwrap_err().to_string(),
            "error: cannot use the same name, 'colb' more than once"
        );
    }

    #[test]
    fn structure_requires_schema() {
        assert!(structure(&Structure::default()).is_err());
        let st = Structure {
            schema: Some(Schema {
                fields: vec![Field::new("", FieldType::String)],
            }),
            ..Default::default()
        };
        assert!(structure(&st).is_err());
    }

    #[test]
    fn data_against_schema() {
        let raw = b"n\n1\n2\n";
        let st = structure_from_bytes(DataFormat::Csv, raw).unwrap();
        data(&st, raw).unwrap();

        let mut strict = st.clone();
        strict.schema.as_mut().unwrap().fields[0].field_type = FieldType::Boolean;
        assert!(data(&strict, raw).is_err());
    }
}
