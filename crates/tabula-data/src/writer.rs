use serde_json::{Map, Value};
use tabula_types::{DataFormat, Field, Structure};

use crate::error::{DataError, DataResult};

enum Sink {
    Csv(csv::Writer<Vec<u8>>),
    Json { rows: Vec<Value>, objects: bool },
}

/// Encodes rows into the format described by an output structure.
///
/// CSV output writes a header row when the structure's format config asks
/// for one. JSON output is an array of arrays when `array_entries` is set and
/// an array of objects keyed by field name otherwise.
pub struct StructuredWriter {
    fields: Vec<Field>,
    sink: Sink,
}

impl StructuredWriter {
    pub fn new(structure: &Structure) -> DataResult<Self> {
        let fields = structure
            .schema
            .as_ref()
            .map(|s| s.fields.clone())
            .ok_or_else(|| DataError::InvalidStructure("structure has no schema".into()))?;
        let sink = match structure.format {
            DataFormat::Csv => {
                let mut w = csv::Writer::from_writer(Vec::new());
                if structure.header_row() {
                    w.write_record(fields.iter().map(|f| f.name.as_str()))
                        .map_err(|e| DataError::Encode(e.to_string()))?;
                }
                Sink::Csv(w)
            }
            DataFormat::Json => Sink::Json {
                rows: Vec::new(),
                objects: !structure
                    .format_config
                    .as_ref()
                    .is_some_and(|c| c.array_entries),
            },
            DataFormat::Unknown => {
                return Err(DataError::UnsupportedFormat(structure.format.to_string()))
            }
        };
        Ok(Self { fields, sink })
    }

    pub fn write_row(&mut self, row: Vec<Value>) -> DataResult<()> {
        if row.len() != self.fields.len() {
            return Err(DataError::Encode(format!(
                "row has {} values, schema has {} fields",
                row.len(),
                self.fields.len()
            )));
        }
        match &mut self.sink {
            Sink::Csv(w) => w
                .write_record(row.iter().map(csv_cell))
                .map_err(|e| DataError::Encode(e.to_string())),
            Sink::Json { rows, objects: false } => {
                rows.push(Value::Array(row));
                Ok(())
            }
            Sink::Json { rows, objects: true } => {
                let map: Map<String, Value> = self
                    .fields
                    .iter()
                    .map(|f| f.name.clone())
                    .zip(row)
                    .collect();
                rows.push(Value::Object(map));
                Ok(())
            }
        }
    }

    /// Flush and return the encoded bytes.
    pub fn finish(self) -> DataResult<Vec<u8>> {
        match self.sink {
            Sink::Csv(w) => w.into_inner().map_err(|e| DataError::Encode(e.to_string())),
            Sink::Json { rows, .. } => {
                serde_json::to_vec(&rows).map_err(|e| DataError::Encode(e.to_string()))
            }
        }
    }
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::each_row;
    use serde_json::json;
    use tabula_types::{FieldType, FormatConfig, Schema};

    fn schema() -> Option<Schema> {
        Some(Schema {
            fields: vec![
                Field::new("city", FieldType::String),
                Field::new("pop", FieldType::Integer),
            ],
        })
    }

    fn out(format: DataFormat, header_row: bool, array_entries: bool) -> Structure {
        Structure {
            format,
            format_config: Some(FormatConfig {
                header_row,
                array_entries,
            }),
            schema: schema(),
            ..Default::default()
        }
    }

    #[test]
    fn json_objects_output() {
        let mut w = StructuredWriter::new(&out(DataFormat::Json, false, false)).unwrap();
        w.write_row(vec![json!("toronto"), json!(40)]).unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&bytes).unwrap(),
            json!([{"city": "toronto", "pop": 40}])
        );
    }

    #[test]
    fn json_arrays_output() {
        let mut w = StructuredWriter::new(&out(DataFormat::Json, false, true)).unwrap();
        w.write_row(vec![json!("toronto"), json!(40)]).unwrap();
        w.write_row(vec![json!("new york"), Value::Null]).unwrap();
        assert_eq!(
            w.finish().unwrap(),
            br#"[["toronto",40],["new york",null]]"#.to_vec()
        );
    }

    #[test]
    fn csv_output_with_header() {
        let mut w = StructuredWriter::new(&out(DataFormat::Csv, true, false)).unwrap();
        w.write_row(vec![json!("toronto"), json!(40)]).unwrap();
        w.write_row(vec![json!("a, b"), Value::Null]).unwrap();
        assert_eq!(
            String::from_utf8(w.finish().unwrap()).unwrap(),
            "city,pop\ntoronto,40\n\"a, b\",\n"
        );
    }

    #[test]
    fn rejects_wrong_width() {
        let mut w = StructuredWriter::new(&out(DataFormat::Json, false, false)).unwrap();
        assert!(w.write_row(vec![json!(1)]).is_err());
    }

    #[test]
    fn csv_to_json_conversion() {
        let input = out(DataFormat::Csv, true, false);
        let mut w = StructuredWriter::new(&out(DataFormat::Json, false, true)).unwrap();
        each_row(&input, b"city,pop\ntoronto,40\nchicago,30\n", |_, row| w.write_row(row)).unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&w.finish().unwrap()).unwrap(),
            json!([["toronto", 40], ["chicago", 30]])
        );
    }
}
