use serde_json::Value;
use tabula_types::{DataFormat, Field, FieldType, Structure};

use crate::error::{DataError, DataResult};

/// Drop blank lines before the first record.
pub(crate) fn strip_leading_blank_lines(data: &[u8]) -> &[u8] {
    let mut rest = data;
    loop {
        let line_end = rest.iter().position(|&b| b == b'\n');
        let line = match line_end {
            Some(i) => &rest[..i],
            None => rest,
        };
        if !line.iter().all(u8::is_ascii_whitespace) {
            return rest;
        }
        match line_end {
            Some(i) => rest = &rest[i + 1..],
            None => return &rest[rest.len()..],
        }
    }
}

/// Parse every CSV record. Record widths are not checked here.
pub(crate) fn csv_records(data: &[u8]) -> DataResult<Vec<csv::StringRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(strip_leading_blank_lines(data));
    reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DataError::InvalidData(format!("error reading csv: {e}")))
}

/// Narrowest type that can hold a single CSV cell.
pub(crate) fn cell_type(cell: &str) -> FieldType {
    if cell.is_empty() {
        FieldType::Unknown
    } else if cell.parse::<i64>().is_ok() {
        FieldType::Integer
    } else if cell.parse::<f64>().is_ok() {
        FieldType::Float
    } else if cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false") {
        FieldType::Boolean
    } else {
        FieldType::String
    }
}

fn cell_value(row: usize, field: &Field, cell: &str) -> DataResult<Value> {
    if cell.is_empty() {
        return Ok(Value::Null);
    }
    let invalid = || DataError::Row {
        row,
        reason: format!(
            "invalid {} value '{cell}' for field '{}'",
            field.field_type, field.name
        ),
    };
    match field.field_type {
        FieldType::Integer => cell.parse::<i64>().map(Value::from).map_err(|_| invalid()),
        FieldType::Float => cell
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        FieldType::Boolean => match cell.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        FieldType::String | FieldType::Unknown => Ok(Value::String(cell.to_string())),
    }
}

enum Source {
    Csv(std::vec::IntoIter<csv::StringRecord>),
    Json(std::vec::IntoIter<Value>),
}

/// Iterator over the rows of a payload, typed by a structure's schema.
///
/// Each item is one row with exactly one value per schema field. Iteration
/// yields an error for the first malformed row and should be stopped there.
pub struct RowReader {
    fields: Vec<Field>,
    source: Source,
    index: usize,
}

impl RowReader {
    pub fn new(structure: &Structure, data: &[u8]) -> DataResult<Self> {
        let fields = structure
            .schema
            .as_ref()
            .map(|s| s.fields.clone())
            .ok_or_else(|| DataError::InvalidStructure("structure has no schema".into()))?;
        let source = match structure.format {
            DataFormat::Csv => {
                let mut records = csv_records(data)?;
                if structure.header_row() && !records.is_empty() {
                    records.remove(0);
                }
                Source::Csv(records.into_iter())
            }
            DataFormat::Json => match serde_json::from_slice::<Value>(data) {
                Ok(Value::Array(entries)) => Source::Json(entries.into_iter()),
                Ok(_) => return Err(DataError::InvalidData("json data must be an array".into())),
                Err(e) => return Err(DataError::InvalidData(format!("error reading json: {e}"))),
            },
            DataFormat::Unknown => {
                return Err(DataError::UnsupportedFormat(structure.format.to_string()))
            }
        };
        Ok(Self {
            fields,
            source,
            index: 0,
        })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn read_csv(&self, record: csv::StringRecord) -> DataResult<Vec<Value>> {
        if record.len() != self.fields.len() {
            return Err(DataError::Row {
                row: self.index,
                reason: format!(
                    "expected {} columns, got {}",
                    self.fields.len(),
                    record.len()
                ),
            });
        }
        self.fields
            .iter()
            .zip(record.iter())
            .map(|(field, cell)| cell_value(self.index, field, cell))
            .collect()
    }

    fn read_json(&self, entry: Value) -> DataResult<Vec<Value>> {
        match entry {
            Value::Array(values) if values.len() == self.fields.len() => Ok(values),
            Value::Array(values) => Err(DataError::Row {
                row: self.index,
                reason: format!(
                    "expected {} values, got {}",
                    self.fields.len(),
                    values.len()
                ),
            }),
            Value::Object(mut map) => Ok(self
                .fields
                .iter()
                .map(|f| map.remove(&f.name).unwrap_or(Value::Null))
                .collect()),
            other => Err(DataError::Row {
                row: self.index,
                reason: format!("expected an array or object, got {other}"),
            }),
        }
    }
}

impl Iterator for RowReader {
    type Item = DataResult<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match &mut self.source {
            Source::Csv(records) => {
                let record = records.next()?;
                self.read_csv(record)
            }
            Source::Json(entries) => {
                let entry = entries.next()?;
                self.read_json(entry)
            }
        };
        self.index += 1;
        Some(row)
    }
}

/// Call `f` for every row, stopping at the first read error or callback error.
pub fn each_row<F>(structure: &Structure, data: &[u8], mut f: F) -> DataResult<()>
where
    F: FnMut(usize, Vec<Value>) -> DataResult<()>,
{
    for (i, row) in RowReader::new(structure, data)?.enumerate() {
        f(i, row?)?;
    }
    Ok(())
}
