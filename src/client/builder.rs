//! Builders which turn points into a structured write request.
//!
//! A `WriteRequestBuilder` lives for the whole run of one database and
//! retention policy and remembers the columns of every measurement it
//! has encoded, so later batches keep the same column order and types.

use std::collections::HashMap;

use prost::Message;

use super::proto::{
    self, Column, ColumnBlock, ColumnType, CompressMethod, WriteRequest, REQUEST_VERSION,
};
use crate::error::{ImportError, ImportResult};
use crate::point::FieldValue;

/// One finished row.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLine {
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp: i64,
}

/// An open row. Tags are added before fields.
#[derive(Debug, Default)]
pub struct LineBuilder {
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
}

impl LineBuilder {
    pub fn add_tag(&mut self, key: &str, value: &str) -> &mut Self {
        self.tags.push((key.to_owned(), value.to_owned()));
        self
    }

    pub fn add_field(&mut self, key: &str, value: FieldValue) -> &mut Self {
        self.fields.push((key.to_owned(), value));
        self
    }

    /// Close the row with its timestamp in nanoseconds.
    pub fn build(self, timestamp: i64) -> RecordLine {
        RecordLine {
            tags: self.tags,
            fields: self.fields,
            timestamp,
        }
    }
}

/// Rows of one measurement.
#[derive(Debug)]
pub struct RecordBuilder {
    measurement: String,
    lines: Vec<RecordLine>,
}

impl RecordBuilder {
    pub fn new(measurement: &str) -> ImportResult<RecordBuilder> {
        if measurement.is_empty() {
            return Err(ImportError::Schema("measurement name is empty".into()));
        }
        Ok(RecordBuilder {
            measurement: measurement.to_owned(),
            lines: Vec::new(),
        })
    }

    pub fn new_line(&self) -> LineBuilder {
        LineBuilder::default()
    }

    pub fn add_line(&mut self, line: RecordLine) {
        self.lines.push(line);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    String,
    Integer,
    Float,
    Boolean,
}

impl Kind {
    fn of(value: &FieldValue) -> Kind {
        match *value {
            FieldValue::String(_) => Kind::String,
            FieldValue::Integer(_) => Kind::Integer,
            FieldValue::Float(_) => Kind::Float,
            FieldValue::Boolean(_) => Kind::Boolean,
        }
    }

    fn column_type(self) -> ColumnType {
        match self {
            Kind::String => ColumnType::String,
            Kind::Integer => ColumnType::Integer,
            Kind::Float => ColumnType::Float,
            Kind::Boolean => ColumnType::Boolean,
        }
    }
}

const TIME_COLUMN: &str = "time";

/// Columns of one measurement, in first seen order.
#[derive(Debug, Default)]
struct Schema {
    tags: Vec<String>,
    fields: Vec<(String, Kind)>,
}

impl Schema {
    /// Check a row against the known columns and learn its new ones.
    fn admit(&mut self, measurement: &str, line: &RecordLine) -> ImportResult<()> {
        for (key, _) in &line.tags {
            if key == TIME_COLUMN || self.fields.iter().any(|(name, _)| name == key) {
                return Err(ImportError::Schema(format!(
                    "tag {} of measurement {} clashes with a field or the time column",
                    key, measurement
                )));
            }
        }
        for (key, value) in &line.fields {
            if key == TIME_COLUMN
                || self.tags.iter().any(|name| name == key)
                || line.tags.iter().any(|(tag, _)| tag == key)
            {
                return Err(ImportError::Schema(format!(
                    "field {} of measurement {} clashes with a tag or the time column",
                    key, measurement
                )));
            }
            if let Some((_, kind)) = self.fields.iter().find(|(name, _)| name == key) {
                if *kind != Kind::of(value) {
                    return Err(ImportError::Schema(format!(
                        "field {} of measurement {} is {:?}, got {}",
                        key,
                        measurement,
                        kind,
                        value.kind()
                    )));
                }
            }
        }

        for (key, _) in &line.tags {
            if !self.tags.contains(key) {
                self.tags.push(key.clone());
            }
        }
        for (key, value) in &line.fields {
            if !self.fields.iter().any(|(name, _)| name == key) {
                self.fields.push((key.clone(), Kind::of(value)));
            }
        }
        Ok(())
    }

    /// Lay the rows out column by column: tags, fields, time.
    fn encode(&self, lines: &[RecordLine]) -> ColumnBlock {
        let rows = lines.len();
        let mut columns = Vec::with_capacity(self.tags.len() + self.fields.len() + 1);

        for tag in &self.tags {
            let mut column = empty_column(tag, ColumnType::Tag, rows);
            for (row, line) in lines.iter().enumerate() {
                if let Some((_, value)) = line.tags.iter().find(|(key, _)| key == tag) {
                    set_present(&mut column, row);
                    column.string_values.push(value.clone());
                }
            }
            columns.push(column);
        }

        for (field, kind) in &self.fields {
            let mut column = empty_column(field, kind.column_type(), rows);
            for (row, line) in lines.iter().enumerate() {
                let value = match line.fields.iter().find(|(key, _)| key == field) {
                    Some((_, value)) => value,
                    None => continue,
                };
                set_present(&mut column, row);
                match *value {
                    FieldValue::String(ref v) => column.string_values.push(v.clone()),
                    FieldValue::Integer(v) => column.integer_values.push(v),
                    FieldValue::Float(v) => column.float_values.push(v),
                    FieldValue::Boolean(v) => column.boolean_values.push(v),
                }
            }
            columns.push(column);
        }

        let mut time = empty_column(TIME_COLUMN, ColumnType::Time, rows);
        for (row, line) in lines.iter().enumerate() {
            set_present(&mut time, row);
            time.integer_values.push(line.timestamp);
        }
        columns.push(time);

        ColumnBlock {
            columns,
            row_count: rows as u32,
        }
    }
}

fn empty_column(name: &str, column_type: ColumnType, rows: usize) -> Column {
    Column {
        name: name.to_owned(),
        column_type: column_type as i32,
        presence: vec![0; (rows + 7) / 8],
        ..Column::default()
    }
}

fn set_present(column: &mut Column, row: usize) {
    column.presence[row / 8] |= 1 << (row % 8);
}

/// Request builder for one database and retention policy.
#[derive(Debug)]
pub struct WriteRequestBuilder {
    database: String,
    retention_policy: String,
    username: String,
    password: String,
    schemas: HashMap<String, Schema>,
}

impl WriteRequestBuilder {
    pub fn new(database: &str, retention_policy: &str) -> ImportResult<WriteRequestBuilder> {
        if database.is_empty() {
            return Err(ImportError::MissingDatabase);
        }
        Ok(WriteRequestBuilder {
            database: database.to_owned(),
            retention_policy: retention_policy.to_owned(),
            username: String::new(),
            password: String::new(),
            schemas: HashMap::new(),
        })
    }

    pub fn authenticate(&mut self, username: &str, password: &str) -> &mut Self {
        self.username = username.to_owned();
        self.password = password.to_owned();
        self
    }

    /// Names of the known columns of a measurement, time last.
    #[cfg(test)]
    pub fn columns(&self, measurement: &str) -> Vec<String> {
        match self.schemas.get(measurement) {
            Some(schema) => schema
                .tags
                .iter()
                .cloned()
                .chain(schema.fields.iter().map(|(name, _)| name.clone()))
                .chain(Some(TIME_COLUMN.to_owned()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Assemble the request. Rows which don't fit the columns of their
    /// measurement are left out and reported back.
    pub fn build(&mut self, records: Vec<RecordBuilder>) -> (WriteRequest, Vec<ImportError>) {
        let mut errors = Vec::new();
        let mut encoded = Vec::with_capacity(records.len());

        for record in records {
            let schema = self.schemas.entry(record.measurement.clone()).or_default();
            let mut accepted = Vec::with_capacity(record.lines.len());
            for line in record.lines {
                match schema.admit(&record.measurement, &line) {
                    Ok(()) => accepted.push(line),
                    Err(e) => errors.push(e),
                }
            }
            if accepted.is_empty() {
                continue;
            }

            let min_time = accepted.iter().map(|l| l.timestamp).min().unwrap_or(0);
            let max_time = accepted.iter().map(|l| l.timestamp).max().unwrap_or(0);
            encoded.push(proto::Record {
                measurement: record.measurement,
                min_time,
                max_time,
                compress_method: CompressMethod::Uncompressed as i32,
                block: schema.encode(&accepted).encode_to_vec(),
            });
        }

        let request = WriteRequest {
            version: REQUEST_VERSION,
            database: self.database.clone(),
            retention_policy: self.retention_policy.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            records: encoded,
        };
        (request, errors)
    }
}
