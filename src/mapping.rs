//! The basic conversion between a csv source and openGemini is a mapping
//! between header columns and the tags, fields and timestamp of a point.
//! Non numeric timestamps need a time format,
//! see https://docs.rs/chrono/0.4/chrono/format/strftime/index.html

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use log::info;

use crate::config::{ImportConfig, Precision};
use crate::error::{ImportError, ImportResult};
use crate::point::{FieldValue, Record};

/// The configured column roles.
#[derive(Debug, Clone)]
pub struct Layout {
    pub tags: Vec<String>,
    /// Empty takes every column which is neither a tag nor the time.
    pub fields: Vec<String>,
    pub time: String,
    pub tformat: Option<String>,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            tags: Vec::new(),
            fields: Vec::new(),
            time: String::from("time"),
            tformat: None,
        }
    }
}

/// Column positions found in the header row.
#[derive(Debug, Clone, PartialEq)]
pub struct Positions {
    pub tags: BTreeMap<String, usize>,
    pub fields: BTreeMap<String, usize>,
    pub time: usize,
    tformat: Option<String>,
}

impl Layout {
    pub fn from_config(cfg: &ImportConfig) -> Layout {
        Layout {
            tags: cfg.tags.clone(),
            fields: cfg.fields.clone(),
            time: cfg.time_field.clone(),
            tformat: cfg.time_format.clone(),
        }
    }

    /// Search the positions within the header row.
    /// Tags are matched before fields, fields before the time column.
    pub fn apply(&self, header: &[&str]) -> ImportResult<Positions> {
        let tag_names: HashSet<&str> = self.tags.iter().map(String::as_str).collect();
        let field_names: HashSet<&str> = self.fields.iter().map(String::as_str).collect();

        let mut tags = BTreeMap::new();
        let mut fields = BTreeMap::new();
        let mut time = None;

        for (idx, column) in header.iter().enumerate() {
            let name = column.trim_start_matches('\u{feff}').trim();
            if tag_names.contains(name) {
                tags.entry(name.to_owned()).or_insert(idx);
            } else if field_names.contains(name) {
                fields.entry(name.to_owned()).or_insert(idx);
            } else if name == self.time {
                time.get_or_insert(idx);
            } else if self.fields.is_empty() && !name.is_empty() {
                fields.entry(name.to_owned()).or_insert(idx);
            } else {
                info!("ignore column name: {}", name);
            }
        }

        if let Some(tag) = self.tags.iter().find(|t| !tags.contains_key(*t)) {
            return Err(ImportError::Configuration(format!(
                "tag name not in csv header {}",
                tag
            )));
        }
        if let Some(field) = self.fields.iter().find(|f| !fields.contains_key(*f)) {
            return Err(ImportError::Configuration(format!(
                "field name not in csv header {}",
                field
            )));
        }
        let time = time.ok_or_else(|| {
            ImportError::Configuration(format!("time field name not in csv header {}", self.time))
        })?;
        if fields.is_empty() {
            return Err(ImportError::Configuration(
                "no field column found in csv header".into(),
            ));
        }

        Ok(Positions {
            tags,
            fields,
            time,
            tformat: self.tformat.clone(),
        })
    }
}

impl Positions {
    /// Build the point of one data row. Empty cells are left out.
    pub fn record(&self, row: &[&str], measurement: &str, precision: Precision) -> ImportResult<Record> {
        let cell = |name: &str, pos: usize| {
            row.get(pos).map(|v| v.trim()).ok_or_else(|| {
                ImportError::Parse(format!(
                    "row has {} columns, column {} at {} is missing",
                    row.len(),
                    name,
                    pos
                ))
            })
        };

        let mut record = Record::new(measurement);
        for (name, &pos) in &self.tags {
            let value = cell(name.as_str(), pos)?;
            if !value.is_empty() {
                record.tags.insert(name.clone(), value.to_owned());
            }
        }
        for (name, &pos) in &self.fields {
            let value = cell(name.as_str(), pos)?;
            if !value.is_empty() {
                record
                    .fields
                    .insert(name.clone(), FieldValue::String(value.to_owned()));
            }
        }
        if record.fields.is_empty() {
            return Err(ImportError::Parse("row has no field values".into()));
        }

        let raw = cell("time", self.time)?;
        record.timestamp = Some(parse_time(raw, self.tformat.as_deref(), precision)?);
        Ok(record)
    }
}

/// Integers are taken as they are, anything else is parsed with the
/// time format or as RFC 3339 and scaled to the precision.
fn parse_time(raw: &str, tformat: Option<&str>, precision: Precision) -> ImportResult<i64> {
    if let Ok(ts) = raw.parse::<i64>() {
        return Ok(ts);
    }

    let time = match tformat {
        Some(format) => NaiveDateTime::parse_from_str(raw, format)
            .map(|t| Utc.from_utc_datetime(&t))
            .map_err(|e| ImportError::Parse(format!("parsing time {:?} failed: {}", raw, e)))?,
        None => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| ImportError::Parse(format!("parsing time {:?} failed: {}", raw, e)))?,
    };
    precision
        .from_datetime(&time)
        .ok_or_else(|| ImportError::Parse(format!("time {:?} out of range", raw)))
}
