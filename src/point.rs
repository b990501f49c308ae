//! The in memory form of one data point.

use std::collections::BTreeMap;
use std::fmt;

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl FieldValue {
    /// Format this value for line protocol.
    pub fn to_line_protocol(&self) -> String {
        match *self {
            FieldValue::String(ref v) => {
                format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""))
            }
            FieldValue::Integer(v) => format!("{}i", v),
            FieldValue::Float(v) => format!("{}", v),
            FieldValue::Boolean(v) => format!("{}", v),
        }
    }

    /// Short type name used in schema messages.
    pub fn kind(&self) -> &'static str {
        match *self {
            FieldValue::String(_) => "string",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FieldValue::String(ref v) => f.write_str(v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

/// One data point. Tags and fields are kept sorted by key.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    /// In the configured precision, `None` lets the server pick.
    pub timestamp: Option<i64>,
}

impl Record {
    pub fn new(measurement: &str) -> Record {
        Record {
            measurement: measurement.to_owned(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    /// Render the record as a single line protocol line.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape(key, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(value, &[',', '=', ' ']));
        }

        line.push(' ');
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| {
                format!("{}={}", escape(key, &[',', '=', ' ']), value.to_line_protocol())
            })
            .collect();
        line.push_str(&fields.join(","));

        if let Some(ts) = self.timestamp {
            line.push(' ');
            line.push_str(&ts.to_string());
        }
        line
    }
}

fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
