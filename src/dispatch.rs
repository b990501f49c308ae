//! Runs the actions of the import state machine against the transports.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::Utc;
use log::debug;

use crate::client::proto::ResponseCode;
use crate::client::{ColumnWriter, HttpClient, RecordBuilder, WriteRequestBuilder};
use crate::config::{ImportConfig, Precision};
use crate::error::{ImportError, ImportResult};
use crate::mapper::{Flush, Payload};
use crate::point::Record;

/// Map the code of a structured write response.
pub fn classify(code: i32) -> ImportResult<()> {
    match ResponseCode::try_from(code) {
        Ok(ResponseCode::Success) => Ok(()),
        Ok(ResponseCode::Partial) => Err(ImportError::PartialWrite { code }),
        Ok(ResponseCode::Failed) => Err(ImportError::WriteFailed { code }),
        Err(_) => Err(ImportError::Protocol { code }),
    }
}

pub struct Dispatcher {
    http: Box<dyn HttpClient>,
    column: Option<Box<dyn ColumnWriter>>,
    precision: Precision,
    credentials: Option<(String, String)>,
    /// One request builder per `database.retention_policy`.
    builders: HashMap<String, WriteRequestBuilder>,
}

impl Dispatcher {
    pub fn new(
        cfg: &ImportConfig,
        http: Box<dyn HttpClient>,
        column: Option<Box<dyn ColumnWriter>>,
    ) -> Dispatcher {
        let credentials = match (&cfg.username, &cfg.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };
        Dispatcher {
            http,
            column,
            precision: cfg.precision,
            credentials,
            builders: HashMap::new(),
        }
    }

    /// Run a control command, scoped to `database` when one is known.
    pub fn execute_schema(&self, command: &str, database: &str) -> ImportResult<()> {
        let database = if database.is_empty() {
            None
        } else {
            Some(database)
        };
        self.http.query(command, database).map(|_| ())
    }

    /// Send one drained batch to the target it was collected for.
    pub fn flush(&mut self, flush: Flush) -> ImportResult<()> {
        if flush.payload.is_empty() {
            return Ok(());
        }
        debug!(
            "flush {} rows to {}.{}",
            flush.payload.len(),
            flush.database,
            flush.retention_policy
        );
        match flush.payload {
            Payload::Lines(lines) => self.http.write(
                &flush.database,
                &flush.retention_policy,
                &lines.join("\n"),
                self.precision,
            ),
            Payload::Points(points) => {
                self.write_points(&flush.database, &flush.retention_policy, points)
            }
        }
    }

    fn write_points(
        &mut self,
        database: &str,
        retention_policy: &str,
        points: Vec<Record>,
    ) -> ImportResult<()> {
        let column = self.column.as_mut().ok_or_else(|| {
            ImportError::Configuration("column write client is not configured".into())
        })?;

        let builder = match self.builders.entry(format!("{}.{}", database, retention_policy)) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let mut builder = WriteRequestBuilder::new(database, retention_policy)?;
                if let Some((ref user, ref pass)) = self.credentials {
                    builder.authenticate(user, pass);
                }
                e.insert(builder)
            }
        };

        let mut errs = Vec::new();
        let records = group_by_measurement(points, self.precision, &mut errs);
        let (request, rejected) = builder.build(records);
        errs.extend(rejected);

        if !request.records.is_empty() {
            match column.write(request) {
                Ok(response) => {
                    if let Err(e) = classify(response.code) {
                        errs.push(e);
                    }
                }
                Err(e) => errs.push(e),
            }
        }
        ImportError::join(errs)
    }
}

/// Sort points into one builder per measurement, in first seen order.
/// Timestamps are turned into nanoseconds, missing ones become now.
fn group_by_measurement(
    points: Vec<Record>,
    precision: Precision,
    errs: &mut Vec<ImportError>,
) -> Vec<RecordBuilder> {
    let mut records: Vec<RecordBuilder> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for point in points {
        let timestamp = match point.timestamp {
            Some(ts) => precision.to_nanos(ts),
            None => Precision::Nanoseconds.from_datetime(&Utc::now()),
        };
        let timestamp = match timestamp {
            Some(ts) => ts,
            None => {
                errs.push(ImportError::Parse(format!(
                    "timestamp of {} out of range",
                    point.measurement
                )));
                continue;
            }
        };

        let slot = match index.get(&point.measurement) {
            Some(&slot) => slot,
            None => match RecordBuilder::new(&point.measurement) {
                Ok(record) => {
                    records.push(record);
                    index.insert(point.measurement.clone(), records.len() - 1);
                    records.len() - 1
                }
                Err(e) => {
                    errs.push(e);
                    continue;
                }
            },
        };

        let record = &mut records[slot];
        let mut line = record.new_line();
        for (key, value) in &point.tags {
            line.add_tag(key, value);
        }
        for (key, value) in point.fields {
            line.add_field(&key, value);
        }
        record.add_line(line.build(timestamp));
    }
    records
}
