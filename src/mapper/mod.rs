//! This module holds the import state machine which maps
//! units of a source file (lines or csv rows) to
//! context changes and deferred write actions.
//!
//! The machine never talks to the network. It returns an `Action`
//! and the driver decides how to run it.

use crate::batch::Batch;
use crate::config::{ImportConfig, Precision, DEFAULT_RETENTION_POLICY};
use crate::mapping::{Layout, Positions};
use crate::point::Record;

mod csv;
mod line;

pub const TOKEN_DDL: &str = "# DDL";
pub const TOKEN_DML: &str = "# DML";
pub const TOKEN_DATABASE: &str = "# CONTEXT-DATABASE:";
pub const TOKEN_RETENTION_POLICY: &str = "# CONTEXT-RETENTION-POLICY:";

/// Section of the source currently read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Control commands, or the csv header.
    Schema,
    /// Data rows.
    Data,
}

/// Where rows go and how csv columns are read.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub database: String,
    pub retention_policy: String,
    pub measurement: String,
    pub positions: Option<Positions>,
}

/// Work left for the driver after one unit was mapped.
#[derive(Debug, PartialEq)]
pub enum Action {
    NoOp,
    /// Run a control command right away.
    ExecuteSchema(String),
    /// Write a drained batch.
    Flush(Flush),
}

/// A drained batch together with the target it was collected for.
#[derive(Debug, PartialEq)]
pub struct Flush {
    pub database: String,
    pub retention_policy: String,
    pub payload: Payload,
}

#[derive(Debug, PartialEq)]
pub enum Payload {
    /// Line protocol text for the http write path.
    Lines(Vec<String>),
    /// Points for the column write path.
    Points(Vec<Record>),
}

impl Payload {
    pub fn len(&self) -> usize {
        match *self {
            Payload::Lines(ref lines) => lines.len(),
            Payload::Points(ref points) => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The import state machine. One instance per run.
#[derive(Debug)]
pub struct ImportFsm {
    state: State,
    context: Context,
    layout: Layout,
    column_write: bool,
    precision: Precision,
    default_retention_policy: String,
    lines: Batch<String>,
    points: Batch<Record>,
}

impl ImportFsm {
    pub fn new(cfg: &ImportConfig) -> ImportFsm {
        let retention_policy = if cfg.retention_policy.is_empty() {
            String::from(DEFAULT_RETENTION_POLICY)
        } else {
            cfg.retention_policy.clone()
        };

        ImportFsm {
            state: State::Schema,
            context: Context {
                database: cfg.database.clone(),
                retention_policy: retention_policy.clone(),
                measurement: cfg.measurement.clone(),
                positions: None,
            },
            layout: Layout::from_config(cfg),
            column_write: cfg.column_write,
            precision: cfg.precision,
            default_retention_policy: retention_policy,
            lines: Batch::new(cfg.batch_size),
            points: Batch::new(cfg.batch_size),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> State {
        self.state
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Number of buffered units.
    pub fn pending(&self) -> usize {
        self.lines.len() + self.points.len()
    }

    /// Flush whatever is left at the end of the source.
    pub fn finish(&mut self) -> Action {
        self.flush_pending()
    }

    fn flush_pending(&mut self) -> Action {
        let payload = if !self.lines.is_empty() {
            Payload::Lines(self.lines.drain())
        } else if !self.points.is_empty() {
            Payload::Points(self.points.drain())
        } else {
            return Action::NoOp;
        };

        Action::Flush(Flush {
            database: self.context.database.clone(),
            retention_policy: self.context.retention_policy.clone(),
            payload,
        })
    }

    fn push_line(&mut self, line: String) -> Action {
        self.lines.append(line);
        if self.lines.is_full() {
            self.flush_pending()
        } else {
            Action::NoOp
        }
    }

    fn push_point(&mut self, record: Record) -> Action {
        self.points.append(record);
        if self.points.is_full() {
            self.flush_pending()
        } else {
            Action::NoOp
        }
    }

    /// Queue a point on the configured write path.
    fn push_record(&mut self, record: Record) -> Action {
        if self.column_write {
            self.push_point(record)
        } else {
            let line = record.to_line_protocol();
            self.push_line(line)
        }
    }

    /// Change the target database, flushing rows collected for the old one.
    fn switch_database(&mut self, database: &str) -> Action {
        if self.context.database == database {
            return Action::NoOp;
        }
        let action = self.flush_pending();
        self.context.database = database.to_owned();
        action
    }

    fn switch_retention_policy(&mut self, retention_policy: &str) -> Action {
        if self.context.retention_policy == retention_policy {
            return Action::NoOp;
        }
        let action = self.flush_pending();
        self.context.retention_policy = retention_policy.to_owned();
        action
    }
}
