use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Local;
use log::LevelFilter;
use thiserror::Error;

/// Install the process wide logger.
///
/// Lines keep the `<timestamp> <Level>: <message>` shape.
/// `verbose` raises the level to debug, `RUST_LOG` overrides both.
pub fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {}: {}",
                Local::now().format("%F %T"),
                record.level(),
                record.args()
            )
        })
        .try_init();
}

/// Internal result which throws an error if
/// something bad happens.
pub type ImportResult<T> = Result<T, ImportError>;

#[derive(Debug, Error)]
pub enum ImportError {
    /// A required name or column is missing. Aborts the run.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The source can't be opened. Aborts the run.
    #[error("open {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Reading a single unit from an opened source failed.
    #[error("read failed: {0}")]
    Read(String),
    /// A malformed line or row.
    #[error("parse error: {0}")]
    Parse(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error: {status} - {message}")]
    Server { status: u16, message: String },
    /// A statement level error reported in a query result.
    #[error("query error: {0}")]
    Query(String),
    #[error("write failed, code: {code}, partial write failure")]
    PartialWrite { code: i32 },
    #[error("write failed, code: {code}, write failure")]
    WriteFailed { code: i32 },
    #[error("unexpected response code: {code}")]
    Protocol { code: i32 },
    #[error("unknown --format {0}, only support line_protocol,csv")]
    Format(String),
    #[error("database is required, make sure `# CONTEXT-DATABASE:` token is exist")]
    MissingDatabase,
    /// A row doesn't fit the column schema of its measurement.
    #[error("schema error: {0}")]
    Schema(String),
    /// Every sub-failure of one flush.
    #[error("{}", JoinedErrors(.0))]
    Batch(Vec<ImportError>),
}

struct JoinedErrors<'a>(&'a [ImportError]);

impl<'a> fmt::Display for JoinedErrors<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            fmt::Display::fmt(err, f)?;
        }
        Ok(())
    }
}

impl ImportError {
    /// Errors which stop the whole import instead of a single unit.
    pub fn is_fatal(&self) -> bool {
        match *self {
            ImportError::Configuration(_) | ImportError::Io { .. } | ImportError::Format(_) => {
                true
            }
            ImportError::Batch(ref errs) => errs.iter().any(ImportError::is_fatal),
            _ => false,
        }
    }

    /// Errors which only deserve a warning, some rows made it.
    pub fn is_warning(&self) -> bool {
        match *self {
            ImportError::PartialWrite { .. } => true,
            ImportError::Batch(ref errs) => errs.iter().all(ImportError::is_warning),
            _ => false,
        }
    }

    /// Split the rows dropped before sending (`Schema`, `Parse`) off the
    /// failures of the batch itself.
    pub fn split_rejected(self) -> (Vec<ImportError>, Option<ImportError>) {
        let errs = match self {
            ImportError::Batch(errs) => errs,
            other => vec![other],
        };
        let (rows, rest): (Vec<_>, Vec<_>) = errs
            .into_iter()
            .partition(|e| matches!(*e, ImportError::Schema(_) | ImportError::Parse(_)));
        (rows, ImportError::join(rest).err())
    }

    /// Fold the failures of one flush, keeping every one of them.
    pub fn join(mut errs: Vec<ImportError>) -> ImportResult<()> {
        match errs.len() {
            0 => Ok(()),
            1 => Err(errs.remove(0)),
            _ => Err(ImportError::Batch(errs)),
        }
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> ImportError {
        ImportError::Transport(err.to_string())
    }
}

impl From<tonic::Status> for ImportError {
    fn from(status: tonic::Status) -> ImportError {
        ImportError::Transport(format!(
            "rpc failed, status: {:?}, message: {}",
            status.code(),
            status.message()
        ))
    }
}

impl From<tonic::transport::Error> for ImportError {
    fn from(err: tonic::transport::Error) -> ImportError {
        ImportError::Transport(err.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> ImportError {
        ImportError::Read(err.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ImportError::Configuration("tag".into()).is_fatal());
        assert!(ImportError::Format("json".into()).is_fatal());
        assert!(ImportError::Io {
            path: PathBuf::from("missing.txt"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        }
        .is_fatal());
        assert!(!ImportError::Parse("bad".into()).is_fatal());
        assert!(!ImportError::PartialWrite { code: 1 }.is_fatal());
        assert!(!ImportError::MissingDatabase.is_fatal());
    }

    #[test]
    fn test_warning_classification() {
        assert!(ImportError::PartialWrite { code: 1 }.is_warning());
        assert!(!ImportError::WriteFailed { code: 2 }.is_warning());
        assert!(!ImportError::Batch(vec![
            ImportError::PartialWrite { code: 1 },
            ImportError::Schema("conflict".into()),
        ])
        .is_warning());
    }

    #[test]
    fn test_join_keeps_every_error() {
        assert!(ImportError::join(vec![]).is_ok());

        match ImportError::join(vec![ImportError::Protocol { code: 7 }]) {
            Err(ImportError::Protocol { code }) => assert_eq!(code, 7),
            other => panic!("unexpected {:?}", other),
        }

        let err = ImportError::join(vec![
            ImportError::Schema("field value is float".into()),
            ImportError::WriteFailed { code: 2 },
        ])
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("schema error: field value is float"));
        assert!(msg.contains("write failed, code: 2, write failure"));
        assert_eq!(msg.lines().count(), 2);
    }

    #[test]
    fn test_split_rejected_rows() {
        let (rows, rest) = ImportError::Schema("field value is float".into()).split_rejected();
        assert_eq!(rows.len(), 1);
        assert!(rest.is_none());

        let (rows, rest) = ImportError::Batch(vec![
            ImportError::Schema("field value is float".into()),
            ImportError::Parse("timestamp out of range".into()),
            ImportError::PartialWrite { code: 1 },
        ])
        .split_rejected();
        assert_eq!(rows.len(), 2);
        assert!(rest.unwrap().is_warning());

        let (rows, rest) = ImportError::WriteFailed { code: 2 }.split_rejected();
        assert!(rows.is_empty());
        assert!(!rest.unwrap().is_warning());
    }

    #[test]
    fn test_logger_init_twice() {
        init_logger(true);
        init_logger(false);
        log::debug!("logger still usable");
    }
}
