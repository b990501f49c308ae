//! The import driver.
//!
//! Reads the source one unit at a time, hands every unit to the state
//! machine and runs the returned action before the next unit is read.
//! Only fatal errors end the run, everything else is logged.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::str;

use log::{error, info, warn};

use crate::client::{ColumnWriter, ColumnWriterClient, GeminiHttpClient, HttpClient};
use crate::config::{Format, ImportConfig};
use crate::dispatch::Dispatcher;
use crate::error::{ImportError, ImportResult};
use crate::mapper::{Action, ImportFsm};

/// Counters of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Lines or csv rows read.
    pub units: usize,
    pub schema_commands: usize,
    /// Units which couldn't be mapped.
    pub rejected: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "units: {}, schema commands: {}, rejected: {}, batches: {}, failed batches: {}",
            self.units, self.schema_commands, self.rejected, self.batches, self.failed_batches
        )
    }
}

pub struct ImportCommand {
    cfg: ImportConfig,
    fsm: ImportFsm,
    dispatcher: Dispatcher,
    summary: Summary,
}

impl ImportCommand {
    pub fn new(
        cfg: ImportConfig,
        http: Box<dyn HttpClient>,
        column: Option<Box<dyn ColumnWriter>>,
    ) -> ImportCommand {
        ImportCommand {
            fsm: ImportFsm::new(&cfg),
            dispatcher: Dispatcher::new(&cfg, http, column),
            summary: Summary::default(),
            cfg,
        }
    }

    /// Set up the network clients the configuration asks for.
    pub fn connect(cfg: ImportConfig) -> ImportResult<ImportCommand> {
        let http = GeminiHttpClient::new(&cfg)?;
        let column: Option<Box<dyn ColumnWriter>> = if cfg.column_write {
            Some(Box::new(ColumnWriterClient::new(&cfg)?))
        } else {
            None
        };
        Ok(ImportCommand::new(cfg, Box::new(http), column))
    }

    pub fn run(mut self) -> ImportResult<Summary> {
        let file = File::open(&self.cfg.path).map_err(|source| ImportError::Io {
            path: self.cfg.path.clone(),
            source,
        })?;
        info!(
            "import {} as {}, batch size {}",
            self.cfg.path.display(),
            self.cfg.format,
            self.cfg.batch_size
        );

        match self.cfg.format {
            Format::LineProtocol => self.read_lines(file)?,
            Format::Csv => self.read_csv(file)?,
        }

        let action = self.fsm.finish();
        self.perform(action)?;

        info!(
            "process finished, path: {}, {}",
            self.cfg.path.display(),
            self.summary
        );
        Ok(self.summary)
    }

    fn read_lines(&mut self, file: File) -> ImportResult<()> {
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                Err(e) => {
                    error!("read {} failed: {}", self.cfg.path.display(), e);
                    return Ok(());
                }
            }
            self.summary.units += 1;

            let result = match str::from_utf8(&buf) {
                Ok(line) => self.fsm.process_line(line),
                Err(e) => Err(ImportError::Read(format!("invalid utf-8: {}", e))),
            };
            self.step(result)?;
        }
    }

    fn read_csv(&mut self, file: File) -> ImportResult<()> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .from_reader(file);

        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    let stop = e.is_io_error();
                    self.summary.units += 1;
                    self.summary.rejected += 1;
                    error!("{}:{}: {}", self.cfg.path.display(), self.summary.units, e);
                    if stop {
                        return Ok(());
                    }
                    continue;
                }
            };
            self.summary.units += 1;

            let cells: Vec<&str> = row.iter().collect();
            let result = self.fsm.process_row(&cells);
            self.step(result)?;
        }
        Ok(())
    }

    /// Run the action of one unit, or log why the unit was dropped.
    fn step(&mut self, result: ImportResult<Action>) -> ImportResult<()> {
        match result {
            Ok(action) => self.perform(action),
            Err(e) if e.is_fatal() => {
                if self.fsm.pending() > 0 {
                    warn!("dropping {} buffered rows", self.fsm.pending());
                }
                Err(e)
            }
            Err(e) => {
                self.summary.rejected += 1;
                error!("{}:{}: {}", self.cfg.path.display(), self.summary.units, e);
                Ok(())
            }
        }
    }

    fn perform(&mut self, action: Action) -> ImportResult<()> {
        match action {
            Action::NoOp => Ok(()),
            Action::ExecuteSchema(command) => {
                self.summary.schema_commands += 1;
                let database = self.fsm.context().database.clone();
                match self.dispatcher.execute_schema(&command, &database) {
                    Ok(()) => info!("execute schema command success: {}", command),
                    Err(e) => error!("execute schema command {:?} failed: {}", command, e),
                }
                Ok(())
            }
            Action::Flush(flush) => {
                self.summary.batches += 1;
                let target = format!("{}.{}", flush.database, flush.retention_policy);
                let rows = flush.payload.len();
                let err = match self.dispatcher.flush(flush) {
                    Ok(()) => return Ok(()),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => e,
                };

                let (dropped, failure) = err.split_rejected();
                for e in &dropped {
                    error!("row for {} rejected: {}", target, e);
                }
                self.summary.rejected += dropped.len();
                match failure {
                    None => {}
                    Some(e) if e.is_warning() => {
                        warn!("write {} rows to {}: {}", rows, target, e);
                    }
                    Some(e) => {
                        self.summary.failed_batches += 1;
                        error!("write {} rows to {} failed: {}", rows, target, e);
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    use prost::Message;
    use tempfile::NamedTempFile;

    use crate::client::fake::{Call, FakeColumn, FakeHttp};
    use crate::client::proto::ColumnBlock;
    use crate::config::Precision;

    fn source(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn config(file: &NamedTempFile, format: Format) -> ImportConfig {
        ImportConfig {
            path: file.path().to_path_buf(),
            format,
            batch_size: 10,
            ..ImportConfig::default()
        }
    }

    fn writes(http: &FakeHttp) -> Vec<String> {
        http.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                Call::Write { body, .. } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_line_protocol_import() {
        let file = source(
            "# DDL\nCREATE DATABASE db0\n# DML\n# CONTEXT-DATABASE: db0\ncpu,host=a value=1 1\n",
        );
        let http = FakeHttp::default();
        let summary = ImportCommand::new(
            config(&file, Format::LineProtocol),
            Box::new(http.clone()),
            None,
        )
        .run()
        .unwrap();

        assert_eq!(
            *http.calls.borrow(),
            vec![
                Call::Query {
                    command: "CREATE DATABASE db0".into(),
                    database: None,
                },
                Call::Write {
                    database: "db0".into(),
                    retention_policy: "autogen".into(),
                    body: "cpu,host=a value=1 1".into(),
                    precision: Precision::Nanoseconds,
                },
            ]
        );
        assert_eq!(
            summary,
            Summary {
                units: 5,
                schema_commands: 1,
                rejected: 0,
                batches: 1,
                failed_batches: 0,
            }
        );
    }

    #[test]
    fn test_bad_lines_dont_stop_the_run() {
        let file = source(
            "# DML\r\n# CONTEXT-DATABASE: db0\r\ncpu value=1 1\r\ncpu value= 2\r\ncpu value=3 3",
        );
        let http = FakeHttp::default();
        let summary = ImportCommand::new(
            config(&file, Format::LineProtocol),
            Box::new(http.clone()),
            None,
        )
        .run()
        .unwrap();

        assert_eq!(writes(&http), vec!["cpu value=1 1\ncpu value=3 3"]);
        assert_eq!(summary.units, 5);
        assert_eq!(summary.rejected, 1);
    }

    #[test]
    fn test_failed_batches_are_counted() {
        let file = source("# DML\n# CONTEXT-DATABASE: db0\ncpu value=1 1\ncpu value=2 2\ncpu value=3 3\n");
        let http = FakeHttp {
            fail_writes: true,
            ..FakeHttp::default()
        };
        let mut cfg = config(&file, Format::LineProtocol);
        cfg.batch_size = 2;
        let summary = ImportCommand::new(cfg, Box::new(http.clone()), None)
            .run()
            .unwrap();

        assert_eq!(writes(&http).len(), 2);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.failed_batches, 2);
    }

    #[test]
    fn test_csv_column_write() {
        let file = source("time,host,value\n# skipped\n100,serverA,42\n200,serverB,43\n");
        let mut cfg = config(&file, Format::Csv);
        cfg.column_write = true;
        cfg.database = "db0".into();
        cfg.measurement = "m0".into();
        cfg.tags = vec!["host".into()];
        cfg.fields = vec!["value".into()];

        let column = FakeColumn {
            code: 1,
            ..FakeColumn::default()
        };
        let summary = ImportCommand::new(
            cfg,
            Box::new(FakeHttp::default()),
            Some(Box::new(column.clone())),
        )
        .run()
        .unwrap();

        let requests = column.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].records[0].measurement, "m0");
        let block = ColumnBlock::decode(requests[0].records[0].block.as_slice()).unwrap();
        assert_eq!(block.row_count, 2);
        assert_eq!(block.columns[2].integer_values, vec![100, 200]);
        // a partial write is only a warning
        assert_eq!(summary.failed_batches, 0);
        assert_eq!(summary.units, 3);
    }

    fn csv_column_run(code: i32) -> (ImportResult<Summary>, usize) {
        let file = source("time,host,value\n1,a,1\n2,b,2\n3,c,3\n4,d,4\n");
        let mut cfg = config(&file, Format::Csv);
        cfg.column_write = true;
        cfg.batch_size = 2;
        cfg.database = "db0".into();
        cfg.measurement = "m0".into();
        cfg.tags = vec!["host".into()];
        cfg.fields = vec!["value".into()];

        let column = FakeColumn {
            code,
            ..FakeColumn::default()
        };
        let result = ImportCommand::new(
            cfg,
            Box::new(FakeHttp::default()),
            Some(Box::new(column.clone())),
        )
        .run();
        let sent = column.requests.borrow().len();
        (result, sent)
    }

    #[test]
    fn test_partial_writes_keep_the_run_going() {
        let (result, sent) = csv_column_run(1);
        let summary = result.unwrap();
        assert_eq!(sent, 2);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.failed_batches, 0);
        assert_eq!(summary.units, 5);
    }

    #[test]
    fn test_failed_and_unknown_codes_keep_the_run_going() {
        for code in &[2, 7] {
            let (result, sent) = csv_column_run(*code);
            let summary = result.unwrap();
            assert_eq!(sent, 2, "code {}", code);
            assert_eq!(summary.failed_batches, 2, "code {}", code);
            assert_eq!(summary.rejected, 0, "code {}", code);
        }
    }

    #[test]
    fn test_schema_conflicts_count_rows() {
        let file = source(
            "# DML\n# CONTEXT-DATABASE: db0\ncpu value=1 1\ncpu value=2 2\ncpu value=true 3\ncpu value=4 4\n",
        );
        let mut cfg = config(&file, Format::LineProtocol);
        cfg.column_write = true;
        cfg.batch_size = 2;

        let column = FakeColumn::default();
        let summary = ImportCommand::new(
            cfg,
            Box::new(FakeHttp::default()),
            Some(Box::new(column.clone())),
        )
        .run()
        .unwrap();

        let requests = column.requests.borrow();
        assert_eq!(requests.len(), 2);
        let block = ColumnBlock::decode(requests[1].records[0].block.as_slice()).unwrap();
        assert_eq!(block.row_count, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.failed_batches, 0);
    }

    #[test]
    fn test_csv_missing_tag_aborts() {
        let file = source("time,host,value\n100,serverA,42\n");
        let mut cfg = config(&file, Format::Csv);
        cfg.database = "db0".into();
        cfg.measurement = "m0".into();
        cfg.tags = vec!["region".into()];

        let http = FakeHttp::default();
        let err = ImportCommand::new(cfg, Box::new(http.clone()), None)
            .run()
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("region"));
        assert!(http.calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_source() {
        let cfg = ImportConfig {
            path: PathBuf::from("/nonexistent/x-gemini/data.txt"),
            ..ImportConfig::default()
        };
        match ImportCommand::new(cfg, Box::new(FakeHttp::default()), None).run() {
            Err(e @ ImportError::Io { .. }) => assert!(e.is_fatal()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_source_flushes_nothing() {
        let file = source("");
        let http = FakeHttp::default();
        let summary = ImportCommand::new(
            config(&file, Format::LineProtocol),
            Box::new(http.clone()),
            None,
        )
        .run()
        .unwrap();
        assert!(http.calls.borrow().is_empty());
        assert_eq!(summary, Summary::default());
    }
}
