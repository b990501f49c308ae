//! In-memory transports recording what they were asked to do.

use std::cell::RefCell;
use std::rc::Rc;

use super::{ColumnWriter, HttpClient, QueryResult, WriteRequest, WriteResponse};
use crate::config::Precision;
use crate::error::{ImportError, ImportResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Write {
        database: String,
        retention_policy: String,
        body: String,
        precision: Precision,
    },
    Query {
        command: String,
        database: Option<String>,
    },
}

#[derive(Clone, Default)]
pub struct FakeHttp {
    pub calls: Rc<RefCell<Vec<Call>>>,
    pub fail_writes: bool,
}

impl HttpClient for FakeHttp {
    fn write(
        &self,
        database: &str,
        retention_policy: &str,
        lines: &str,
        precision: Precision,
    ) -> ImportResult<()> {
        self.calls.borrow_mut().push(Call::Write {
            database: database.to_owned(),
            retention_policy: retention_policy.to_owned(),
            body: lines.to_owned(),
            precision,
        });
        if self.fail_writes {
            return Err(ImportError::Server {
                status: 500,
                message: "engine is closed".into(),
            });
        }
        Ok(())
    }

    fn query(&self, command: &str, database: Option<&str>) -> ImportResult<QueryResult> {
        self.calls.borrow_mut().push(Call::Query {
            command: command.to_owned(),
            database: database.map(str::to_owned),
        });
        Ok(QueryResult::default())
    }
}

#[derive(Clone, Default)]
pub struct FakeColumn {
    pub requests: Rc<RefCell<Vec<WriteRequest>>>,
    pub code: i32,
}

impl ColumnWriter for FakeColumn {
    fn write(&mut self, request: WriteRequest) -> ImportResult<WriteResponse> {
        self.requests.borrow_mut().push(request);
        Ok(WriteResponse { code: self.code })
    }
}
