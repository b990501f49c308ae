//! Line protocol files.
//!
//! ```text
//! # DDL
//! CREATE DATABASE db0
//! # DML
//! # CONTEXT-DATABASE: db0
//! # CONTEXT-RETENTION-POLICY: autogen
//! cpu,host=a value=1 1
//! ```

use super::*;

use crate::error::{ImportError, ImportResult};
use crate::line_protocol;

impl ImportFsm {
    /// Map one line of a line protocol file.
    pub fn process_line(&mut self, data: &str) -> ImportResult<Action> {
        let data = data.trim_end_matches(|c| c == '\n' || c == '\r');

        if data.starts_with(TOKEN_DDL) {
            // rows read so far must land before the schema changes
            let action = self.flush_pending();
            self.state = State::Schema;
            return Ok(action);
        }
        if data.starts_with(TOKEN_DML) {
            self.state = State::Data;
            let default = self.default_retention_policy.clone();
            return Ok(self.switch_retention_policy(&default));
        }

        match self.state {
            State::Schema => {
                let command = data.trim();
                if command.is_empty() {
                    Ok(Action::NoOp)
                } else {
                    Ok(Action::ExecuteSchema(command.to_owned()))
                }
            }
            State::Data => self.process_data_line(data),
        }
    }

    fn process_data_line(&mut self, data: &str) -> ImportResult<Action> {
        if let Some(database) = directive(data, TOKEN_DATABASE)? {
            return Ok(self.switch_database(database));
        }
        if let Some(retention_policy) = directive(data, TOKEN_RETENTION_POLICY)? {
            return Ok(self.switch_retention_policy(retention_policy));
        }

        let data = data.trim();
        if data.is_empty() || data.starts_with('#') {
            return Ok(Action::NoOp);
        }
        if self.context.database.is_empty() {
            return Err(ImportError::MissingDatabase);
        }

        // malformed lines never reach a batch
        let record = line_protocol::parse_line(data)?;
        if self.column_write {
            Ok(self.push_point(record))
        } else {
            Ok(self.push_line(data.to_owned()))
        }
    }
}

/// Value of a `# CONTEXT-...:` line, split at the first colon.
fn directive<'a>(data: &'a str, token: &str) -> ImportResult<Option<&'a str>> {
    if !data.starts_with(token) {
        return Ok(None);
    }
    let value = data
        .split_once(':')
        .map(|(_, value)| value.trim())
        .unwrap_or("");
    if value.is_empty() {
        return Err(ImportError::Parse(format!("empty value for {}", token)));
    }
    Ok(Some(value))
}
