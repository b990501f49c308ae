//! A csv import. The first row names the columns,
//! every following row is one point.

use super::*;

use log::info;

use crate::error::{ImportError, ImportResult};

impl ImportFsm {
    /// Map one csv row.
    pub fn process_row(&mut self, row: &[&str]) -> ImportResult<Action> {
        if row.is_empty() {
            return Ok(Action::NoOp);
        }

        match self.state {
            State::Schema => {
                self.state = State::Data;
                self.resolve_header(row)?;
                Ok(Action::NoOp)
            }
            State::Data => {
                if self.context.database.is_empty() {
                    return Err(ImportError::MissingDatabase);
                }
                let positions = self.context.positions.as_ref().ok_or_else(|| {
                    ImportError::Configuration("csv header is not resolved".into())
                })?;
                let record = positions.record(row, &self.context.measurement, self.precision)?;
                Ok(self.push_record(record))
            }
        }
    }

    fn resolve_header(&mut self, header: &[&str]) -> ImportResult<()> {
        if self.context.database.is_empty() {
            return Err(ImportError::Configuration(
                "--database is required for csv import".into(),
            ));
        }
        if self.context.measurement.is_empty() {
            return Err(ImportError::Configuration(
                "--measurement is required for csv import".into(),
            ));
        }

        let positions = self.layout.apply(header)?;
        info!(
            "parse header success, tags: {:?}, fields: {:?}, time: {}",
            positions.tags, positions.fields, positions.time
        );
        self.context.positions = Some(positions);
        Ok(())
    }
}
