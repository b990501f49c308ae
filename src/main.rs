//    x-gemini is a simple cli tool to import data into openGemini.
//    Copyright (C) 2018  Henrik Jürges
//
//    This program is free software: you can redistribute it and/or modify
//    it under the terms of the GNU General Public License as published by
//    the Free Software Foundation, either version 3 of the License, or
//    (at your option) any later version.
//
//    This program is distributed in the hope that it will be useful,
//    but WITHOUT ANY WARRANTY; without even the implied warranty of
//    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//    GNU General Public License for more details.
//
//    You should have received a copy of the GNU General Public License
//    along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! x-gemini
//!
//! This program feeds openGemini with line protocol
//! or csv files.
//!
//! License is GPL
//! See `USAGE` for arguments.
#[macro_use]
extern crate serde_derive;

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use docopt::Docopt;
use log::{debug, error};

mod batch;
mod client;
mod config;
mod dispatch;
mod error;
mod import;
mod line_protocol;
mod mapper;
mod mapping;
mod point;

use config::{ImportConfig, TlsOptions};
use error::{init_logger, ImportResult};
use import::ImportCommand;

const VERSION: &str = "
Version 0.1 of x-gemini.
This is a simple cli tool to import data into openGemini.

x-gemini  Copyright (C) 2018  Henrik Jürges
This program comes with ABSOLUTELY NO WARRANTY;
This is free software, and you are welcome to redistribute it
under certain conditions; see LICENSE file for details.
";

/// Program Flags and Options
const USAGE: &str = "
Usage:
  x-gemini import [options]
  x-gemini version
  x-gemini (-h | --help | -V | --version)

Options:
  -h, --help                  Print this help message.
  -v, --verbose               Enable verbose logging.
  -V, --version               Shows version and license information.
  -H, --host HOST             The openGemini host [default: localhost].
  -p, --port PORT             Http port [default: 8086].
  --timeout MS                Request timeout in milliseconds [default: 10000].
  -u, --username USER         Username [default: ].
  -P, --password PASS         Password [default: ].
  -s, --ssl                   Use https and tls.
  -i, --insecure-tls          Skip certificate verification.
  -I, --insecure-hostname     Skip host name verification.
  -c, --cacert FILE           Extra CA certificate in PEM [default: ].
  -C, --cert FILE             Client certificate in PEM [default: ].
  -k, --cert-key FILE         Client certificate key in PEM [default: ].

  -w, --column-write          Write through the column write service.
  -W, --column-write-port P   Port of the column write service [default: 8035].
  -b, --batch-size NUM        Points per write request [default: 1000].
  -T, --path FILE             The file to import [default: ].
  -f, --format FMT            line_protocol or csv [default: line_protocol].
  -d, --database DB           Target database [default: ].
  -r, --retention-policy RP   Target retention policy [default: autogen].
  -U, --precision UNIT        Timestamp unit, h, m, s, ms, u or ns [default: ns].

  -m, --measurement NAME      Measurement of csv rows [default: ].
  --tags LIST                 Comma seperated list of csv tag columns [default: ].
  --fields LIST               Comma seperated list of csv field columns,
                              every other column if empty [default: ].
  -t, --time NAME             Name of the csv time column [default: time].
  --time-format FMT           Layout of non numeric csv times [default: ].
                              See https://docs.rs/chrono/0.4/chrono/format/strftime/index.html
";

#[derive(Debug, Deserialize)]
struct Args {
    cmd_import: bool,
    cmd_version: bool,
    flag_verbose: bool,
    flag_version: bool,
    flag_host: String,
    flag_port: u16,
    flag_timeout: u64,
    flag_username: String,
    flag_password: String,
    flag_ssl: bool,
    flag_insecure_tls: bool,
    flag_insecure_hostname: bool,
    flag_cacert: String,
    flag_cert: String,
    flag_cert_key: String,
    flag_column_write: bool,
    flag_column_write_port: u16,
    flag_batch_size: usize,
    flag_path: String,
    flag_format: String,
    flag_database: String,
    flag_retention_policy: String,
    flag_precision: String,
    flag_measurement: String,
    flag_tags: String,
    flag_fields: String,
    flag_time: String,
    flag_time_format: String,
}

/// Empty strings stand for an unset option.
fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| e.to_owned())
        .collect()
}

impl Args {
    fn to_config(&self) -> ImportResult<ImportConfig> {
        Ok(ImportConfig {
            host: self.flag_host.clone(),
            port: self.flag_port,
            timeout: Duration::from_millis(self.flag_timeout),
            username: optional(&self.flag_username),
            password: optional(&self.flag_password),
            tls: TlsOptions {
                enabled: self.flag_ssl,
                insecure: self.flag_insecure_tls,
                insecure_hostname: self.flag_insecure_hostname,
                ca_cert: optional(&self.flag_cacert).map(PathBuf::from),
                cert: optional(&self.flag_cert).map(PathBuf::from),
                cert_key: optional(&self.flag_cert_key).map(PathBuf::from),
            },
            path: PathBuf::from(&self.flag_path),
            format: self.flag_format.parse()?,
            column_write: self.flag_column_write,
            column_write_port: self.flag_column_write_port,
            batch_size: self.flag_batch_size,
            database: self.flag_database.clone(),
            retention_policy: self.flag_retention_policy.clone(),
            measurement: self.flag_measurement.clone(),
            tags: list(&self.flag_tags),
            fields: list(&self.flag_fields),
            time_field: self.flag_time.clone(),
            time_format: optional(&self.flag_time_format),
            precision: self.flag_precision.parse()?,
        })
    }
}

fn import(args: &Args) -> ImportResult<()> {
    let cfg = args.to_config()?;
    cfg.validate()?;
    debug!(
        "import {} into {}, column write: {}",
        cfg.path.display(),
        cfg.http_url(),
        cfg.column_write
    );
    ImportCommand::connect(cfg)?.run().map(|_| ())
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if args.flag_version || args.cmd_version {
        println!("{}", VERSION);
        return;
    }

    init_logger(args.flag_verbose);

    if args.cmd_import {
        if let Err(e) = import(&args) {
            error!("Import failed {}", e);
            process::exit(1);
        }
    }
}
