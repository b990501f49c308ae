//! Import configuration, fixed once the run starts.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{ImportError, ImportResult};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_HTTP_PORT: u16 = 8086;
pub const DEFAULT_COLUMN_WRITE_PORT: u16 = 8035;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_RETENTION_POLICY: &str = "autogen";
pub const DEFAULT_TIME_FIELD: &str = "time";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Layout of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    LineProtocol,
    Csv,
}

impl FromStr for Format {
    type Err = ImportError;

    fn from_str(s: &str) -> ImportResult<Format> {
        match s {
            "" | "line_protocol" => Ok(Format::LineProtocol),
            "csv" => Ok(Format::Csv),
            other => Err(ImportError::Format(other.to_owned())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Format::LineProtocol => f.write_str("line_protocol"),
            Format::Csv => f.write_str("csv"),
        }
    }
}

/// Unit of the integer timestamps found in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl Precision {
    /// Value of the `precision` query parameter of the write endpoint.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "u",
            Precision::Milliseconds => "ms",
            Precision::Seconds => "s",
            Precision::Minutes => "m",
            Precision::Hours => "h",
        }
    }

    fn nanos_per_unit(&self) -> i64 {
        match *self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
            Precision::Minutes => 60 * 1_000_000_000,
            Precision::Hours => 3600 * 1_000_000_000,
        }
    }

    /// Scale a timestamp in this unit to nanoseconds, `None` on overflow.
    pub fn to_nanos(&self, ts: i64) -> Option<i64> {
        ts.checked_mul(self.nanos_per_unit())
    }

    /// Express a point in time in this unit, truncating.
    pub fn from_datetime(&self, time: &DateTime<Utc>) -> Option<i64> {
        match *self {
            Precision::Nanoseconds => time.timestamp_nanos_opt(),
            Precision::Microseconds => Some(time.timestamp_micros()),
            Precision::Milliseconds => Some(time.timestamp_millis()),
            _ => Some(time.timestamp().div_euclid(self.nanos_per_unit() / 1_000_000_000)),
        }
    }
}

impl FromStr for Precision {
    type Err = ImportError;

    fn from_str(s: &str) -> ImportResult<Precision> {
        match s.to_lowercase().as_str() {
            "" | "n" | "ns" => Ok(Precision::Nanoseconds),
            "u" | "us" => Ok(Precision::Microseconds),
            "ms" => Ok(Precision::Milliseconds),
            "s" => Ok(Precision::Seconds),
            "m" => Ok(Precision::Minutes),
            "h" => Ok(Precision::Hours),
            other => Err(ImportError::Configuration(format!(
                "unknown precision {:?}, precision must be h, m, s, ms, u or ns",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    pub enabled: bool,
    /// Skip certificate verification.
    pub insecure: bool,
    /// Verify the chain but not the host name.
    pub insecure_hostname: bool,
    pub ca_cert: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub cert_key: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: TlsOptions,

    pub path: PathBuf,
    pub format: Format,
    /// Use the structured column write path instead of line protocol over http.
    pub column_write: bool,
    pub column_write_port: u16,
    pub batch_size: usize,

    pub database: String,
    pub retention_policy: String,
    pub measurement: String,
    pub tags: Vec<String>,
    /// Empty means every remaining csv column is a field.
    pub fields: Vec<String>,
    pub time_field: String,
    /// strftime layout for non numeric csv time values.
    pub time_format: Option<String>,
    pub precision: Precision,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            host: String::from(DEFAULT_HOST),
            port: DEFAULT_HTTP_PORT,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            username: None,
            password: None,
            tls: TlsOptions::default(),
            path: PathBuf::new(),
            format: Format::LineProtocol,
            column_write: false,
            column_write_port: DEFAULT_COLUMN_WRITE_PORT,
            batch_size: DEFAULT_BATCH_SIZE,
            database: String::new(),
            retention_policy: String::from(DEFAULT_RETENTION_POLICY),
            measurement: String::new(),
            tags: Vec::new(),
            fields: Vec::new(),
            time_field: String::from(DEFAULT_TIME_FIELD),
            time_format: None,
            precision: Precision::Nanoseconds,
        }
    }
}

impl ImportConfig {
    /// Check the rules which don't need the source file.
    pub fn validate(&self) -> ImportResult<()> {
        if self.batch_size == 0 {
            return Err(ImportError::Configuration(
                "--batch-size must be greater than 0".into(),
            ));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ImportError::Configuration(
                "--username and --password must be set together".into(),
            ));
        }
        if self.tls.cert.is_some() != self.tls.cert_key.is_some() {
            return Err(ImportError::Configuration(
                "--cert and --cert-key must be set together".into(),
            ));
        }
        if self.path.as_os_str().is_empty() {
            return Err(ImportError::Configuration("--path is required".into()));
        }
        Ok(())
    }

    /// Base url of the http endpoint.
    pub fn http_url(&self) -> String {
        let scheme = if self.tls.enabled { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Address of the column write service.
    pub fn column_write_url(&self) -> String {
        let scheme = if self.tls.enabled { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.column_write_port)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_from_str() {
        assert_eq!("csv".parse::<Format>().unwrap(), Format::Csv);
        assert_eq!("line_protocol".parse::<Format>().unwrap(), Format::LineProtocol);
        assert_eq!("".parse::<Format>().unwrap(), Format::LineProtocol);
        match "jsonp".parse::<Format>() {
            Err(ImportError::Format(f)) => assert_eq!(f, "jsonp"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_precision_from_str() {
        assert_eq!("ns".parse::<Precision>().unwrap(), Precision::Nanoseconds);
        assert_eq!("US".parse::<Precision>().unwrap(), Precision::Microseconds);
        assert_eq!("s".parse::<Precision>().unwrap(), Precision::Seconds);
        assert!("rfc3339".parse::<Precision>().unwrap_err().is_fatal());
    }

    #[test]
    fn test_precision_scaling() {
        assert_eq!(Precision::Seconds.to_nanos(2), Some(2_000_000_000));
        assert_eq!(Precision::Milliseconds.to_nanos(5), Some(5_000_000));
        assert_eq!(Precision::Hours.to_nanos(i64::MAX), None);

        let time = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 30).unwrap();
        assert_eq!(Precision::Seconds.from_datetime(&time), Some(1_704_070_830));
        assert_eq!(Precision::Minutes.from_datetime(&time), Some(1_704_070_830 / 60));
        assert_eq!(
            Precision::Milliseconds.from_datetime(&time),
            Some(1_704_070_830_000)
        );
    }

    #[test]
    fn test_validate() {
        let mut cfg = ImportConfig {
            path: PathBuf::from("data.txt"),
            ..ImportConfig::default()
        };
        assert!(cfg.validate().is_ok());

        cfg.username = Some("root".into());
        assert!(cfg.validate().is_err());
        cfg.password = Some("secret".into());
        assert!(cfg.validate().is_ok());

        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_urls() {
        let mut cfg = ImportConfig::default();
        assert_eq!(cfg.http_url(), "http://localhost:8086");
        cfg.tls.enabled = true;
        assert_eq!(cfg.column_write_url(), "https://localhost:8035");
    }
}
