//! Http client for line protocol writes and control statements.

use std::fs;
use std::path::Path;

use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Certificate, Identity};

use super::HttpClient;
use crate::config::{ImportConfig, Precision};
use crate::error::{ImportError, ImportResult};

/// Decoded answer of `/query`.
#[derive(Debug, Default, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub results: Vec<StatementResult>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatementResult {
    #[serde(default)]
    pub statement_id: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl QueryResult {
    /// Turn every reported error into a `Query` error.
    pub fn check(&self) -> ImportResult<()> {
        let mut errs = Vec::new();
        if let Some(ref e) = self.error {
            errs.push(ImportError::Query(e.clone()));
        }
        for statement in &self.results {
            if let Some(ref e) = statement.error {
                errs.push(ImportError::Query(format!(
                    "statement {}: {}",
                    statement.statement_id, e
                )));
            }
        }
        ImportError::join(errs)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct GeminiHttpClient {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl GeminiHttpClient {
    pub fn new(cfg: &ImportConfig) -> ImportResult<GeminiHttpClient> {
        let mut builder = Client::builder().timeout(cfg.timeout);

        if cfg.tls.enabled {
            if let Some(ref ca_cert) = cfg.tls.ca_cert {
                builder = builder.add_root_certificate(Certificate::from_pem(&read_pem(ca_cert)?)?);
            }
            if let (Some(cert), Some(key)) = (&cfg.tls.cert, &cfg.tls.cert_key) {
                let identity = Identity::from_pkcs8_pem(&read_pem(cert)?, &read_pem(key)?)?;
                builder = builder.identity(identity);
            }
            builder = builder
                .danger_accept_invalid_certs(cfg.tls.insecure)
                .danger_accept_invalid_hostnames(cfg.tls.insecure_hostname);
        }

        let credentials = match (&cfg.username, &cfg.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };

        Ok(GeminiHttpClient {
            client: builder.build()?,
            base_url: cfg.http_url(),
            credentials,
        })
    }

    fn post(&self, endpoint: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}/{}", self.base_url, endpoint));
        match self.credentials {
            Some((ref user, ref pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }
}

impl HttpClient for GeminiHttpClient {
    fn write(
        &self,
        database: &str,
        retention_policy: &str,
        lines: &str,
        precision: Precision,
    ) -> ImportResult<()> {
        debug!("write {} bytes to {}.{}", lines.len(), database, retention_policy);
        let response = self
            .post("write")
            .query(&[
                ("db", database),
                ("rp", retention_policy),
                ("precision", precision.as_str()),
            ])
            .body(lines.to_owned())
            .send()?;
        check_status(response).map(|_| ())
    }

    fn query(&self, command: &str, database: Option<&str>) -> ImportResult<QueryResult> {
        let mut params = vec![("q", command)];
        if let Some(db) = database {
            params.push(("db", db));
        }
        let response = check_status(self.post("query").form(&params).send()?)?;
        let result: QueryResult = response.json()?;
        result.check()?;
        Ok(result)
    }
}

fn check_status(response: Response) -> ImportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.trim().to_owned(),
    };
    Err(ImportError::Server {
        status: status.as_u16(),
        message,
    })
}

fn read_pem(path: &Path) -> ImportResult<Vec<u8>> {
    fs::read(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
