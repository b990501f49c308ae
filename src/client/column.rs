//! Client of the column write rpc service.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::runtime::{Builder, Runtime};
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint, Identity};
use tonic::{Code, Request, Response, Status};

use super::proto::{WriteRequest, WriteResponse, WRITE_METHOD};
use super::ColumnWriter;
use crate::config::ImportConfig;
use crate::error::{ImportError, ImportResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(3);
const WINDOW_SIZE: u32 = 16 << 20;
const MAX_MESSAGE_SIZE: usize = 64 << 20;

/// Exponential reconnect delay with jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    multiplier: f64,
    jitter: f64,
    max: Duration,
    attempts: i32,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            base: Duration::from_secs(1),
            multiplier: 1.6,
            jitter: 0.2,
            max: Duration::from_secs(30),
            attempts: 0,
        }
    }
}

impl Backoff {
    /// Delay before the next attempt. Grows until it hits the cap, the
    /// jitter spreads it by up to 20% either way.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.base.as_secs_f64() * self.multiplier.powi(self.attempts);
        let delay = delay.min(self.max.as_secs_f64());
        let spread = 1.0 + self.jitter * (fastrand::f64() * 2.0 - 1.0);
        self.attempts = self.attempts.saturating_add(1);
        Duration::from_secs_f64(delay * spread)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Blocking front of a lazily connected rpc channel.
pub struct ColumnWriterClient {
    runtime: Runtime,
    endpoint: Endpoint,
    channel: Option<Channel>,
    backoff: Backoff,
    retry_at: Option<Instant>,
}

impl ColumnWriterClient {
    /// Prepare the channel settings. Nothing is dialed before the first write.
    pub fn new(cfg: &ImportConfig) -> ImportResult<ColumnWriterClient> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ImportError::Configuration(format!("can't start rpc runtime: {}", e)))?;

        let mut endpoint = Endpoint::from_shared(cfg.column_write_url())?
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(cfg.timeout)
            .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
            .keep_alive_timeout(KEEP_ALIVE_TIMEOUT)
            .keep_alive_while_idle(true)
            .initial_stream_window_size(WINDOW_SIZE)
            .initial_connection_window_size(WINDOW_SIZE);

        if cfg.tls.enabled {
            endpoint = endpoint.tls_config(tls_config(cfg)?)?;
        }

        Ok(ColumnWriterClient {
            runtime,
            endpoint,
            channel: None,
            backoff: Backoff::default(),
            retry_at: None,
        })
    }

    fn channel(&mut self) -> ImportResult<Channel> {
        if let Some(ref channel) = self.channel {
            return Ok(channel.clone());
        }

        let now = Instant::now();
        if let Some(retry_at) = self.retry_at {
            if now < retry_at {
                return Err(ImportError::Transport(format!(
                    "column write service unreachable, next reconnect in {:?}",
                    retry_at - now
                )));
            }
        }

        debug!("connecting to column write service {}", self.endpoint.uri());
        match self.runtime.block_on(self.endpoint.connect()) {
            Ok(channel) => {
                self.backoff.reset();
                self.retry_at = None;
                self.channel = Some(channel.clone());
                Ok(channel)
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                self.retry_at = Some(Instant::now() + delay);
                warn!(
                    "connect to {} failed, retry in {:?}",
                    self.endpoint.uri(),
                    delay
                );
                Err(e.into())
            }
        }
    }
}

impl ColumnWriter for ColumnWriterClient {
    fn write(&mut self, request: WriteRequest) -> ImportResult<WriteResponse> {
        let channel = self.channel()?;
        match self.runtime.block_on(unary_write(channel, request)) {
            Ok(response) => Ok(response),
            Err(status) => {
                if status.code() == Code::Unavailable {
                    self.channel = None;
                }
                Err(status.into())
            }
        }
    }
}

async fn unary_write(channel: Channel, request: WriteRequest) -> Result<WriteResponse, Status> {
    let mut grpc = Grpc::new(channel)
        .max_encoding_message_size(MAX_MESSAGE_SIZE)
        .max_decoding_message_size(MAX_MESSAGE_SIZE);
    grpc.ready()
        .await
        .map_err(|e| Status::unavailable(format!("service was not ready: {}", e)))?;

    let codec: ProstCodec<WriteRequest, WriteResponse> = ProstCodec::default();
    grpc.unary(
        Request::new(request),
        PathAndQuery::from_static(WRITE_METHOD),
        codec,
    )
    .await
    .map(Response::into_inner)
}

fn tls_config(cfg: &ImportConfig) -> ImportResult<ClientTlsConfig> {
    if cfg.tls.insecure || cfg.tls.insecure_hostname {
        warn!("insecure tls switches are ignored by the column write client");
    }
    let ca_cert = cfg.tls.ca_cert.as_ref().ok_or_else(|| {
        ImportError::Configuration("--cacert is required for column write over tls".into())
    })?;

    let mut tls = ClientTlsConfig::new()
        .domain_name(cfg.host.clone())
        .ca_certificate(Certificate::from_pem(read_pem(ca_cert)?));
    if let (Some(cert), Some(key)) = (&cfg.tls.cert, &cfg.tls.cert_key) {
        tls = tls.identity(Identity::from_pem(read_pem(cert)?, read_pem(key)?));
    }
    Ok(tls)
}

fn read_pem(path: &Path) -> ImportResult<Vec<u8>> {
    fs::read(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_backoff_grows_to_cap() {
        let mut backoff = Backoff::default();
        let first = backoff.next_delay().as_secs_f64();
        assert!((0.8..=1.2).contains(&first), "first delay {}", first);
        let second = backoff.next_delay().as_secs_f64();
        assert!((1.28..=1.92).contains(&second), "second delay {}", second);

        for _ in 0..20 {
            backoff.next_delay();
        }
        let capped = backoff.next_delay().as_secs_f64();
        assert!((24.0..=36.0).contains(&capped), "capped delay {}", capped);

        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_millis(1200));
    }

    #[test]
    fn test_unreachable_service_fails_fast() {
        let cfg = ImportConfig {
            host: "127.0.0.1".into(),
            column_write_port: 1,
            ..ImportConfig::default()
        };
        let mut client = ColumnWriterClient::new(&cfg).unwrap();

        match client.write(WriteRequest::default()) {
            Err(ImportError::Transport(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match client.write(WriteRequest::default()) {
            Err(ImportError::Transport(msg)) => assert!(msg.contains("next reconnect")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_tls_needs_ca_file() {
        let mut cfg = ImportConfig::default();
        cfg.tls.enabled = true;
        match ColumnWriterClient::new(&cfg) {
            Err(e) => assert!(e.is_fatal()),
            Ok(_) => panic!("tls without a ca file accepted"),
        }
    }
}
