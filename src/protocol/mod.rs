//! HTTP/JSON client for the controller's local query endpoints.
//!
//! IDs are opaque strings here; the caller says which endpoint they belong to
//! through [`Mode`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use jiff::Timestamp;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

pub mod error;
pub mod request;
pub mod response;

pub use error::ProtocolError;
pub use request::{RequestDescriptor, Verb, build_request, format_value};
pub use response::{CachedValue, WriteAck};

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_USERNAME: &str = "JSON";
pub const DEFAULT_PASSWORD: &str = "SBTAdmin!";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// `/JSON.HTML` with `ID=`, batchable
    Direct,
    /// `/jsongen.html` with `OA=`, one id per request
    Generic,
}

impl Mode {
    pub fn param(self) -> &'static str {
        match self {
            Mode::Direct => "ID",
            Mode::Generic => "OA",
        }
    }

    /// Endpoint paths in the order they are tried.
    pub fn paths(self) -> &'static [&'static str] {
        match self {
            Mode::Direct => &["/JSON.HTML"],
            Mode::Generic => &["/jsongen.html", "/JSONgen.html"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub pin: Option<String>,
    pub timeout: Duration,
}

impl Connection {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            pin: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn pin(&self) -> Option<&str> {
        self.pin.as_deref().filter(|p| !p.is_empty())
    }
}

/// What the poller needs from a controller.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn read(&self, mode: Mode, ids: &[&str]) -> Result<HashMap<String, CachedValue>, ProtocolError>;

    async fn write(&self, mode: Mode, id: &str, value: f64) -> Result<WriteAck, ProtocolError>;
}

#[async_trait]
impl<T: Controller + ?Sized> Controller for Arc<T> {
    async fn read(&self, mode: Mode, ids: &[&str]) -> Result<HashMap<String, CachedValue>, ProtocolError> {
        (**self).read(mode, ids).await
    }

    async fn write(&self, mode: Mode, id: &str, value: f64) -> Result<WriteAck, ProtocolError> {
        (**self).write(mode, id, value).await
    }
}

pub struct ProtocolClient {
    conn: Connection,
    http: Client,
}

impl ProtocolClient {
    pub fn new(conn: Connection) -> Result<Self, ProtocolError> {
        let http = Client::builder().timeout(conn.timeout).build()?;
        Ok(Self { conn, http })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn send(&self, mut req: RequestDescriptor) -> Result<Value, ProtocolError> {
        loop {
            let url = req.url()?;
            debug!("GET {url}");

            let res = self
                .http
                .get(url)
                .basic_auth(&self.conn.username, Some(&self.conn.password))
                .send()
                .await?;

            let status = res.status();
            if status == StatusCode::NOT_FOUND {
                if let Some(alt) = req.alternate() {
                    debug!("{} not found, trying {}", req.path, alt.path);
                    req = alt;
                    continue;
                }
            }
            if !status.is_success() {
                return Err(ProtocolError::Status(status.as_u16()));
            }

            let bytes = res.bytes().await?;
            return response::parse_json(&bytes);
        }
    }

    pub async fn read(&self, mode: Mode, ids: &[&str]) -> Result<HashMap<String, CachedValue>, ProtocolError> {
        if ids.is_empty() {
            return Err(ProtocolError::NoIds);
        }

        match mode {
            Mode::Direct => {
                let req = build_request(mode, &self.conn, Verb::Read, ids)?;
                let body = self.send(req).await?;
                response::parse_values(&body, ids, Timestamp::now())
            }
            Mode::Generic => {
                let mut out = HashMap::with_capacity(ids.len());
                for id in ids {
                    let req = build_request(mode, &self.conn, Verb::Read, &[*id])?;
                    let body = self.send(req).await?;
                    out.extend(response::parse_values(&body, &[*id], Timestamp::now())?);
                }
                Ok(out)
            }
        }
    }

    pub async fn write(&self, mode: Mode, id: &str, value: f64) -> Result<WriteAck, ProtocolError> {
        let payload = format!("{id};{}", format_value(value));
        let req = build_request(mode, &self.conn, Verb::Write, &[payload.as_str()])?;
        let body = self.send(req).await?;
        Ok(WriteAck { body })
    }
}

#[async_trait]
impl Controller for ProtocolClient {
    async fn read(&self, mode: Mode, ids: &[&str]) -> Result<HashMap<String, CachedValue>, ProtocolError> {
        ProtocolClient::read(self, mode, ids).await
    }

    async fn write(&self, mode: Mode, id: &str, value: f64) -> Result<WriteAck, ProtocolError> {
        ProtocolClient::write(self, mode, id, value).await
    }
}
