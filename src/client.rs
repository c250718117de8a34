//! HTTP client for the supervisor API, used by the CLI subcommands and the
//! TUI. Wraps the caching contract: every fetch returns the resource ETag,
//! and the `poll_*` variants hold a long poll open server-side until the
//! resource moves past that ETag or the timeout lapses.

use crate::api::{ApiError, ManagerSummary, OkReply, POLL_ETAG_HEADER, POLL_TIME_HEADER};
use crate::error::{Error, Result};
use crate::log::LogRecord;
use crate::service::ServiceInfo;
use reqwest::{header, Certificate, StatusCode};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// Connection settings for [`Client::connect`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. `http://127.0.0.1:8641`.
    pub addr: String,
    pub user: Option<String>,
    pub pass: Option<String>,
    /// Extra PEM root certificate file.
    pub cacert: Option<PathBuf>,
    /// Directory of PEM root certificates.
    pub capath: Option<PathBuf>,
    /// Skip TLS verification.
    pub insecure: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: format!("http://{}", crate::DEFAULT_LISTEN_ADDR),
            user: None,
            pass: None,
            cacert: None,
            capath: None,
            insecure: false,
        }
    }
}

pub struct Client {
    http: reqwest::Client,
    base: String,
    user: Option<String>,
    pass: Option<String>,
}

impl Client {
    pub fn connect(cfg: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if cfg.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(path) = &cfg.cacert {
            builder = builder.add_root_certificate(load_cert(path)?);
        }
        if let Some(dir) = &cfg.capath {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().map_or(false, |e| e == "pem" || e == "crt") {
                    builder = builder.add_root_certificate(load_cert(&path)?);
                }
            }
        }
        Ok(Self {
            http: builder.build()?,
            base: cfg.addr.trim_end_matches('/').to_string(),
            user: cfg.user,
            pass: cfg.pass,
        })
    }

    pub async fn manager_info(&self) -> Result<ManagerSummary> {
        self.fetch("/", None).await.map(|(body, _)| body)
    }

    /// Service names plus the list ETag.
    pub async fn services(&self) -> Result<(Vec<String>, String)> {
        self.fetch("/services", None).await
    }

    /// Long poll on the service list. `None` means unchanged at timeout.
    pub async fn poll_services(
        &self,
        etag: &str,
        secs: u64,
    ) -> Result<Option<(Vec<String>, String)>> {
        self.fetch_poll("/services", etag, secs).await
    }

    pub async fn service(&self, name: &str) -> Result<(ServiceInfo, String)> {
        self.fetch(&format!("/services/{}", name), None).await
    }

    pub async fn poll_service(
        &self,
        name: &str,
        etag: &str,
        secs: u64,
    ) -> Result<Option<(ServiceInfo, String)>> {
        self.fetch_poll(&format!("/services/{}", name), etag, secs)
            .await
    }

    pub async fn poll_manager(
        &self,
        etag: &str,
        secs: u64,
    ) -> Result<Option<(ManagerSummary, String)>> {
        self.fetch_poll("/", etag, secs).await
    }

    pub async fn enable(&self, name: &str) -> Result<()> {
        self.post(&format!("/services/{}/enable", name)).await
    }

    pub async fn disable(&self, name: &str) -> Result<()> {
        self.post(&format!("/services/{}/disable", name)).await
    }

    pub async fn clear(&self, name: &str) -> Result<()> {
        self.post(&format!("/services/{}/clear", name)).await
    }

    pub async fn restart(&self, name: &str) -> Result<()> {
        self.post(&format!("/services/{}/restart", name)).await
    }

    pub async fn service_log(&self, name: &str) -> Result<Vec<LogRecord>> {
        self.fetch(&format!("/services/{}/log", name), None)
            .await
            .map(|(body, _)| body)
    }

    pub async fn global_log(&self) -> Result<Vec<LogRecord>> {
        self.fetch("/log", None).await.map(|(body, _)| body)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        poll: Option<(&str, u64)>,
    ) -> Result<(T, String)> {
        match self.fetch_inner(path, poll).await? {
            Some(result) => Ok(result),
            // Without conditional headers the server never answers 304.
            None => Err(Error::Server {
                code: 304,
                message: "unexpected not-modified".to_string(),
            }),
        }
    }

    async fn fetch_poll<T: DeserializeOwned>(
        &self,
        path: &str,
        etag: &str,
        secs: u64,
    ) -> Result<Option<(T, String)>> {
        self.fetch_inner(path, Some((etag, secs))).await
    }

    async fn fetch_inner<T: DeserializeOwned>(
        &self,
        path: &str,
        poll: Option<(&str, u64)>,
    ) -> Result<Option<(T, String)>> {
        let mut req = self.http.get(format!("{}{}", self.base, path));
        if let Some(user) = &self.user {
            req = req.basic_auth(user, self.pass.as_deref());
        }
        if let Some((etag, secs)) = poll {
            req = req
                .header(POLL_ETAG_HEADER, etag)
                .header(POLL_TIME_HEADER, secs.to_string())
                .header(header::IF_NONE_MATCH, etag);
        }
        let resp = req.send().await?;
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let etag = resp
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(Some((resp.json().await?, etag)))
    }

    async fn post(&self, path: &str) -> Result<()> {
        let mut req = self.http.post(format!("{}{}", self.base, path));
        if let Some(user) = &self.user {
            req = req.basic_auth(user, self.pass.as_deref());
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let _: OkReply = resp.json().await?;
        Ok(())
    }
}

async fn api_error(resp: reqwest::Response) -> Error {
    let code = resp.status().as_u16();
    match resp.json::<ApiError>().await {
        Ok(body) => Error::Server {
            code: body.code,
            message: body.message,
        },
        Err(_) => Error::Server {
            code,
            message: "request failed".to_string(),
        },
    }
}

fn load_cert(path: &std::path::Path) -> Result<Certificate> {
    let pem = std::fs::read(path)?;
    Certificate::from_pem(&pem).map_err(Error::Http)
}
