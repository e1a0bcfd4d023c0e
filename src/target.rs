//! The host under test.

use crate::error::ScanError;
use reqwest::Url;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct Target {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Base path, always with leading and trailing `/`.
    pub base_path: String,
    /// Address the host resolved to, filled once by [`Target::resolve`].
    pub addr: Option<SocketAddr>,
}

impl Target {
    /// Parses `scheme://host[:port][/basepath]`. A missing scheme means http.
    pub fn parse(raw: &str) -> Result<Self, ScanError> {
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| ScanError::InvalidTarget(raw.to_string(), e.to_string()))?;

        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(ScanError::InvalidTarget(
                raw.to_string(),
                format!("unsupported scheme {scheme}"),
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ScanError::InvalidTarget(raw.to_string(), "missing host".into()))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ScanError::InvalidTarget(raw.to_string(), "missing port".into()))?;

        let mut base_path = url.path().to_string();
        if !base_path.ends_with('/') {
            base_path.push('/');
        }

        Ok(Self {
            scheme,
            host,
            port,
            base_path,
            addr: None,
        })
    }

    /// Resolves the host once; later calls return the cached address.
    pub async fn resolve(&mut self) -> Result<SocketAddr, ScanError> {
        if let Some(addr) = self.addr {
            return Ok(addr);
        }
        let addr = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|_| ScanError::Resolve(self.host.clone()))?
            .next()
            .ok_or_else(|| ScanError::Resolve(self.host.clone()))?;
        self.addr = Some(addr);
        Ok(addr)
    }

    fn is_default_port(&self) -> bool {
        matches!((self.scheme.as_str(), self.port), ("http", 80) | ("https", 443))
    }

    /// `scheme://host[:port]/base/`, always ending with `/`.
    pub fn base_url(&self) -> String {
        if self.is_default_port() {
            format!("{}://{}{}", self.scheme, self.host, self.base_path)
        } else {
            format!(
                "{}://{}:{}{}",
                self.scheme, self.host, self.port, self.base_path
            )
        }
    }

    /// Absolute URL for a directory candidate; always ends with `/`.
    pub fn directory_url(&self, relative: &str) -> String {
        if relative == "/" {
            return self.base_url();
        }
        format!("{}/", self.file_url(relative))
    }

    /// Absolute URL for a file candidate.
    pub fn file_url(&self, relative: &str) -> String {
        format!(
            "{}{}",
            self.base_url().trim_end_matches('/'),
            relative
        )
    }
}
