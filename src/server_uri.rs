use crate::error::{Error, Result};
use std::{fmt, str::FromStr};
use url::Url;

/// Represents a parsed server address in the format:
/// ws://host\[:port\]\[/path\]
/// or the bare format:
/// host\[:port\]\[/path\]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUri {
    /// Host to connect to
    pub host: String,

    /// Port to connect to
    pub port: Option<u16>,

    /// Optional path
    pub path: Option<String>,
}

impl ServerUri {
    /// Parse a server address
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidUri("empty server address".to_string()));
        }

        match input.split_once("://") {
            Some(("ws", _)) => Self::parse_as_url(input),
            Some((scheme, _)) => Err(Error::InvalidUri(format!(
                "unsupported scheme '{}', expected ws://",
                scheme
            ))),
            None => Self::parse_bare(input),
        }
    }

    /// Parse as a URL (ws://host:port/path)
    fn parse_as_url(input: &str) -> Result<Self> {
        let url = Url::parse(input)?;

        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUri("missing host".to_string()))?
            .to_string();

        // Only set path if it's not just "/"
        let path = if url.path() == "/" || url.path().is_empty() {
            None
        } else {
            Some(url.path().to_string())
        };

        Ok(Self {
            host,
            port: url.port(),
            path,
        })
    }

    /// Parse as bare host:port/path
    fn parse_bare(input: &str) -> Result<Self> {
        let mut rest = input;
        let mut path = None;

        // Extract path if present
        if let Some(path_idx) = rest.find('/') {
            let path_str = &rest[path_idx..];
            if path_str != "/" {
                path = Some(path_str.to_string());
            }
            rest = &rest[..path_idx];
        }

        // Extract port if present
        let mut host = rest;
        let mut port = None;
        if let Some(port_idx) = rest.rfind(':') {
            match rest[port_idx + 1..].parse::<u16>() {
                Ok(port_num) => {
                    port = Some(port_num);
                    host = &rest[..port_idx];
                }
                Err(_) => {
                    return Err(Error::InvalidUri("Invalid port format".to_string()));
                }
            }
        }

        if host.is_empty() {
            return Err(Error::InvalidUri("missing host".to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path,
        })
    }

    /// Build the WebSocket URL, filling in `default_port` when none was given
    pub fn to_url(&self, default_port: u16) -> Result<Url> {
        let port = self.port.unwrap_or(default_port);
        let mut url = Url::parse(&format!("ws://{}:{}", self.host, port))?;
        if let Some(path) = &self.path {
            url.set_path(path);
        }
        Ok(url)
    }
}

impl FromStr for ServerUri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws://{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(path) = &self.path {
            write!(f, "{}", path)?;
        }
        Ok(())
    }
}
