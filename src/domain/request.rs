//! Transport-agnostic request descriptor and client identity extraction.
//!
//! The engine never sees the HTTP framework's request type. Adapters copy the
//! handful of fields the core needs into a [`RequestInfo`] and derive the
//! client identifier from it with [`RequestInfo::client_ip`].

use std::net::SocketAddr;

/// The request fields the rate limiter cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    /// HTTP method, verbatim.
    pub method: String,
    /// Request path, verbatim.
    pub path: String,
    /// Transport-level peer address, usually `host:port`.
    pub remote_addr: String,
    /// Value of the `X-Forwarded-For` header, if present.
    pub forwarded_for: Option<String>,
    /// Value of the `X-Real-IP` header, if present.
    pub real_ip: Option<String>,
}

impl RequestInfo {
    /// Describe a request by method, path, and peer address.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        remote_addr: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            remote_addr: remote_addr.into(),
            forwarded_for: None,
            real_ip: None,
        }
    }

    /// Attach an `X-Forwarded-For` header value.
    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    /// Attach an `X-Real-IP` header value.
    pub fn with_real_ip(mut self, value: impl Into<String>) -> Self {
        self.real_ip = Some(value.into());
        self
    }

    /// Derive the client identifier for this request.
    ///
    /// Precedence:
    /// 1. first comma-separated entry of a non-empty `X-Forwarded-For`,
    ///    trimmed of whitespace;
    /// 2. a non-empty `X-Real-IP`, verbatim;
    /// 3. the host part of `remote_addr`;
    /// 4. `remote_addr` verbatim when it has no port to split off.
    pub fn client_ip(&self) -> String {
        if let Some(forwarded) = self.forwarded_for.as_deref().filter(|v| !v.is_empty()) {
            let first = forwarded.split(',').next().unwrap_or(forwarded);
            return first.trim().to_string();
        }

        if let Some(real_ip) = self.real_ip.as_deref().filter(|v| !v.is_empty()) {
            return real_ip.to_string();
        }

        match self.remote_addr.parse::<SocketAddr>() {
            Ok(addr) => addr.ip().to_string(),
            Err(_) => self.remote_addr.clone(),
        }
    }
}
