//! Forwarding one inbound request to an upstream server.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::time::error::Elapsed;
use url::Url;

use crate::http::client::HttpClient;
use crate::http::connection::ConnectionId;
use crate::http::reply::{ContentType, Reply, StatusCode};
use crate::http::request::Request;

/// Headers that only apply to a single hop.
const HOP_BY_HOP: [&str; 5] = [
    "Connection",
    "Keep-Alive",
    "Proxy-Connection",
    "Transfer-Encoding",
    "Upgrade",
];

/// A request being relayed on behalf of a server connection.
#[derive(Debug, Clone)]
pub struct Proxy {
    conn_id: ConnectionId,
    addr: String,
    request: Request,
    client: HttpClient,
    started: Instant,
}

impl Proxy {
    /// Prepares the outbound copy of `inbound` for `upstream`, with `prefix`
    /// stripped from the path.
    pub fn new(
        conn_id: ConnectionId,
        upstream: &Url,
        prefix: &str,
        inbound: &Request,
        client: HttpClient,
    ) -> Result<Self> {
        let request = build_upstream_request(inbound, upstream, prefix)?;
        let addr = upstream_addr(upstream)?;
        Ok(Self {
            conn_id,
            addr,
            request,
            client,
            started: Instant::now(),
        })
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// `host:port` of the upstream.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The outbound request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Runs the outbound request and returns the upstream reply, or a stock
    /// 504 on timeout and 502 on any other failure.
    pub async fn execute(&self) -> Reply {
        match self.client.execute(&self.addr, self.request.clone()).await {
            Ok(reply) => {
                tracing::info!(
                    conn = self.conn_id,
                    upstream = %self.addr,
                    status = reply.status,
                    uri = %self.request.uri,
                    elapsed_ms = self.elapsed().as_millis() as u64,
                    "Request forwarded"
                );
                reply
            }
            Err(e) => {
                tracing::warn!(conn = self.conn_id, upstream = %self.addr, error = %e, "Upstream request failed");
                error_reply(&e)
            }
        }
    }
}

/// Maps an upstream failure to a stock reply.
pub fn error_reply(error: &anyhow::Error) -> Reply {
    let status = if error.is::<Elapsed>() {
        StatusCode::GatewayTimeout
    } else {
        StatusCode::BadGateway
    };
    Reply::stock(status, ContentType::Html)
}

/// `host:port` for a plain-HTTP upstream URL.
pub fn upstream_addr(upstream: &Url) -> Result<String> {
    if upstream.scheme() != "http" {
        anyhow::bail!("Unsupported upstream scheme: {}", upstream.scheme());
    }
    let host = upstream.host_str().context("Upstream URL missing host")?;
    let port = upstream.port_or_known_default().unwrap_or(80);
    Ok(format!("{host}:{port}"))
}

/// Builds the request sent upstream.
///
/// The `Host` header is rewritten to the upstream, hop-by-hop headers are
/// dropped and `Connection: close` is added.
pub fn build_upstream_request(inbound: &Request, upstream: &Url, prefix: &str) -> Result<Request> {
    let host = upstream.host_str().context("Upstream URL missing host")?;
    let host_value = match upstream.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut request = Request::new();
    request.method = inbound.method;
    request.uri = upstream_uri(upstream, prefix, &inbound.uri);
    request.v_major = 1;
    request.v_minor = 1;
    request.headers = inbound.headers.clone();
    request.content = inbound.content.clone();
    request.content_length = inbound.content.len();

    request.headers.set("Host", host_value);
    for name in HOP_BY_HOP {
        request.headers.remove(name);
    }
    request.headers.set("Connection", "close");
    if !request.content.is_empty() {
        request.headers.set("Content-Length", request.content.len().to_string());
    }

    Ok(request)
}

fn upstream_uri(upstream: &Url, prefix: &str, uri: &str) -> String {
    let rest = uri.strip_prefix(prefix).unwrap_or(uri);
    let base = upstream.path().trim_end_matches('/');

    let mut out = String::with_capacity(base.len() + rest.len() + 1);
    out.push_str(base);
    if !rest.starts_with('/') {
        out.push('/');
    }
    out.push_str(rest);
    out
}
