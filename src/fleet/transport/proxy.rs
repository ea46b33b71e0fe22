// ABOUTME: TCP dialing for egress routes, including HTTP CONNECT tunnels
//
// Direct routes connect straight to the target. Proxied routes connect to
// the proxy, issue a CONNECT for the target authority and hand back the
// tunnelled stream once the proxy answers 2xx.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{Target, TransportError};
use crate::fleet::route::EgressRoute;

/// Upper bound on the proxy response head we are willing to buffer
const MAX_PROXY_RESPONSE: usize = 8 * 1024;

/// Open a TCP stream to `target` following `route`
pub async fn dial(target: &Target, route: &EgressRoute) -> Result<TcpStream, TransportError> {
    match route {
        EgressRoute::Direct => TcpStream::connect((target.host(), target.port()))
            .await
            .map_err(TransportError::Connect),
        EgressRoute::HttpProxy { host, port } => {
            let mut stream = TcpStream::connect((host.as_str(), *port))
                .await
                .map_err(TransportError::Connect)?;
            stream.set_nodelay(true).map_err(TransportError::Connect)?;

            let authority = target.authority();
            let request = format!(
                "CONNECT {authority} HTTP/1.1\r\n\
                 Host: {authority}\r\n\
                 Proxy-Connection: Keep-Alive\r\n\r\n"
            );
            stream
                .write_all(request.as_bytes())
                .await
                .map_err(TransportError::Connect)?;

            let head = read_response_head(&mut stream, route).await?;
            let status = parse_status_code(&head).map_err(|status| TransportError::ProxyRefused {
                proxy: route.to_string(),
                status,
            })?;

            if !(200..300).contains(&status) {
                return Err(TransportError::ProxyRefused {
                    proxy: route.to_string(),
                    status: status_line(&head),
                });
            }

            debug!(proxy = %route, endpoint = %authority, "Proxy tunnel established");
            Ok(stream)
        }
    }
}

/// Read up to and including the blank line ending the response head.
///
/// Reads one byte at a time so no tunnelled bytes are consumed.
async fn read_response_head(
    stream: &mut TcpStream,
    route: &EgressRoute,
) -> Result<Vec<u8>, TransportError> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_PROXY_RESPONSE {
            return Err(TransportError::ProxyRefused {
                proxy: route.to_string(),
                status: "response head too large".to_string(),
            });
        }

        let read = stream
            .read(&mut byte)
            .await
            .map_err(TransportError::Connect)?;
        if read == 0 {
            return Err(TransportError::ProxyRefused {
                proxy: route.to_string(),
                status: "connection closed before response".to_string(),
            });
        }
        head.push(byte[0]);
    }

    Ok(head)
}

fn status_line(head: &[u8]) -> String {
    String::from_utf8_lossy(head)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Extract the numeric status from an `HTTP/1.x NNN reason` head
pub(crate) fn parse_status_code(head: &[u8]) -> Result<u16, String> {
    let line = status_line(head);
    let mut parts = line.split_whitespace();

    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse::<u16>()
            .map_err(|_| format!("malformed status line '{line}'")),
        _ => Err(format!("malformed status line '{line}'")),
    }
}
