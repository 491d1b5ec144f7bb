use std::{
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{header, HeaderValue, Response, StatusCode};
use log::{debug, error, info, warn};
use pingora::{
    apps::{http_app::ServeHttp, ServerApp},
    protocols::{http::ServerSession, l4::stream::Stream as L4Stream, Stream},
    server::ShutdownWatch,
};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::{
    core::error::{RelayError, RelayResult},
    orchestration::router::{RelayRequest, RelayRouter},
    utils::response::ResponseBuilder,
    validation_error,
};

/// Pause before accepting again when the process is out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(500);

/// HTTP application serving the assembled relay router.
///
/// Every request/response pair is logged with a generated request id; the
/// logging never changes what the router returns.
pub struct RelayHttpApp {
    router: RelayRouter,
    max_body_bytes: usize,
}

impl RelayHttpApp {
    pub fn new(router: RelayRouter, max_body_bytes: usize) -> Self {
        Self {
            router,
            max_body_bytes,
        }
    }
}

#[async_trait]
impl ServeHttp for RelayHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        http_session.set_keepalive(None);

        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let (method, path) = {
            let req_header = http_session.req_header();
            (req_header.method.clone(), req_header.uri.path().to_string())
        };

        let mut resp = match read_request_body(http_session, self.max_body_bytes).await {
            Ok(body) => {
                self.router
                    .dispatch(RelayRequest::new(method.clone(), path.clone(), body))
                    .await
            }
            Err(e) => {
                debug!("[{request_id}] rejected request body: {e}");
                ResponseBuilder::error_http(e.status_code(), &e.to_string())
            }
        };

        if resp.status() != StatusCode::NO_CONTENT {
            let len = HeaderValue::from(resp.body().len());
            resp.headers_mut().insert(header::CONTENT_LENGTH, len);
        }

        info!(
            "[{request_id}] {} {} {} {}B {}us",
            method,
            path,
            resp.status().as_u16(),
            resp.body().len(),
            started.elapsed().as_micros()
        );
        resp
    }
}

async fn read_request_body(http_session: &mut ServerSession, limit: usize) -> RelayResult<Bytes> {
    let mut body_data = BytesMut::new();
    while let Some(chunk) = http_session
        .read_request_body()
        .await
        .map_err(|e| validation_error!("failed to read request body: {}", e))?
    {
        append_body_chunk(&mut body_data, &chunk, limit)?;
    }
    Ok(body_data.freeze())
}

/// Append `chunk` unless the body would grow past `limit` bytes
fn append_body_chunk(body: &mut BytesMut, chunk: &[u8], limit: usize) -> RelayResult<()> {
    if body.len().saturating_add(chunk.len()) > limit {
        return Err(RelayError::PayloadTooLarge(limit));
    }
    body.extend_from_slice(chunk);
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum AcceptFailure {
    /// The failed connection is dropped, the listener is fine
    Connection,
    /// Out of file descriptors, retry after a pause
    Exhausted,
    Fatal,
}

fn classify_accept_error(err: &io::Error) -> AcceptFailure {
    use io::ErrorKind::*;

    match err.kind() {
        ConnectionAborted | ConnectionReset | ConnectionRefused | Interrupted | WouldBlock
        | TimedOut => AcceptFailure::Connection,
        // ENFILE, EMFILE
        _ if matches!(err.raw_os_error(), Some(23) | Some(24)) => AcceptFailure::Exhausted,
        _ => AcceptFailure::Fatal,
    }
}

/// Accept connections on `listener` until `shutdown` flips to true.
///
/// Each connection is handed to its own task. Errors tied to a single
/// connection are logged and skipped. Returns `Ok(())` on a graceful close and
/// the accept error when the listener itself fails.
pub async fn serve(
    app: Arc<RelayHttpApp>,
    listener: TcpListener,
    mut shutdown: ShutdownWatch,
) -> RelayResult<()> {
    if *shutdown.borrow() {
        info!("Listener closed before accepting connections");
        return Ok(());
    }

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Shutdown signal received, closing listener");
                    return Ok(());
                }
            },

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => match classify_accept_error(&e) {
                        AcceptFailure::Connection => {
                            warn!("Dropped connection during accept: {e}");
                            continue;
                        }
                        AcceptFailure::Exhausted => {
                            warn!("Accept failed, retrying in {ACCEPT_BACKOFF:?}: {e}");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                        AcceptFailure::Fatal => {
                            error!("Failed to accept connection: {e}");
                            return Err(e.into());
                        }
                    },
                };
                debug!("Accepted connection from {peer}");

                let app = app.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let stream: Stream = Box::new(L4Stream::from(stream));
                    app.process_new(stream, &shutdown).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_keep_listening() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
            io::ErrorKind::TimedOut,
        ] {
            assert_eq!(
                classify_accept_error(&io::Error::from(kind)),
                AcceptFailure::Connection,
                "{kind:?}"
            );
        }
    }

    #[test]
    fn test_fd_exhaustion_backs_off() {
        for errno in [23, 24] {
            assert_eq!(
                classify_accept_error(&io::Error::from_raw_os_error(errno)),
                AcceptFailure::Exhausted
            );
        }
    }

    #[test]
    fn test_listener_errors_are_fatal() {
        assert_eq!(
            classify_accept_error(&io::Error::from(io::ErrorKind::InvalidInput)),
            AcceptFailure::Fatal
        );
        assert_eq!(
            classify_accept_error(&io::Error::from(io::ErrorKind::PermissionDenied)),
            AcceptFailure::Fatal
        );
    }

    #[test]
    fn test_body_limit() {
        let mut body = BytesMut::new();
        append_body_chunk(&mut body, b"abcd", 6).unwrap();
        append_body_chunk(&mut body, b"ef", 6).unwrap();
        assert_eq!(&body[..], b"abcdef");

        let err = append_body_chunk(&mut body, b"g", 6).unwrap_err();
        assert!(matches!(err, RelayError::PayloadTooLarge(6)));
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body.len(), 6);
    }
}
