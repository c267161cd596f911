//! FTP/FTPS implementation of [`RemoteStore`] over suppaftp.
//!
//! One authenticated session is cached per store; the first operation
//! opens it and later operations reuse it. An error that poisons the
//! session tears it down, and the next operation reconnects. All
//! blocking socket work runs on the tokio blocking pool, serialized
//! per server by the session lock.

use std::io::{Cursor, Read};
use std::net::ToSocketAddrs;
use std::time::{Duration, Instant};

use bytes::Bytes;
use suppaftp::native_tls::TlsConnector;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode, NativeTlsConnector, NativeTlsFtpStream, Status};
use tracing::{debug, trace};
use trawl_types::ServerDescriptor;

use crate::error::TransportError;
use crate::progress::TransferControl;
use crate::traits::RemoteStore;
use crate::url;

/// Block size for streamed downloads.
const DOWNLOAD_BLOCK: usize = 64 * 1024;

/// A live control connection, plain or TLS.
enum FtpSession {
    Plain(FtpStream),
    Secure(NativeTlsFtpStream),
}

/// Dispatch an operation onto whichever stream variant is live.
macro_rules! on_stream {
    ($session:expr, $stream:ident => $body:expr) => {
        match $session {
            FtpSession::Plain($stream) => $body,
            FtpSession::Secure($stream) => $body,
        }
    };
}

/// [`RemoteStore`] backed by a single FTP/FTPS server.
pub struct FtpStore {
    server: ServerDescriptor,
    timeout: Duration,
    verify_certs: bool,
    session: tokio::sync::Mutex<Option<FtpSession>>,
}

impl FtpStore {
    /// Create a store for `server`. `timeout` applies to connect and to
    /// socket reads/writes; callers double it for TLS servers.
    pub fn new(server: ServerDescriptor, timeout: Duration, verify_certs: bool) -> Self {
        Self {
            server,
            timeout,
            verify_certs,
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Absolute path on the server for a base-relative `path`.
    fn abs(&self, path: &str) -> String {
        url::join_remote(&self.server.base_path, path)
    }

    /// Run `op` against the cached session, opening one if needed.
    ///
    /// The session lock is held for the whole call, which serializes
    /// operations against one server.
    async fn with_session<T, F>(&self, op: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpSession) -> Result<T, TransportError> + Send + 'static,
    {
        let mut slot = self.session.lock().await;

        let session = match slot.take() {
            Some(session) => session,
            None => {
                let server = self.server.clone();
                let timeout = self.timeout;
                let verify = self.verify_certs;
                debug!(server = %server.id, url = %url::build_url(&server, ""), "opening ftp session");
                tokio::task::spawn_blocking(move || connect_blocking(&server, timeout, verify))
                    .await
                    .map_err(worker_failed)??
            }
        };

        let (session, result) = tokio::task::spawn_blocking(move || {
            let mut session = session;
            let result = op(&mut session);
            (session, result)
        })
        .await
        .map_err(worker_failed)?;

        match &result {
            Err(e) if e.poisons_session() => {
                debug!(server = %self.server.id, error = %e, "tearing down ftp session");
                drop(session);
            }
            _ => *slot = Some(session),
        }

        result
    }
}

#[async_trait::async_trait]
impl RemoteStore for FtpStore {
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        ctl: &TransferControl,
    ) -> Result<(), TransportError> {
        let abs = self.abs(path);
        let ctl = ctl.clone();
        let total = data.len() as u64;
        trace!(server = %self.server.id, path = %abs, bytes = total, "ftp upload");
        self.with_session(move |session| {
            let mut reader = TransferReader {
                inner: Cursor::new(data),
                done: 0,
                total,
                ctl,
            };
            on_stream!(session, s => s.put_file(&abs, &mut reader))
                .map(|_| ())
                .map_err(classify)
        })
        .await
    }

    async fn download(&self, path: &str, ctl: &TransferControl) -> Result<Bytes, TransportError> {
        let abs = self.abs(path);
        let ctl = ctl.clone();
        trace!(server = %self.server.id, path = %abs, "ftp download");
        self.with_session(move |session| {
            on_stream!(session, s => s.retr(&abs, |stream| {
                let mut out = Vec::new();
                let mut block = vec![0u8; DOWNLOAD_BLOCK];
                loop {
                    if ctl.is_cancelled() {
                        return Err(FtpError::ConnectionError(cancelled_io()));
                    }
                    let n = stream.read(&mut block).map_err(FtpError::ConnectionError)?;
                    if n == 0 {
                        break;
                    }
                    out.extend_from_slice(&block[..n]);
                    ctl.report(out.len() as u64, 0);
                }
                Ok(out)
            }))
            .map(Bytes::from)
            .map_err(classify)
        })
        .await
    }

    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        let abs = self.abs(path);
        self.with_session(move |session| on_stream!(session, s => s.rm(&abs)).map_err(classify))
            .await
    }

    async fn exists(&self, path: &str) -> Result<bool, TransportError> {
        match self.size(path).await {
            Ok(_) => Ok(true),
            Err(TransportError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn size(&self, path: &str) -> Result<u64, TransportError> {
        let abs = self.abs(path);
        self.with_session(move |session| {
            on_stream!(session, s => s.size(&abs))
                .map(|size| size as u64)
                .map_err(classify)
        })
        .await
    }

    async fn mkdir(&self, path: &str) -> Result<(), TransportError> {
        let abs = self.abs(path);
        let result = self
            .with_session(move |session| on_stream!(session, s => s.mkdir(&abs)).map_err(classify))
            .await;
        match result {
            Ok(()) => Ok(()),
            // Most servers answer 550 for an existing directory; mkdir is
            // idempotent from the caller's perspective.
            Err(TransportError::NotFound(_)) | Err(TransportError::Ftp(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, TransportError> {
        let abs = self.abs(path);
        self.with_session(move |session| {
            let entries = on_stream!(session, s => s.nlst(Some(&abs))).map_err(classify)?;
            // Servers may return full paths; reduce to file names.
            Ok(entries
                .into_iter()
                .filter_map(|entry| {
                    let name = entry.rsplit('/').next().unwrap_or(&entry).to_string();
                    (!name.is_empty()).then_some(name)
                })
                .collect())
        })
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), TransportError> {
        let from = self.abs(from);
        let to = self.abs(to);
        self.with_session(move |session| {
            on_stream!(session, s => s.rename(&from, &to)).map_err(classify)
        })
        .await
    }

    async fn ping(&self) -> Result<Duration, TransportError> {
        let start = Instant::now();
        self.with_session(move |session| on_stream!(session, s => s.noop()).map_err(classify))
            .await?;
        Ok(start.elapsed())
    }
}

/// Reader adapter that reports progress and honors cancellation at
/// every block boundary.
struct TransferReader {
    inner: Cursor<Bytes>,
    done: u64,
    total: u64,
    ctl: TransferControl,
}

impl Read for TransferReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.ctl.is_cancelled() {
            return Err(cancelled_io());
        }
        let n = self.inner.read(buf)?;
        self.done += n as u64;
        self.ctl.report(self.done, self.total);
        Ok(n)
    }
}

/// Open, authenticate, and configure a session. Blocking.
fn connect_blocking(
    server: &ServerDescriptor,
    timeout: Duration,
    verify_certs: bool,
) -> Result<FtpSession, TransportError> {
    let addr = (server.host.as_str(), server.port)
        .to_socket_addrs()
        .map_err(|e| TransportError::Network(format!("resolve {}: {e}", server.host)))?
        .next()
        .ok_or_else(|| TransportError::Network(format!("no address for {}", server.host)))?;

    let mut session = if server.use_ssl {
        let stream = NativeTlsFtpStream::connect_timeout(addr, timeout).map_err(classify)?;
        set_socket_timeouts(stream.get_ref(), timeout)?;
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(!verify_certs)
            .build()
            .map_err(|e| TransportError::Network(format!("tls setup: {e}")))?;
        let secure = stream
            .into_secure(NativeTlsConnector::from(connector), &server.host)
            .map_err(classify)?;
        FtpSession::Secure(secure)
    } else {
        let stream = FtpStream::connect_timeout(addr, timeout).map_err(classify)?;
        set_socket_timeouts(stream.get_ref(), timeout)?;
        FtpSession::Plain(stream)
    };

    on_stream!(&mut session, s => {
        s.login(&server.username, &server.password)
            .map_err(|e| match classify(e) {
                // A rejected login is an auth failure even when the server
                // words it differently.
                TransportError::Ftp(msg) => TransportError::AuthFailed(msg),
                other => other,
            })?;
        s.transfer_type(FileType::Binary).map_err(classify)?;
        s.set_mode(if server.passive_mode { Mode::Passive } else { Mode::Active });
        Ok::<(), TransportError>(())
    })?;

    Ok(session)
}

fn set_socket_timeouts(
    stream: &std::net::TcpStream,
    timeout: Duration,
) -> Result<(), TransportError> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(())
}

fn cancelled_io() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Interrupted, "transfer cancelled")
}

fn worker_failed(e: tokio::task::JoinError) -> TransportError {
    TransportError::Network(format!("transfer worker failed: {e}"))
}

/// Map a suppaftp error into the transport taxonomy.
fn classify(err: FtpError) -> TransportError {
    match err {
        FtpError::ConnectionError(io) => match io.kind() {
            std::io::ErrorKind::Interrupted => TransportError::Cancelled,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportError::Timeout(io.to_string())
            }
            _ => TransportError::Network(io.to_string()),
        },
        FtpError::UnexpectedResponse(resp) => {
            let text = format!(
                "{:?}: {}",
                resp.status,
                String::from_utf8_lossy(&resp.body).trim()
            );
            match resp.status {
                Status::NotLoggedIn | Status::InvalidCredentials => {
                    TransportError::AuthFailed(text)
                }
                Status::FileUnavailable => TransportError::NotFound(text),
                Status::ExceededStorage => TransportError::StorageFull(text),
                Status::BadFilename => TransportError::AccessDenied(text),
                Status::NotAvailable
                | Status::CannotOpenDataConnection
                | Status::TransferAborted => TransportError::Network(text),
                _ => TransportError::Ftp(text),
            }
        }
        other => TransportError::Ftp(other.to_string()),
    }
}
