//! IMAP connection lifecycle: connect, login, and reconnect-on-closed-stream.
//!
//! Everything here is provider-agnostic IMAP plumbing; folder enumeration
//! and message mapping live in [`crate::adapter`].

use async_imap::Session;
use async_native_tls::{TlsConnector, TlsStream};
use mailvault_core::ports::RemoteError;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// The stream type every session in this crate is built on.
pub type ImapStream = TlsStream<TcpStream>;
pub type ImapSession = Session<ImapStream>;

/// Connection parameters for one mailbox-protocol source.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// A lazily-established, auto-reconnecting IMAP session shared by every
/// adapter call. IMAP sessions are stateful and not safe to use
/// concurrently, so every command holds the mutex for its duration.
pub struct SessionHandle {
    config: ImapConfig,
    session: Mutex<Option<ImapSession>>,
}

impl SessionHandle {
    pub fn new(config: ImapConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<ImapSession, RemoteError> {
        let tcp = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        let tls = TlsConnector::new()
            .connect(self.config.host.as_str(), tcp)
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        let client = async_imap::Client::new(tls);
        client
            .login(&self.config.username, &self.config.password)
            .await
            .map_err(|(e, _client)| RemoteError::Unauthorized(e.to_string()))
    }

    /// Runs `f` against the live session, connecting first if none exists
    /// yet. On a transport-level failure whose message indicates the
    /// connection was closed out from under us, reconnects once and retries.
    pub async fn with_session<F, Fut, T>(&self, f: F) -> Result<T, RemoteError>
    where
        F: Fn(&mut ImapSession) -> Fut,
        Fut: std::future::Future<Output = Result<T, RemoteError>>,
    {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }

        let result = f(guard.as_mut().expect("just populated")).await;
        match result {
            Ok(value) => Ok(value),
            Err(err) if is_closed_connection(&err) => {
                tracing::warn!(error = %err, "imap connection appears closed, reconnecting once");
                *guard = Some(self.connect().await?);
                f(guard.as_mut().expect("just populated")).await
            }
            Err(err) => Err(err),
        }
    }
}

/// Maps an `async_imap` error into the shared [`RemoteError`] vocabulary.
pub fn imap_error(e: async_imap::error::Error) -> RemoteError {
    RemoteError::Network(e.to_string())
}

/// Recognizes the substrings a dropped/reset IMAP connection surfaces as,
/// so the caller knows a reconnect (rather than a retry in place) is needed.
fn is_closed_connection(err: &RemoteError) -> bool {
    let text = err.to_string().to_ascii_lowercase();
    const MARKERS: &[&str] = &[
        "closed",
        "broken pipe",
        "connection reset",
        "unexpected eof",
        "not connected",
    ];
    MARKERS.iter().any(|marker| text.contains(marker))
}
