//! TCP transport for MCP server.
//!
//! Each accepted socket gets its own [`FramedStream`] and [`McpSession`]; no
//! protocol state is shared between connections. The only shared state is
//! the [`ConnectionLimiter`], which bounds how many connections are served at
//! once. When the limit is reached the accept loop stops accepting and backs
//! off; waiting clients sit in the kernel backlog until a slot frees up.
//!
//! Shutdown is a drain: the listener is closed, then every in-flight
//! connection is allowed to finish its current message before the transport
//! returns.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, SemaphorePermit};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::mcp::connection::serve_connection;
use crate::mcp::provider::ToolProvider;
use crate::mcp::server::McpSession;
use crate::mcp::shutdown::Shutdown;
use crate::mcp::stream::FramedStream;

/// Connections served concurrently by default.
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Default deadline for receiving data on an accepted socket.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for sending data on an accepted socket.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default pause before retrying admission when at capacity.
pub const DEFAULT_ADMISSION_BACKOFF: Duration = Duration::from_millis(100);

/// Resource limits applied by the TCP transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Maximum number of connections served at once.
    pub max_connections: usize,
    /// Deadline for each read on an accepted socket.
    pub read_timeout: Duration,
    /// Deadline for each write on an accepted socket.
    pub write_timeout: Duration,
    /// Pause before retrying admission when at capacity.
    pub admission_backoff: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            admission_backoff: DEFAULT_ADMISSION_BACKOFF,
        }
    }
}

/// Settings for the TCP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Host name or IP address to bind.
    pub host: String,
    /// Port to bind; `0` picks an ephemeral port.
    pub port: u16,
    /// Log every message at info level.
    pub verbose: bool,
    /// Connection limits.
    pub limits: ConnectionLimits,
}

impl TcpConfig {
    /// Creates a configuration with default limits.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            verbose: false,
            limits: ConnectionLimits::default(),
        }
    }

    /// Returns the `host:port` string to resolve, bracketing IPv6 literals.
    #[must_use]
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Counts live connections against a fixed ceiling.
///
/// Backed by a [`Semaphore`] holding one permit per connection, so the check
/// and the take are a single step and concurrent admissions can never
/// overshoot the ceiling.
#[derive(Debug)]
pub struct ConnectionLimiter {
    permits: Arc<Semaphore>,
    max: usize,
}

impl ConnectionLimiter {
    /// Creates a limiter admitting at most `max` connections.
    ///
    /// `max` is capped at [`Semaphore::MAX_PERMITS`].
    #[must_use]
    pub fn new(max: usize) -> Self {
        let max = max.min(Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Takes a slot if one is free. The slot stays taken until
    /// [`release`](Self::release) is called.
    #[must_use]
    pub fn try_admit(&self) -> bool {
        self.permits.try_acquire().map(SemaphorePermit::forget).is_ok()
    }

    /// Returns a slot taken by [`try_admit`](Self::try_admit).
    pub fn release(&self) {
        if self.permits.available_permits() < self.max {
            self.permits.add_permits(1);
        } else {
            error!("Connection slot released without a matching admission");
        }
    }

    /// Takes a slot wrapped in a guard that releases it when dropped.
    #[must_use]
    pub fn try_acquire(&self) -> Option<ConnectionSlot> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| ConnectionSlot { _permit: permit })
    }

    /// Number of slots currently taken. For reporting only.
    #[must_use]
    pub fn active(&self) -> usize {
        self.max.saturating_sub(self.permits.available_permits())
    }

    /// The admission ceiling.
    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }
}

/// An admitted connection's capacity token; released exactly once on drop.
#[derive(Debug)]
pub struct ConnectionSlot {
    _permit: OwnedSemaphorePermit,
}

/// A TCP-based MCP transport.
#[derive(Debug)]
pub struct TcpTransport {
    config: TcpConfig,
    limiter: Arc<ConnectionLimiter>,
}

impl TcpTransport {
    /// Creates a transport; nothing is bound until [`run`](Self::run).
    #[must_use]
    pub fn new(config: TcpConfig) -> Self {
        let limiter = Arc::new(ConnectionLimiter::new(config.limits.max_connections));
        Self { config, limiter }
    }

    /// The limiter shared by this transport's connections.
    #[must_use]
    pub const fn limiter(&self) -> &Arc<ConnectionLimiter> {
        &self.limiter
    }

    /// Resolves and binds the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidAddress`] if the address does not
    /// resolve and [`TransportError::Bind`] if binding fails.
    pub async fn bind(&self) -> Result<TcpListener, TransportError> {
        let addr = self.config.bind_address();
        let resolved = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| {
                debug!(%addr, error = %e, "Address lookup failed");
                TransportError::InvalidAddress { addr: addr.clone() }
            })?
            .next()
            .ok_or_else(|| TransportError::InvalidAddress { addr: addr.clone() })?;

        TcpListener::bind(resolved)
            .await
            .map_err(|source| TransportError::Bind { addr, source })
    }

    /// Binds the configured address and serves until shutdown.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listener cannot be bound.
    pub async fn run(
        &self,
        provider: Option<Arc<dyn ToolProvider>>,
        shutdown: Shutdown,
    ) -> Result<(), TransportError> {
        let listener = self.bind().await?;
        self.serve(listener, provider, shutdown).await;
        Ok(())
    }

    /// Accepts and serves connections on `listener` until shutdown, then
    /// drains in-flight connections.
    ///
    /// The listener is closed when this returns, however the loop ends.
    pub async fn serve(
        &self,
        listener: TcpListener,
        provider: Option<Arc<dyn ToolProvider>>,
        shutdown: Shutdown,
    ) {
        let limits = self.config.limits;
        info!(
            addr = ?listener.local_addr().ok(),
            max_connections = limits.max_connections,
            "TCP transport listening"
        );

        let mut connections = JoinSet::new();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let Some(slot) = self.limiter.try_acquire() else {
                debug!(
                    max_connections = limits.max_connections,
                    "At connection capacity, backing off"
                );
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(limits.admission_backoff) => {}
                    Some(joined) = connections.join_next(), if !connections.is_empty() => {
                        log_join(joined);
                    }
                }
                continue;
            };

            let accepted = tokio::select! {
                () = shutdown.cancelled() => break,
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join(joined);
                    continue;
                }
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Failed to accept TCP connection");
                    drop(slot);
                    if !back_off(&shutdown, limits.admission_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            let session = McpSession::new(provider.clone()).with_verbose(self.config.verbose);
            let shutdown = shutdown.clone();
            connections.spawn(handle_connection(stream, peer, session, limits, shutdown, slot));
        }

        drop(listener);
        info!(
            in_flight = connections.len(),
            "TCP listener closed, draining connections"
        );
        while let Some(joined) = connections.join_next().await {
            log_join(joined);
        }
        info!("TCP transport stopped");
    }
}

/// Serves one accepted connection; the slot is released when this returns.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    mut session: McpSession,
    limits: ConnectionLimits,
    shutdown: Shutdown,
    slot: ConnectionSlot,
) {
    let _slot = slot;

    let mut framed = match configure_socket(stream, &limits) {
        Ok(framed) => framed,
        Err(e) => {
            warn!(%peer, error = %e, "Dropping connection");
            return;
        }
    };

    info!(%peer, "TCP client connected");
    let result = serve_connection(&mut framed, &mut session, &shutdown).await;
    framed.shutdown().await;

    match result {
        Ok(processed) => info!(%peer, processed, "TCP client disconnected"),
        Err(e) if e.is_disconnect() => debug!(%peer, error = %e, "TCP client went away"),
        Err(e) => warn!(%peer, error = %e, "TCP connection closed on error"),
    }
}

/// Applies socket options and deadlines to a freshly accepted socket.
///
/// On failure the socket is dropped, and therefore closed, before the error
/// reaches the caller.
fn configure_socket(
    stream: TcpStream,
    limits: &ConnectionLimits,
) -> Result<FramedStream<OwnedReadHalf, OwnedWriteHalf>, TransportError> {
    stream
        .set_nodelay(true)
        .map_err(|source| TransportError::Configure { source })?;

    let (reader, writer) = stream.into_split();
    Ok(FramedStream::new(reader, writer)
        .with_timeouts(Some(limits.read_timeout), Some(limits.write_timeout)))
}

/// Sleeps for `delay` unless shutdown comes first.
///
/// Returns `false` if shutdown was requested.
async fn back_off(shutdown: &Shutdown, delay: Duration) -> bool {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Connection task failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    use super::*;
    use crate::mcp::shutdown;

    #[test]
    fn default_limits() {
        let limits = ConnectionLimits::default();
        assert_eq!(limits.max_connections, 100);
        assert_eq!(limits.read_timeout, Duration::from_secs(30));
        assert_eq!(limits.write_timeout, Duration::from_secs(10));
        assert_eq!(limits.admission_backoff, Duration::from_millis(100));
    }

    #[test]
    fn bind_address_formats() {
        assert_eq!(TcpConfig::new("127.0.0.1", 8080).bind_address(), "127.0.0.1:8080");
        assert_eq!(TcpConfig::new("::1", 9000).bind_address(), "[::1]:9000");
        assert_eq!(TcpConfig::new("[::1]", 9000).bind_address(), "[::1]:9000");
    }

    #[test]
    fn admits_up_to_max() {
        let limiter = ConnectionLimiter::new(2);
        assert!(limiter.try_admit());
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());
        assert_eq!(limiter.active(), 2);

        limiter.release();
        assert!(limiter.try_admit());
        assert!(!limiter.try_admit());
    }

    #[test]
    fn release_never_underflows() {
        let limiter = ConnectionLimiter::new(1);
        limiter.release();
        assert_eq!(limiter.active(), 0);
        assert!(limiter.try_admit());
    }

    #[test]
    fn slot_releases_on_drop() {
        let limiter = Arc::new(ConnectionLimiter::new(1));
        let slot = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());
        drop(slot);
        assert_eq!(limiter.active(), 0);
        assert!(limiter.try_acquire().is_some());
    }

    #[test]
    fn concurrent_admission_never_exceeds_max() {
        const MAX: usize = 100;
        const THREADS: usize = 32;
        const ATTEMPTS: usize = 50;

        let limiter = Arc::new(ConnectionLimiter::new(MAX));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    (0..ATTEMPTS).filter(|_| limiter.try_admit()).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, MAX);
        assert_eq!(limiter.active(), MAX);
    }

    #[test]
    fn concurrent_admit_and_release() {
        let limiter = Arc::new(ConnectionLimiter::new(8));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if let Some(slot) = limiter.try_acquire() {
                            peak.fetch_max(limiter.active(), Ordering::SeqCst);
                            drop(slot);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 8);
        assert_eq!(limiter.active(), 0);
    }

    #[test]
    fn ceiling_is_capped_at_semaphore_limit() {
        let limiter = ConnectionLimiter::new(usize::MAX);
        assert_eq!(limiter.max(), Semaphore::MAX_PERMITS);
        assert_eq!(limiter.active(), 0);
    }

    #[test]
    fn admit_and_acquire_share_the_ceiling() {
        let limiter = ConnectionLimiter::new(2);
        assert!(limiter.try_admit());
        let slot = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());
        assert!(!limiter.try_admit());

        drop(slot);
        assert_eq!(limiter.active(), 1);
        limiter.release();
        assert_eq!(limiter.active(), 0);
    }

    #[tokio::test]
    async fn back_off_returns_early_on_shutdown() {
        let (trigger, shutdown) = shutdown::channel();
        trigger.cancel();

        let slept = tokio::time::timeout(
            Duration::from_secs(1),
            back_off(&shutdown, Duration::from_secs(60)),
        )
        .await
        .expect("backoff should end as soon as shutdown is requested");
        assert!(!slept);
    }

    #[tokio::test]
    async fn back_off_sleeps_without_shutdown() {
        let (_trigger, shutdown) = shutdown::channel();
        assert!(back_off(&shutdown, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn rejects_unresolvable_host() {
        let transport = TcpTransport::new(TcpConfig::new("definitely not a host", 1));
        assert!(matches!(
            transport.bind().await,
            Err(TransportError::InvalidAddress { .. })
        ));
    }
}
