//! SMTP server implementation

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::smtp::error::SmtpError;
use crate::smtp::session::{Session, SessionObserver};
use crate::smtp::store::{
    AcceptAllFilterFactory, DiscardStoreFactory, MailboxFilterFactory, MessageStoreFactory,
};

/// Configuration for an [`SmtpServer`].
///
/// The defaults accept mail from everyone, discard the content, and impose no
/// size limit. Hosts plug in their own policies with the `with_*` methods.
pub struct ServerOptions {
    /// Name announced in the greeting and HELO/EHLO replies
    pub server_name: String,
    /// Addresses to listen on
    pub endpoints: Vec<SocketAddr>,
    /// Largest acceptable `SIZE=` declaration, in bytes; 0 means unlimited
    pub max_message_size: u64,
    pub(crate) message_store_factory: Box<dyn MessageStoreFactory>,
    pub(crate) mailbox_filter_factory: Box<dyn MailboxFilterFactory>,
    pub(crate) observers: Vec<Box<dyn SessionObserver>>,
}

impl ServerOptions {
    pub fn new(server_name: &str) -> Self {
        Self {
            server_name: server_name.to_owned(),
            endpoints: Vec::new(),
            max_message_size: 0,
            message_store_factory: Box::new(DiscardStoreFactory),
            mailbox_filter_factory: Box::new(AcceptAllFilterFactory),
            observers: Vec::new(),
        }
    }

    /// Add a listening endpoint
    pub fn with_endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Cap the declared message size; advertised as the SIZE extension
    pub fn with_max_message_size(mut self, bytes: u64) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Replace the message sink
    pub fn with_message_store(mut self, factory: impl MessageStoreFactory + 'static) -> Self {
        self.message_store_factory = Box::new(factory);
        self
    }

    /// Replace the acceptance policy
    pub fn with_mailbox_filter(mut self, factory: impl MailboxFilterFactory + 'static) -> Self {
        self.mailbox_filter_factory = Box::new(factory);
        self
    }

    /// Register a session lifecycle observer
    pub fn with_observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// The extension lines advertised in the EHLO reply.
    pub(crate) fn supported_extensions(&self) -> Vec<String> {
        if self.max_message_size > 0 {
            vec![format!("SIZE {}", self.max_message_size)]
        } else {
            Vec::new()
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("server_name", &self.server_name)
            .field("endpoints", &self.endpoints)
            .field("max_message_size", &self.max_message_size)
            .finish_non_exhaustive()
    }
}

/// The SMTP server: accepts connections and runs one session task per
/// connection.
///
/// Shutdown is cooperative. Cancelling the token stops the acceptors at
/// once; live sessions notice the token at their next read or write and wind
/// down, and `serve` returns only when every session task has finished.
#[derive(Debug)]
pub struct SmtpServer {
    options: Arc<ServerOptions>,
}

impl SmtpServer {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Bind the configured endpoints and serve until `shutdown` is
    /// cancelled.
    ///
    /// Failing to bind an endpoint is the one fatal error a running server
    /// can produce.
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<(), SmtpError> {
        if self.options.endpoints.is_empty() {
            return Err(SmtpError::NoEndpoints);
        }
        let mut listeners = Vec::with_capacity(self.options.endpoints.len());
        for &endpoint in &self.options.endpoints {
            let listener = TcpListener::bind(endpoint)
                .await
                .map_err(|source| SmtpError::Bind {
                    addr: endpoint,
                    source,
                })?;
            info!("listening on {endpoint}");
            listeners.push(listener);
        }
        self.serve_with_listeners(listeners, shutdown).await
    }

    /// Serve on listeners the caller has already bound.
    ///
    /// Useful for binding port 0 in tests and reading the assigned port back
    /// from the listener before the server starts.
    pub async fn serve_with_listeners(
        &self,
        listeners: Vec<TcpListener>,
        shutdown: CancellationToken,
    ) -> Result<(), SmtpError> {
        if listeners.is_empty() {
            return Err(SmtpError::NoEndpoints);
        }

        let tracker = TaskTracker::new();
        for listener in listeners {
            tracker.spawn(accept_loop(
                listener,
                self.options.clone(),
                shutdown.clone(),
                tracker.clone(),
            ));
        }
        tracker.close();
        tracker.wait().await;
        Ok(())
    }
}

/// Accept connections until cancellation, spawning a session task for each.
async fn accept_loop(
    listener: TcpListener,
    options: Arc<ServerOptions>,
    shutdown: CancellationToken,
    sessions: TaskTracker,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    debug!("accepted connection from {remote_addr}");
                    sessions.spawn(run_session(
                        stream,
                        remote_addr,
                        options.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(error) => warn!("failed to accept connection: {error}"),
            },
        }
    }
}

async fn run_session(
    stream: TcpStream,
    remote_addr: SocketAddr,
    options: Arc<ServerOptions>,
    shutdown: CancellationToken,
) {
    let (read_half, write_half) = stream.into_split();
    let mut session = Session::new(
        BufReader::new(read_half),
        write_half,
        remote_addr,
        options.clone(),
        shutdown,
    );

    for observer in &options.observers {
        observer.session_created(session.context());
    }
    // Protocol errors never get here; anything else ends the session
    // without a word to the peer.
    if let Err(error) = session.run().await {
        debug!("session from {remote_addr} ended with error: {error}");
    }
    for observer in &options.observers {
        observer.session_completed(session.context());
    }
}
