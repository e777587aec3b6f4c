//! Per-connection session driver

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use log::debug;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::smtp::command::{Command, CommandFactory};
use crate::smtp::error::{SmtpError, SmtpLimits};
use crate::smtp::machine::{SessionState, StateMachine};
use crate::smtp::response::SmtpResponse;
use crate::smtp::server::ServerOptions;
use crate::smtp::store::{FilterResult, MessageStore};
use crate::smtp::transaction::{Mailbox, Transaction};

/// Everything a session knows about its connection.
///
/// Handed to mailbox filters, message stores, and session observers. Lives
/// exactly as long as the TCP connection.
#[derive(Debug)]
pub struct SessionContext {
    /// The peer's address
    pub remote_addr: SocketAddr,
    /// The envelope being assembled
    pub transaction: Transaction,
}

impl SessionContext {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            transaction: Transaction::new(),
        }
    }
}

/// Observes session lifecycle events.
///
/// Callbacks run on the session task and must not block.
pub trait SessionObserver: Send + Sync {
    /// Fired after the connection is accepted, before the first read.
    fn session_created(&self, _context: &SessionContext) {}

    /// Fired once the session has terminated, successfully or not.
    fn session_completed(&self, _context: &SessionContext) {}
}

enum Flow {
    Continue,
    Quit,
}

/// Drives one SMTP dialogue over a line-oriented transport.
///
/// Reads commands, consults the state machine, executes what is allowed, and
/// turns every protocol-level problem into an SMTP reply. Only transport
/// faults escape as errors, and the server logs those without telling the
/// peer.
pub(crate) struct Session<R, W> {
    reader: R,
    writer: W,
    context: SessionContext,
    options: Arc<ServerOptions>,
    state: SessionState,
    shutdown: CancellationToken,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(
        reader: R,
        writer: W,
        remote_addr: SocketAddr,
        options: Arc<ServerOptions>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            reader,
            writer,
            context: SessionContext::new(remote_addr),
            options,
            state: SessionState::WaitingForHelo,
            shutdown,
        }
    }

    pub(crate) fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Run the dialogue until QUIT, peer close, cancellation, or a transport
    /// fault.
    pub(crate) async fn run(&mut self) -> Result<(), SmtpError> {
        let greeting = SmtpResponse::service_ready(&self.options.server_name);
        self.send(&greeting).await?;

        loop {
            let shutdown = self.shutdown.clone();
            let line = tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = self.send(&SmtpResponse::closing()).await;
                    return Ok(());
                }
                line = self.read_line() => line?,
            };
            let Some(line) = line else {
                debug!("peer {} closed the connection", self.context.remote_addr);
                return Ok(());
            };

            if line.len() + 2 > SmtpLimits::COMMAND_LINE_MAX_LENGTH {
                self.send(&SmtpResponse::line_too_long()).await?;
                continue;
            }

            let command = CommandFactory::create(&line);
            match self.dispatch(command).await? {
                Flow::Continue => {}
                Flow::Quit => return Ok(()),
            }
        }
    }

    /// Read one CRLF-terminated line, stripping the terminator. `None` means
    /// the peer closed the connection.
    async fn read_line(&mut self) -> Result<Option<String>, SmtpError> {
        let mut buffer = Vec::new();
        let read = self.reader.read_until(b'\n', &mut buffer).await?;
        if read == 0 {
            return Ok(None);
        }
        let mut line = String::from_utf8_lossy(&buffer).into_owned();
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    async fn send(&mut self, response: &SmtpResponse) -> Result<(), SmtpError> {
        self.writer.write_all(response.render().as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn dispatch(&mut self, command: Command) -> Result<Flow, SmtpError> {
        let Some(next) = StateMachine::transition(self.state, &command) else {
            self.send(&SmtpResponse::bad_sequence()).await?;
            return Ok(Flow::Continue);
        };

        match command {
            Command::Helo { domain } => {
                let reply = SmtpResponse::helo(&self.options.server_name, &domain);
                self.send(&reply).await?;
                self.state = next;
            }
            Command::Ehlo { domain } => {
                let extensions = self.options.supported_extensions();
                let reply = SmtpResponse::ehlo(&self.options.server_name, &domain, &extensions);
                self.send(&reply).await?;
                self.state = next;
            }
            Command::Mail { from, parameters } => {
                if self.execute_mail(from, &parameters).await? {
                    self.state = next;
                }
            }
            Command::Rcpt { to } => {
                if self.execute_rcpt(to).await? {
                    self.state = next;
                }
            }
            Command::Data => {
                self.execute_data().await?;
                self.context.transaction.reset();
                self.state = next;
            }
            Command::Rset => {
                self.context.transaction.reset();
                self.send(&SmtpResponse::ok()).await?;
                self.state = next;
            }
            Command::Noop => {
                self.send(&SmtpResponse::ok()).await?;
            }
            Command::Quit => {
                self.send(&SmtpResponse::closing()).await?;
                return Ok(Flow::Quit);
            }
            Command::Invalid { response } => {
                self.send(&response).await?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Execute MAIL; returns whether the transaction was opened.
    async fn execute_mail(
        &mut self,
        from: Option<Mailbox>,
        parameters: &HashMap<String, String>,
    ) -> Result<bool, SmtpError> {
        self.context.transaction.reset();

        let size = match parameters.get("SIZE") {
            None => 0,
            Some(value) => match value.parse::<u64>() {
                Ok(size) => size,
                Err(_) => {
                    self.send(&SmtpResponse::syntax_error()).await?;
                    return Ok(false);
                }
            },
        };
        let max = self.options.max_message_size;
        if max > 0 && size > max {
            self.send(&SmtpResponse::size_limit_exceeded()).await?;
            return Ok(false);
        }

        let mut filter = self.options.mailbox_filter_factory.create(&self.context);
        let verdict = filter
            .can_accept_from(&self.context, from.as_ref(), size)
            .await;
        drop(filter);

        match verdict {
            FilterResult::Yes => {
                self.context.transaction.from = from;
                self.send(&SmtpResponse::ok()).await?;
                Ok(true)
            }
            FilterResult::NoTemporarily => {
                self.send(&SmtpResponse::mailbox_unavailable()).await?;
                Ok(false)
            }
            FilterResult::NoPermanently => {
                self.send(&SmtpResponse::mailbox_name_not_allowed()).await?;
                Ok(false)
            }
            FilterResult::SizeLimitExceeded => {
                self.send(&SmtpResponse::size_limit_exceeded()).await?;
                Ok(false)
            }
        }
    }

    /// Execute RCPT; returns whether the recipient was added.
    async fn execute_rcpt(&mut self, to: Mailbox) -> Result<bool, SmtpError> {
        if self.context.transaction.to.len() >= SmtpLimits::MAX_RECIPIENTS {
            self.send(&SmtpResponse::too_many_recipients()).await?;
            return Ok(false);
        }

        let mut filter = self.options.mailbox_filter_factory.create(&self.context);
        let verdict = filter
            .can_deliver_to(&self.context, &to, self.context.transaction.from.as_ref())
            .await;
        drop(filter);

        match verdict {
            FilterResult::Yes => {
                self.context.transaction.to.push(to);
                self.send(&SmtpResponse::ok()).await?;
                Ok(true)
            }
            FilterResult::NoTemporarily => {
                self.send(&SmtpResponse::mailbox_unavailable()).await?;
                Ok(false)
            }
            FilterResult::NoPermanently => {
                self.send(&SmtpResponse::mailbox_name_not_allowed()).await?;
                Ok(false)
            }
            FilterResult::SizeLimitExceeded => {
                self.send(&SmtpResponse::size_limit_exceeded()).await?;
                Ok(false)
            }
        }
    }

    /// Execute DATA: go-ahead, store lifecycle, body streaming, final reply.
    async fn execute_data(&mut self) -> Result<(), SmtpError> {
        // The state machine already guards this; kept as a second line of
        // defense.
        if self.context.transaction.to.is_empty() {
            self.send(&SmtpResponse::no_valid_recipients()).await?;
            return Ok(());
        }

        self.send(&SmtpResponse::start_mail_input()).await?;

        let mut store = self.options.message_store_factory.create(&self.context);
        let reply = self.receive_body(store.as_mut()).await?;
        drop(store);
        self.send(&reply).await
    }

    /// Stream body lines into the store until the `<CRLF>.<CRLF>` terminator.
    ///
    /// Undoes dot-stuffing, preserves blank lines between content one-for-one
    /// and absorbs blanks directly in front of the terminator. Store faults
    /// become `554 transaction failed`; only transport faults propagate.
    async fn receive_body(
        &mut self,
        store: &mut dyn MessageStore,
    ) -> Result<SmtpResponse, SmtpError> {
        match store.begin_write().await {
            Ok(response) if response.code == 250 => {}
            Ok(response) => return Ok(response),
            Err(error) => {
                debug!("message store refused to start: {error}");
                return Ok(SmtpResponse::transaction_failed());
            }
        }

        let mut pending_blanks = 0usize;
        loop {
            let shutdown = self.shutdown.clone();
            let line = tokio::select! {
                _ = shutdown.cancelled() => return Ok(SmtpResponse::transaction_failed()),
                line = self.read_line() => line?,
            };
            let Some(line) = line else {
                return Err(SmtpError::ConnectionClosed);
            };

            if line == "." {
                break;
            }
            // Undo dot-stuffing (RFC 5321 section 4.5.2).
            let content = if line.len() > 1 && line.starts_with('.') {
                &line[1..]
            } else {
                line.as_str()
            };
            if content.is_empty() {
                // Held back until the next content line; blanks in front of
                // the terminator are never delivered.
                pending_blanks += 1;
                continue;
            }
            while pending_blanks > 0 {
                if let Err(error) = store.write_line("").await {
                    debug!("message store rejected a line: {error}");
                    return Ok(SmtpResponse::transaction_failed());
                }
                pending_blanks -= 1;
            }
            if let Err(error) = store.write_line(content).await {
                debug!("message store rejected a line: {error}");
                return Ok(SmtpResponse::transaction_failed());
            }
        }

        match store.end_write().await {
            Ok(response) => Ok(response),
            Err(error) => {
                debug!("message store failed to complete: {error}");
                Ok(SmtpResponse::transaction_failed())
            }
        }
    }
}
