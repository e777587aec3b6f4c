//! Pluggable mailbox acceptance and message storage
//!
//! The server never persists or forwards mail itself. Hosts decide which
//! senders and recipients to accept by supplying a [`MailboxFilterFactory`],
//! and consume message content by supplying a [`MessageStoreFactory`]. The
//! bundled implementations accept everything and either discard the content
//! or hand assembled [`Email`] values to a channel.

use async_trait::async_trait;
use log::warn;
use tokio::sync::mpsc;

use crate::smtp::email::Email;
use crate::smtp::error::SmtpError;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SessionContext;
use crate::smtp::transaction::Mailbox;

/// A mailbox filter's verdict on a sender or recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// Accept the mailbox
    Yes,
    /// Refuse with a transient error (450); the client may retry
    NoTemporarily,
    /// Refuse permanently (550)
    NoPermanently,
    /// Refuse because the declared message size is too large (452)
    SizeLimitExceeded,
}

/// Decides whether senders and recipients are allowed.
///
/// An instance is created per command execution and dropped before the
/// command returns, so implementations may hold per-decision state.
#[async_trait]
pub trait MailboxFilter: Send {
    /// Judge the reverse path of a MAIL command. `from` is `None` for the
    /// null sender and `size` is the declared `SIZE=` parameter (0 when
    /// absent).
    async fn can_accept_from(
        &mut self,
        context: &SessionContext,
        from: Option<&Mailbox>,
        size: u64,
    ) -> FilterResult;

    /// Judge the forward path of a RCPT command.
    async fn can_deliver_to(
        &mut self,
        context: &SessionContext,
        to: &Mailbox,
        from: Option<&Mailbox>,
    ) -> FilterResult;
}

/// Creates a [`MailboxFilter`] for a command scope.
pub trait MailboxFilterFactory: Send + Sync {
    fn create(&self, context: &SessionContext) -> Box<dyn MailboxFilter>;
}

/// Consumes the message content of one DATA command.
///
/// The store is created when DATA begins and dropped when DATA completes or
/// fails, whatever the outcome; `Drop` is the place for cleanup. Errors from
/// any method abort the transaction with `554 transaction failed`.
#[async_trait]
pub trait MessageStore: Send {
    /// Called once before any content line. A non-250 response is forwarded
    /// to the client and the transaction is aborted.
    async fn begin_write(&mut self) -> Result<SmtpResponse, SmtpError>;

    /// Called once per content line, dot-stuffing already undone.
    async fn write_line(&mut self, line: &str) -> Result<(), SmtpError>;

    /// Called once after the terminator; the response is forwarded to the
    /// client.
    async fn end_write(&mut self) -> Result<SmtpResponse, SmtpError>;
}

/// Creates a [`MessageStore`] for one DATA command. The envelope being
/// delivered is `context.transaction`.
pub trait MessageStoreFactory: Send + Sync {
    fn create(&self, context: &SessionContext) -> Box<dyn MessageStore>;
}

/// A filter that accepts every sender and recipient.
#[derive(Debug, Default)]
pub struct AcceptAllFilter;

#[async_trait]
impl MailboxFilter for AcceptAllFilter {
    async fn can_accept_from(
        &mut self,
        _context: &SessionContext,
        _from: Option<&Mailbox>,
        _size: u64,
    ) -> FilterResult {
        FilterResult::Yes
    }

    async fn can_deliver_to(
        &mut self,
        _context: &SessionContext,
        _to: &Mailbox,
        _from: Option<&Mailbox>,
    ) -> FilterResult {
        FilterResult::Yes
    }
}

/// Factory for [`AcceptAllFilter`]; the default acceptance policy.
#[derive(Debug, Default)]
pub struct AcceptAllFilterFactory;

impl MailboxFilterFactory for AcceptAllFilterFactory {
    fn create(&self, _context: &SessionContext) -> Box<dyn MailboxFilter> {
        Box::new(AcceptAllFilter)
    }
}

/// A store that acknowledges everything and drops the content.
#[derive(Debug, Default)]
pub struct DiscardStore;

#[async_trait]
impl MessageStore for DiscardStore {
    async fn begin_write(&mut self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::ok())
    }

    async fn write_line(&mut self, _line: &str) -> Result<(), SmtpError> {
        Ok(())
    }

    async fn end_write(&mut self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::ok())
    }
}

/// Factory for [`DiscardStore`]; the default sink.
#[derive(Debug, Default)]
pub struct DiscardStoreFactory;

impl MessageStoreFactory for DiscardStoreFactory {
    fn create(&self, _context: &SessionContext) -> Box<dyn MessageStore> {
        Box::new(DiscardStore)
    }
}

/// A store that assembles the transaction into an [`Email`] and sends it
/// down a channel when the message is complete.
pub struct ChannelStore {
    sender: mpsc::UnboundedSender<Email>,
    from: Option<String>,
    to: Vec<String>,
    lines: Vec<String>,
}

#[async_trait]
impl MessageStore for ChannelStore {
    async fn begin_write(&mut self) -> Result<SmtpResponse, SmtpError> {
        Ok(SmtpResponse::ok())
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SmtpError> {
        self.lines.push(line.to_string());
        Ok(())
    }

    async fn end_write(&mut self) -> Result<SmtpResponse, SmtpError> {
        let email = Email::new(
            self.from.take(),
            std::mem::take(&mut self.to),
            self.lines.join("\n"),
        );
        // A dropped receiver only means nobody is listening any more.
        if self.sender.send(email).is_err() {
            warn!("email receiver dropped, message discarded");
        }
        Ok(SmtpResponse::ok())
    }
}

/// Creates [`ChannelStore`] instances delivering to one receiver.
pub struct ChannelStoreFactory {
    sender: mpsc::UnboundedSender<Email>,
}

impl ChannelStoreFactory {
    /// Build the factory plus the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Email>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl MessageStoreFactory for ChannelStoreFactory {
    fn create(&self, context: &SessionContext) -> Box<dyn MessageStore> {
        Box::new(ChannelStore {
            sender: self.sender.clone(),
            from: context.transaction.from.as_ref().map(Mailbox::address),
            to: context.transaction.to.iter().map(Mailbox::address).collect(),
            lines: Vec::new(),
        })
    }
}
