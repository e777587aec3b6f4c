//! The mail envelope being assembled by MAIL and RCPT

use std::fmt;

/// An SMTP mailbox: the `local@domain` pair inside a path.
///
/// A mailbox is immutable once constructed. The null reverse path `<>` is
/// represented by the absence of a mailbox (`Option<Mailbox>::None`), never by
/// empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    local_part: String,
    domain: String,
}

impl Mailbox {
    pub fn new(local_part: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local_part: local_part.into(),
            domain: domain.into(),
        }
    }

    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The `local@domain` rendering of this mailbox.
    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// The in-progress envelope of a mail transaction.
///
/// `from` is set only after a successful MAIL command and `to` grows by one
/// per successful RCPT. The transaction is reset on connection setup, on
/// RSET, and at the start of every MAIL.
#[derive(Debug, Default)]
pub struct Transaction {
    /// Sender from MAIL FROM; `None` both before MAIL and for the null sender
    pub from: Option<Mailbox>,
    /// Recipients accumulated by RCPT TO
    pub to: Vec<Mailbox>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the envelope
    pub fn reset(&mut self) {
        self.from = None;
        self.to.clear();
    }
}
