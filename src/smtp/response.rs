//! SMTP response handling

/// Represents an SMTP reply that can be sent to a client.
///
/// Most replies carry a single line of text; EHLO answers with one line per
/// supported extension. The numeric code is shared by every line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpResponse {
    /// The SMTP reply code (e.g. 250, 354, 501)
    pub code: u16,
    /// The human-readable text, one entry per reply line
    pub lines: Vec<String>,
}

impl SmtpResponse {
    /// Create a single-line response
    pub fn new(code: u16, text: &str) -> Self {
        Self {
            code,
            lines: vec![text.to_string()],
        }
    }

    /// Create a multi-line response
    pub fn with_lines(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Create a greeting response (220)
    pub fn service_ready(server_name: &str) -> Self {
        Self::new(220, &format!("{server_name} ESMTP service ready"))
    }

    /// Create a QUIT response (221)
    pub fn closing() -> Self {
        Self::new(221, "service closing transmission channel")
    }

    /// Create a success response (250 Ok)
    pub fn ok() -> Self {
        Self::new(250, "Ok")
    }

    /// Create a HELO response (250)
    pub fn helo(server_name: &str, client_domain: &str) -> Self {
        Self::new(250, &format!("{server_name} Hello {client_domain}"))
    }

    /// Create an EHLO response (250), one extra line per extension
    pub fn ehlo(server_name: &str, client_domain: &str, extensions: &[String]) -> Self {
        let mut lines = vec![format!("{server_name} Hello {client_domain}")];
        lines.extend(extensions.iter().cloned());
        Self::with_lines(250, lines)
    }

    /// Create a DATA intermediate response (354)
    pub fn start_mail_input() -> Self {
        Self::new(354, "start mail input, end with <CRLF>.<CRLF>")
    }

    /// Create a transient mailbox-unavailable response (450)
    pub fn mailbox_unavailable() -> Self {
        Self::new(450, "mailbox unavailable")
    }

    /// Create a size-limit response (452)
    pub fn size_limit_exceeded() -> Self {
        Self::new(452, "size limit exceeded")
    }

    /// Create a too-many-recipients response (452)
    pub fn too_many_recipients() -> Self {
        Self::new(452, "too many recipients")
    }

    /// Create an unknown-verb response (500)
    pub fn command_unrecognized() -> Self {
        Self::new(500, "command unrecognized")
    }

    /// Create an over-long-line response (500)
    pub fn line_too_long() -> Self {
        Self::new(500, "line too long")
    }

    /// Create a syntax-error response (501)
    pub fn syntax_error() -> Self {
        Self::new(501, "syntax error")
    }

    /// Create a bad-sequence response (503)
    pub fn bad_sequence() -> Self {
        Self::new(503, "bad sequence of commands")
    }

    /// Create an authentication-required response (530)
    pub fn authentication_required() -> Self {
        Self::new(530, "authentication required")
    }

    /// Create a permanent mailbox rejection (550)
    pub fn mailbox_name_not_allowed() -> Self {
        Self::new(550, "mailbox name not allowed")
    }

    /// Create a DATA-without-recipients response (554)
    pub fn no_valid_recipients() -> Self {
        Self::new(554, "no valid recipients given")
    }

    /// Create a failed-transaction response (554)
    pub fn transaction_failed() -> Self {
        Self::new(554, "transaction failed")
    }

    /// Format the response for sending over the wire.
    ///
    /// All lines but the last use the `250-text` continuation form; the last
    /// uses `250 text`.
    pub fn render(&self) -> String {
        let mut wire = String::new();
        let last = self.lines.len().saturating_sub(1);
        for (i, line) in self.lines.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            wire.push_str(&format!("{}{}{}\r\n", self.code, separator, line));
        }
        if self.lines.is_empty() {
            wire.push_str(&format!("{}\r\n", self.code));
        }
        wire
    }

    /// Check if this is a success response (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Check if this is an error response (4xx or 5xx)
    pub fn is_error(&self) -> bool {
        (400..600).contains(&self.code)
    }
}
