//! Email data structures and functionality

use std::time::SystemTime;

/// A message assembled from one completed mail transaction.
///
/// Produced by the bundled channel-backed message store; hosts that plug in
/// their own store are free to represent messages differently.
#[derive(Debug, Clone)]
pub struct Email {
    /// The envelope sender; `None` for the null reverse path `<>`
    pub from: Option<String>,

    /// The envelope recipients
    pub to: Vec<String>,

    /// The message content, headers and body, lines joined with `\n`
    pub data: String,

    /// When the message was received by the server
    pub timestamp: SystemTime,
}

impl Email {
    /// Create a new email
    pub fn new(from: Option<String>, to: Vec<String>, data: String) -> Self {
        Self {
            from,
            to,
            data,
            timestamp: SystemTime::now(),
        }
    }

    /// Check if this email was sent to a specific recipient
    pub fn has_recipient(&self, recipient: &str) -> bool {
        self.to.iter().any(|addr| addr == recipient)
    }

    /// Check if this email was sent from a specific sender
    pub fn is_from_sender(&self, sender: &str) -> bool {
        self.from.as_deref() == Some(sender)
    }

    /// Get the size of the email data in bytes
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Get the subject line from the email headers (if present)
    pub fn subject(&self) -> Option<&str> {
        for line in self.data.lines() {
            if line.is_empty() {
                // End of headers
                break;
            }
            if let Some(subject) = line.strip_prefix("Subject: ") {
                return Some(subject);
            }
            if let Some(subject) = line.strip_prefix("subject: ") {
                return Some(subject);
            }
        }
        None
    }

    /// Get the message body (content after the first empty line)
    pub fn body(&self) -> Option<&str> {
        let mut offset = 0;
        for line in self.data.lines() {
            if line.is_empty() {
                let start = offset + 1;
                return (start < self.data.len()).then(|| &self.data[start..]);
            }
            offset += line.len() + 1;
        }
        None
    }

    /// Check if the email contains a specific text in headers or body
    pub fn contains_text(&self, text: &str) -> bool {
        self.data.contains(text)
    }
}
