//! Error types for the SMTP server

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    #[error("message store failure: {0}")]
    Store(String),
}

/// SMTP size limits as defined in RFC 5321
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of a command line including CRLF
    pub const COMMAND_LINE_MAX_LENGTH: usize = 512;

    /// Maximum number of recipients per message
    pub const MAX_RECIPIENTS: usize = 100;
}
