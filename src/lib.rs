//! # Jushin
//!
//! Jushin is an embeddable SMTP/ESMTP server.
//!
//! It accepts TCP connections from mail clients, walks each one through the
//! SMTP command/reply dialogue, parses the RFC 5321 address grammar, and
//! streams message content into a sink you supply. The server itself never
//! persists or forwards mail; what happens to a message is entirely the
//! host's decision.
//!
//! ## Quick Start
//!
//! ```no_run
//! use jushin::{ChannelStoreFactory, ServerOptions, SmtpServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Deliver completed messages to an in-process channel.
//!     let (store, mut inbox) = ChannelStoreFactory::new();
//!
//!     let options = ServerOptions::new("mail.local")
//!         .with_endpoint("127.0.0.1:2525".parse().unwrap())
//!         .with_message_store(store);
//!     let server = SmtpServer::new(options);
//!
//!     tokio::spawn(async move {
//!         while let Some(email) = inbox.recv().await {
//!             println!("mail from {:?} to {:?}", email.from, email.to);
//!         }
//!     });
//!
//!     server.serve(CancellationToken::new()).await.unwrap();
//! }
//! ```
//!
//! ## Supported SMTP commands
//!
//! - `HELO` / `EHLO` - Identify the client
//! - `MAIL FROM` - Open a transaction; ESMTP `SIZE=` is honored
//! - `RCPT TO` - Add a recipient (multiple recipients are supported)
//! - `DATA` - Stream the message body
//! - `RSET` - Reset the current transaction
//! - `NOOP` - Do nothing
//! - `QUIT` - Close the connection
//!
//! ## Plugging in policy
//!
//! Two traits connect the server to the host application:
//!
//! - [`MailboxFilter`] decides whether a sender or recipient is acceptable,
//!   per address, before any content is transferred.
//! - [`MessageStore`] consumes the message body line by line and produces
//!   the reply the client sees after the terminating `.`.
//!
//! Both are created through factories carried in [`ServerOptions`], one
//! instance per command scope, so implementations may keep per-transaction
//! state without synchronization.
//!
//! ## Notes
//!
//! - Mail relay, queueing, and MX lookup are not implemented.
//! - SMTP authentication is not supported.
//! - SSL/TLS connection is not supported.

mod smtp;

pub use smtp::*;
