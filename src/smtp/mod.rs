//! SMTP server implementation

pub mod command;
pub mod email;
pub mod error;
pub mod machine;
pub mod parser;
pub mod response;
pub mod server;
pub mod session;
pub mod store;
pub mod tokens;
pub mod transaction;

pub use command::{Command, CommandFactory};
pub use email::Email;
pub use error::{SmtpError, SmtpLimits};
pub use machine::{SessionState, StateMachine};
pub use parser::Parser;
pub use response::SmtpResponse;
pub use server::{ServerOptions, SmtpServer};
pub use session::{SessionContext, SessionObserver};
pub use store::{
    AcceptAllFilter, AcceptAllFilterFactory, ChannelStore, ChannelStoreFactory, DiscardStore,
    DiscardStoreFactory, FilterResult, MailboxFilter, MailboxFilterFactory, MessageStore,
    MessageStoreFactory,
};
pub use tokens::{Token, TokenCursor, TokenKind};
pub use transaction::{Mailbox, Transaction};
