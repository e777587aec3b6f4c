//! SMTP command model and the line-to-command factory

use std::collections::HashMap;

use crate::smtp::parser::Parser;
use crate::smtp::response::SmtpResponse;
use crate::smtp::tokens::{TokenCursor, TokenKind};
use crate::smtp::transaction::Mailbox;

/// A parsed SMTP command.
///
/// Lines that carry a recognized verb with an unparsable argument, or an
/// unknown verb altogether, become [`Command::Invalid`] holding the reply the
/// session should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo {
        domain: String,
    },
    Ehlo {
        domain: String,
    },
    Mail {
        from: Option<Mailbox>,
        parameters: HashMap<String, String>,
    },
    Rcpt {
        to: Mailbox,
    },
    Data,
    Rset,
    Noop,
    Quit,
    Invalid {
        response: SmtpResponse,
    },
}

/// Builds [`Command`] values from raw command lines.
pub struct CommandFactory;

impl CommandFactory {
    /// Parse one command line (CR/LF already stripped).
    pub fn create(line: &str) -> Command {
        let mut cursor = TokenCursor::new(line);
        if cursor.peek().kind == TokenKind::Space {
            cursor.take();
        }
        if cursor.peek().kind != TokenKind::Text {
            return Command::Invalid {
                response: SmtpResponse::command_unrecognized(),
            };
        }
        let verb = cursor.take().text.to_ascii_uppercase();
        let mut parser = Parser::new(&mut cursor);

        match verb.as_str() {
            "HELO" => Self::make_greeting(&mut parser)
                .map(|domain| Command::Helo { domain })
                .unwrap_or_else(Self::invalid_syntax),
            "EHLO" => Self::make_greeting(&mut parser)
                .map(|domain| Command::Ehlo { domain })
                .unwrap_or_else(Self::invalid_syntax),
            "MAIL" => Self::make_mail(&mut parser).unwrap_or_else(Self::invalid_syntax),
            "RCPT" => Self::make_rcpt(&mut parser).unwrap_or_else(Self::invalid_syntax),
            "DATA" => Self::make_bare(&mut parser, Command::Data).unwrap_or_else(Self::invalid_syntax),
            "RSET" => Self::make_bare(&mut parser, Command::Rset).unwrap_or_else(Self::invalid_syntax),
            "QUIT" => Self::make_bare(&mut parser, Command::Quit).unwrap_or_else(Self::invalid_syntax),
            // NOOP takes an optional string which is ignored.
            "NOOP" => Command::Noop,
            _ => Command::Invalid {
                response: SmtpResponse::command_unrecognized(),
            },
        }
    }

    fn invalid_syntax() -> Command {
        Command::Invalid {
            response: SmtpResponse::syntax_error(),
        }
    }

    /// `HELO Domain` / `EHLO Domain` — an address literal is accepted in
    /// place of the domain.
    fn make_greeting(parser: &mut Parser<'_>) -> Option<String> {
        parser.take_spaces()?;
        let domain = parser
            .try_make_domain()
            .or_else(|| parser.try_make_address_literal())?;
        parser.skip_spaces();
        parser.at_end().then_some(domain)
    }

    /// `MAIL FROM:<reverse-path> [SP mail-parameters]`
    fn make_mail(parser: &mut Parser<'_>) -> Option<Command> {
        parser.take_spaces()?;
        let tag = parser.take_text()?;
        if !tag.eq_ignore_ascii_case("FROM") {
            return None;
        }
        parser.take_char(':')?;
        parser.skip_spaces();
        let from = parser.try_make_reverse_path()?;
        let parameters = parser
            .backtrack(|p| {
                p.take_spaces()?;
                p.try_make_mail_parameters()
            })
            .unwrap_or_default();
        parser.skip_spaces();
        parser.at_end().then_some(Command::Mail { from, parameters })
    }

    /// `RCPT TO:<forward-path>` — the forward path is never null.
    fn make_rcpt(parser: &mut Parser<'_>) -> Option<Command> {
        parser.take_spaces()?;
        let tag = parser.take_text()?;
        if !tag.eq_ignore_ascii_case("TO") {
            return None;
        }
        parser.take_char(':')?;
        parser.skip_spaces();
        let to = parser.try_make_path()?;
        parser.skip_spaces();
        parser.at_end().then_some(Command::Rcpt { to })
    }

    /// A verb that accepts no argument.
    fn make_bare(parser: &mut Parser<'_>, command: Command) -> Option<Command> {
        parser.skip_spaces();
        parser.at_end().then_some(command)
    }
}
