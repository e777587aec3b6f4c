//! Session state machine

use crate::smtp::command::Command;

/// Where a session is in the SMTP dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no greeting yet
    WaitingForHelo,
    /// Greeted, no transaction open
    WaitingForMail,
    /// MAIL accepted, no recipients yet
    WithinTransaction,
    /// At least one recipient accepted
    CanAcceptData,
}

/// Decides whether a command is legal in the current state.
///
/// The machine is a pure function from `(state, command)` to the next state;
/// it performs no I/O and never touches the transaction. A `None` verdict
/// means the command must be refused with `503 bad sequence of commands`.
/// `Invalid` commands pass in every state: they carry their own reply and do
/// not move the session.
pub struct StateMachine;

impl StateMachine {
    pub fn transition(state: SessionState, command: &Command) -> Option<SessionState> {
        use SessionState::*;

        match (state, command) {
            (_, Command::Invalid { .. }) => Some(state),
            (_, Command::Noop) => Some(state),
            (_, Command::Quit) => Some(state),
            (WaitingForHelo, Command::Helo { .. } | Command::Ehlo { .. }) => Some(WaitingForMail),
            (WaitingForMail, Command::Helo { .. } | Command::Ehlo { .. }) => Some(WaitingForMail),
            (WaitingForMail, Command::Mail { .. }) => Some(WithinTransaction),
            (WaitingForMail, Command::Rset) => Some(WaitingForMail),
            (WithinTransaction, Command::Rcpt { .. }) => Some(CanAcceptData),
            (WithinTransaction, Command::Rset) => Some(WaitingForMail),
            (CanAcceptData, Command::Rcpt { .. }) => Some(CanAcceptData),
            (CanAcceptData, Command::Data) => Some(WaitingForMail),
            (CanAcceptData, Command::Rset) => Some(WaitingForMail),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::response::SmtpResponse;
    use crate::smtp::transaction::Mailbox;
    use SessionState::*;

    fn helo() -> Command {
        Command::Helo {
            domain: "client.local".to_string(),
        }
    }

    fn ehlo() -> Command {
        Command::Ehlo {
            domain: "client.local".to_string(),
        }
    }

    fn mail() -> Command {
        Command::Mail {
            from: Some(Mailbox::new("a", "x")),
            parameters: Default::default(),
        }
    }

    fn rcpt() -> Command {
        Command::Rcpt {
            to: Mailbox::new("b", "y"),
        }
    }

    fn accepts(state: SessionState, command: &Command) -> Option<SessionState> {
        StateMachine::transition(state, command)
    }

    #[test]
    fn test_greeting_opens_the_session() {
        assert_eq!(accepts(WaitingForHelo, &helo()), Some(WaitingForMail));
        assert_eq!(accepts(WaitingForHelo, &ehlo()), Some(WaitingForMail));
    }

    #[test]
    fn test_greeting_can_be_repeated_before_mail() {
        assert_eq!(accepts(WaitingForMail, &helo()), Some(WaitingForMail));
        assert_eq!(accepts(WaitingForMail, &ehlo()), Some(WaitingForMail));
    }

    #[test]
    fn test_greeting_rejected_mid_transaction() {
        assert_eq!(accepts(WithinTransaction, &helo()), None);
        assert_eq!(accepts(CanAcceptData, &ehlo()), None);
    }

    #[test]
    fn test_mail_requires_greeting() {
        assert_eq!(accepts(WaitingForHelo, &mail()), None);
        assert_eq!(accepts(WaitingForMail, &mail()), Some(WithinTransaction));
        assert_eq!(accepts(WithinTransaction, &mail()), None);
        assert_eq!(accepts(CanAcceptData, &mail()), None);
    }

    #[test]
    fn test_rcpt_requires_mail() {
        assert_eq!(accepts(WaitingForHelo, &rcpt()), None);
        assert_eq!(accepts(WaitingForMail, &rcpt()), None);
        assert_eq!(accepts(WithinTransaction, &rcpt()), Some(CanAcceptData));
        assert_eq!(accepts(CanAcceptData, &rcpt()), Some(CanAcceptData));
    }

    #[test]
    fn test_data_requires_recipients() {
        assert_eq!(accepts(WaitingForHelo, &Command::Data), None);
        assert_eq!(accepts(WaitingForMail, &Command::Data), None);
        assert_eq!(accepts(WithinTransaction, &Command::Data), None);
        assert_eq!(accepts(CanAcceptData, &Command::Data), Some(WaitingForMail));
    }

    #[test]
    fn test_rset_returns_to_waiting_for_mail() {
        assert_eq!(accepts(WaitingForHelo, &Command::Rset), None);
        assert_eq!(accepts(WaitingForMail, &Command::Rset), Some(WaitingForMail));
        assert_eq!(
            accepts(WithinTransaction, &Command::Rset),
            Some(WaitingForMail)
        );
        assert_eq!(accepts(CanAcceptData, &Command::Rset), Some(WaitingForMail));
    }

    #[test]
    fn test_noop_and_quit_allowed_everywhere() {
        for state in [WaitingForHelo, WaitingForMail, WithinTransaction, CanAcceptData] {
            assert_eq!(accepts(state, &Command::Noop), Some(state));
            assert_eq!(accepts(state, &Command::Quit), Some(state));
        }
    }

    #[test]
    fn test_invalid_commands_pass_without_moving() {
        let invalid = Command::Invalid {
            response: SmtpResponse::syntax_error(),
        };
        for state in [WaitingForHelo, WaitingForMail, WithinTransaction, CanAcceptData] {
            assert_eq!(accepts(state, &invalid), Some(state));
        }
    }
}
