//! Backtracking recognizers for the RFC 5321 address grammar
//!
//! Every `try_make_*` recognizer either succeeds, returning the produced
//! value with the cursor advanced past the consumed tokens, or fails and
//! leaves the cursor exactly where it was. Alternatives and lookaheads are
//! wrapped in checkpoints so a failing branch leaves no trace.

use std::collections::HashMap;

use crate::smtp::tokens::{Token, TokenCursor, TokenKind};
use crate::smtp::transaction::Mailbox;

/// Specials accepted inside an atom, per the RFC 5321 `atext` set.
const ATEXT_SPECIALS: &[char] = &[
    '!', '#', '%', '&', '\'', '*', '-', '/', '?', '_', '{', '}', '$', '+', '=', '^', '`', '|', '~',
];

fn is_atext(token: &Token) -> bool {
    match token.kind {
        TokenKind::Text | TokenKind::Number => true,
        TokenKind::Punctuation | TokenKind::Symbol => {
            token.is_char(|c| ATEXT_SPECIALS.contains(&c))
        }
        _ => false,
    }
}

/// RFC 5321 grammar recognizers over a [`TokenCursor`].
pub struct Parser<'a> {
    cursor: &'a mut TokenCursor,
}

impl<'a> Parser<'a> {
    pub fn new(cursor: &'a mut TokenCursor) -> Self {
        Self { cursor }
    }

    /// Run `parse`, restoring the cursor position when it fails.
    pub(crate) fn backtrack<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Option<T>,
    ) -> Option<T> {
        let mark = self.cursor.checkpoint();
        let result = parse(self);
        if result.is_none() {
            self.cursor.rollback(mark);
        }
        result
    }

    /// Consume a one-character token equal to `ch`.
    pub(crate) fn take_char(&mut self, ch: char) -> Option<()> {
        if self.cursor.peek().is_char(|c| c == ch) {
            self.cursor.take();
            Some(())
        } else {
            None
        }
    }

    /// Consume a `Text` token and return its text.
    pub(crate) fn take_text(&mut self) -> Option<String> {
        if self.cursor.peek().kind == TokenKind::Text {
            Some(self.cursor.take().text)
        } else {
            None
        }
    }

    /// Consume one whitespace run; fails if the next token is not whitespace.
    pub(crate) fn take_spaces(&mut self) -> Option<()> {
        if self.cursor.peek().kind == TokenKind::Space {
            self.cursor.take();
            Some(())
        } else {
            None
        }
    }

    /// Consume any whitespace at the cursor.
    pub(crate) fn skip_spaces(&mut self) {
        while self.cursor.peek().kind == TokenKind::Space {
            self.cursor.take();
        }
    }

    /// True once the whole line has been consumed.
    pub(crate) fn at_end(&self) -> bool {
        self.cursor.at_end()
    }

    /// `ReversePath ::= Path | "<" Space* ">"`
    ///
    /// The empty form denotes the null sender and yields `None` for the
    /// mailbox.
    pub fn try_make_reverse_path(&mut self) -> Option<Option<Mailbox>> {
        if let Some(mailbox) = self.try_make_path() {
            return Some(Some(mailbox));
        }
        self.backtrack(|p| {
            p.take_char('<')?;
            p.skip_spaces();
            p.take_char('>')?;
            Some(None)
        })
    }

    /// `Path ::= "<"? (AtDomainList ":")? Mailbox ">"?`
    ///
    /// A consumed opening bracket requires the closing one. The at-domain
    /// route list is obsolete (RFC 5321 appendix C): it is recognized and
    /// discarded. Whitespace inside the brackets is tolerated.
    pub fn try_make_path(&mut self) -> Option<Mailbox> {
        self.backtrack(|p| {
            let bracketed = p.take_char('<').is_some();
            if bracketed {
                p.skip_spaces();
            }
            p.backtrack(|p| {
                p.try_make_at_domain_list()?;
                p.take_char(':')
            });
            let mailbox = p.try_make_mailbox()?;
            if bracketed {
                p.skip_spaces();
                p.take_char('>')?;
            } else {
                let _ = p.take_char('>');
            }
            Some(mailbox)
        })
    }

    fn try_make_at_domain_list(&mut self) -> Option<()> {
        self.backtrack(|p| {
            p.try_make_at_domain()?;
            while p
                .backtrack(|p| {
                    p.take_char(',')?;
                    p.try_make_at_domain()
                })
                .is_some()
            {}
            Some(())
        })
    }

    fn try_make_at_domain(&mut self) -> Option<()> {
        self.backtrack(|p| {
            p.take_char('@')?;
            p.try_make_domain().map(|_| ())
        })
    }

    /// `Mailbox ::= LocalPart "@" (Domain | AddressLiteral)`
    pub fn try_make_mailbox(&mut self) -> Option<Mailbox> {
        self.backtrack(|p| {
            let local_part = p.try_make_local_part()?;
            p.take_char('@')?;
            let domain = p
                .try_make_domain()
                .or_else(|| p.try_make_address_literal())?;
            Some(Mailbox::new(local_part, domain))
        })
    }

    /// `LocalPart ::= DotString`
    ///
    /// Quoted-string local parts are not supported.
    pub fn try_make_local_part(&mut self) -> Option<String> {
        self.try_make_dot_string()
    }

    /// `DotString ::= Atom ("." Atom)*`
    fn try_make_dot_string(&mut self) -> Option<String> {
        self.backtrack(|p| {
            let mut text = p.try_make_atom()?;
            while let Some(atom) = p.backtrack(|p| {
                p.take_char('.')?;
                p.try_make_atom()
            }) {
                text.push('.');
                text.push_str(&atom);
            }
            Some(text)
        })
    }

    /// `Atom ::= Atext+`
    fn try_make_atom(&mut self) -> Option<String> {
        let mut text = String::new();
        while is_atext(self.cursor.peek()) {
            text.push_str(&self.cursor.take().text);
        }
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// `Domain ::= Subdomain ("." Subdomain)*`
    pub fn try_make_domain(&mut self) -> Option<String> {
        self.backtrack(|p| {
            let mut domain = p.try_make_subdomain()?;
            while let Some(subdomain) = p.backtrack(|p| {
                p.take_char('.')?;
                p.try_make_subdomain()
            }) {
                domain.push('.');
                domain.push_str(&subdomain);
            }
            Some(domain)
        })
    }

    /// `Subdomain ::= TextOrNumber LdhString?`
    fn try_make_subdomain(&mut self) -> Option<String> {
        self.backtrack(|p| {
            let mut text = match p.cursor.peek().kind {
                TokenKind::Text | TokenKind::Number => p.cursor.take().text,
                _ => return None,
            };
            if let Some(ldh) = p.try_make_ldh_string() {
                text.push_str(&ldh);
            }
            Some(text)
        })
    }

    /// One or more letter/digit/`-` tokens; the run must not end with `-`.
    fn try_make_ldh_string(&mut self) -> Option<String> {
        self.backtrack(|p| {
            let text = p.cursor.take_while(|t| {
                matches!(t.kind, TokenKind::Text | TokenKind::Number) || t.is_char(|c| c == '-')
            });
            if text.is_empty() || text.ends_with('-') {
                None
            } else {
                Some(text)
            }
        })
    }

    /// `AddressLiteral ::= "[" Space* IPv4 Space* "]"`
    ///
    /// Produces the bare address, without the brackets.
    pub fn try_make_address_literal(&mut self) -> Option<String> {
        self.backtrack(|p| {
            p.take_char('[')?;
            p.skip_spaces();
            let address = p.try_make_ipv4_address_literal()?;
            p.skip_spaces();
            p.take_char(']')?;
            Some(address)
        })
    }

    /// Four dot-separated decimal octets.
    pub fn try_make_ipv4_address_literal(&mut self) -> Option<String> {
        self.backtrack(|p| {
            let mut address = p.try_make_snum()?.to_string();
            for _ in 0..3 {
                p.take_char('.')?;
                let octet = p.try_make_snum()?;
                address.push('.');
                address.push_str(&octet.to_string());
            }
            Some(address)
        })
    }

    /// A decimal number in the range [0, 255].
    pub fn try_make_snum(&mut self) -> Option<u8> {
        self.backtrack(|p| {
            if p.cursor.peek().kind != TokenKind::Number {
                return None;
            }
            p.cursor.take().text.parse::<u8>().ok()
        })
    }

    /// `MailParameters ::= EsmtpParameter (Space+ EsmtpParameter)*`
    ///
    /// Keys are folded to upper case so lookups are case-insensitive.
    pub fn try_make_mail_parameters(&mut self) -> Option<HashMap<String, String>> {
        self.backtrack(|p| {
            let mut parameters = HashMap::new();
            let (keyword, value) = p.try_make_esmtp_parameter()?;
            parameters.insert(keyword, value);
            while let Some((keyword, value)) = p.backtrack(|p| {
                p.take_spaces()?;
                p.try_make_esmtp_parameter()
            }) {
                parameters.insert(keyword, value);
            }
            Some(parameters)
        })
    }

    /// `EsmtpParameter ::= Keyword "=" Value`
    pub fn try_make_esmtp_parameter(&mut self) -> Option<(String, String)> {
        self.backtrack(|p| {
            let keyword = p.try_make_esmtp_keyword()?;
            p.take_char('=')?;
            let value = p.try_make_esmtp_value()?;
            Some((keyword.to_ascii_uppercase(), value))
        })
    }

    /// `Keyword ::= (ALPHA | DIGIT) (ALPHA | DIGIT | "-")*`
    fn try_make_esmtp_keyword(&mut self) -> Option<String> {
        self.backtrack(|p| {
            let mut keyword = match p.cursor.peek().kind {
                TokenKind::Text | TokenKind::Number => p.cursor.take().text,
                _ => return None,
            };
            keyword.push_str(&p.cursor.take_while(|t| {
                matches!(t.kind, TokenKind::Text | TokenKind::Number) || t.is_char(|c| c == '-')
            }));
            Some(keyword)
        })
    }

    /// One or more printable characters in 33..=126, excluding `=`.
    fn try_make_esmtp_value(&mut self) -> Option<String> {
        let text = self.cursor.take_while(|t| {
            matches!(
                t.kind,
                TokenKind::Text | TokenKind::Number | TokenKind::Punctuation | TokenKind::Symbol
            ) && t.text.chars().all(|c| matches!(c, '!'..='<' | '>'..='~'))
        });
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// One or more base64 alphabet tokens whose total length is a multiple
    /// of four.
    pub fn try_make_base64(&mut self) -> Option<String> {
        self.backtrack(|p| {
            let text = p.cursor.take_while(|t| {
                matches!(t.kind, TokenKind::Text | TokenKind::Number)
                    || t.is_char(|c| c == '+' || c == '/')
            });
            if text.is_empty() || text.len() % 4 != 0 {
                None
            } else {
                Some(text)
            }
        })
    }
}
