use std::{iter::Peekable, str::Chars};

use super::{Host, ParseHostError};

/// Parser for seed lists of the form `host[:tls-name][:port][,...]`. IPv6 addresses are written
/// in brackets, like `[::1]:3000`.
pub(super) struct Parser<'a> {
    s: Peekable<Chars<'a>>,
    default_port: u16,
}

impl<'a> Parser<'a> {
    pub(super) fn new(s: &'a str, default_port: u16) -> Self {
        Parser {
            s: s.chars().peekable(),
            default_port,
        }
    }

    pub(super) fn read_hosts(&mut self) -> Result<Vec<Host>, ParseHostError> {
        let mut hosts = Vec::new();
        loop {
            self.skip_whitespace();
            let addr = self.read_addr_tuple()?;
            let (host, port) = match addr.as_slice() {
                // The TLS name is accepted for compatibility with other clients' seed strings,
                // connections are always made in plain text.
                [host, _tls_name, port] => {
                    (host.clone(), port.parse().map_err(ParseHostError::PortNumber)?)
                }
                [host, second] => match second.parse() {
                    Ok(port) => (host.clone(), port),
                    Err(_) => (host.clone(), self.default_port),
                },
                [host] => (host.clone(), self.default_port),
                _ => return Err(ParseHostError::InvalidArgument),
            };
            hosts.push(Host::new(&host, port));

            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.next_char(),
                None => break,
                Some(_) => return Err(ParseHostError::InvalidArgument),
            };
        }

        Ok(hosts)
    }

    fn read_addr_tuple(&mut self) -> Result<Vec<String>, ParseHostError> {
        let mut parts = vec![self.read_host_part()?];
        while self.peek() == Some(':') {
            self.next_char();
            parts.push(self.read_addr_part()?);
        }
        Ok(parts)
    }

    /// The host itself, which may be a bracketed IPv6 address containing colons.
    fn read_host_part(&mut self) -> Result<String, ParseHostError> {
        if self.peek() != Some('[') {
            return self.read_addr_part();
        }

        self.next_char();
        let mut addr = String::new();
        loop {
            match self.next_char() {
                Some(']') if !addr.is_empty() => return Ok(addr),
                Some(c) if c != ']' && c != ',' => addr.push(c),
                _ => return Err(ParseHostError::InvalidArgument),
            }
        }
    }

    fn read_addr_part(&mut self) -> Result<String, ParseHostError> {
        let mut substr = String::new();
        while let Some(c) = self.peek().filter(|&c| c != ':' && c != ',' && !c.is_whitespace()) {
            substr.push(c);
            self.next_char();
        }

        if substr.is_empty() {
            Err(ParseHostError::InvalidArgument)
        } else {
            Ok(substr)
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.next_char();
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.s.peek().copied()
    }

    fn next_char(&mut self) -> Option<char> {
        self.s.next()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{Host, Parser};

    #[test]
    fn read_addr_part() {
        assert_eq!("foo", Parser::new("foo:bar", 3000).read_addr_part().unwrap());
        assert_eq!("foo", Parser::new("foo,bar", 3000).read_addr_part().unwrap());
        assert_eq!("foo", Parser::new("foo", 3000).read_addr_part().unwrap());
        assert!(Parser::new("", 3000).read_addr_part().is_err());
        assert!(Parser::new(",", 3000).read_addr_part().is_err());
        assert!(Parser::new(":", 3000).read_addr_part().is_err());
    }

    #[test]
    fn read_addr_tuple() {
        assert_eq!(
            vec!["foo".to_owned()],
            Parser::new("foo", 3000).read_addr_tuple().unwrap()
        );
        assert_eq!(
            vec!["foo".to_owned(), "bar".to_owned()],
            Parser::new("foo:bar", 3000).read_addr_tuple().unwrap()
        );
        assert_eq!(
            vec!["::1".to_owned(), "3100".to_owned()],
            Parser::new("[::1]:3100", 3000).read_addr_tuple().unwrap()
        );
        assert!(Parser::new("", 3000).read_addr_tuple().is_err());
        assert!(Parser::new("foo:", 3000).read_addr_tuple().is_err());
        assert!(Parser::new("[::1", 3000).read_addr_tuple().is_err());
        assert!(Parser::new("[]", 3000).read_addr_tuple().is_err());
    }

    #[test]
    fn read_hosts() {
        assert_eq!(
            vec![Host::new("foo", 3000)],
            Parser::new("foo", 3000).read_hosts().unwrap()
        );
        assert_eq!(
            vec![Host::new("foo", 3000)],
            Parser::new("foo:bar", 3000).read_hosts().unwrap()
        );
        assert_eq!(
            vec![Host::new("foo", 1234)],
            Parser::new("foo:bar:1234", 3000).read_hosts().unwrap()
        );
        assert_eq!(
            vec![Host::new("foo", 1234), Host::new("bar", 1234)],
            Parser::new("foo:1234, bar:1234", 3000).read_hosts().unwrap()
        );
        assert_eq!(
            vec![Host::new("::1", 3000), Host::new("10.0.0.2", 3001)],
            Parser::new("[::1],10.0.0.2:3001", 3000).read_hosts().unwrap()
        );
        assert!(Parser::new("", 3000).read_hosts().is_err());
        assert!(Parser::new("foo,", 3000).read_hosts().is_err());
        assert!(Parser::new("foo:bar:bar", 3000).read_hosts().is_err());
        assert!(Parser::new("foo:bar:1234:1234", 3000).read_hosts().is_err());
        assert!(Parser::new("foo bar", 3000).read_hosts().is_err());
    }

    proptest! {
        #[test]
        fn read_random_hosts(name in any::<String>(), port in any::<u16>()) {
            Parser::new(&name, port).read_hosts().ok();
        }

        #[test]
        fn read_multiple_hosts(name in r"\w+:\d{4}(,\w+:\d{4})+") {
            let count = name.split(',').count();
            prop_assert_eq!(count, Parser::new(&name, 3000).read_hosts().unwrap().len());
        }
    }
}
