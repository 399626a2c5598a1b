use std::fmt;

use super::{parser::Parser, ParseHostError};

const DEFAULT_PORT: u16 = 3000;

/// Host name/port of a database server.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Host {
    /// Host name or IP address of database server.
    pub name: String,

    /// Port of database server.
    pub port: u16,
}

impl Host {
    /// Create a new host instance given a hostname/IP and a port number.
    #[must_use]
    pub fn new(name: &str, port: u16) -> Self {
        Self {
            name: name.to_owned(),
            port,
        }
    }

    /// Returns a string representation of the host's address.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.name, self.port)
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// A trait for objects which can be converted to one or more `Host` values.
pub trait ToHosts {
    /// Converts this object into a list of `Host`s.
    ///
    /// # Errors
    ///
    /// Any errors encountered during conversion will be returned as an `Err`.
    fn to_hosts(&self) -> Result<Vec<Host>, ParseHostError>;
}

impl<T: ToHosts + ?Sized> ToHosts for &T {
    fn to_hosts(&self) -> Result<Vec<Host>, ParseHostError> {
        (**self).to_hosts()
    }
}

impl ToHosts for Vec<Host> {
    fn to_hosts(&self) -> Result<Vec<Host>, ParseHostError> {
        Ok(self.clone())
    }
}

impl ToHosts for [Host] {
    fn to_hosts(&self) -> Result<Vec<Host>, ParseHostError> {
        Ok(self.to_vec())
    }
}

impl ToHosts for Host {
    fn to_hosts(&self) -> Result<Vec<Host>, ParseHostError> {
        Ok(vec![self.clone()])
    }
}

/// Parses a comma separated list of `host[:tls-name][:port]` entries, with a default port of
/// 3000.
impl ToHosts for String {
    fn to_hosts(&self) -> Result<Vec<Host>, ParseHostError> {
        self.as_str().to_hosts()
    }
}

impl ToHosts for str {
    fn to_hosts(&self) -> Result<Vec<Host>, ParseHostError> {
        Parser::new(self, DEFAULT_PORT).read_hosts()
    }
}
