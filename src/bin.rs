use std::convert::From;

use crate::{errors::Error, value::Value};

/// Longest bin name, in bytes, the server accepts.
pub const MAX_BIN_NAME_LEN: usize = 14;

/// Container object for a record bin, comprising a name and a value.
#[derive(Clone, Debug, PartialEq)]
pub struct Bin<'a> {
    /// Bin name
    pub name: &'a str,
    /// Bin value
    pub value: Value,
}

impl<'a> Bin<'a> {
    /// Construct a new bin given a name and a value.
    #[must_use]
    pub fn new(name: &'a str, value: impl Into<Value>) -> Self {
        Bin {
            name,
            value: value.into(),
        }
    }

    /// Reject bins the server can't store before anything is sent.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        check_bin_name(self.name)?;
        self.value.check_bin_value().map_err(Into::into)
    }
}

impl<'a> AsRef<Bin<'a>> for Bin<'a> {
    fn as_ref(&self) -> &Self {
        self
    }
}

pub(crate) fn check_bin_name(name: &str) -> Result<(), Error> {
    if name.len() > MAX_BIN_NAME_LEN {
        return Err(Error::invalid_argument(format!(
            "bin name `{name}` is longer than {MAX_BIN_NAME_LEN} bytes"
        )));
    }
    Ok(())
}

/// Specify which, if any, bins to return in read operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Bins {
    /// Read all bins.
    All,
    /// Read record header (generation, expiration) only.
    None,
    /// Read specified bin names only.
    Some(Vec<String>),
}

impl Bins {
    pub(crate) fn validate(&self) -> Result<(), Error> {
        match self {
            Self::Some(names) => names.iter().try_for_each(|name| check_bin_name(name)),
            Self::All | Self::None => Ok(()),
        }
    }
}

impl<'a> From<&'a [&'a str]> for Bins {
    fn from(bins: &'a [&'a str]) -> Self {
        let bins = bins.iter().copied().map(String::from).collect();
        Self::Some(bins)
    }
}

impl<'a, const N: usize> From<[&'a str; N]> for Bins {
    fn from(bins: [&'a str; N]) -> Self {
        let bins = bins.iter().copied().map(String::from).collect();
        Self::Some(bins)
    }
}

impl From<Vec<String>> for Bins {
    fn from(bins: Vec<String>) -> Self {
        Self::Some(bins)
    }
}
