//! Registration of user defined function (UDF) packages.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{
    errors::{Error, ParseError, Result},
    ResultCode,
};

/// Language a UDF package is written in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UdfLanguage {
    Lua,
}

impl fmt::Display for UdfLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lua => "LUA",
        })
    }
}

/// A UDF package registered on the server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UdfMeta {
    /// File name the package was registered under.
    pub name: String,
    /// Hash of the package content, as computed by the server.
    pub hash: String,
    pub language: UdfLanguage,
}

pub(crate) fn register_command(content: &[u8], server_path: &str, language: UdfLanguage) -> String {
    let encoded = STANDARD.encode(content);
    format!(
        "udf-put:filename={server_path};content={encoded};content-len={};udf-type={language};",
        encoded.len()
    )
}

pub(crate) fn remove_command(server_path: &str) -> String {
    format!("udf-remove:filename={server_path};")
}

/// Pairs of a `key=value;key=value` response.
fn pairs(response: &str, separator: char) -> impl Iterator<Item = (&str, &str)> {
    response
        .split(separator)
        .filter_map(|pair| pair.split_once('='))
}

/// A failed registration is reported as `error=<kind>;file=<name>;line=<n>;message=<base64>`.
pub(crate) fn check_register_response(response: &str) -> Result<()> {
    let mut error = None;
    let mut message = None;

    for (key, value) in pairs(response, ';') {
        match key {
            "error" => error = Some(value),
            "message" => message = Some(value),
            _ => {}
        }
    }

    let Some(error) = error else {
        return Ok(());
    };

    let message = match message {
        Some(message) => {
            let decoded = STANDARD.decode(message).map_err(ParseError::from)?;
            String::from_utf8_lossy(&decoded).into_owned()
        }
        None => error.to_owned(),
    };

    Err(Error::Udf {
        code: ResultCode::UdfBadResponse,
        message,
    })
}

/// Removing a package that doesn't exist is not an error.
pub(crate) fn check_remove_response(response: &str) -> Result<()> {
    if response.eq_ignore_ascii_case("ok") || response.starts_with("error=file_not_found") {
        return Ok(());
    }

    Err(Error::Udf {
        code: ResultCode::UdfBadResponse,
        message: response.to_owned(),
    })
}

/// `udf-list` answers with `filename=<name>,hash=<hash>,type=LUA;` for every package.
pub(crate) fn parse_list(response: &str) -> Result<Vec<UdfMeta>> {
    response
        .split(';')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            let mut name = None;
            let mut hash = None;
            let mut language = None;

            for (key, value) in pairs(entry, ',') {
                match key {
                    "filename" => name = Some(value.to_owned()),
                    "hash" => hash = Some(value.to_owned()),
                    "type" if value.eq_ignore_ascii_case("lua") => {
                        language = Some(UdfLanguage::Lua);
                    }
                    _ => {}
                }
            }

            match (name, hash, language) {
                (Some(name), Some(hash), Some(language)) => Ok(UdfMeta {
                    name,
                    hash,
                    language,
                }),
                _ => Err(ParseError::Info(format!("invalid UDF entry `{entry}`")).into()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register() {
        assert_eq!(
            "udf-put:filename=a.lua;content=cmV0dXJu;content-len=8;udf-type=LUA;",
            register_command(b"return", "a.lua", UdfLanguage::Lua)
        );

        assert!(check_register_response("").is_ok());
        let err = check_register_response(
            "error=compile_error;file=a.lua;line=3;message=c3ludGF4IGVycm9y",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Udf { message, .. } if message == "syntax error"));
    }

    #[test]
    fn remove() {
        assert!(check_remove_response("ok").is_ok());
        assert!(check_remove_response("error=file_not_found").is_ok());
        assert!(check_remove_response("error=busy").is_err());
    }

    #[test]
    fn list() {
        let list =
            parse_list("filename=a.lua,hash=0a1b,type=LUA;filename=b.lua,hash=2c3d,type=LUA;")
                .unwrap();
        assert_eq!(
            vec![
                UdfMeta {
                    name: "a.lua".to_owned(),
                    hash: "0a1b".to_owned(),
                    language: UdfLanguage::Lua,
                },
                UdfMeta {
                    name: "b.lua".to_owned(),
                    hash: "2c3d".to_owned(),
                    language: UdfLanguage::Lua,
                },
            ],
            list
        );
        assert!(parse_list("").unwrap().is_empty());
        assert!(parse_list("filename=a.lua").is_err());
    }
}
