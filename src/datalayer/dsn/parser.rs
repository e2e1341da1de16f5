use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::datalayer::db_ops::constants::DEFAULT_POSTGRES_PORT;
use crate::datalayer::dsn::secret::{encode_secret_if_needed, is_scheme_form};
use crate::errors::DsnError;

/// The pieces of a connection string needed to configure a connector.
///
/// Derived once per configuration load and never mutated; option order is
/// not significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsnComponents {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub database: Option<String>,
    pub options: HashMap<String, String>,
}

impl DsnComponents {
    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Copy of these components pointed at `endpoint` (`host[:port]`).
    ///
    /// A missing port keeps the current one.
    pub fn with_endpoint(&self, endpoint: &str) -> Result<Self, DsnError> {
        let (host, port) = match endpoint.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse::<u16>()
                    .map_err(|_| DsnError::InvalidPort(port.to_string()))?,
            ),
            None => (endpoint, self.port),
        };
        if host.is_empty() {
            return Err(DsnError::EndpointNotFound);
        }

        Ok(Self {
            host: host.to_string(),
            port,
            ..self.clone()
        })
    }

    /// Username from the DSN, falling back to `configured`.
    pub fn resolve_username(&self, configured: Option<&str>) -> Result<String, DsnError> {
        resolve(self.username.as_deref(), configured)
    }
}

/// A key-value DSN token; `raw` is the exact source text including any quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyValueToken<'a> {
    pub key: &'a str,
    pub value: String,
    pub raw: &'a str,
}

/// Components before host/port requirements are applied.
#[derive(Debug, Default)]
struct ParsedDsn {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    database: Option<String>,
    options: HashMap<String, String>,
}

/// Parses a scheme-form or key-value DSN into its components.
pub fn parse_dsn(dsn: &str) -> Result<DsnComponents, DsnError> {
    let parsed = decompose(dsn)?;
    let host = parsed.host.ok_or(DsnError::EndpointNotFound)?;

    Ok(DsnComponents {
        host,
        port: parsed.port.unwrap_or(DEFAULT_POSTGRES_PORT),
        username: parsed.username,
        database: parsed.database,
        options: parsed.options,
    })
}

/// `host:port` of the DSN; the port defaults to 5432.
pub fn extract_endpoint(dsn: &str) -> Result<String, DsnError> {
    parse_dsn(dsn).map(|components| components.endpoint())
}

/// Username embedded in the DSN.
pub fn extract_username(dsn: &str) -> Result<String, DsnError> {
    decompose(dsn)?.username.ok_or(DsnError::UsernameNotFound)
}

/// Username embedded in the DSN, or `configured` when the DSN has none.
pub fn resolve_username(dsn: &str, configured: Option<&str>) -> Result<String, DsnError> {
    resolve(decompose(dsn)?.username.as_deref(), configured)
}

pub fn extract_database(dsn: &str) -> Result<Option<String>, DsnError> {
    Ok(decompose(dsn)?.database)
}

pub fn extract_options(dsn: &str) -> Result<HashMap<String, String>, DsnError> {
    Ok(decompose(dsn)?.options)
}

fn resolve(from_dsn: Option<&str>, configured: Option<&str>) -> Result<String, DsnError> {
    from_dsn
        .or(configured)
        .filter(|user| !user.is_empty())
        .map(str::to_string)
        .ok_or(DsnError::UsernameUnresolved)
}

fn decompose(dsn: &str) -> Result<ParsedDsn, DsnError> {
    let dsn = dsn.trim();
    if dsn.is_empty() {
        return Err(DsnError::Empty);
    }

    if is_scheme_form(dsn) {
        decompose_scheme_form(dsn)
    } else {
        decompose_key_value_form(dsn)
    }
}

fn decode(value: &str) -> Result<String, DsnError> {
    percent_decode_str(value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| DsnError::Malformed(e.to_string()))
}

fn decompose_scheme_form(dsn: &str) -> Result<ParsedDsn, DsnError> {
    let encoded = encode_secret_if_needed(dsn);
    let url = Url::parse(&encoded).map_err(|e| match e {
        url::ParseError::InvalidPort => DsnError::InvalidPort(e.to_string()),
        url::ParseError::EmptyHost => DsnError::EndpointNotFound,
        other => DsnError::Malformed(other.to_string()),
    })?;

    let username = Some(decode(url.username())?).filter(|u| !u.is_empty());
    let database = Some(decode(url.path().trim_start_matches('/'))?).filter(|d| !d.is_empty());

    Ok(ParsedDsn {
        host: url
            .host_str()
            .filter(|h| !h.is_empty())
            .map(str::to_string),
        port: url.port(),
        username,
        database,
        options: url.query_pairs().into_owned().collect(),
    })
}

fn decompose_key_value_form(dsn: &str) -> Result<ParsedDsn, DsnError> {
    let mut parsed = ParsedDsn::default();

    for token in tokenize_key_values(dsn)? {
        match token.key {
            "host" => parsed.host = Some(token.value).filter(|h| !h.is_empty()),
            "port" => {
                let port = token
                    .value
                    .parse::<u16>()
                    .map_err(|_| DsnError::InvalidPort(token.value.clone()))?;
                parsed.port = Some(port);
            }
            "user" => parsed.username = Some(token.value).filter(|u| !u.is_empty()),
            "dbname" => parsed.database = Some(token.value).filter(|d| !d.is_empty()),
            "password" => {}
            other => {
                parsed.options.insert(other.to_string(), token.value);
            }
        }
    }

    Ok(parsed)
}

/// Splits a key-value DSN into tokens, honouring single-quoted values and
/// backslash escapes.
pub(crate) fn tokenize_key_values(dsn: &str) -> Result<Vec<KeyValueToken<'_>>, DsnError> {
    let mut tokens = Vec::new();
    let mut chars = dsn.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut key_end = None;
        while let Some(&(idx, c)) = chars.peek() {
            if c == '=' {
                key_end = Some(idx);
                chars.next();
                break;
            }
            if c.is_whitespace() {
                break;
            }
            chars.next();
        }

        let key_end = key_end.ok_or_else(|| {
            let fragment = dsn[start..].split_whitespace().next().unwrap_or_default();
            DsnError::Malformed(format!("expected key=value, found `{}`", fragment))
        })?;
        let key = &dsn[start..key_end];
        if key.is_empty() {
            return Err(DsnError::Malformed("missing key before `=`".to_string()));
        }

        let mut value = String::new();
        let mut end = dsn.len();

        if let Some(&(_, '\'')) = chars.peek() {
            chars.next();
            let mut closed = false;
            while let Some((idx, c)) = chars.next() {
                match c {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '\'' => {
                        closed = true;
                        end = idx + 1;
                        break;
                    }
                    _ => value.push(c),
                }
            }
            if !closed {
                return Err(DsnError::Malformed(format!(
                    "unterminated quoted value for `{}`",
                    key
                )));
            }
        } else {
            while let Some(&(idx, c)) = chars.peek() {
                if c.is_whitespace() {
                    end = idx;
                    break;
                }
                chars.next();
                if c == '\\' {
                    if let Some((_, escaped)) = chars.next() {
                        value.push(escaped);
                    }
                } else {
                    value.push(c);
                }
            }
        }

        tokens.push(KeyValueToken {
            key,
            value,
            raw: &dsn[start..end],
        });
    }

    Ok(tokens)
}
