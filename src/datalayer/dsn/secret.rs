use once_cell::sync::Lazy;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;

use crate::datalayer::dsn::parser::tokenize_key_values;
use crate::errors::DsnError;

/// Everything except RFC 3986 unreserved characters is escaped inside userinfo.
const USERINFO_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

static PERCENT_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%[0-9A-Fa-f]{2}").expect("percent escape pattern is valid"));

/// A scheme-form DSN split around its credentials separator.
///
/// `rest` is everything after the separator (host, port, path, query),
/// or everything after the scheme when the DSN carries no userinfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SchemeParts<'a> {
    pub scheme: &'a str,
    pub username: Option<&'a str>,
    pub secret: Option<&'a str>,
    pub rest: &'a str,
    pub has_userinfo: bool,
}

/// Returns `("scheme://", remainder)` when `dsn` starts with a URL scheme.
pub(crate) fn split_scheme(dsn: &str) -> Option<(&str, &str)> {
    let idx = dsn.find("://")?;
    let scheme = &dsn[..idx];
    let valid = scheme
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    valid.then(|| dsn.split_at(idx + 3))
}

pub(crate) fn is_scheme_form(dsn: &str) -> bool {
    split_scheme(dsn).is_some()
}

/// `host[:port]` prefix of `s`, up to the first path, query or fragment.
fn authority_of(s: &str) -> &str {
    s.split(['/', '?', '#']).next().unwrap_or_default()
}

/// Splits `host[:port]`, keeping the brackets of an IPv6 literal on the host.
fn split_host_port(host_port: &str) -> Option<(&str, Option<&str>)> {
    if let Some(bracketed) = host_port.strip_prefix('[') {
        let (addr, tail) = bracketed.split_once(']')?;
        if addr.is_empty()
            || !addr
                .chars()
                .all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.')
        {
            return None;
        }
        let host = &host_port[..addr.len() + 2];
        return match tail {
            "" => Some((host, None)),
            _ => tail.strip_prefix(':').map(|port| (host, Some(port))),
        };
    }

    match host_port.rsplit_once(':') {
        Some((host, port)) => Some((host, Some(port))),
        None => Some((host_port, None)),
    }
}

/// Is `host_port` a syntactically valid `host[:port]`?
///
/// Without `bare_hosts`, a single-label host only counts when it is
/// `localhost` or carries a port.
fn is_authority(host_port: &str, bare_hosts: bool) -> bool {
    let Some((host, port)) = split_host_port(host_port) else {
        return false;
    };
    if host.is_empty()
        || port.is_some_and(|p| p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()))
    {
        return false;
    }
    if host.starts_with('[') {
        return true;
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
    {
        return false;
    }

    bare_hosts || host.contains('.') || host == "localhost" || port.is_some()
}

/// Heuristic: does `suffix` start with something that reads like `host[:port]`?
///
/// Best effort only. A secret containing `@` followed by a dotted word can
/// still fool it; DSNs that percent-encode their secrets never need it.
pub(crate) fn looks_like_host(suffix: &str) -> bool {
    is_authority(authority_of(suffix), false)
}

/// A candidate userinfo that itself opens with `host[:port]` and continues
/// with a path or query is the tail of a DSN without credentials.
fn reads_as_authority(userinfo: &str) -> bool {
    authority_of(userinfo).len() < userinfo.len() && looks_like_host(userinfo)
}

/// Is the `@` at `idx` inside the path or query of a host named by an
/// earlier `@`?
fn follows_earlier_host(rest: &str, ats: &[usize], idx: usize) -> bool {
    ats.iter().take_while(|&&j| j < idx).any(|&j| {
        looks_like_host(&rest[j + 1..]) && rest[j + 1..idx].contains(['/', '?'])
    })
}

/// Separator for DSNs whose host is a bare name such as `db`.
///
/// Takes the last `@` of the authority. When the authority holds no `@` but
/// is not a plain `host[:port]` either, the secret carries an unencoded `/`
/// or `?` and the rightmost `@` before a valid host is used.
fn fallback_separator(rest: &str) -> Option<usize> {
    let authority = authority_of(rest);
    if let Some(idx) = authority.rfind('@') {
        return is_authority(&authority[idx + 1..], true).then_some(idx);
    }
    if authority.is_empty() || is_authority(authority, true) {
        return None;
    }

    rest.rmatch_indices('@')
        .map(|(idx, _)| idx)
        .find(|&idx| is_authority(authority_of(&rest[idx + 1..]), true))
}

/// Index of the `@` separating userinfo from the host, if any.
///
/// Prefers the rightmost `@` followed by a dotted host, `localhost`, a port
/// or an IPv6 literal, skipping any that sit in the path or query.
pub(crate) fn credentials_separator(rest: &str) -> Option<usize> {
    let ats: Vec<usize> = rest.match_indices('@').map(|(idx, _)| idx).collect();

    ats.iter()
        .rev()
        .copied()
        .find(|&idx| {
            looks_like_host(&rest[idx + 1..])
                && !reads_as_authority(&rest[..idx])
                && !follows_earlier_host(rest, &ats, idx)
        })
        .or_else(|| fallback_separator(rest))
}

pub(crate) fn split_scheme_parts(dsn: &str) -> Option<SchemeParts<'_>> {
    let (scheme, remainder) = split_scheme(dsn)?;

    let Some(at) = credentials_separator(remainder) else {
        return Some(SchemeParts {
            scheme,
            username: None,
            secret: None,
            rest: remainder,
            has_userinfo: false,
        });
    };

    let userinfo = &remainder[..at];
    let (username, secret) = match userinfo.split_once(':') {
        Some((user, secret)) => (user, Some(secret)),
        None => (userinfo, None),
    };

    Some(SchemeParts {
        scheme,
        username: Some(username).filter(|u| !u.is_empty()),
        secret,
        rest: &remainder[at + 1..],
        has_userinfo: true,
    })
}

pub fn is_percent_encoded(value: &str) -> bool {
    PERCENT_ESCAPE.is_match(value)
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, USERINFO_ENCODE_SET).to_string()
}

fn encode_if_needed(value: &str) -> String {
    if is_percent_encoded(value) {
        value.to_string()
    } else {
        encode_component(value)
    }
}

/// Percent-encodes the userinfo of a scheme-form DSN unless it already
/// contains `%XX` escapes, so a generic URL parser splits it correctly.
///
/// Key-value DSNs are returned unchanged.
pub fn encode_secret_if_needed(dsn: &str) -> String {
    let Some(parts) = split_scheme_parts(dsn) else {
        return dsn.to_string();
    };
    if !parts.has_userinfo {
        return dsn.to_string();
    }

    let username = parts.username.map(encode_if_needed).unwrap_or_default();
    match parts.secret {
        Some(secret) => format!(
            "{}{}:{}@{}",
            parts.scheme,
            username,
            encode_if_needed(secret),
            parts.rest
        ),
        None => format!("{}{}@{}", parts.scheme, username, parts.rest),
    }
}

/// Removes an embedded secret, keeping the username.
///
/// Applying it twice yields the same string as applying it once.
pub fn strip_secret(dsn: &str) -> Result<String, DsnError> {
    let dsn = dsn.trim();
    if dsn.is_empty() {
        return Err(DsnError::Empty);
    }

    if let Some(parts) = split_scheme_parts(dsn) {
        if parts.secret.is_none() {
            return Ok(dsn.to_string());
        }
        return Ok(match parts.username {
            Some(user) => format!("{}{}@{}", parts.scheme, user, parts.rest),
            None => format!("{}{}", parts.scheme, parts.rest),
        });
    }

    let kept: Vec<&str> = tokenize_key_values(dsn)?
        .into_iter()
        .filter(|token| token.key != "password")
        .map(|token| token.raw)
        .collect();
    Ok(kept.join(" "))
}

/// Substitutes `secret` for whatever secret (if any) the DSN carries.
///
/// The new secret is always percent-encoded in scheme form since it is a raw
/// token, not a DSN fragment. Scheme-form DSNs must name a user.
pub fn replace_secret(dsn: &str, secret: &str) -> Result<String, DsnError> {
    let dsn = dsn.trim();
    if dsn.is_empty() {
        return Err(DsnError::Empty);
    }

    if let Some(parts) = split_scheme_parts(dsn) {
        let user = parts.username.ok_or(DsnError::UsernameNotFound)?;
        return Ok(format!(
            "{}{}:{}@{}",
            parts.scheme,
            user,
            encode_component(secret),
            parts.rest
        ));
    }

    let mut kept: Vec<String> = tokenize_key_values(dsn)?
        .into_iter()
        .filter(|token| token.key != "password")
        .map(|token| token.raw.to_string())
        .collect();
    kept.push(format!("password={}", quote_value(secret)));
    Ok(kept.join(" "))
}

/// Quotes a key-value DSN value when it contains whitespace, quotes or
/// backslashes.
fn quote_value(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}
