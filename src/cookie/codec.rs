//! Conversions between cookie header strings and [`CookieSet`]s.
//!
//! - `Cookie` request headers: `name=value; name2=value2`, values percent-escaped
//! - `Set-Cookie` response headers: one directive per header value; only the
//!   leading `name=value` pair matters here, attributes are carried through raw

use tracing::{debug, instrument};

use super::CookieSet;

/// Errors produced while encoding or decoding cookie strings.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Cookie name is not a valid HTTP token.
    #[error("invalid cookie name '{name}'")]
    InvalidName {
        /// The rejected cookie name.
        name: String,
    },
    /// Cookie path attribute contains separators or control characters.
    #[error("invalid cookie path '{path}'")]
    InvalidPath {
        /// The rejected path.
        path: String,
    },
    /// A non-blank credential string did not contain a single `name=value` pair.
    #[error("cookie string contains no name=value pairs")]
    Malformed,
}

/// Serializes a cookie set into a `Cookie` header value.
///
/// Pairs are joined with `"; "` in the set's insertion order and values are
/// percent-escaped.
///
/// # Errors
///
/// Returns [`CodecError::InvalidName`] when a cookie name is not an HTTP token.
pub fn encode(cookies: &CookieSet) -> Result<String, CodecError> {
    let pairs = cookies
        .iter()
        .map(|(name, value)| encode_pair(name, value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pairs.join("; "))
}

/// Serializes a single `name=value` pair.
///
/// # Errors
///
/// Returns [`CodecError::InvalidName`] when `name` is not an HTTP token.
pub fn encode_pair(name: &str, value: &str) -> Result<String, CodecError> {
    if !is_token(name) {
        return Err(CodecError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(format!("{name}={}", urlencoding::encode(value)))
}

/// Builds a `Set-Cookie` directive for `name`/`value` scoped to `path`.
///
/// # Errors
///
/// Returns [`CodecError`] when the name is not a token or the path contains
/// `;` or control characters.
pub fn serialize_set_cookie(name: &str, value: &str, path: &str) -> Result<String, CodecError> {
    let pair = encode_pair(name, value)?;
    if path.chars().any(|c| c == ';' || c.is_control()) {
        return Err(CodecError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(format!("{pair}; Path={path}"))
}

/// Parses a `Cookie` header value into a cookie set.
///
/// Missing input yields an empty set. Segments without `=` are ignored, names
/// and values are trimmed, surrounding double quotes are removed and
/// percent-escapes are decoded when valid. The last occurrence of a duplicate
/// name wins.
#[must_use]
#[instrument(level = "trace", skip(header))]
pub fn decode(header: Option<&str>) -> CookieSet {
    let mut cookies = CookieSet::new();
    let Some(header) = header else {
        return cookies;
    };

    for segment in header.split(';') {
        let Some((name, value)) = segment.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        cookies.insert(name, unescape_value(value.trim()));
    }

    cookies
}

/// Parses a stored or operator-entered credential string.
///
/// Behaves like [`decode`], but rejects non-blank input that yields no cookies,
/// so garbage never replaces a previously cached set.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] when non-blank input has no `name=value` pair.
pub fn decode_credential(raw: &str) -> Result<CookieSet, CodecError> {
    let cookies = decode(Some(raw));
    if cookies.is_empty() && !raw.trim().is_empty() {
        return Err(CodecError::Malformed);
    }
    Ok(cookies)
}

/// Normalizes `Set-Cookie` header values.
///
/// Returns the raw directive list, untouched, together with a name → value
/// mapping built from the text before each directive's first `;`, split on the
/// first `=`. A directive without `=` still records its name with an empty value.
#[must_use]
pub fn decode_set_cookie<I, S>(values: I) -> (Vec<String>, CookieSet)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let raw: Vec<String> = values
        .into_iter()
        .map(|value| value.as_ref().to_string())
        .collect();

    let mut parsed = CookieSet::new();
    for directive in &raw {
        let pair = directive.split(';').next().unwrap_or_default();
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = name.trim();
        if name.is_empty() {
            debug!("ignoring Set-Cookie directive without a name");
            continue;
        }
        parsed.insert(name, value);
    }

    (raw, parsed)
}

fn unescape_value(value: &str) -> String {
    let value = value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value);

    if value.contains('%') {
        match urlencoding::decode(value) {
            Ok(decoded) => return decoded.into_owned(),
            Err(_) => return value.to_string(),
        }
    }
    value.to_string()
}

/// RFC 7230 `token`: visible ASCII minus separators.
fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic()
                && !matches!(
                    b,
                    b'(' | b')'
                        | b'<'
                        | b'>'
                        | b'@'
                        | b','
                        | b';'
                        | b':'
                        | b'\\'
                        | b'"'
                        | b'/'
                        | b'['
                        | b']'
                        | b'?'
                        | b'='
                        | b'{'
                        | b'}'
                )
        })
}
