//! Canonical request construction for AWS Signature Version 4
//!
//! Turns a method, URL parts, header set and payload-hash token into the
//! normalized byte string the signing protocol hashes. Ordering is explicit
//! everywhere: the same logical request always yields the same canonical
//! string no matter how the caller assembled its maps.

use crate::s3::error::{Result, S3Error};
use std::collections::BTreeMap;

/// Hex lookup table for zero-allocation percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// SHA-256 of the empty payload (GET/DELETE/HEAD fast path)
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Payload-hash token for presigned requests whose body is not signed
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Components of an absolute URL, borrowed from the original string
pub struct UrlParts<'a> {
    /// Host with default ports stripped (:443 for https, :80 for http)
    pub host: &'a str,
    pub path: &'a str,
    /// Raw query string, without the leading `?`
    pub query: &'a str,
}

/// Split an absolute URL into host, path and query without heap allocation.
///
/// Only `http://` and `https://` URLs are accepted; anything else is a
/// signing failure surfaced before any network call.
pub fn split_url(url: &str) -> Result<UrlParts<'_>> {
    let (after_scheme, https) = if let Some(rest) = url.strip_prefix("https://") {
        (rest, true)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (rest, false)
    } else {
        return Err(S3Error::UrlParse(format!("unsupported scheme in {:?}", url)));
    };

    // Split authority from path+query at first '/'
    let (authority, path_and_query) = match after_scheme.find('/') {
        Some(pos) => (&after_scheme[..pos], &after_scheme[pos..]),
        None => (after_scheme, "/"),
    };

    // Split path from query at '?'
    let (path, query) = match path_and_query.find('?') {
        Some(pos) => (&path_and_query[..pos], &path_and_query[pos + 1..]),
        None => (path_and_query, ""),
    };

    // Host header: strip default ports
    let host = if https {
        authority.strip_suffix(":443").unwrap_or(authority)
    } else {
        authority.strip_suffix(":80").unwrap_or(authority)
    };

    if host.is_empty() {
        return Err(S3Error::UrlParse(format!("missing host in {:?}", url)));
    }

    Ok(UrlParts { host, path, query })
}

/// Percent-encode a string (RFC 3986) using the hex lookup table.
///
/// Unreserved characters (A-Za-z0-9, `-`, `_`, `.`, `~`) pass through;
/// space becomes `%20`, never `+`. With `encode_slash` false, `/` is kept
/// literal for path encoding.
pub fn uri_encode(s: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(s.len() + 16);
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => {
                result.push('/');
            }
            _ => {
                result.push('%');
                result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
    result
}

/// Canonical URI: each path segment percent-encoded, `/` preserved literally.
///
/// Segments are decoded first so pre-encoded input normalizes instead of
/// double-encoding.
pub fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut out = String::with_capacity(path.len() + 16);
    if !path.starts_with('/') {
        out.push('/');
    }

    let mut first = true;
    for segment in path.split('/') {
        if !first {
            out.push('/');
        }
        first = false;
        match urlencoding::decode(segment) {
            Ok(decoded) => out.push_str(&uri_encode(&decoded, true)),
            Err(_) => out.push_str(&uri_encode(segment, true)),
        }
    }
    out
}

/// Canonical query string: parameters sorted by name then value, both
/// percent-encoded, `=` always present even for empty values.
///
/// Fast path: if every byte is already in canonical form, parameters are
/// sorted and every parameter carries `=`, the raw query is returned as-is.
/// Valueless parameters (`?uploads`) and pre-encoded or unsorted input fall
/// through to the decode/re-encode path.
pub fn canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let all_canonical = query.bytes().all(|b| {
        matches!(b,
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9'
            | b'-' | b'_' | b'.' | b'~'
            | b'=' | b'&' | b'%')
    });

    if all_canonical {
        let mut sorted = true;
        let mut all_have_equals = true;
        // Strictly ascending: duplicate keys sort by value on the slow path
        let mut last_key: Option<&str> = None;
        for pair in query.split('&') {
            let key = match pair.find('=') {
                Some(pos) => &pair[..pos],
                None => {
                    all_have_equals = false;
                    pair
                }
            };
            if last_key.is_some_and(|last| key <= last) {
                sorted = false;
                break;
            }
            last_key = Some(key);
        }
        if sorted && all_have_equals {
            return query.to_string();
        }
    }

    let mut params: Vec<(String, String)> = Vec::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = match pair.find('=') {
            Some(pos) => (&pair[..pos], &pair[pos + 1..]),
            None => (pair, ""),
        };
        let decoded_key = urlencoding::decode(key).unwrap_or_else(|_| key.into());
        let decoded_value = urlencoding::decode(value).unwrap_or_else(|_| value.into());
        params.push((decoded_key.into_owned(), decoded_value.into_owned()));
    }

    canonical_query_from_pairs(&params)
}

/// Canonical query string from decoded name/value pairs.
///
/// Sorts lexicographically by name, ties broken by value, and emits
/// `name=` for empty values.
pub fn canonical_query_from_pairs(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode(k, true), uri_encode(v, true)))
        .collect();
    encoded.sort_unstable();

    let mut out = String::with_capacity(encoded.iter().map(|(k, v)| k.len() + v.len() + 2).sum());
    for (i, (k, v)) in encoded.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}

/// Trim a header value and collapse internal whitespace runs to one space.
fn collapse_whitespace(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_run = false;
    for ch in value.trim().chars() {
        if ch.is_ascii_whitespace() {
            in_run = true;
        } else {
            if in_run && !out.is_empty() {
                out.push(' ');
            }
            in_run = false;
            out.push(ch);
        }
    }
    out
}

/// Canonical headers plus the signed-headers list.
///
/// Names are lowercased and sorted; names that repeat after case-folding
/// have their values combined in iteration order separated by a comma.
/// Returns `(canonical_headers, signed_headers)`.
pub fn canonical_headers(headers: &BTreeMap<String, String>) -> (String, String) {
    let mut folded: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let lower = name.to_ascii_lowercase();
        let cleaned = collapse_whitespace(value);
        match folded.get_mut(&lower) {
            Some(existing) => {
                existing.push(',');
                existing.push_str(&cleaned);
            }
            None => {
                folded.insert(lower, cleaned);
            }
        }
    }

    let mut canonical = String::with_capacity(folded.len() * 64);
    let mut signed = String::with_capacity(folded.len() * 20);
    for (i, (name, value)) in folded.iter().enumerate() {
        canonical.push_str(name);
        canonical.push(':');
        canonical.push_str(value);
        canonical.push('\n');

        if i > 0 {
            signed.push(';');
        }
        signed.push_str(name);
    }

    (canonical, signed)
}

/// Per-call signing input: everything the canonical request derives from.
///
/// The payload hash is passed through unchanged; hashing the body (or
/// choosing [`EMPTY_SHA256`] / [`UNSIGNED_PAYLOAD`]) is the caller's job.
pub struct SigningRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub headers: &'a BTreeMap<String, String>,
    pub payload_hash: &'a str,
}

impl SigningRequest<'_> {
    /// Build the canonical request string and the signed-headers list.
    pub fn canonical_request(&self) -> (String, String) {
        let uri = canonical_uri(self.path);
        let query = canonical_query_string(self.query);
        let (headers, signed_headers) = canonical_headers(self.headers);

        let request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method, uri, query, headers, signed_headers, self.payload_hash
        );
        (request, signed_headers)
    }
}
