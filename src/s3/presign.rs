//! Query-based (presigned URL) signing
//!
//! Produces a self-contained, time-limited query string carrying the
//! signature, so the resulting URL needs no `Authorization` header. The
//! payload is always treated as unsigned.

use crate::s3::canonical::{
    canonical_headers, canonical_query_from_pairs, split_url, UNSIGNED_PAYLOAD,
};
use crate::s3::error::{Result, S3Error};
use crate::s3::signer::{string_to_sign, SignerV4, ALGORITHM};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Longest permitted presigned-URL lifetime: seven days, in seconds
pub const MAX_EXPIRES_SECS: u64 = 604_800;

impl SignerV4 {
    /// Presign a request, returning the query string to append to `url`
    /// with `?`.
    ///
    /// `expires_secs` must be in `1..=604800`; violations are input
    /// validation failures raised before any signing work. Query
    /// parameters already present on the URL are folded into the signed
    /// query string.
    pub fn presign(&self, method: &str, url: &str, expires_secs: u64) -> Result<String> {
        self.presign_at(method, url, expires_secs, Utc::now())
    }

    /// Deterministic presigning core with an injectable clock instant.
    pub fn presign_at(
        &self,
        method: &str,
        url: &str,
        expires_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<String> {
        if expires_secs == 0 || expires_secs > MAX_EXPIRES_SECS {
            return Err(S3Error::InvalidInput(format!(
                "presign expiry must be 1..={} seconds, got {}",
                MAX_EXPIRES_SECS, expires_secs
            )));
        }

        let parts = split_url(url)?;
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let scope = self.credential_scope(&date);

        // Decoded name/value pairs: any parameters on the URL itself plus
        // the protocol's own X-Amz-* set
        let mut params: Vec<(String, String)> = Vec::with_capacity(8);
        for pair in parts.query.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = match pair.find('=') {
                Some(pos) => (&pair[..pos], &pair[pos + 1..]),
                None => (pair, ""),
            };
            let key = urlencoding::decode(key).unwrap_or_else(|_| key.into());
            let value = urlencoding::decode(value).unwrap_or_else(|_| value.into());
            params.push((key.into_owned(), value.into_owned()));
        }
        params.push(("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()));
        params.push((
            "X-Amz-Credential".to_string(),
            format!("{}/{}", self.access_key(), scope),
        ));
        params.push(("X-Amz-Date".to_string(), amz_date.clone()));
        params.push(("X-Amz-Expires".to_string(), expires_secs.to_string()));
        params.push(("X-Amz-SignedHeaders".to_string(), "host".to_string()));

        let canonical_query = canonical_query_from_pairs(&params);

        // Only the host header takes part in a presigned signature
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), parts.host.to_string());
        let (canonical_hdrs, signed_headers) = canonical_headers(&headers);

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method,
            crate::s3::canonical::canonical_uri(parts.path),
            canonical_query,
            canonical_hdrs,
            signed_headers,
            UNSIGNED_PAYLOAD
        );

        tracing::trace!(method, url, canonical_request, "presign canonical request");

        let sts = string_to_sign(&amz_date, &scope, &canonical_request);
        let signature = self.signature(&date, &sts);

        Ok(format!("{}&X-Amz-Signature={}", canonical_query, signature))
    }
}
