//! S3 client with the mechanical CRUD surface
//!
//! Every operation builds a URL, signs through [`SignerV4`] and hands the
//! request to the owned [`Transport`]. Non-2xx responses are classified
//! into specific errors by `error::classify_response`. There is no retry
//! at this layer; a failure surfaces to the caller (or, for multipart
//! uploads, to the orchestrator's abort handling).

use crate::s3::error::{classify_response, Result, S3Error};
use crate::s3::signer::SignerV4;
use crate::s3::transport::{HyperTransport, Transport, TransportReply};
use crate::s3::types::{
    DeleteError, DeleteObjectsResponse, DeletedObject, ListObjectsResponse, S3Object,
};
use bytes::Bytes;
use hyper::header::HeaderMap;
use hyper::Method;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::time::Duration;

/// Hex lookup table for URI encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// S3 client over an owned transport
///
/// The transport, signer and bucket are explicit constructor inputs, not
/// ambient singletons; the client's lifecycle owns them.
pub struct S3Client<T: Transport = HyperTransport> {
    pub(crate) transport: T,
    pub(crate) signer: SignerV4,
    pub(crate) bucket: String,
}

impl S3Client<HyperTransport> {
    /// Create a client with the default hyper transport (300s per-call
    /// timeout).
    ///
    /// Set `S3WHARF_INSECURE_TLS=1` to skip certificate verification
    /// against self-signed test endpoints.
    pub fn new(
        access_key: String,
        secret_key: String,
        bucket: String,
        region: Option<String>,
    ) -> Self {
        let insecure_tls = std::env::var("S3WHARF_INSECURE_TLS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            transport: HyperTransport::new(Duration::from_secs(300), insecure_tls),
            signer: SignerV4::new(access_key, secret_key, region),
            bucket,
        }
    }

    /// Set the per-call timeout; `Duration::ZERO` removes the bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transport = self.transport.with_timeout(timeout);
        self
    }

    /// Build a client from a configuration profile.
    /// `request_timeout` is in seconds; 0 removes the bound.
    pub fn from_profile(profile: &crate::config::Profile, request_timeout: u64) -> Self {
        Self::new(
            profile.access_key.clone(),
            profile.secret_key.clone(),
            profile.bucket.clone().unwrap_or_default(),
            Some(profile.region.clone()),
        )
        .with_timeout(Duration::from_secs(request_timeout))
    }
}

impl<T: Transport> S3Client<T> {
    /// Create a client over a caller-supplied transport.
    pub fn with_transport(transport: T, signer: SignerV4, bucket: String) -> Self {
        Self {
            transport,
            signer,
            bucket,
        }
    }

    /// Override the bucket name
    pub fn with_bucket(mut self, bucket: String) -> Self {
        self.bucket = bucket;
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Sign and send one request.
    ///
    /// `sign_body` hashes the payload into the signature (small XML
    /// bodies); otherwise the body is signed as `UNSIGNED-PAYLOAD`.
    pub(crate) async fn dispatch(
        &self,
        method: Method,
        url: &str,
        mut headers: BTreeMap<String, String>,
        body: Bytes,
        sign_body: bool,
    ) -> Result<TransportReply> {
        let authorization = if sign_body {
            self.signer.sign(method.as_str(), url, &mut headers, &body)?
        } else {
            self.signer.sign_unsigned(method.as_str(), url, &mut headers)?
        };
        headers.insert("authorization".to_string(), authorization);

        self.transport.send(method, url.to_string(), headers, body).await
    }

    /// Reject empty bucket or key before any signing or network work.
    pub(crate) fn check_target(&self, key: &str) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(S3Error::InvalidInput("bucket name is empty".to_string()));
        }
        if key.is_empty() {
            return Err(S3Error::InvalidInput("object key is empty".to_string()));
        }
        Ok(())
    }

    /// Map a non-2xx reply into a classified error.
    pub(crate) fn expect_success(reply: TransportReply) -> Result<TransportReply> {
        if reply.status.is_success() {
            Ok(reply)
        } else {
            Err(classify_response(reply.status, &reply.body))
        }
    }

    /// ETag response header with surrounding quotes stripped
    pub(crate) fn etag_header(headers: &HeaderMap) -> String {
        headers
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_matches('"').to_string())
            .unwrap_or_default()
    }

    /// Encode an S3 key, preserving forward slashes.
    /// Borrows when no encoding is needed (the common case).
    fn encode_s3_key(key: &str) -> Cow<'_, str> {
        let needs_encoding = key.bytes().any(|b| {
            !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/')
        });

        if !needs_encoding {
            return Cow::Borrowed(key);
        }

        let mut result = String::with_capacity(key.len() + 32);
        for byte in key.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                    result.push(byte as char);
                }
                _ => {
                    result.push('%');
                    result.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    result.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
        Cow::Owned(result)
    }

    /// Full URL for a key within the configured bucket
    pub(crate) fn build_url(&self, endpoint: &str, key: &str) -> String {
        let endpoint = endpoint.trim_end_matches('/');
        let encoded_key = Self::encode_s3_key(key);
        let mut url =
            String::with_capacity(endpoint.len() + 1 + self.bucket.len() + 1 + encoded_key.len());
        url.push_str(endpoint);
        url.push('/');
        url.push_str(&self.bucket);
        url.push('/');
        url.push_str(&encoded_key);
        url
    }

    /// Bucket URL (no key)
    pub(crate) fn build_bucket_url(&self, endpoint: &str) -> String {
        let endpoint = endpoint.trim_end_matches('/');
        let mut url = String::with_capacity(endpoint.len() + 1 + self.bucket.len());
        url.push_str(endpoint);
        url.push('/');
        url.push_str(&self.bucket);
        url
    }

    /// RFC 3986 encode into an existing buffer
    pub(crate) fn url_encode_into(buf: &mut String, s: &str) {
        for byte in s.bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    buf.push(byte as char);
                }
                _ => {
                    buf.push('%');
                    buf.push(HEX_UPPER[(byte >> 4) as usize] as char);
                    buf.push(HEX_UPPER[(byte & 0xf) as usize] as char);
                }
            }
        }
    }

    /// URL for ListObjectsV2.
    ///
    /// Parameters are emitted alphabetically (c, d, l, m, p) so the
    /// canonical query string fast path can skip re-sorting.
    fn build_list_url(
        &self,
        endpoint: &str,
        prefix: Option<&str>,
        max_keys: Option<i32>,
        continuation_token: Option<&str>,
        delimiter: Option<&str>,
    ) -> String {
        let base_url = self.build_bucket_url(endpoint);
        let max_keys_val = max_keys.unwrap_or(1000);

        let mut url = String::with_capacity(base_url.len() + 256);
        url.push_str(&base_url);
        url.push_str("/?");

        if let Some(token) = continuation_token {
            url.push_str("continuation-token=");
            Self::url_encode_into(&mut url, token);
            url.push('&');
        }
        if let Some(d) = delimiter {
            url.push_str("delimiter=");
            Self::url_encode_into(&mut url, d);
            url.push('&');
        }
        url.push_str("list-type=2&max-keys=");
        let _ = write!(url, "{}", max_keys_val);
        if let Some(p) = prefix {
            url.push_str("&prefix=");
            Self::url_encode_into(&mut url, p);
        }

        url
    }

    /// List objects in the bucket (ListObjectsV2)
    pub async fn list_objects_v2(
        &self,
        endpoint: &str,
        prefix: Option<&str>,
        max_keys: Option<i32>,
        continuation_token: Option<&str>,
        delimiter: Option<&str>,
    ) -> Result<ListObjectsResponse> {
        let url = self.build_list_url(endpoint, prefix, max_keys, continuation_token, delimiter);

        let reply = self
            .dispatch(Method::GET, &url, BTreeMap::new(), Bytes::new(), true)
            .await?;
        let reply = Self::expect_success(reply)?;

        parse_list_response(&reply.body)
    }

    /// Get an object, returning the body bytes
    pub async fn get_object(&self, endpoint: &str, key: &str) -> Result<Bytes> {
        self.check_target(key)?;
        let url = self.build_url(endpoint, key);

        let reply = self
            .dispatch(Method::GET, &url, BTreeMap::new(), Bytes::new(), true)
            .await?;
        let reply = Self::expect_success(reply)?;

        Ok(reply.body)
    }

    /// Put an object, returning its ETag.
    ///
    /// Non-empty bodies are signed as `UNSIGNED-PAYLOAD`, skipping a
    /// SHA-256 pass over the payload.
    pub async fn put_object(&self, endpoint: &str, key: &str, data: Bytes) -> Result<String> {
        self.check_target(key)?;
        let url = self.build_url(endpoint, key);

        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        );
        headers.insert("content-length".to_string(), data.len().to_string());

        let sign_body = data.is_empty();
        let reply = self
            .dispatch(Method::PUT, &url, headers, data, sign_body)
            .await?;
        let reply = Self::expect_success(reply)?;

        Ok(Self::etag_header(&reply.headers))
    }

    /// HEAD an object, returning its response headers.
    ///
    /// Doubles as an existence check and a cheap connection warm-up.
    pub async fn head_object(&self, endpoint: &str, key: &str) -> Result<HeaderMap> {
        self.check_target(key)?;
        let url = self.build_url(endpoint, key);

        let reply = self
            .dispatch(Method::HEAD, &url, BTreeMap::new(), Bytes::new(), true)
            .await?;
        let reply = Self::expect_success(reply)?;

        Ok(reply.headers)
    }

    /// Delete a single object
    pub async fn delete_object(&self, endpoint: &str, key: &str) -> Result<()> {
        self.check_target(key)?;
        let url = self.build_url(endpoint, key);

        let reply = self
            .dispatch(Method::DELETE, &url, BTreeMap::new(), Bytes::new(), true)
            .await?;
        Self::expect_success(reply)?;

        Ok(())
    }

    /// Batch delete (up to 1000 keys per call)
    pub async fn delete_objects(
        &self,
        endpoint: &str,
        keys: &[String],
    ) -> Result<DeleteObjectsResponse> {
        if keys.is_empty() {
            return Ok(DeleteObjectsResponse::new());
        }
        if keys.len() > 1000 {
            return Err(S3Error::InvalidInput(
                "cannot delete more than 1000 objects at once".to_string(),
            ));
        }

        let mut xml = String::with_capacity(keys.len() * 60 + 80);
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Delete>");
        for key in keys {
            xml.push_str("<Object><Key>");
            xml_escape_into(&mut xml, key);
            xml.push_str("</Key></Object>");
        }
        xml.push_str("</Delete>");
        let xml_bytes = xml.into_bytes();

        let md5_hash = md5::compute(&xml_bytes);
        let md5_base64 =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &md5_hash[..]);

        // Explicit empty value so the canonical query string is "delete="
        let url = format!("{}/?delete=", self.build_bucket_url(endpoint));

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/xml".to_string());
        headers.insert("content-length".to_string(), xml_bytes.len().to_string());
        headers.insert("content-md5".to_string(), md5_base64);

        let reply = self
            .dispatch(Method::POST, &url, headers, Bytes::from(xml_bytes), true)
            .await?;
        let reply = Self::expect_success(reply)?;

        parse_delete_response(&reply.body)
    }

    /// Create a bucket
    pub async fn create_bucket(&self, endpoint: &str, bucket_name: &str) -> Result<()> {
        let endpoint = endpoint.trim_end_matches('/');
        let url = format!("{}/{}", endpoint, bucket_name);

        let reply = self
            .dispatch(Method::PUT, &url, BTreeMap::new(), Bytes::new(), true)
            .await?;
        Self::expect_success(reply)?;

        Ok(())
    }

    /// Delete a bucket
    pub async fn delete_bucket(&self, endpoint: &str, bucket_name: &str) -> Result<()> {
        let endpoint = endpoint.trim_end_matches('/');
        let url = format!("{}/{}", endpoint, bucket_name);

        let reply = self
            .dispatch(Method::DELETE, &url, BTreeMap::new(), Bytes::new(), true)
            .await?;
        Self::expect_success(reply)?;

        Ok(())
    }

    /// Presigned GET URL for a key, valid for `expires_secs`.
    ///
    /// The result is self-authenticating: no `Authorization` header is
    /// needed by whoever fetches it.
    pub fn presign_get(&self, endpoint: &str, key: &str, expires_secs: u64) -> Result<String> {
        self.check_target(key)?;
        let url = self.build_url(endpoint, key);
        let query = self.signer.presign("GET", &url, expires_secs)?;
        Ok(format!("{}?{}", url, query))
    }

    /// Presigned PUT URL for a key, valid for `expires_secs`.
    pub fn presign_put(&self, endpoint: &str, key: &str, expires_secs: u64) -> Result<String> {
        self.check_target(key)?;
        let url = self.build_url(endpoint, key);
        let query = self.signer.presign("PUT", &url, expires_secs)?;
        Ok(format!("{}?{}", url, query))
    }
}

/// Parse a ListObjectsV2 XML response with byte-slice tag matching
fn parse_list_response(xml_data: &[u8]) -> Result<ListObjectsResponse> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut response = ListObjectsResponse::new();
    let mut current_object: Option<S3Object> = None;
    let mut current_text = String::with_capacity(256);
    let mut in_common_prefixes = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"Contents" => current_object = Some(S3Object::new(String::new(), 0)),
                b"CommonPrefixes" => in_common_prefixes = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Key" => {
                        if let Some(obj) = current_object.as_mut() {
                            obj.key = std::mem::take(&mut current_text);
                        }
                    }
                    b"Size" => {
                        if let Some(obj) = current_object.as_mut() {
                            obj.size = current_text.parse().unwrap_or(0);
                        }
                    }
                    b"LastModified" => {
                        if let Some(obj) = current_object.as_mut() {
                            obj.last_modified = Some(std::mem::take(&mut current_text));
                        }
                    }
                    b"ETag" => {
                        if let Some(obj) = current_object.as_mut() {
                            obj.etag = Some(std::mem::take(&mut current_text));
                        }
                    }
                    b"StorageClass" => {
                        if let Some(obj) = current_object.as_mut() {
                            obj.storage_class = Some(std::mem::take(&mut current_text));
                        }
                    }
                    b"Contents" => {
                        if let Some(obj) = current_object.take() {
                            response.contents.push(obj);
                        }
                    }
                    b"CommonPrefixes" => in_common_prefixes = false,
                    b"Prefix" => {
                        if in_common_prefixes {
                            response
                                .common_prefixes
                                .push(std::mem::take(&mut current_text));
                        } else {
                            response.prefix = Some(std::mem::take(&mut current_text));
                        }
                    }
                    b"IsTruncated" => response.is_truncated = current_text == "true",
                    b"NextContinuationToken" => {
                        response.next_continuation_token = Some(std::mem::take(&mut current_text));
                    }
                    b"MaxKeys" => response.max_keys = current_text.parse().ok(),
                    b"KeyCount" => response.key_count = current_text.parse().ok(),
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(S3Error::XmlParse(e.to_string())),
            _ => {}
        }
    }

    Ok(response)
}

/// Parse a DeleteObjects XML response
fn parse_delete_response(xml_data: &[u8]) -> Result<DeleteObjectsResponse> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut response = DeleteObjectsResponse::new();
    let mut current_deleted: Option<DeletedObject> = None;
    let mut current_error: Option<DeleteError> = None;
    let mut current_text = String::with_capacity(256);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"Deleted" => current_deleted = Some(DeletedObject::new(String::new())),
                b"Error" => {
                    current_error = Some(DeleteError {
                        key: String::new(),
                        code: String::new(),
                        message: String::new(),
                    })
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Key" => {
                        if let Some(deleted) = current_deleted.as_mut() {
                            deleted.key = std::mem::take(&mut current_text);
                        } else if let Some(error) = current_error.as_mut() {
                            error.key = std::mem::take(&mut current_text);
                        }
                    }
                    b"VersionId" => {
                        if let Some(deleted) = current_deleted.as_mut() {
                            deleted.version_id = Some(std::mem::take(&mut current_text));
                        }
                    }
                    b"Code" => {
                        if let Some(error) = current_error.as_mut() {
                            error.code = std::mem::take(&mut current_text);
                        }
                    }
                    b"Message" => {
                        if let Some(error) = current_error.as_mut() {
                            error.message = std::mem::take(&mut current_text);
                        }
                    }
                    b"Deleted" => {
                        if let Some(deleted) = current_deleted.take() {
                            response.deleted.push(deleted);
                        }
                    }
                    b"Error" => {
                        if let Some(error) = current_error.take() {
                            response.errors.push(error);
                        }
                    }
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(S3Error::XmlParse(e.to_string())),
            _ => {}
        }
    }

    Ok(response)
}

/// Escape XML special characters into an existing buffer
pub(crate) fn xml_escape_into(buf: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '&' => buf.push_str("&amp;"),
            '<' => buf.push_str("&lt;"),
            '>' => buf.push_str("&gt;"),
            '"' => buf.push_str("&quot;"),
            '\'' => buf.push_str("&apos;"),
            _ => buf.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_escape() {
        let mut buf = String::new();
        xml_escape_into(&mut buf, "hello<world> & \"friends\"");
        assert_eq!(buf, "hello&lt;world&gt; &amp; &quot;friends&quot;");
    }

    #[test]
    fn test_encode_s3_key_no_encoding() {
        let result = S3Client::<HyperTransport>::encode_s3_key("path/to/file.txt");
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, "path/to/file.txt");
    }

    #[test]
    fn test_encode_s3_key_with_encoding() {
        let result = S3Client::<HyperTransport>::encode_s3_key("path/to/file with spaces.txt");
        assert!(matches!(result, Cow::Owned(_)));
        assert_eq!(result, "path/to/file%20with%20spaces.txt");
    }

    #[test]
    fn test_parse_list_response() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <Name>bucket</Name>
  <KeyCount>2</KeyCount>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>false</IsTruncated>
  <Contents>
    <Key>a.txt</Key>
    <Size>12</Size>
    <ETag>"abc"</ETag>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>b/c.txt</Key>
    <Size>34</Size>
  </Contents>
</ListBucketResult>"#;

        let response = parse_list_response(xml).unwrap();
        assert_eq!(response.contents.len(), 2);
        assert_eq!(response.contents[0].key, "a.txt");
        assert_eq!(response.contents[0].size, 12);
        assert_eq!(response.contents[1].key, "b/c.txt");
        assert_eq!(response.key_count, Some(2));
        assert!(!response.is_truncated);
    }

    #[test]
    fn test_parse_delete_response() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<DeleteResult>
  <Deleted><Key>gone.txt</Key></Deleted>
  <Error><Key>kept.txt</Key><Code>AccessDenied</Code><Message>denied</Message></Error>
</DeleteResult>"#;

        let response = parse_delete_response(xml).unwrap();
        assert_eq!(response.deleted.len(), 1);
        assert_eq!(response.deleted[0].key, "gone.txt");
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].code, "AccessDenied");
    }

    #[test]
    fn test_empty_key_and_bucket_are_rejected() {
        let client = S3Client::new(
            "key".to_string(),
            "secret".to_string(),
            "bucket".to_string(),
            None,
        );
        let err = client
            .presign_get("https://s3.example.com", "", 60)
            .unwrap_err();
        assert!(matches!(err, S3Error::InvalidInput(_)));

        let client = client.with_bucket(String::new());
        let err = client
            .presign_get("https://s3.example.com", "k", 60)
            .unwrap_err();
        assert!(matches!(err, S3Error::InvalidInput(_)));
    }

    #[test]
    fn test_build_list_url_parameter_order() {
        let client = S3Client::new(
            "key".to_string(),
            "secret".to_string(),
            "bucket".to_string(),
            None,
        );
        let url = client.build_list_url(
            "https://s3.example.com",
            Some("logs/"),
            Some(500),
            Some("token"),
            Some("/"),
        );
        assert_eq!(
            url,
            "https://s3.example.com/bucket/?continuation-token=token&delimiter=%2F&list-type=2&max-keys=500&prefix=logs%2F"
        );
    }
}
