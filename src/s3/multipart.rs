//! Multipart upload orchestration
//!
//! Drives create -> upload-parts -> complete (or abort) over payloads
//! above the multipart threshold. Parts are uploaded strictly
//! sequentially in ascending part-number order, one whole chunk buffered
//! at a time, so memory use is bounded by the chunk size rather than the
//! object size.
//!
//! Failure policy: a failure before the upload id exists is fatal with
//! nothing to clean up. After that, any failure triggers a best-effort
//! AbortMultipartUpload for the captured id; the abort's own failure is
//! logged and swallowed, and the original error is returned unchanged.

use crate::s3::client::S3Client;
use crate::s3::error::{Result, S3Error};
use crate::s3::transport::Transport;
use crate::s3::types::{
    CompleteMultipartUploadResponse, CompletedPart, CreateMultipartUploadResponse,
    UploadPartResponse,
};
use bytes::Bytes;
use hyper::Method;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;

/// Payloads at or below this size go out as a single PUT
pub const MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Smallest valid part number
pub const MIN_PART_NUMBER: u32 = 1;

/// Largest valid part number
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Multipart upload tuning
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Chunk size per part; the store's 5 MiB minimum is enforced
    pub part_size: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            part_size: MULTIPART_THRESHOLD as usize,
        }
    }
}

impl MultipartConfig {
    pub fn with_part_size(mut self, size: usize) -> Self {
        self.part_size = size.max(MULTIPART_THRESHOLD as usize);
        self
    }
}

impl<T: Transport> S3Client<T> {
    /// Initiate a multipart upload, returning the store-issued upload id.
    pub async fn create_multipart_upload(
        &self,
        endpoint: &str,
        key: &str,
    ) -> Result<CreateMultipartUploadResponse> {
        self.check_target(key)?;
        let url = format!("{}?uploads", self.build_url(endpoint, key));

        let mut headers = BTreeMap::new();
        headers.insert(
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        );

        let reply = self
            .dispatch(Method::POST, &url, headers, Bytes::new(), true)
            .await?;
        let reply = Self::expect_success(reply)?;

        parse_create_multipart_response(&reply.body)
    }

    /// Upload one part. Part numbers are 1..=10000; the bound is checked
    /// here, before any network call.
    pub async fn upload_part(
        &self,
        endpoint: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<UploadPartResponse> {
        if !(MIN_PART_NUMBER..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(S3Error::InvalidInput(format!(
                "part number {} out of range {}..={}",
                part_number, MIN_PART_NUMBER, MAX_PART_NUMBER
            )));
        }

        let base_url = self.build_url(endpoint, key);
        let mut url = String::with_capacity(base_url.len() + 64);
        url.push_str(&base_url);
        url.push_str("?partNumber=");
        let _ = write!(url, "{}", part_number);
        url.push_str("&uploadId=");
        Self::url_encode_into(&mut url, upload_id);

        let mut headers = BTreeMap::new();
        headers.insert("content-length".to_string(), data.len().to_string());

        // UNSIGNED-PAYLOAD: no SHA-256 pass over multi-megabyte chunks
        let reply = self
            .dispatch(Method::PUT, &url, headers, data, false)
            .await?;
        let reply = Self::expect_success(reply)?;

        Ok(UploadPartResponse::new(
            part_number,
            Self::etag_header(&reply.headers),
        ))
    }

    /// Assemble the uploaded parts into the final object.
    ///
    /// The part list is submitted sorted ascending by part number
    /// regardless of the order the caller accumulated it in; the store
    /// rejects anything else.
    pub async fn complete_multipart_upload(
        &self,
        endpoint: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompleteMultipartUploadResponse> {
        let base_url = self.build_url(endpoint, key);
        let mut url = String::with_capacity(base_url.len() + 64);
        url.push_str(&base_url);
        url.push_str("?uploadId=");
        Self::url_encode_into(&mut url, upload_id);

        let xml_bytes = complete_xml(parts).into_bytes();

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/xml".to_string());
        headers.insert("content-length".to_string(), xml_bytes.len().to_string());

        // The XML body is small; sign its actual hash
        let reply = self
            .dispatch(Method::POST, &url, headers, Bytes::from(xml_bytes), true)
            .await?;
        let reply = Self::expect_success(reply)?;

        parse_complete_multipart_response(&reply.body)
    }

    /// Cancel an upload and discard its parts on the remote store.
    pub async fn abort_multipart_upload(
        &self,
        endpoint: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        let base_url = self.build_url(endpoint, key);
        let mut url = String::with_capacity(base_url.len() + 64);
        url.push_str(&base_url);
        url.push_str("?uploadId=");
        Self::url_encode_into(&mut url, upload_id);

        let reply = self
            .dispatch(Method::DELETE, &url, BTreeMap::new(), Bytes::new(), true)
            .await?;
        Self::expect_success(reply)?;

        Ok(())
    }

    /// Upload an in-memory payload, choosing single PUT or multipart by
    /// size. Returns the final ETag.
    pub async fn upload_object(
        &self,
        endpoint: &str,
        key: &str,
        data: Bytes,
        config: &MultipartConfig,
    ) -> Result<String> {
        if data.len() as u64 <= MULTIPART_THRESHOLD {
            return self.put_object(endpoint, key, data).await;
        }

        let part_size = config.part_size.max(MULTIPART_THRESHOLD as usize);
        let num_parts = data.len().div_ceil(part_size);
        if num_parts > MAX_PART_NUMBER as usize {
            return Err(S3Error::InvalidInput(format!(
                "payload of {} bytes needs {} parts of {} bytes; the limit is {}",
                data.len(),
                num_parts,
                part_size,
                MAX_PART_NUMBER
            )));
        }

        let created = self.create_multipart_upload(endpoint, key).await?;
        let upload_id = created.upload_id;

        match self
            .upload_chunks(endpoint, key, &upload_id, &data, part_size)
            .await
        {
            Ok(etag) => Ok(etag),
            Err(err) => {
                self.abort_quietly(endpoint, key, &upload_id).await;
                Err(err)
            }
        }
    }

    /// Sequential part loop over a fully buffered payload.
    async fn upload_chunks(
        &self,
        endpoint: &str,
        key: &str,
        upload_id: &str,
        data: &Bytes,
        part_size: usize,
    ) -> Result<String> {
        let mut parts: Vec<CompletedPart> = Vec::with_capacity(data.len().div_ceil(part_size));

        let mut offset = 0usize;
        let mut part_number = MIN_PART_NUMBER;
        while offset < data.len() {
            let end = (offset + part_size).min(data.len());
            let chunk = data.slice(offset..end);

            let uploaded = self
                .upload_part(endpoint, key, upload_id, part_number, chunk)
                .await?;
            parts.push(CompletedPart::new(uploaded.part_number, uploaded.etag));

            offset = end;
            part_number += 1;
        }

        let completed = self
            .complete_multipart_upload(endpoint, key, upload_id, &parts)
            .await?;
        Ok(completed.etag)
    }

    /// Upload a file, streaming it chunk by chunk so only one part is in
    /// memory at a time. Returns the final ETag.
    pub async fn upload_file(
        &self,
        endpoint: &str,
        key: &str,
        path: &std::path::Path,
        config: &MultipartConfig,
    ) -> Result<String> {
        let metadata = std::fs::metadata(path)?;
        let file_size = metadata.len();

        if file_size <= MULTIPART_THRESHOLD {
            let data = std::fs::read(path)?;
            return self.put_object(endpoint, key, Bytes::from(data)).await;
        }

        let part_size = config.part_size.max(MULTIPART_THRESHOLD as usize);
        let num_parts = (file_size as usize).div_ceil(part_size);
        if num_parts > MAX_PART_NUMBER as usize {
            return Err(S3Error::InvalidInput(format!(
                "file of {} bytes needs {} parts of {} bytes; the limit is {}",
                file_size, num_parts, part_size, MAX_PART_NUMBER
            )));
        }

        let created = self.create_multipart_upload(endpoint, key).await?;
        let upload_id = created.upload_id;

        match self
            .upload_file_chunks(endpoint, key, &upload_id, path, part_size)
            .await
        {
            Ok(etag) => Ok(etag),
            Err(err) => {
                self.abort_quietly(endpoint, key, &upload_id).await;
                Err(err)
            }
        }
    }

    async fn upload_file_chunks(
        &self,
        endpoint: &str,
        key: &str,
        upload_id: &str,
        path: &std::path::Path,
        part_size: usize,
    ) -> Result<String> {
        use std::io::Read;

        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::with_capacity(part_size, file);
        let mut parts: Vec<CompletedPart> = Vec::new();
        let mut part_number = MIN_PART_NUMBER;

        loop {
            let mut buffer = vec![0u8; part_size];
            let mut total_read = 0;
            while total_read < part_size {
                match reader.read(&mut buffer[total_read..])? {
                    0 => break,
                    n => total_read += n,
                }
            }
            if total_read == 0 {
                break;
            }
            buffer.truncate(total_read);

            let uploaded = self
                .upload_part(endpoint, key, upload_id, part_number, Bytes::from(buffer))
                .await?;
            parts.push(CompletedPart::new(uploaded.part_number, uploaded.etag));
            part_number += 1;
        }

        let completed = self
            .complete_multipart_upload(endpoint, key, upload_id, &parts)
            .await?;
        Ok(completed.etag)
    }

    /// Best-effort abort: its own failure must never mask the error that
    /// triggered it.
    async fn abort_quietly(&self, endpoint: &str, key: &str, upload_id: &str) {
        if let Err(abort_err) = self.abort_multipart_upload(endpoint, key, upload_id).await {
            tracing::warn!(
                upload_id,
                error = %abort_err,
                "abort after failed multipart upload also failed"
            );
        }
    }
}

/// Serialize the CompleteMultipartUpload body, parts sorted ascending by
/// part number.
fn complete_xml(parts: &[CompletedPart]) -> String {
    let mut sorted: Vec<&CompletedPart> = parts.iter().collect();
    sorted.sort_by_key(|p| p.part_number);

    let mut xml = String::with_capacity(parts.len() * 100 + 100);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    xml.push_str("<CompleteMultipartUpload>");
    for part in sorted {
        xml.push_str("<Part><PartNumber>");
        let _ = write!(xml, "{}", part.part_number);
        xml.push_str("</PartNumber><ETag>\"");
        xml.push_str(part.etag.trim_matches('"'));
        xml.push_str("\"</ETag></Part>");
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}

fn parse_create_multipart_response(xml_data: &[u8]) -> Result<CreateMultipartUploadResponse> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut bucket = String::new();
    let mut key = String::new();
    let mut upload_id = String::new();
    let mut current_text = String::with_capacity(256);

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Bucket" => bucket = std::mem::take(&mut current_text),
                    b"Key" => key = std::mem::take(&mut current_text),
                    b"UploadId" => upload_id = std::mem::take(&mut current_text),
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(S3Error::XmlParse(e.to_string())),
            _ => {}
        }
    }

    if upload_id.is_empty() {
        return Err(S3Error::XmlParse(
            "missing UploadId in CreateMultipartUpload response".to_string(),
        ));
    }

    Ok(CreateMultipartUploadResponse::new(bucket, key, upload_id))
}

fn parse_complete_multipart_response(xml_data: &[u8]) -> Result<CompleteMultipartUploadResponse> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut location = None;
    let mut bucket = String::new();
    let mut key = String::new();
    let mut etag = String::new();
    let mut current_text = String::with_capacity(256);

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Location" => location = Some(std::mem::take(&mut current_text)),
                    b"Bucket" => bucket = std::mem::take(&mut current_text),
                    b"Key" => key = std::mem::take(&mut current_text),
                    b"ETag" => {
                        etag = std::mem::take(&mut current_text)
                            .trim_matches('"')
                            .to_string()
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

    let mut response = CompleteMultipartUploadResponse::new(bucket, key, etag);
    response.location = location;
    Ok(response)
}
