//! S3 response structures

use serde::{Deserialize, Serialize};

/// S3 object metadata from a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Object {
    /// Object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub last_modified: Option<String>,
    /// ETag
    pub etag: Option<String>,
    /// Storage class (STANDARD, STANDARD_IA, GLACIER, ...)
    pub storage_class: Option<String>,
}

impl S3Object {
    pub fn new(key: String, size: u64) -> Self {
        Self {
            key,
            size,
            last_modified: None,
            etag: None,
            storage_class: None,
        }
    }
}

/// Response from ListObjectsV2
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListObjectsResponse {
    pub contents: Vec<S3Object>,
    /// Common prefixes (subdirectories when using a delimiter)
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
    pub prefix: Option<String>,
    pub max_keys: Option<i32>,
    pub key_count: Option<i32>,
}

impl ListObjectsResponse {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Response from the batch DeleteObjects operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteObjectsResponse {
    pub deleted: Vec<DeletedObject>,
    pub errors: Vec<DeleteError>,
}

impl DeleteObjectsResponse {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedObject {
    pub key: String,
    pub version_id: Option<String>,
}

impl DeletedObject {
    pub fn new(key: String) -> Self {
        Self {
            key,
            version_id: None,
        }
    }
}

/// Per-key failure inside a batch delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteError {
    pub key: String,
    pub code: String,
    pub message: String,
}

// =============================================================================
// Multipart upload types
// =============================================================================

/// Response from CreateMultipartUpload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMultipartUploadResponse {
    pub bucket: String,
    pub key: String,
    /// Upload id for subsequent UploadPart / Complete / Abort calls
    pub upload_id: String,
}

impl CreateMultipartUploadResponse {
    pub fn new(bucket: String, key: String, upload_id: String) -> Self {
        Self {
            bucket,
            key,
            upload_id,
        }
    }
}

/// Response from UploadPart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPartResponse {
    pub part_number: u32,
    /// ETag of the uploaded part, required at completion
    pub etag: String,
}

impl UploadPartResponse {
    pub fn new(part_number: u32, etag: String) -> Self {
        Self { part_number, etag }
    }
}

/// One entry of the CompleteMultipartUpload part list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedPart {
    /// Part number (1..=10000)
    pub part_number: u32,
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, etag: String) -> Self {
        Self { part_number, etag }
    }
}

/// Response from CompleteMultipartUpload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteMultipartUploadResponse {
    pub location: Option<String>,
    pub bucket: String,
    pub key: String,
    /// ETag of the assembled object
    pub etag: String,
}

impl CompleteMultipartUploadResponse {
    pub fn new(bucket: String, key: String, etag: String) -> Self {
        Self {
            location: None,
            bucket,
            key,
            etag,
        }
    }
}
