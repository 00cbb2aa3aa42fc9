//! S3 client module with AWS SigV4 signing
//!
//! This module provides:
//! - AWS Signature Version 4 signing, header-based and presigned-URL
//! - Async S3 operations (list, get, put, delete) over a pluggable transport
//! - Multipart upload orchestration with abort-on-failure cleanup

pub mod canonical;
pub mod client;
pub mod error;
pub mod multipart;
pub mod presign;
pub mod signer;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::S3Client;
pub use error::{Result, S3Error};
pub use multipart::{MultipartConfig, MAX_PART_NUMBER, MIN_PART_NUMBER, MULTIPART_THRESHOLD};
pub use presign::MAX_EXPIRES_SECS;
pub use signer::SignerV4;
pub use transport::{HyperTransport, Transport, TransportReply};
pub use types::{
    CompleteMultipartUploadResponse, CompletedPart, CreateMultipartUploadResponse, DeleteError,
    DeleteObjectsResponse, DeletedObject, ListObjectsResponse, S3Object, UploadPartResponse,
};
