//! s3wharf - S3-compatible client library
//!
//! AWS Signature Version 4 request signing (header-based and presigned-URL
//! variants) plus multipart upload orchestration, over a pluggable HTTP
//! transport.

pub mod config;
pub mod s3;

pub use config::{Config, Profile};
pub use s3::{MultipartConfig, Result, S3Client, S3Error, SignerV4};
