//! S3 error taxonomy and remote-error classification
//!
//! Four failure families:
//! - input validation (raised before any network call)
//! - signing failures (malformed URL, raised before send)
//! - transport failures (timeout, connection error)
//! - remote protocol errors, classified by HTTP status plus the `<Code>`
//!   element of the XML error body, with a generic `Server` fallback that
//!   carries the raw body when no specific classification matches

use hyper::StatusCode;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Duration;
use thiserror::Error;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3Error {
    /// Caller-supplied input rejected before any network call
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// URL could not be split into scheme/host/path
    #[error("invalid URL: {0}")]
    UrlParse(String),

    /// Connection-level failure from the transport
    #[error("transport error: {0}")]
    Transport(String),

    /// Per-call deadline exceeded
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 412 or `PreconditionFailed` from the store
    #[error("precondition failed: {message}")]
    PreconditionFailed { message: String },

    /// Conditional write lost the race (If-None-Match / If-Match conflict)
    #[error("conditional request conflict: {message}")]
    ConditionalRequestConflict { message: String },

    /// Upload id unknown to the store (already aborted or completed)
    #[error("multipart upload not found: {message}")]
    NoSuchUpload { message: String },

    /// CompleteMultipartUpload part list was not strictly ascending
    #[error("invalid part order: {message}")]
    InvalidPartOrder { message: String },

    /// A non-final part was below the store's minimum part size
    #[error("part too small: {message}")]
    EntityTooSmall { message: String },

    #[error("no such key: {message}")]
    NoSuchKey { message: String },

    #[error("no such bucket: {message}")]
    NoSuchBucket { message: String },

    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// Unclassified non-2xx response; `message` holds the raw body when the
    /// store returned no `<Message>` element
    #[error("server error ({status}): {code}: {message}")]
    Server {
        status: StatusCode,
        code: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, S3Error>;

/// Extract `<Code>` and `<Message>` from an S3 XML error body.
///
/// Returns empty strings for anything that is not a well-formed error
/// document; classification then falls back on HTTP status alone.
fn parse_error_body(body: &[u8]) -> (String, String) {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut code = String::new();
    let mut message = String::new();
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                current_text.clear();
                if let Ok(text) = e.unescape() {
                    current_text.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Code" => code = std::mem::take(&mut current_text),
                    b"Message" => message = std::mem::take(&mut current_text),
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    (code, message)
}

/// Classify a non-2xx response into a specific error where the status and
/// provider error code allow it, otherwise a generic `Server` error carrying
/// the raw body.
pub fn classify_response(status: StatusCode, body: &[u8]) -> S3Error {
    let (code, message) = parse_error_body(body);
    let message = if message.is_empty() {
        String::from_utf8_lossy(body).to_string()
    } else {
        message
    };

    match code.as_str() {
        "PreconditionFailed" => S3Error::PreconditionFailed { message },
        "ConditionalRequestConflict" => S3Error::ConditionalRequestConflict { message },
        "NoSuchUpload" => S3Error::NoSuchUpload { message },
        "InvalidPartOrder" => S3Error::InvalidPartOrder { message },
        "EntityTooSmall" => S3Error::EntityTooSmall { message },
        "NoSuchKey" => S3Error::NoSuchKey { message },
        "NoSuchBucket" => S3Error::NoSuchBucket { message },
        "AccessDenied" => S3Error::AccessDenied { message },
        _ if status == StatusCode::PRECONDITION_FAILED => {
            S3Error::PreconditionFailed { message }
        }
        _ => S3Error::Server {
            status,
            code,
            message,
        },
    }
}

impl From<quick_xml::Error> for S3Error {
    fn from(err: quick_xml::Error) -> Self {
        S3Error::XmlParse(err.to_string())
    }
}

impl From<hyper::http::Error> for S3Error {
    fn from(err: hyper::http::Error) -> Self {
        S3Error::Transport(format!("request build error: {}", err))
    }
}
