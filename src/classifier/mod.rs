//! Remote error classification
//!
//! Maps S3 error codes to a short human-readable cause and logs store
//! failures with that explanation attached. Classification is diagnostic
//! only; no caller branches on it.

use crate::metrics;
use crate::s3::S3ClientError;

/// Known S3 error codes and what they usually mean.
const EXPLANATIONS: &[(&str, &str)] = &[
    ("NoSuchBucket", "bucket does not exist"),
    ("NoSuchKey", "object not found"),
    ("NoSuchUpload", "multipart upload does not exist or was already completed/aborted"),
    ("AccessDenied", "access denied by ACL or bucket policy"),
    ("InvalidAccessKeyId", "access key id is not recognised by the store"),
    ("SignatureDoesNotMatch", "request signature mismatch (check secret key and region)"),
    ("RequestTimeTooSkewed", "client clock differs too much from the server"),
    ("SlowDown", "throttled, the store asks to reduce the request rate"),
    ("InternalError", "internal error on the store side"),
    ("ServiceUnavailable", "service unavailable"),
    ("ExpiredToken", "session token has expired"),
    ("InvalidBucketName", "bucket name is invalid"),
    ("EntityTooSmall", "part too small (non-final parts must be at least 5 MB)"),
    ("EntityTooLarge", "object or part exceeds the maximum allowed size"),
    ("InvalidPart", "a listed part was not found or its entity tag does not match"),
    ("InvalidPartOrder", "parts were not listed in ascending part-number order"),
    ("BucketAlreadyExists", "bucket name is already taken globally"),
    ("BucketAlreadyOwnedByYou", "bucket already exists and is owned by you"),
];

/// Human-readable explanation for a store error code.
///
/// Returns `None` for codes that are not in the table.
pub fn explain(code: &str) -> Option<&'static str> {
    EXPLANATIONS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, explanation)| *explanation)
}

/// Log a failed store call for `key` during `phase`.
///
/// Service errors are logged with their code, message and, when the code is
/// known, its explanation. Anything else is logged verbatim.
pub fn log_store_error(key: &str, phase: &str, err: &S3ClientError) {
    match err {
        S3ClientError::ServiceError { code, message } => {
            metrics::record_store_error(phase, code);
            match explain(code) {
                Some(explanation) => tracing::error!(
                    key = %key,
                    phase = phase,
                    code = %code,
                    message = %message,
                    explanation = explanation,
                    "S3 API error"
                ),
                None => tracing::error!(
                    key = %key,
                    phase = phase,
                    code = %code,
                    message = %message,
                    "S3 API error"
                ),
            }
        }
        other => {
            metrics::record_store_error(phase, "none");
            tracing::error!(key = %key, phase = phase, error = %other, "S3 request failed");
        }
    }
}
