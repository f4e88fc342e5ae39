//! Authentication error types.
//!
//! These errors are internal to the verification flow: the public
//! [`verify`](crate::sigv4::verify) entry point degrades every failure to
//! `false` so that malformed input can never abort request handling. The
//! variants exist so the failure reason can be logged at `debug` level.

/// Reasons a request can fail SigV4 verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request carries neither an `Authorization` header nor presigned
    /// query parameters.
    #[error("request carries no authentication material")]
    MissingAuthentication,

    /// The `Authorization` header is present but malformed.
    #[error("malformed Authorization header")]
    InvalidAuthHeader,

    /// The signing algorithm is not `AWS4-HMAC-SHA256`.
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The credential scope does not have the `AKID/date/region/service/aws4_request` shape.
    #[error("invalid credential scope")]
    InvalidCredential,

    /// The request timestamp (`x-amz-date` header or `X-Amz-Date` query
    /// parameter) is absent.
    #[error("missing request timestamp")]
    MissingTimestamp,

    /// A header named in the signed-headers list is absent from the request.
    #[error("missing signed header: {0}")]
    MissingHeader(String),

    /// A required presigned query parameter is absent or malformed.
    #[error("missing or invalid query parameter: {0}")]
    MissingQueryParam(String),

    /// The credential's access key ID does not match the configured key.
    #[error("access key ID does not match the configured key")]
    AccessKeyMismatch,

    /// The credential scope names a region other than the configured one.
    #[error("credential scope region does not match the configured region")]
    RegionMismatch,

    /// A presigned URL's validity window has elapsed.
    #[error("presigned request has expired")]
    RequestExpired,

    /// The computed signature does not equal the claimed signature.
    #[error("signature does not match")]
    SignatureMismatch,
}
