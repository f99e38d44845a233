//! Content-Type negotiation for inbound calls.
//!
//! Only the `application/grpc` media family is served. A `+<format>` suffix
//! names the payload encoding; selecting a marshaller from it is left to the
//! bound method, so any suffix is accepted here.

use thiserror::Error;

/// Base media type of the gRPC family.
pub const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Rejection raised before any handler logic runs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UnsupportedMediaType {
    /// The request carried no `content-type` header.
    #[error("Content-Type is missing from the request.")]
    Missing,
    /// The request declared a media type outside the gRPC family.
    #[error("Content-Type '{0}' is not supported.")]
    Unsupported(String),
}

/// Accepted gRPC media type, lower-cased with parameters removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GrpcContentType {
    format: Option<String>,
}

impl GrpcContentType {
    /// The `+<format>` suffix, if one was declared.
    #[must_use]
    pub fn format(&self) -> Option<&str> { self.format.as_deref() }

    /// Render the media type for the response `content-type` header.
    #[must_use]
    pub fn to_header_value(&self) -> String {
        match &self.format {
            Some(format) => format!("{GRPC_CONTENT_TYPE}+{format}"),
            None => GRPC_CONTENT_TYPE.to_owned(),
        }
    }
}

/// Validate a request's declared media type.
///
/// # Errors
///
/// Returns [`UnsupportedMediaType`] when the value is absent or not in the
/// `application/grpc` family.
///
/// # Examples
///
/// ```
/// use grpcframe::content_type::{UnsupportedMediaType, negotiate};
///
/// let accepted = negotiate(Some("Application/GRPC+Proto; charset=utf-8")).unwrap();
/// assert_eq!(accepted.format(), Some("proto"));
/// assert_eq!(negotiate(None), Err(UnsupportedMediaType::Missing));
/// ```
pub fn negotiate(value: Option<&str>) -> Result<GrpcContentType, UnsupportedMediaType> {
    let Some(raw) = value else {
        return Err(UnsupportedMediaType::Missing);
    };
    let essence = raw.split(';').next().unwrap_or_default();
    let unsupported = || UnsupportedMediaType::Unsupported(raw.to_owned());

    let prefix = essence.get(..GRPC_CONTENT_TYPE.len()).ok_or_else(unsupported)?;
    if !prefix.eq_ignore_ascii_case(GRPC_CONTENT_TYPE) {
        return Err(unsupported());
    }
    match &essence[GRPC_CONTENT_TYPE.len()..] {
        "" => Ok(GrpcContentType::default()),
        rest => {
            let format = rest.strip_prefix('+').ok_or_else(unsupported)?;
            Ok(GrpcContentType {
                format: (!format.is_empty()).then(|| format.to_ascii_lowercase()),
            })
        }
    }
}
