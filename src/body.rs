//! Content-type driven request body decoding.

use serde::de::DeserializeOwned;

use crate::error::{Error, REQUEST};
use crate::request::Request;
use crate::response::ContentType;

pub(crate) const FORM: &str = ContentType::FormData.as_str();

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed form body: {0}")]
    Form(#[source] serde_urlencoded::de::Error),
}

impl From<BodyError> for Error {
    fn from(e: BodyError) -> Self {
        REQUEST.bad_request(5, &["malformed request body", e.to_string().as_str()])
    }
}

/// Decodes the request body into `T`.
///
/// Form bodies (`application/x-www-form-urlencoded`) are decoded as form
/// pairs, with scalar fields parsed from their text. Everything else,
/// including a missing content type, is read as JSON.
pub fn parse_body<T: DeserializeOwned>(req: &Request) -> Result<T, BodyError> {
    match media_type(req.header("content-type")).as_deref() {
        Some(FORM) => parse_form(req.body()),
        _ => Ok(serde_json::from_slice(req.body())?),
    }
}

/// `"Application/JSON; charset=utf-8"` → `"application/json"`.
pub(crate) fn media_type(header: Option<&str>) -> Option<String> {
    header
        .and_then(|h| h.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
}

fn parse_form<T: DeserializeOwned>(body: &[u8]) -> Result<T, BodyError> {
    serde_urlencoded::from_bytes(body).map_err(BodyError::Form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Signup {
        name: String,
        email: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Order {
        name: String,
        qty: u32,
        gift: bool,
        note: Option<String>,
    }

    fn request(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = http::Request::builder().method("POST").uri("/signup");
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        Request::from(builder.body(Bytes::from_static(body.as_bytes())).unwrap())
    }

    #[test]
    fn json_body() {
        let req = request(Some("application/json"), r#"{"name":"ann","email":"a@x.io"}"#);
        let signup: Signup = parse_body(&req).unwrap();
        assert_eq!(signup, Signup { name: "ann".into(), email: "a@x.io".into() });
    }

    #[test]
    fn form_body() {
        let req = request(Some("application/x-www-form-urlencoded"), "name=ann+lee&email=a%40x.io");
        let signup: Signup = parse_body(&req).unwrap();
        assert_eq!(signup, Signup { name: "ann lee".into(), email: "a@x.io".into() });
    }

    #[test]
    fn form_scalars_decode_into_typed_fields() {
        let req = request(Some("application/x-www-form-urlencoded; charset=UTF-8"), "name=lamp&qty=3&gift=true");
        let order: Order = parse_body(&req).unwrap();
        assert_eq!(order, Order { name: "lamp".into(), qty: 3, gift: true, note: None });
    }

    #[test]
    fn form_value_of_the_wrong_type_is_a_request_error() {
        let req = request(Some("application/x-www-form-urlencoded"), "name=lamp&qty=lots&gift=true");
        let err = parse_body::<Order>(&req).unwrap_err();
        assert!(matches!(err, BodyError::Form(_)), "{err}");
        assert_eq!(Error::from(err).code(), "REQUEST.400105");
    }

    #[test]
    fn unknown_or_missing_content_type_reads_json() {
        let body = r#"{"name":"bo","email":"b@x.io"}"#;
        for ct in [None, Some("text/plain"), Some("application/xml")] {
            let signup: Signup = parse_body(&request(ct, body)).unwrap();
            assert_eq!(signup.name, "bo");
        }
    }

    #[test]
    fn malformed_body_is_a_request_error() {
        let err = parse_body::<Signup>(&request(None, "{oops")).unwrap_err();
        assert!(matches!(err, BodyError::Json(_)));

        let err = Error::from(err);
        assert_eq!(err.code(), "REQUEST.400105");
    }
}
