//! Bearer token wrappers.
//!
//! Token *validation* is not done here. A [`TokenValidator`] turns the raw
//! token into [`Claims`] or refuses it; the wrappers only extract the token,
//! map failures onto the [`ACL`] error system and fill the
//! [`RequestContext`](crate::RequestContext).
//!
//! Every auth failure is a `400 Bad Request`, never `401`/`403`:
//!
//! | Condition | Subcode | Message |
//! |---|---|---|
//! | header missing, or no space-separated token | 11 | `Authorization must be Bearer token` |
//! | empty token (`"Bearer "`) | 10 | `Authorization not provided` |
//! | validator refused the token | 10 | the validator's error |
//! | audience with fewer than 3 `/` segments (ACL only) | 11 | `Audience is invalid` |

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{ACL, Error};
use crate::handler::Endpoint;
use crate::request::Request;
use crate::response::Reply;

/// The token claims the wrappers care about. Everything else is kept in
/// `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, rename = "sub")]
    pub subject: String,
    #[serde(default, rename = "aud")]
    pub audience: String,
    #[serde(default)]
    pub acl: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token is not a JWT")]
    Malformed,

    #[error("token payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token payload is not valid claims: {0}")]
    Claims(#[from] serde_json::Error),

    #[error("{0}")]
    Rejected(String),
}

/// Turns a bearer token into claims.
///
/// Implemented for any `Fn(&str) -> Result<Claims, AuthError>`.
pub trait TokenValidator: Send + Sync + 'static {
    fn validate(&self, token: &str) -> Result<Claims, AuthError>;
}

impl<F> TokenValidator for F
where
    F: Fn(&str) -> Result<Claims, AuthError> + Send + Sync + 'static,
{
    fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        self(token)
    }
}

/// Reads the claims out of a JWT without checking its signature.
///
/// Only for services behind a gateway that has already verified the token.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnverifiedClaims;

impl TokenValidator for UnverifiedClaims {
    fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut segments = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (segments.next(), segments.next(), segments.next(), segments.next())
        else {
            return Err(AuthError::Malformed);
        };
        let json = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

// ── Wrappers ──────────────────────────────────────────────────────────────────

/// Requires a bearer token accepted by `validator` and stores its claims in
/// the request context.
pub fn bearer(validator: Arc<dyn TokenValidator>, endpoint: impl Endpoint) -> impl Endpoint {
    let inner = endpoint.into_boxed_endpoint();
    move |mut req: Request| {
        let inner = Arc::clone(&inner);
        let outcome = authenticate(&req, validator.as_ref());
        async move {
            match outcome {
                Ok(claims) => {
                    req.context_mut().claims = Some(claims);
                    inner.call(req).await
                }
                Err(err) => Reply::from(err),
            }
        }
    }
}

/// [`acl_with`] using [`UnverifiedClaims`].
pub fn acl(endpoint: impl Endpoint) -> impl Endpoint {
    acl_with(Arc::new(UnverifiedClaims), endpoint)
}

/// Requires a token whose audience is `bucket/brand/client_id[/…]` and fills
/// the request context with the caller's identity and ACL.
pub fn acl_with(parser: Arc<dyn TokenValidator>, endpoint: impl Endpoint) -> impl Endpoint {
    let inner = endpoint.into_boxed_endpoint();
    move |mut req: Request| {
        let inner = Arc::clone(&inner);
        let outcome = authenticate(&req, parser.as_ref()).and_then(|claims| {
            let (bucket, brand, client_id) = split_audience(&claims.audience)
                .ok_or_else(|| ACL.bad_request(11, &["Audience is invalid"]))?;
            Ok((bucket, brand, client_id, claims))
        });
        async move {
            let (bucket, brand, client_id, claims) = match outcome {
                Ok(identity) => identity,
                Err(err) => return Reply::from(err),
            };
            info!(user_id = %claims.subject, acl = ?claims.acl, "resolved ACL for user");

            let ctx = req.context_mut();
            ctx.bucket = Some(bucket);
            ctx.brand = Some(brand);
            ctx.client_id = Some(client_id);
            ctx.user_id = Some(claims.subject.clone());
            ctx.acl = claims.acl.clone();
            ctx.email = claims.email.clone();
            ctx.phone_number = claims.phone_number.clone();
            ctx.claims = Some(claims);

            inner.call(req).await
        }
    }
}

/// `bucket/brand/client_id`, extra segments ignored.
fn split_audience(audience: &str) -> Option<(String, String, String)> {
    let mut segments = audience.split('/');
    let bucket = segments.next()?;
    let brand = segments.next()?;
    let client_id = segments.next()?;
    Some((bucket.to_owned(), brand.to_owned(), client_id.to_owned()))
}

fn authenticate(req: &Request, validator: &dyn TokenValidator) -> Result<Claims, Error> {
    let token = bearer_token(req)?;
    validator
        .validate(token)
        .map_err(|e| ACL.bad_request(10, &[e.to_string().as_str()]))
}

/// The second space-separated token of `Authorization`. The scheme word
/// itself is not checked.
fn bearer_token(req: &Request) -> Result<&str, Error> {
    let header = req.header("authorization").unwrap_or_default();
    match header.split(' ').nth(1) {
        None => Err(ACL.bad_request(11, &["Authorization must be Bearer token"])),
        Some("") => Err(ACL.bad_request(10, &["Authorization not provided"])),
        Some(token) => Ok(token),
    }
}
