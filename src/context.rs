//! Request-scoped identity filled in by the auth wrappers.

use crate::middleware::auth::Claims;

/// Values the auth wrappers attach to a single request.
///
/// Lives inside the [`Request`](crate::Request), so it is dropped with it and
/// can never be observed by another request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestContext {
    /// Claims accepted by the [`bearer`](crate::middleware::bearer) wrapper.
    pub claims: Option<Claims>,
    pub user_id: Option<String>,
    pub acl: Vec<String>,
    pub bucket: Option<String>,
    pub brand: Option<String>,
    pub client_id: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}
