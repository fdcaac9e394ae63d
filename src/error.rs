//! Structured error envelope.
//!
//! Every failure a client can see is an [`Error`]: a namespace (`system`), the
//! HTTP status, a category (`series`) and a composite `code` that clients
//! branch on. Errors are minted by an [`ErrorSystem`], one per subsystem:
//!
//! ```rust
//! use stoa::ErrorSystem;
//!
//! static BILLING: ErrorSystem = ErrorSystem::new("BILLING", 31);
//!
//! let err = BILLING.not_found(7, &["invoice not found"]);
//! assert_eq!(err.code(), "BILLING.404317");
//! assert_eq!(err.more_info(), "docs/BILLING.404317");
//! ```

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::response::Reply;

/// Auth wrapper failures.
pub static ACL: ErrorSystem = ErrorSystem::new("ACL", 20);

/// Malformed query strings and request bodies.
pub static REQUEST: ErrorSystem = ErrorSystem::new("REQUEST", 10);

/// Routing failures (unknown path).
pub static HTTP: ErrorSystem = ErrorSystem::new("HTTP", 404);

// ── Error ─────────────────────────────────────────────────────────────────────

/// A client-facing error.
///
/// Immutable once minted. Serialized as
/// `{system, status, series, code, message, developerMessage, moreInfo}` with
/// empty strings and zero numbers left out.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("system: {system}; status: {status}; code: {code}; message: {message}; moreInfo: {more_info}")]
pub struct Error {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    system: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    status: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    series: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    developer_message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    more_info: String,
}

fn is_zero(n: &u16) -> bool {
    *n == 0
}

impl Error {
    pub fn system(&self) -> &str { &self.system }
    pub fn series(&self) -> u16 { self.series }
    pub fn code(&self) -> &str { &self.code }
    pub fn message(&self) -> &str { &self.message }
    pub fn developer_message(&self) -> &str { &self.developer_message }
    pub fn more_info(&self) -> &str { &self.more_info }

    /// The HTTP status. Out-of-range values (only possible for errors decoded
    /// from foreign JSON) read as `500`.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Recovers the subsystem-local subcode from `code`.
    ///
    /// Codes that were not minted as `{system}.{status}{series}{subcode}` are
    /// parsed whole; anything unparsable is `0`.
    pub fn subcode(&self) -> u32 {
        let prefix = code_prefix(&self.system, self.status, self.series);
        self.code
            .strip_prefix(prefix.as_str())
            .unwrap_or(&self.code)
            .parse()
            .unwrap_or(0)
    }
}

fn code_prefix(system: &str, status: u16, series: u16) -> String {
    format!("{system}.{status}{series}")
}

/// Sniffs `data` for an [`Error`] envelope.
///
/// A body counts as an error only when it decodes *and* carries a non-zero
/// `series` plus non-empty `message`, `code` and `system`. Any other JSON,
/// even JSON that happens to decode into the shape, is not an error.
pub fn detect_error_envelope(data: &[u8]) -> Option<Error> {
    let err: Error = serde_json::from_slice(data).ok()?;
    let is_err = err.series != 0
        && !err.message.is_empty()
        && !err.code.is_empty()
        && !err.system.is_empty();
    is_err.then_some(err)
}

// ── ErrorSystem ───────────────────────────────────────────────────────────────

/// Mints [`Error`]s for one subsystem.
///
/// `const` so subsystems can be declared as `static`s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorSystem {
    system: &'static str,
    series: u16,
}

impl ErrorSystem {
    pub const fn new(system: &'static str, series: u16) -> Self {
        Self { system, series }
    }

    pub fn system(&self) -> &'static str { self.system }
    pub fn series(&self) -> u16 { self.series }

    /// Builds an error with `code = "{system}.{status}{series}{subcode}"`.
    ///
    /// `messages` is read positionally: `[message]` or
    /// `[message, developer_message]`. Any other length leaves both empty.
    pub fn new_error(&self, status: StatusCode, subcode: u32, messages: &[&str]) -> Error {
        let (message, developer_message) = match messages {
            [message, developer] => (*message, *developer),
            [message] => (*message, ""),
            _ => ("", ""),
        };

        let code = format!(
            "{}{subcode}",
            code_prefix(self.system, status.as_u16(), self.series)
        );

        Error {
            system: self.system.to_owned(),
            status: status.as_u16(),
            series: self.series,
            more_info: format!("docs/{code}"),
            code,
            message: message.to_owned(),
            developer_message: developer_message.to_owned(),
        }
    }

    pub fn bad_request(&self, subcode: u32, messages: &[&str]) -> Error {
        self.new_error(StatusCode::BAD_REQUEST, subcode, messages)
    }

    pub fn internal_server_error(&self, subcode: u32, messages: &[&str]) -> Error {
        self.new_error(StatusCode::INTERNAL_SERVER_ERROR, subcode, messages)
    }

    pub fn not_found(&self, subcode: u32, messages: &[&str]) -> Error {
        self.new_error(StatusCode::NOT_FOUND, subcode, messages)
    }

    pub fn forbidden(&self, subcode: u32, messages: &[&str]) -> Error {
        self.new_error(StatusCode::FORBIDDEN, subcode, messages)
    }

    /// Re-mints a foreign error in this subsystem's namespace.
    ///
    /// Status, subcode and both messages carry over, so `ACL.4032042` becomes
    /// `ORDERS.4031242` rather than losing its subcode. System, series, code and
    /// `moreInfo` are reassigned. Returns `None` for a successful reply.
    pub fn from_error(&self, reply: &Reply) -> Option<Error> {
        let Reply::Failure(err) = reply else {
            return None;
        };
        Some(self.new_error(
            err.status(),
            err.subcode(),
            &[err.message(), err.developer_message()],
        ))
    }
}
