//! JSON API payloads of the CFSSL HTTP API.
//!
//! Not intended to be used directly. Provided to aid debugging.

use std::fmt;

use serde::{Deserialize, Serialize};

mod info;
mod sign;

pub use self::{
    info::{InfoRequest, InfoResult},
    sign::{AuthSignRequest, SignRequest, SignResult},
};

/// Envelope wrapping every CFSSL API response.
///
/// # Example JSON
///
/// ```json
/// {
///   "success": false,
///   "result": null,
///   "errors": [{ "code": 5300, "message": "Invalid or unknown policy" }],
///   "messages": []
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response<T> {
    pub success: bool,

    /// Missing or `null` when the call failed.
    pub result: Option<T>,

    #[serde(default)]
    pub errors: Vec<ResponseMessage>,

    #[serde(default)]
    pub messages: Vec<ResponseMessage>,
}

impl<T> Response<T> {
    /// The result of a successful call, or the errors the API reported.
    pub fn into_result(self) -> Result<T, ResponseMessage> {
        match (self.success, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(ResponseMessage::new(0, "response carries no result")),
            (false, _) => Err(ResponseMessage::combine(self.errors)),
        }
    }
}

/// An error or informational message reported by CFSSL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub code: i64,
    pub message: String,
}

impl ResponseMessage {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        ResponseMessage {
            code,
            message: message.into(),
        }
    }

    fn combine(errors: Vec<ResponseMessage>) -> Self {
        let mut errors = errors.into_iter();

        let Some(mut first) = errors.next() else {
            return ResponseMessage::new(0, "request failed without an error message");
        };

        for err in errors {
            first.message.push_str("; ");
            first.message.push_str(&err.to_string());
        }

        first
    }

    /// Returns true if CFSSL rejected the request on policy grounds (error category 5xxx).
    pub fn is_policy_error(&self) -> bool {
        (5000..6000).contains(&self.code)
    }
}

impl fmt::Display for ResponseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}
