//! Client side of the grid authority.
//!
//! Requests are a method name plus a flat parameter map, posted as
//! `{"method": ..., "params": {...}}`. The answer is either a flat result map
//! or a fault object carrying `faultCode` and `faultString`.

use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, trace};
use worldgrid_common::Fields;

use crate::error::AuthorityError;

/// A grid authority that answers named requests.
///
/// Every call carries its own timeout; operations differ widely in how long
/// they may block (registration is allowed far longer than a lookup).
pub trait GridAuthority: Send + Sync {
    fn call(&self, method: &str, params: Fields, timeout: Duration) -> Result<Fields, AuthorityError>;

    /// Where the authority lives, for error reports.
    fn url(&self) -> &str;
}

/// Grid authority reached over HTTP.
#[derive(Clone)]
pub struct HttpAuthority {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpAuthority {
    pub fn new(url: impl Into<String>) -> Result<Self, AuthorityError> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("worldgrid/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthorityError::Transport {
                url: url.clone(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { url, client })
    }
}

impl GridAuthority for HttpAuthority {
    fn call(&self, method: &str, params: Fields, timeout: Duration) -> Result<Fields, AuthorityError> {
        debug!(url = %self.url, method, ?timeout, "grid authority request");
        let response = self
            .client
            .post(&self.url)
            .timeout(timeout)
            .json(&json!({ "method": method, "params": params }))
            .send()
            .map_err(|e| AuthorityError::Transport {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(AuthorityError::Protocol {
                url: self.url.clone(),
                message: format!("HTTP {}", response.status()),
            });
        }

        let body: Value = response.json().map_err(|e| AuthorityError::Protocol {
            url: self.url.clone(),
            message: format!("undecodable body: {e}"),
        })?;
        trace!(method, %body, "grid authority answer");
        decode_answer(&self.url, body)
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Split an answer into a result map or a fault.
pub(crate) fn decode_answer(url: &str, body: Value) -> Result<Fields, AuthorityError> {
    let Value::Object(fields) = body else {
        return Err(AuthorityError::Protocol {
            url: url.to_string(),
            message: "answer is not a map".into(),
        });
    };
    if let Some(code) = fields.get("faultCode") {
        return Err(AuthorityError::Fault {
            code: code.as_i64().unwrap_or(-1),
            message: fields
                .get("faultString")
                .and_then(Value::as_str)
                .unwrap_or("unspecified fault")
                .to_string(),
        });
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_map_is_the_result() {
        let fields = decode_answer("u", json!({"region_locx": "1000"})).unwrap();
        assert_eq!(fields["region_locx"], "1000");
    }

    #[test]
    fn fault_is_surfaced() {
        let err = decode_answer("u", json!({"faultCode": 7, "faultString": "nope"})).unwrap_err();
        assert!(matches!(err, AuthorityError::Fault { code: 7, ref message } if message == "nope"));
    }

    #[test]
    fn non_map_is_protocol_error() {
        assert!(matches!(
            decode_answer("u", json!([1, 2])),
            Err(AuthorityError::Protocol { .. })
        ));
    }

    #[test]
    fn unreachable_authority_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let authority = HttpAuthority::new(format!("http://127.0.0.1:{port}/")).unwrap();
        let err = authority
            .call("region_data_request", Fields::new(), Duration::from_secs(2))
            .unwrap_err();
        assert!(matches!(err, AuthorityError::Transport { .. }));
    }
}
