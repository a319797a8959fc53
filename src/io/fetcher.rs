use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

const FALLBACK_MESSAGE: &str = "Failed to fetch resource";

/// What a transport answered, before the status is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    Bytes,
    Text,
    Json,
}

/// A successful response converted into the kind the loader asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedData {
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Communication error while requesting {url}: {reason}")]
    TransportFailure { url: String, reason: String },

    #[error("{message} (HTTP {status} for {url})")]
    HttpStatusError { url: String, status: u16, message: String },

    #[error("Response of {url} is not valid {expected:?}")]
    InvalidResponseKind { url: String, expected: ResponseKind },
}

pub type FetchFuture = BoxFuture<'static, Result<FetchResponse, FetchError>>;

/// Byte retrieval from a network or storage backend.
///
/// `fetch` only starts the request and must not block. The scheduler polls the returned future
/// once per tick until it completes, so implementations can't rely on being woken.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> FetchFuture;
}

impl FetchedData {
    /// Checks the status and converts the body into `kind`.
    pub fn from_response(url: &str, response: FetchResponse, kind: ResponseKind) -> Result<Self, FetchError> {
        if !response.is_success() {
            return Err(FetchError::HttpStatusError {
                url: url.to_string(),
                status: response.status,
                message: error_message(&response.body),
            });
        }

        let invalid = || FetchError::InvalidResponseKind {
            url: url.to_string(),
            expected: kind,
        };

        match kind {
            ResponseKind::Bytes => Ok(FetchedData::Bytes(response.body)),
            ResponseKind::Text => String::from_utf8(response.body)
                .map(FetchedData::Text)
                .map_err(|_| invalid()),
            ResponseKind::Json => serde_json::from_slice(&response.body)
                .map(FetchedData::Json)
                .map_err(|_| invalid()),
        }
    }

    pub fn kind(&self) -> ResponseKind {
        match self {
            FetchedData::Bytes(_) => ResponseKind::Bytes,
            FetchedData::Text(_) => ResponseKind::Text,
            FetchedData::Json(_) => ResponseKind::Json,
        }
    }
}

/// Extracts the message of an error body like `{"message": "..."}`. The keys `message`, `msg`,
/// `error` and `err` are tried in that order, booleans and empty values are skipped.
pub fn error_message(body: &[u8]) -> String {
    let Ok(Value::Object(json)) = serde_json::from_slice::<Value>(body) else {
        return FALLBACK_MESSAGE.to_string();
    };

    ["message", "msg", "error", "err"]
        .iter()
        .filter_map(|key| match json.get(*key) {
            Some(Value::String(message)) if !message.is_empty() => Some(message.clone()),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        })
        .next()
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_error_messages() {
        assert_eq!(error_message(br#"{"message": "Not found"}"#), "Not found");
        assert_eq!(error_message(br#"{"msg": "Gone"}"#), "Gone");
        assert_eq!(error_message(br#"{"error": true, "err": "Denied"}"#), "Denied");
        assert_eq!(error_message(br#"{"error": true}"#), FALLBACK_MESSAGE);
        assert_eq!(error_message(b"<html>502</html>"), FALLBACK_MESSAGE);
        assert_eq!(error_message(b""), FALLBACK_MESSAGE);
    }

    #[test]
    fn non_success_status_is_an_http_error() {
        let response = FetchResponse {
            status: 404,
            body: br#"{"message": "No such file"}"#.to_vec(),
        };
        let err = FetchedData::from_response("cdn/a.black", response, ResponseKind::Bytes).unwrap_err();
        match err {
            FetchError::HttpStatusError { status, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(message, "No such file");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn converts_response_kinds() {
        let text = FetchedData::from_response("a.txt", FetchResponse::ok(b"hello".to_vec()), ResponseKind::Text);
        assert_eq!(text.unwrap(), FetchedData::Text("hello".to_string()));

        let json = FetchedData::from_response("a.json", FetchResponse::ok(br#"{"a": 1}"#.to_vec()), ResponseKind::Json);
        assert_eq!(json.unwrap(), FetchedData::Json(serde_json::json!({"a": 1})));

        let invalid = FetchedData::from_response("a.txt", FetchResponse::ok(vec![0xFF, 0xFE]), ResponseKind::Text);
        assert!(matches!(invalid, Err(FetchError::InvalidResponseKind { .. })));
    }
}
