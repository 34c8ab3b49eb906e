//! JSON-RPC 2.0 over a byte stream with `Content-Length` framing.

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use yaml_bridge_core::{BridgeError, Result};

/// Upper bound on a single message body.
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

pub const INVALID_PARAMS: i64 = -32602;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INTERNAL_ERROR: i64 = -32603;

/// Writes one framed message and flushes.
pub async fn write_message<W>(writer: &mut W, message: &Value) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let body = serde_json::to_vec(message)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one framed message.
///
/// Returns `Ok(None)` on a clean end of stream before any header byte.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Value>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut content_length = None;
    let mut line = String::new();
    let mut first = true;

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            if first {
                return Ok(None);
            }
            return Err(BridgeError::Protocol("unexpected end of stream in headers".into()));
        }
        first = false;

        let header = line.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            break;
        }

        if let Some((name, value)) = header.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            let length = value
                .trim()
                .parse::<usize>()
                .map_err(|_| BridgeError::Protocol(format!("invalid Content-Length: {value}")))?;
            content_length = Some(length);
        }
    }

    let length = content_length
        .ok_or_else(|| BridgeError::Protocol("missing Content-Length header".into()))?;
    if length > MAX_MESSAGE_SIZE {
        return Err(BridgeError::Protocol(format!(
            "message of {length} bytes exceeds limit"
        )));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// A message received from the language server.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Answer to one of our requests.
    Response {
        id: u64,
        result: std::result::Result<Value, ResponseError>,
    },
    /// Request the server expects us to answer.
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
        params: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

impl From<ResponseError> for BridgeError {
    fn from(error: ResponseError) -> Self {
        Self::LanguageService(format!("{} (code {})", error.message, error.code))
    }
}

impl Incoming {
    pub fn parse(mut message: Value) -> Result<Self> {
        let params = message
            .get_mut("params")
            .map(Value::take)
            .unwrap_or(Value::Null);
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = message.get_mut("id").map(Value::take);

        match (method, id) {
            (Some(method), Some(id)) if !id.is_null() => Ok(Self::Request { id, method, params }),
            (Some(method), _) => Ok(Self::Notification { method, params }),
            (None, Some(id)) => {
                let id = id
                    .as_u64()
                    .ok_or_else(|| BridgeError::Protocol(format!("unexpected response id {id}")))?;
                let result = match message.get_mut("error").map(Value::take) {
                    Some(error) if !error.is_null() => Err(ResponseError {
                        code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                        message: error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string(),
                    }),
                    _ => Ok(message
                        .get_mut("result")
                        .map(Value::take)
                        .unwrap_or(Value::Null)),
                };
                Ok(Self::Response { id, result })
            }
            (None, None) => Err(BridgeError::Protocol(
                "message has neither method nor id".into(),
            )),
        }
    }
}

pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

pub fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

pub fn failure(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn framed(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    #[test]
    fn test_write_message_framing() {
        let message = json!({"jsonrpc": "2.0", "method": "initialized", "params": {}});
        let body = serde_json::to_string(&message).unwrap();
        let mut mock = tokio_test::io::Builder::new()
            .write(&framed(&body))
            .build();

        tokio_test::block_on(write_message(&mut mock, &message)).unwrap();
    }

    #[test]
    fn test_read_message() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":null}"#;
        let mock = tokio_test::io::Builder::new().read(&framed(body)).build();
        let mut reader = BufReader::new(mock);

        let message = tokio_test::block_on(read_message(&mut reader))
            .unwrap()
            .unwrap();
        assert_eq!(message["id"], 1);
    }

    #[test]
    fn test_read_message_split_across_reads() {
        let body = r#"{"jsonrpc":"2.0","method":"window/logMessage","params":{"type":3,"message":"hi"}}"#;
        let bytes = framed(body);
        let (head, tail) = bytes.split_at(10);
        let mock = tokio_test::io::Builder::new().read(head).read(tail).build();
        let mut reader = BufReader::new(mock);

        let message = tokio_test::block_on(read_message(&mut reader))
            .unwrap()
            .unwrap();
        assert_eq!(message["params"]["message"], "hi");
    }

    #[test]
    fn test_read_message_extra_headers() {
        let body = r#"{"jsonrpc":"2.0","id":2,"result":[]}"#;
        let bytes = format!(
            "Content-Type: application/vscode-jsonrpc; charset=utf-8\r\ncontent-length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let mock = tokio_test::io::Builder::new().read(bytes.as_bytes()).build();
        let mut reader = BufReader::new(mock);

        let message = tokio_test::block_on(read_message(&mut reader))
            .unwrap()
            .unwrap();
        assert_eq!(message["id"], 2);
    }

    #[test]
    fn test_read_two_messages_then_eof() {
        let mut bytes = framed(r#"{"id":1,"result":1}"#);
        bytes.extend(framed(r#"{"id":2,"result":2}"#));
        let mock = tokio_test::io::Builder::new().read(&bytes).build();
        let mut reader = BufReader::new(mock);

        tokio_test::block_on(async {
            assert_eq!(read_message(&mut reader).await.unwrap().unwrap()["result"], 1);
            assert_eq!(read_message(&mut reader).await.unwrap().unwrap()["result"], 2);
            assert!(read_message(&mut reader).await.unwrap().is_none());
        });
    }

    #[test]
    fn test_read_message_missing_length() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Content-Type: text/plain\r\n\r\n{}")
            .build();
        let mut reader = BufReader::new(mock);

        let err = tokio_test::block_on(read_message(&mut reader)).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[test]
    fn test_read_message_truncated_headers() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Content-Length: 10\r\n")
            .build();
        let mut reader = BufReader::new(mock);

        let err = tokio_test::block_on(read_message(&mut reader)).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[test]
    fn test_parse_response() {
        let incoming = Incoming::parse(json!({"jsonrpc": "2.0", "id": 7, "result": {"a": 1}})).unwrap();
        assert_eq!(
            incoming,
            Incoming::Response {
                id: 7,
                result: Ok(json!({"a": 1}))
            }
        );
    }

    #[test]
    fn test_parse_error_response() {
        let incoming = Incoming::parse(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32603, "message": "boom"}
        }))
        .unwrap();

        let Incoming::Response { result: Err(error), .. } = incoming else {
            panic!("expected error response");
        };
        assert_eq!(error.code, INTERNAL_ERROR);

        let bridge: BridgeError = error.into();
        assert!(bridge.to_string().contains("boom"));
    }

    #[test]
    fn test_parse_server_request() {
        let incoming = Incoming::parse(json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "method": "workspace/configuration",
            "params": {"items": [{"section": "yaml"}]}
        }))
        .unwrap();

        let Incoming::Request { id, method, params } = incoming else {
            panic!("expected request");
        };
        assert_eq!(id, json!("abc"));
        assert_eq!(method, "workspace/configuration");
        assert_eq!(params["items"][0]["section"], "yaml");
    }

    #[test]
    fn test_parse_notification() {
        let incoming = Incoming::parse(json!({"jsonrpc": "2.0", "method": "initialized"})).unwrap();
        assert_eq!(
            incoming,
            Incoming::Notification {
                method: "initialized".into(),
                params: Value::Null
            }
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Incoming::parse(json!({"jsonrpc": "2.0"})).is_err());
        assert!(Incoming::parse(json!({"id": "x", "result": null})).is_err());
    }
}
