//! Newline-delimited JSON-RPC framing for the Stratum dialect spoken to
//! the pool: requests the coordinator emits, and the two message shapes
//! (Response, Notification) it accepts back.

use crate::error::CoordinatorError;
use serde::Serialize;
use serde_json::{json, Value};

pub const MINING_SUBSCRIBE: &str = "mining.subscribe";
pub const MINING_AUTHORIZE: &str = "mining.authorize";
pub const MINING_SUBMIT: &str = "mining.submit";
pub const MINING_SET_TARGET: &str = "mining.set_target";
pub const MINING_NOTIFY: &str = "mining.notify";

/// A pool message, classified by key presence: a `result` key (even if
/// null) makes it a Response, a `method` key makes it a Notification.
/// Neither present is a protocol error.
#[derive(Debug, Clone, PartialEq)]
pub enum StratumMessage {
    Response {
        id: u64,
        result: Option<Value>,
        error: Option<Value>,
    },
    Notification {
        method: String,
        params: Vec<Value>,
    },
}

#[derive(Serialize)]
struct RequestWire {
    id: u64,
    method: &'static str,
    params: Vec<Value>,
}

/// Serializes `{"id":id,"method":method,"params":params}` as one
/// newline-terminated JSON line.
pub fn encode_request(method: &'static str, id: u64, params: Vec<Value>) -> String {
    let wire = RequestWire { id, method, params };
    format!("{}\n", serde_json::to_string(&wire).expect("request serializes"))
}

pub fn encode_subscribe(id: u64, host: &str, port: u16) -> String {
    encode_request(
        MINING_SUBSCRIBE,
        id,
        vec![json!("silentarmy"), Value::Null, json!(host), json!(port.to_string())],
    )
}

pub fn encode_authorize(id: u64, user: &str, pwd: Option<&str>) -> String {
    let params = match pwd {
        Some(pwd) => vec![json!(user), json!(pwd)],
        None => vec![json!(user)],
    };
    encode_request(MINING_AUTHORIZE, id, params)
}

pub fn encode_submit(
    id: u64,
    user: &str,
    job_id: &str,
    ntime: &str,
    nonce_rightpart: &str,
    sol: &str,
) -> String {
    encode_request(
        MINING_SUBMIT,
        id,
        vec![
            json!(user),
            json!(job_id),
            json!(ntime),
            json!(nonce_rightpart),
            json!(sol),
        ],
    )
}

/// Parses one already-framed line (no trailing newline needed).
pub fn decode_message(line: &str) -> Result<StratumMessage, CoordinatorError> {
    let value: Value = serde_json::from_str(line.trim())?;
    let obj = value
        .as_object()
        .ok_or_else(|| CoordinatorError::Protocol("message is not a JSON object".into()))?;

    if obj.contains_key("result") {
        let id = obj
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| CoordinatorError::Protocol("response missing numeric id".into()))?;
        return Ok(StratumMessage::Response {
            id,
            result: obj.get("result").cloned().filter(|v| !v.is_null()),
            error: obj.get("error").cloned().filter(|v| !v.is_null()),
        });
    }

    if let Some(method) = obj.get("method").and_then(Value::as_str) {
        let params = obj
            .get("params")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        return Ok(StratumMessage::Notification {
            method: method.to_string(),
            params,
        });
    }

    Err(CoordinatorError::Protocol(
        "message has neither result nor method".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_response_by_result_key_even_if_null() {
        let msg = decode_message(r#"{"id":1,"result":null,"error":null}"#).unwrap();
        assert_eq!(
            msg,
            StratumMessage::Response {
                id: 1,
                result: None,
                error: None
            }
        );
    }

    #[test]
    fn classifies_notification_by_method_key() {
        let msg =
            decode_message(r#"{"id":null,"method":"mining.set_target","params":["ff"]}"#).unwrap();
        assert_eq!(
            msg,
            StratumMessage::Notification {
                method: "mining.set_target".into(),
                params: vec![json!("ff")]
            }
        );
    }

    #[test]
    fn neither_key_is_a_protocol_error() {
        assert!(decode_message(r#"{"foo":"bar"}"#).is_err());
    }

    #[test]
    fn bad_json_is_a_protocol_error() {
        assert!(decode_message("not json").is_err());
    }

    #[test]
    fn subscribe_request_round_trips_method_id_params() {
        let line = encode_subscribe(1, "pool.example.com", 3333);
        assert!(line.ends_with('\n'));
        let value: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["id"], 1);
        assert_eq!(value["method"], MINING_SUBSCRIBE);
        assert_eq!(
            value["params"],
            json!(["silentarmy", null, "pool.example.com", "3333"])
        );
    }

    #[test]
    fn authorize_without_password_has_single_param() {
        let line = encode_authorize(2, "user", None);
        let value: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["params"], json!(["user"]));
    }

    #[test]
    fn authorize_with_password_has_two_params() {
        let line = encode_authorize(2, "user", Some("pwd"));
        let value: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["params"], json!(["user", "pwd"]));
    }

    #[test]
    fn submit_params_are_the_four_solver_tokens_in_order() {
        let line = encode_submit(3, "user", "job1", "5a000000", "deadbeef0011", "aabbccdd");
        let value: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(
            value["params"],
            json!(["user", "job1", "5a000000", "deadbeef0011", "aabbccdd"])
        );
    }
}
