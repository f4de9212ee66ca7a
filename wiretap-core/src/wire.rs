//! Outbound messages sent to the debugger client

use serde_json::{json, Map, Value};
use wiretap_common::{encode_body, Headers, InterceptedRequest, InterceptedResponse};

pub const DEBUG_REQUEST_TYPE: &str = "debugRequest";

/// Query asking the debugger for a response decision. `message_id` is the
/// id the debugger must echo in its `debugReply`.
pub fn debug_request_message(message_id: &str, response: Option<&InterceptedResponse>) -> String {
    let mut object = Map::new();
    object.insert("type".into(), Value::from(DEBUG_REQUEST_TYPE));
    object.insert("requestId".into(), Value::from(message_id));
    if let Some(response) = response {
        object.insert("response".into(), response_json(response));
    }
    Value::Object(object).to_string()
}

/// Query asking the debugger for a replacement request. The serialized
/// request carries the query id as its `messageId`.
pub fn debug_request_override_message(message_id: &str, request: &InterceptedRequest) -> String {
    let mut request_object = request_json(request);
    request_object["messageId"] = Value::from(message_id);

    json!({
        "type": DEBUG_REQUEST_TYPE,
        "request": request_object,
    })
    .to_string()
}

pub fn request_json(request: &InterceptedRequest) -> Value {
    json!({
        "type": "request",
        "messageId": request.message_id(),
        "requestId": request.request_id(),
        "timestamp": request.timestamp().timestamp_millis(),
        "url": request.url(),
        "method": request.method(),
        "headers": headers_json(request.headers()),
        "body": encode_body(request.body()),
    })
}

pub fn response_json(response: &InterceptedResponse) -> Value {
    let timings = response.timings();
    json!({
        "type": "response",
        "messageId": response.message_id(),
        "requestId": response.request_id(),
        "timestamp": response.timestamp().timestamp_millis(),
        "statusCode": response.status_code(),
        "statusLine": response.status_line(),
        "httpVersion": response.http_version(),
        "headers": headers_json(response.headers()),
        "body": encode_body(response.body()),
        "writeTime": timings.write_time,
        "readTime": timings.read_time,
        "waitTime": timings.wait_time,
    })
}

fn headers_json(headers: &Headers) -> Value {
    let object: Map<String, Value> = headers
        .iter()
        .map(|(name, values)| (name.clone(), Value::from(values.clone())))
        .collect();
    Value::Object(object)
}
