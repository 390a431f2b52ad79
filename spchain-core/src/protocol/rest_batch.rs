//! REST `$batch` encoding: one `multipart/mixed` request, reads as plain
//! `application/http` parts, every write inside its own change set.

use super::{business_error_from_json, EncodedBatch, ExecutionMode, ProtocolAdapter, ResponseSlot, SubResult};
use super::{WireRequest, WireResponse};
use crate::action::{Operation, RestOperation};
use crate::error::{BusinessError, CompositionError, SpError};
use crate::resolver::{PreparedAction, ResolvedBatch};
use http::Method;
use indexmap::IndexMap;
use serde_json::Value;
use uuid::Uuid;

pub const BATCH_PATH: &str = "/_api/$batch";

const CRLF: &str = "\r\n";

const BATCH_RESPONSE_PREFIX: &str = "batchresponse_";
const CHANGESET_RESPONSE_PREFIX: &str = "changesetresponse_";

#[derive(Debug, Clone, Copy, Default)]
pub struct RestBatchAdapter;

impl ProtocolAdapter for RestBatchAdapter {
    fn serialize(&self, base_url: &str, batch: ResolvedBatch, mode: ExecutionMode) -> Result<EncodedBatch, SpError> {
        let slots = batch
            .actions
            .iter()
            .map(|action| ResponseSlot::positional(action.id))
            .collect();

        let request = match (mode, batch.actions.as_slice()) {
            (ExecutionMode::Immediate, [action]) => direct_request(action)?,
            _ => multipart_request(base_url, &batch.actions)?,
        };
        Ok(EncodedBatch { request, slots })
    }

    fn deserialize(&self, response: WireResponse, slots: &[ResponseSlot], mode: ExecutionMode) -> Result<Vec<SubResult>, SpError> {
        let text = response
            .text()
            .map_err(|e| SpError::protocol(format!("response body is not UTF-8: {}", e)))?;

        if mode == ExecutionMode::Immediate && slots.len() == 1 {
            let status = response.status.as_u16();
            let reason = response.status.canonical_reason().unwrap_or("");
            return Ok(vec![part_result(status, reason, text.trim())]);
        }

        if !response.status.is_success() {
            return Err(SpError::Service(error_from_body(
                response.status.as_u16(),
                response.status.canonical_reason().unwrap_or(""),
                text.trim(),
            )));
        }

        let boundary = response_boundary(&response.headers);
        let parts = parse_multipart(text, boundary.as_deref())?;
        if parts.len() != slots.len() {
            return Err(SpError::protocol(format!(
                "expected {} batch parts, received {}",
                slots.len(),
                parts.len()
            )));
        }

        Ok(parts
            .into_iter()
            .map(|part| part_result(part.status, &part.reason, &part.body))
            .collect())
    }
}

fn rest_operation(action: &PreparedAction) -> Result<(&RestOperation, &str), SpError> {
    let operation = match &action.operation {
        Operation::Rest(operation) => operation,
        Operation::ClientSvc(_) => {
            return Err(CompositionError::ProtocolMismatch {
                node: "client_svc",
                batch: "rest",
            }
            .into())
        }
    };
    let url = action
        .target
        .url()
        .ok_or_else(|| SpError::protocol(format!("{} has no REST address", action.id)))?;
    Ok((operation, url))
}

fn direct_request(action: &PreparedAction) -> Result<WireRequest, SpError> {
    let (operation, url) = rest_operation(action)?;
    let mut request = WireRequest::new(operation.method.clone(), url).header("Accept", "application/json");
    for (name, value) in &operation.headers {
        request = request.header(name.clone(), value.clone());
    }
    if let Some(body) = &operation.body {
        request = request
            .header("Content-Type", "application/json;odata=verbose")
            .body(serde_json::to_vec(body)?);
    }
    Ok(request)
}

fn multipart_request(base_url: &str, actions: &[PreparedAction]) -> Result<WireRequest, SpError> {
    let boundary = format!("batch_{}", Uuid::new_v4());
    let mut body = String::new();

    for action in actions {
        let (operation, url) = rest_operation(action)?;
        body.push_str(&format!("--{}{}", boundary, CRLF));
        if operation.is_read() {
            write_part(&mut body, operation, url)?;
        } else {
            let changeset = format!("changeset_{}", Uuid::new_v4());
            body.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=\"{}\"{}{}",
                changeset, CRLF, CRLF
            ));
            body.push_str(&format!("--{}{}", changeset, CRLF));
            write_part(&mut body, operation, url)?;
            body.push_str(&format!("--{}--{}", changeset, CRLF));
        }
    }
    body.push_str(&format!("--{}--{}", boundary, CRLF));

    Ok(WireRequest::new(Method::POST, format!("{}{}", base_url, BATCH_PATH))
        .header("Content-Type", format!("multipart/mixed; boundary=\"{}\"", boundary))
        .header("Accept", "application/json")
        .body(body))
}

fn write_part(body: &mut String, operation: &RestOperation, url: &str) -> Result<(), SpError> {
    body.push_str("Content-Type: application/http");
    body.push_str(CRLF);
    body.push_str("Content-Transfer-Encoding: binary");
    body.push_str(CRLF);
    body.push_str(CRLF);
    body.push_str(&format!("{} {} HTTP/1.1{}", operation.method, url, CRLF));
    body.push_str(&format!("accept: application/json{}", CRLF));
    for (name, value) in &operation.headers {
        body.push_str(&format!("{}: {}{}", name, value, CRLF));
    }
    match &operation.body {
        Some(payload) => {
            body.push_str(&format!("content-type: application/json;odata=verbose{}{}", CRLF, CRLF));
            body.push_str(&serde_json::to_string(payload)?);
            body.push_str(CRLF);
        }
        None => body.push_str(CRLF),
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
struct ResponsePart {
    status: u16,
    reason: String,
    body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Seeking,
    Headers,
    Body,
}

/// Boundary declared by the response `Content-Type`, if any.
fn response_boundary(headers: &IndexMap<String, String>) -> Option<String> {
    let (_, content_type) = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))?;
    content_type.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Delimiter lines: the declared boundary, or the batch and changeset
/// boundaries the service generates.
fn is_boundary(line: &str, boundary: Option<&str>) -> bool {
    let Some(rest) = line.trim_end().strip_prefix("--") else {
        return false;
    };
    if let Some(boundary) = boundary {
        if rest.strip_prefix(boundary).is_some_and(|tail| tail.is_empty() || tail == "--") {
            return true;
        }
    }
    rest.starts_with(BATCH_RESPONSE_PREFIX) || rest.starts_with(CHANGESET_RESPONSE_PREFIX)
}

/// Positional scan of a multipart response: each `HTTP/1.1 <status>` line
/// opens a part, its body runs from the blank line to the next boundary.
fn parse_multipart(text: &str, boundary: Option<&str>) -> Result<Vec<ResponsePart>, SpError> {
    let mut parts = Vec::new();
    let mut state = ParseState::Seeking;
    let mut current: Option<(u16, String)> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in text.split('\n').map(|l| l.trim_end_matches('\r')) {
        match state {
            ParseState::Seeking => {
                if let Some((status, reason)) = parse_status_line(line)? {
                    current = Some((status, reason));
                    body.clear();
                    state = ParseState::Headers;
                }
            }
            ParseState::Headers => {
                if line.is_empty() {
                    state = ParseState::Body;
                }
            }
            ParseState::Body => {
                if is_boundary(line, boundary) {
                    if let Some((status, reason)) = current.take() {
                        parts.push(ResponsePart {
                            status,
                            reason,
                            body: body.join("\n").trim().to_string(),
                        });
                    }
                    state = ParseState::Seeking;
                } else {
                    body.push(line);
                }
            }
        }
    }

    match (state, current) {
        (ParseState::Headers, Some(_)) => Err(SpError::protocol("batch response ended inside part headers")),
        (ParseState::Body, Some((status, reason))) => {
            parts.push(ResponsePart {
                status,
                reason,
                body: body.join("\n").trim().to_string(),
            });
            Ok(parts)
        }
        _ => Ok(parts),
    }
}

fn parse_status_line(line: &str) -> Result<Option<(u16, String)>, SpError> {
    let Some(rest) = line.strip_prefix("HTTP/") else {
        return Ok(None);
    };
    let mut fields = rest.splitn(3, ' ');
    let _version = fields.next();
    let status = fields
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| SpError::protocol(format!("malformed status line '{}'", line)))?;
    let reason = fields.next().unwrap_or("").to_string();
    Ok(Some((status, reason)))
}

fn part_result(status: u16, reason: &str, body: &str) -> SubResult {
    if !(200..300).contains(&status) {
        return Err(error_from_body(status, reason, body));
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}

fn error_from_body(status: u16, reason: &str, body: &str) -> BusinessError {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| business_error_from_json(Some(status), &json))
        .unwrap_or_else(|| {
            let message = if body.is_empty() { reason } else { body };
            BusinessError::with_status(status, message)
        })
}
