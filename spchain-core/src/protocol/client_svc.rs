//! Client-svc `ProcessQuery` encoding.
//!
//! The request is an XML document listing actions and the object paths they
//! act on. The response is a JSON array: a header object followed by
//! `(id, result)` pairs in action order. Object instantiations report an
//! `{"IsNull": false}` entry of their own; property setters and void methods
//! report nothing.

use super::{business_error_from_json, EncodedBatch, ExecutionMode, ProtocolAdapter, ResponseSlot, SubResult};
use super::{WireRequest, WireResponse};
use crate::action::{ClientSvcOperation, Operation};
use crate::error::{BusinessError, CompositionError, SpError};
use crate::ids::{ActionId, ObjectToken};
use crate::node::{Arg, Segment};
use crate::resolver::{ObjectReferenceTable, PathEntry, ResolvedBatch};
use http::Method;
use serde_json::Value;

pub const PROCESS_QUERY_PATH: &str = "/_vti_bin/client.svc/ProcessQuery";

const NAMESPACE: &str = "http://schemas.microsoft.com/sharepoint/clientquery/2009";
const SCHEMA_VERSION: &str = "15.0.0.0";
const LIBRARY_VERSION: &str = "16.0.0.0";
const APPLICATION_NAME: &str = "spchain";

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientSvcAdapter;

impl ProtocolAdapter for ClientSvcAdapter {
    fn serialize(&self, base_url: &str, batch: ResolvedBatch, _mode: ExecutionMode) -> Result<EncodedBatch, SpError> {
        let ResolvedBatch {
            actions, mut table, ..
        } = batch;

        let mut xml_actions = String::new();
        let mut slots = Vec::with_capacity(actions.len());
        for action in &actions {
            let target = action
                .target
                .token()
                .ok_or_else(|| SpError::protocol(format!("{} has no object path", action.id)))?;
            let operation = match &action.operation {
                Operation::ClientSvc(operation) => operation,
                Operation::Rest(_) => {
                    return Err(CompositionError::ProtocolMismatch {
                        node: "rest",
                        batch: "client_svc",
                    }
                    .into())
                }
            };
            slots.push(write_action(
                &mut xml_actions,
                &mut table,
                action.id,
                target,
                operation,
                &action.select,
            ));
        }

        let mut object_paths = String::new();
        for (token, binding) in table.bindings() {
            write_object_path(&mut object_paths, *token, binding.entry())?;
        }

        let body = format!(
            "<Request AddExpandoFieldTypeSuffix=\"true\" SchemaVersion=\"{}\" LibraryVersion=\"{}\" ApplicationName=\"{}\" xmlns=\"{}\"><Actions>{}</Actions><ObjectPaths>{}</ObjectPaths></Request>",
            SCHEMA_VERSION, LIBRARY_VERSION, APPLICATION_NAME, NAMESPACE, xml_actions, object_paths
        );

        let request = WireRequest::new(Method::POST, format!("{}{}", base_url, PROCESS_QUERY_PATH))
            .header("Content-Type", "text/xml")
            .header("Accept", "application/json")
            .body(body);
        Ok(EncodedBatch { request, slots })
    }

    fn deserialize(&self, response: WireResponse, slots: &[ResponseSlot], _mode: ExecutionMode) -> Result<Vec<SubResult>, SpError> {
        let text = response
            .text()
            .map_err(|e| SpError::protocol(format!("response body is not UTF-8: {}", e)))?;

        if !response.status.is_success() {
            let message = if text.trim().is_empty() {
                response.status.canonical_reason().unwrap_or("").to_string()
            } else {
                text.trim().to_string()
            };
            return Err(SpError::Service(BusinessError::with_status(
                response.status.as_u16(),
                message,
            )));
        }

        let value: Value = serde_json::from_str(text)
            .map_err(|e| SpError::protocol(format!("malformed ProcessQuery response: {}", e)))?;
        let entries = value
            .as_array()
            .ok_or_else(|| SpError::protocol("ProcessQuery response is not a JSON array"))?;
        let (header, rest) = entries
            .split_first()
            .ok_or_else(|| SpError::protocol("ProcessQuery response is empty"))?;

        if let Some(err) = business_error_from_json(None, header) {
            return Err(SpError::Service(err));
        }

        if rest.len() % 2 != 0 {
            return Err(SpError::protocol("truncated result pair"));
        }

        let mut entries = rest.chunks_exact(2).map(|pair| (pair[0].as_u64(), &pair[1])).peekable();
        let mut results = Vec::with_capacity(slots.len());
        for slot in slots {
            let mut instantiation_error = None;
            if let Some(internal) = slot.internal {
                if let Some((_, entry)) = entries.next_if(|(label, _)| *label == Some(u64::from(internal))) {
                    instantiation_error = business_error_from_json(None, entry);
                }
            }

            let reported = match slot.label {
                Some(expected) => entries.next_if(|(label, _)| *label == Some(u64::from(expected))),
                None => entries.next(),
            };
            results.push(match (instantiation_error, reported) {
                (Some(err), _) => Err(err),
                (None, Some((_, result))) => match business_error_from_json(None, result) {
                    Some(err) => Err(err),
                    None => Ok(result.clone()),
                },
                (None, None) if slot.optional => Ok(Value::Null),
                (None, None) => {
                    return Err(SpError::protocol(format!(
                        "no result for {} (expected id {:?})",
                        slot.action, slot.label
                    )))
                }
            });
        }

        if let Some((label, _)) = entries.next() {
            return Err(SpError::protocol(format!(
                "unexpected result id {:?} after the last action",
                label
            )));
        }
        Ok(results)
    }
}

/// Append the elements of one action; returns where its result is reported.
fn write_action(
    out: &mut String,
    table: &mut ObjectReferenceTable,
    action: ActionId,
    target: ObjectToken,
    operation: &ClientSvcOperation,
    select: &[String],
) -> ResponseSlot {
    match operation {
        ClientSvcOperation::Query { properties } => {
            let id = table.allocate();
            write_query(out, id, target, properties, select);
            ResponseSlot::labelled(action, id.as_u32())
        }
        ClientSvcOperation::Method { name, params } => {
            let id = table.allocate();
            out.push_str(&format!(
                "<Method Name=\"{}\" Id=\"{}\" ObjectPathId=\"{}\">",
                escape(name),
                id,
                target
            ));
            write_parameters(out, params);
            out.push_str("</Method>");
            ResponseSlot {
                optional: true,
                ..ResponseSlot::labelled(action, id.as_u32())
            }
        }
        ClientSvcOperation::SetProperty { name, value } => {
            let id = table.allocate();
            out.push_str(&format!(
                "<SetProperty Id=\"{}\" ObjectPathId=\"{}\" Name=\"{}\">",
                id,
                target,
                escape(name)
            ));
            write_parameter(out, value);
            out.push_str("</SetProperty>");
            ResponseSlot {
                optional: true,
                ..ResponseSlot::labelled(action, id.as_u32())
            }
        }
        ClientSvcOperation::Create { properties } => {
            let instantiate = table.allocate();
            out.push_str(&format!(
                "<ObjectPath Id=\"{}\" ObjectPathId=\"{}\" />",
                instantiate, target
            ));
            let id = table.allocate();
            write_query(out, id, target, properties, select);
            ResponseSlot {
                internal: Some(instantiate.as_u32()),
                ..ResponseSlot::labelled(action, id.as_u32())
            }
        }
    }
}

fn write_query(out: &mut String, id: ObjectToken, target: ObjectToken, properties: &[String], select: &[String]) {
    let properties = if properties.is_empty() { select } else { properties };
    out.push_str(&format!(
        "<Query Id=\"{}\" ObjectPathId=\"{}\"><Query SelectAllProperties=\"{}\"><Properties>",
        id,
        target,
        properties.is_empty()
    ));
    for property in properties {
        out.push_str(&format!(
            "<Property Name=\"{}\" ScalarProperty=\"true\" />",
            escape(property)
        ));
    }
    out.push_str("</Properties></Query></Query>");
}

fn write_object_path(out: &mut String, token: ObjectToken, entry: &PathEntry) -> Result<(), SpError> {
    let parent = entry.parent.map(|p| format!(" ParentId=\"{}\"", p)).unwrap_or_default();
    match &entry.step {
        Segment::StaticMethod { type_id, name, args } => {
            out.push_str(&format!(
                "<StaticMethod Id=\"{}\" Name=\"{}\" TypeId=\"{}\">",
                token,
                escape(name),
                escape(type_id)
            ));
            write_parameters(out, args);
            out.push_str("</StaticMethod>");
        }
        Segment::StaticProperty { type_id, name } => out.push_str(&format!(
            "<StaticProperty Id=\"{}\" TypeId=\"{}\" Name=\"{}\" />",
            token,
            escape(type_id),
            escape(name)
        )),
        Segment::Path(name) => out.push_str(&format!(
            "<Property Id=\"{}\"{} Name=\"{}\" />",
            token,
            parent,
            escape(name)
        )),
        Segment::Method { name, args } => {
            out.push_str(&format!(
                "<Method Id=\"{}\"{} Name=\"{}\">",
                token,
                parent,
                escape(name)
            ));
            write_parameters(out, args);
            out.push_str("</Method>");
        }
        Segment::Raw(text) => {
            return Err(SpError::configuration(format!(
                "raw segment '{}' has no client-svc object path form",
                text
            )))
        }
    }
    Ok(())
}

fn write_parameters(out: &mut String, args: &[Arg]) {
    out.push_str("<Parameters>");
    for arg in args {
        write_parameter(out, arg);
    }
    out.push_str("</Parameters>");
}

fn write_parameter(out: &mut String, arg: &Arg) {
    match arg {
        Arg::Str(s) => out.push_str(&format!("<Parameter Type=\"String\">{}</Parameter>", escape(s))),
        Arg::Int(n) => out.push_str(&format!("<Parameter Type=\"Number\">{}</Parameter>", n)),
        Arg::Float(n) => out.push_str(&format!("<Parameter Type=\"Number\">{}</Parameter>", n)),
        Arg::Bool(b) => out.push_str(&format!("<Parameter Type=\"Boolean\">{}</Parameter>", b)),
        Arg::Guid(id) => out.push_str(&format!("<Parameter Type=\"Guid\">{{{}}}</Parameter>", id)),
        Arg::Null => out.push_str("<Parameter Type=\"Null\" />"),
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use crate::ids::{next_batch_id, ActionId};
    use crate::protocol::Protocol;
    use crate::resolver::{PreparedAction, TargetRef};
    use serde_json::json;
    use uuid::Uuid;

    fn session_step() -> Segment {
        Segment::StaticMethod {
            type_id: "{981cbc68-9edc-4f8d-872f-71146fcbb84f}".into(),
            name: "GetTaxonomySession".into(),
            args: vec![],
        }
    }

    #[test]
    fn test_serialize_create_then_update() {
        let mut table = ObjectReferenceTable::new();
        let session = table.intern(None, &session_step(), None);
        let set = table.intern(
            Some(session),
            &Segment::method("GetTermSetById", [Arg::Guid(Uuid::nil())]),
            None,
        );
        let term = table.produce(
            Some(set),
            Segment::method("CreateTerm", [Arg::from("Blue"), Arg::from(1033)]),
            ActionId::new(0),
        );

        let batch = ResolvedBatch {
            batch: next_batch_id(),
            protocol: Protocol::ClientSvc,
            actions: vec![
                PreparedAction {
                    id: ActionId::new(0),
                    kind: ActionKind::Create,
                    operation: Operation::ClientSvc(ClientSvcOperation::Create {
                        properties: vec!["Id".into()],
                    }),
                    target: TargetRef::Forward {
                        token: term,
                        origin: ActionId::new(0),
                    },
                    produces: Some(term),
                    select: vec![],
                },
                PreparedAction {
                    id: ActionId::new(1),
                    kind: ActionKind::Invoke,
                    operation: Operation::ClientSvc(ClientSvcOperation::method(
                        "SetDescription",
                        [Arg::from("a <b> & c"), Arg::from(1033)],
                    )),
                    target: TargetRef::Forward {
                        token: term,
                        origin: ActionId::new(0),
                    },
                    produces: None,
                    select: vec![],
                },
            ],
            table,
        };

        let encoded = ClientSvcAdapter
            .serialize("https://t/sites/a", batch, ExecutionMode::Deferred)
            .unwrap();
        assert_eq!(encoded.request.url, "https://t/sites/a/_vti_bin/client.svc/ProcessQuery");
        assert_eq!(encoded.request.headers["Content-Type"], "text/xml");

        // three object paths take tokens 0..=2, then ObjectPath 3, Query 4, Method 5
        assert_eq!(encoded.slots[0].label, Some(4));
        assert_eq!(encoded.slots[0].internal, Some(3));
        assert!(!encoded.slots[0].optional);
        assert_eq!(encoded.slots[1].label, Some(5));
        assert!(encoded.slots[1].optional);

        let body = encoded.request.body_text();
        assert!(body.contains("<ObjectPath Id=\"3\" ObjectPathId=\"2\" />"));
        assert!(body.contains("<Property Name=\"Id\" ScalarProperty=\"true\" />"));
        assert!(body.contains("<Method Name=\"SetDescription\" Id=\"5\" ObjectPathId=\"2\">"));
        assert!(body.contains("a &lt;b&gt; &amp; c"));
        assert!(body.contains("<StaticMethod Id=\"0\" Name=\"GetTaxonomySession\""));
        assert!(body.contains("<Method Id=\"2\" ParentId=\"1\" Name=\"CreateTerm\">"));
        assert!(body.contains("<Parameter Type=\"Guid\">{00000000-0000-0000-0000-000000000000}</Parameter>"));
        assert!(body.contains("<Parameter Type=\"Number\">1033</Parameter>"));
    }

    fn slots(labels: &[u32]) -> Vec<ResponseSlot> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| ResponseSlot::labelled(ActionId::new(i as u32), *label))
            .collect()
    }

    #[test]
    fn test_deserialize_pairs() {
        let body = json!([
            {"SchemaVersion": "15.0.0.0", "ErrorInfo": null},
            4, {"Name": "Blue", "Id": "/Guid(00000000-0000-0000-0000-000000000001)/"},
            5, {"ErrorInfo": {"ErrorMessage": "Description too long", "ErrorTypeName": "ArgumentException"}}
        ])
        .to_string();

        let results = ClientSvcAdapter
            .deserialize(WireResponse::ok(body), &slots(&[4, 5]), ExecutionMode::Deferred)
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap()["Name"], "Blue");
        assert_eq!(results[1].as_ref().unwrap_err().message, "Description too long");
    }

    #[test]
    fn test_deserialize_create_and_setters() {
        // create: ObjectPath 3 + Query 4; SetProperty 5 and a void method 6 report nothing
        let slots = vec![
            ResponseSlot {
                internal: Some(3),
                ..ResponseSlot::labelled(ActionId::new(0), 4)
            },
            ResponseSlot {
                optional: true,
                ..ResponseSlot::labelled(ActionId::new(1), 5)
            },
            ResponseSlot {
                optional: true,
                ..ResponseSlot::labelled(ActionId::new(2), 6)
            },
        ];
        let body = json!([
            {"SchemaVersion": "15.0.0.0", "LibraryVersion": "16.0.0.0", "ErrorInfo": null},
            3, {"IsNull": false},
            4, {"_ObjectType_": "SP.Taxonomy.Term", "Name": "Blue"}
        ])
        .to_string();

        let results = ClientSvcAdapter
            .deserialize(WireResponse::ok(body), &slots, ExecutionMode::Deferred)
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap()["Name"], "Blue");
        assert!(results[1].as_ref().unwrap().is_null());
        assert!(results[2].as_ref().unwrap().is_null());

        // a method that does return something keeps its value
        let body = json!([{"ErrorInfo": null}, 3, {"IsNull": false}, 4, {}, 6, "label-id"]).to_string();
        let results = ClientSvcAdapter
            .deserialize(WireResponse::ok(body), &slots, ExecutionMode::Deferred)
            .unwrap();
        assert_eq!(results[2].as_ref().unwrap(), "label-id");
    }

    #[test]
    fn test_missing_query_result_or_stray_id_fails() {
        let create = [ResponseSlot {
            internal: Some(3),
            ..ResponseSlot::labelled(ActionId::new(0), 4)
        }];
        let no_query = json!([{"ErrorInfo": null}, 3, {"IsNull": false}]).to_string();
        let err = ClientSvcAdapter
            .deserialize(WireResponse::ok(no_query), &create, ExecutionMode::Deferred)
            .unwrap_err();
        assert!(matches!(err, SpError::Protocol(_)));

        let setter = [ResponseSlot {
            optional: true,
            ..ResponseSlot::labelled(ActionId::new(0), 5)
        }];
        let stray = json!([{"ErrorInfo": null}, 9, {}]).to_string();
        let err = ClientSvcAdapter
            .deserialize(WireResponse::ok(stray), &setter, ExecutionMode::Deferred)
            .unwrap_err();
        assert!(matches!(err, SpError::Protocol(_)));
    }

    #[test]
    fn test_header_error_fails_batch() {
        let body = json!([{"ErrorInfo": {"ErrorMessage": "Access denied", "ErrorTypeName": "UnauthorizedAccessException"}}]).to_string();
        let err = ClientSvcAdapter
            .deserialize(WireResponse::ok(body), &slots(&[4]), ExecutionMode::Deferred)
            .unwrap_err();
        assert!(matches!(err, SpError::Service(ref e) if e.message == "Access denied"));
    }

    #[test]
    fn test_label_and_count_mismatch() {
        let wrong_label = json!([{"ErrorInfo": null}, 7, {}]).to_string();
        let err = ClientSvcAdapter
            .deserialize(WireResponse::ok(wrong_label), &slots(&[4]), ExecutionMode::Deferred)
            .unwrap_err();
        assert!(matches!(err, SpError::Protocol(_)));

        let short = json!([{"ErrorInfo": null}, 4, {}]).to_string();
        let err = ClientSvcAdapter
            .deserialize(WireResponse::ok(short), &slots(&[4, 5]), ExecutionMode::Deferred)
            .unwrap_err();
        assert!(matches!(err, SpError::Protocol(_)));

        let err = ClientSvcAdapter
            .deserialize(WireResponse::ok("<html/>"), &slots(&[4]), ExecutionMode::Deferred)
            .unwrap_err();
        assert!(matches!(err, SpError::Protocol(_)));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a\"b'c"), "a&quot;b&apos;c");
        assert_eq!(escape("plain"), "plain");
    }
}
