//! Protocol messages for push and pull.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{ClientGroupId, ClientId, CvrId};
use crate::mutation::Mutation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncMessage {
    /// Push request.
    Push(PushRequest),
    /// Push response.
    PushResponse(PushResponse),
    /// Pull request.
    Pull(PullRequest),
    /// Pull response.
    PullResponse(PullResponse),
}

impl SyncMessage {
    /// Encodes to JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::malformed(e.to_string()))
    }
}

/// Push request from a client group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Client group submitting the batch.
    #[serde(rename = "clientGroupID")]
    pub client_group_id: ClientGroupId,
    /// Mutations in submission order.
    pub mutations: Vec<Mutation>,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(client_group_id: impl Into<ClientGroupId>, mutations: Vec<Mutation>) -> Self {
        Self {
            client_group_id: client_group_id.into(),
            mutations,
        }
    }
}

/// Push response. Success carries no body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {}

/// Client-held pointer bridging consecutive pulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Client group CVR version at snapshot time.
    pub order: u64,
    /// Snapshot the client has applied.
    #[serde(rename = "cvrID")]
    pub cvr_id: CvrId,
}

impl Cookie {
    /// Creates a cookie.
    pub fn new(order: u64, cvr_id: CvrId) -> Self {
        Self { order, cvr_id }
    }
}

/// Pull request from a client group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Client group pulling.
    #[serde(rename = "clientGroupID")]
    pub client_group_id: ClientGroupId,
    /// Cookie from the previous pull; `None` on the first pull.
    pub cookie: Option<Cookie>,
}

impl PullRequest {
    /// Creates a pull request.
    pub fn new(client_group_id: impl Into<ClientGroupId>, cookie: Option<Cookie>) -> Self {
        Self {
            client_group_id: client_group_id.into(),
            cookie,
        }
    }
}

/// One operation of a pull patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PatchOp {
    /// Drop everything the client holds.
    Clear,
    /// Remove one key.
    Del {
        /// Key to remove.
        key: String,
    },
    /// Insert or replace one key.
    Put {
        /// Key to write.
        key: String,
        /// Full current payload.
        value: Value,
    },
}

impl PatchOp {
    /// Returns the key this op addresses, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            PatchOp::Clear => None,
            PatchOp::Del { key } | PatchOp::Put { key, .. } => Some(key.as_str()),
        }
    }
}

/// Pull response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Cookie to send with the next pull.
    pub cookie: Cookie,
    /// Clients whose `lastMutationID` advanced since the base snapshot.
    #[serde(rename = "lastMutationIDChanges")]
    pub last_mutation_id_changes: BTreeMap<ClientId, u64>,
    /// Operations turning the client's view into the current one.
    pub patch: Vec<PatchOp>,
}

impl PullResponse {
    /// Creates a response that changes nothing and echoes the cookie.
    pub fn unchanged(cookie: Cookie) -> Self {
        Self {
            cookie,
            last_mutation_id_changes: BTreeMap::new(),
            patch: Vec::new(),
        }
    }

    /// Returns true if the response carries no changes.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.patch.is_empty() && self.last_mutation_id_changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationName;
    use serde_json::json;

    #[test]
    fn pull_request_wire_shape() {
        let req: PullRequest = serde_json::from_value(json!({
            "clientGroupID": "g1",
            "cookie": {"order": 3, "cvrID": "abc"}
        }))
        .unwrap();
        assert_eq!(req.client_group_id, ClientGroupId::new("g1"));
        assert_eq!(req.cookie, Some(Cookie::new(3, CvrId::new("abc"))));

        let first: PullRequest =
            serde_json::from_value(json!({"clientGroupID": "g1", "cookie": null})).unwrap();
        assert!(first.cookie.is_none());
    }

    #[test]
    fn patch_ops_are_tagged() {
        let ops = vec![
            PatchOp::Clear,
            PatchOp::Del { key: "progress/1".into() },
            PatchOp::Put {
                key: "progress/2".into(),
                value: json!({"version": 1}),
            },
        ];
        assert_eq!(
            serde_json::to_value(&ops).unwrap(),
            json!([
                {"op": "clear"},
                {"op": "del", "key": "progress/1"},
                {"op": "put", "key": "progress/2", "value": {"version": 1}}
            ])
        );
        assert_eq!(ops[0].key(), None);
        assert_eq!(ops[2].key(), Some("progress/2"));
    }

    #[test]
    fn pull_response_wire_shape() {
        let mut changes = BTreeMap::new();
        changes.insert(ClientId::new("x"), 1);
        let resp = PullResponse {
            cookie: Cookie::new(1, CvrId::new("c")),
            last_mutation_id_changes: changes,
            patch: vec![],
        };
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({
                "cookie": {"order": 1, "cvrID": "c"},
                "lastMutationIDChanges": {"x": 1},
                "patch": []
            })
        );
    }

    #[test]
    fn message_dispatch_encoding() {
        let msg = SyncMessage::Push(PushRequest::new(
            "g1",
            vec![Mutation::new(1, "x", MutationName::SetTime, json!(120))],
        ));
        let bytes = msg.encode().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "push");
        assert_eq!(value["mutations"][0]["name"], "setTime");
        assert_eq!(SyncMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            SyncMessage::decode(b"{\"type\":\"nope\"}"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn unchanged_response_is_noop() {
        let resp = PullResponse::unchanged(Cookie::new(4, CvrId::new("c")));
        assert!(resp.is_noop());
        assert_eq!(resp.cookie.order, 4);
    }
}
