//! Inference results and federated request parameters.
//!
//! These are the values the gateway caches and the identities it derives
//! cache keys from. They serialize as camelCase JSON so entries written by
//! one gateway process can be read by any other.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known result codes.
pub mod retcode {
    /// Inference completed successfully.
    pub const OK: i32 = 0;
    /// Inference completed with a partial result.
    pub const PARTIAL_SUCCESS: i32 = 102;
}

/// Outcome of an inference call, local or remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnResult {
    pub retcode: i32,
    #[serde(default)]
    pub retmsg: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub case_id: String,
    #[serde(default)]
    pub flag: i32,
}

impl ReturnResult {
    pub fn new(retcode: i32) -> Self {
        Self {
            retcode,
            retmsg: String::new(),
            data: Map::new(),
            case_id: String::new(),
            flag: 0,
        }
    }

    pub fn with_case_id(mut self, case_id: impl Into<String>) -> Self {
        self.case_id = case_id.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.retcode == retcode::OK
    }
}

/// Identity of a deployed model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelInfo {
    pub namespace: String,
    pub name: String,
}

impl ModelInfo {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// A participant in a federated inference, e.g. `guest/9999`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedParty {
    pub role: String,
    pub party_id: String,
}

impl FederatedParty {
    pub fn new(role: impl Into<String>, party_id: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            party_id: party_id.into(),
        }
    }
}

/// All parties taking part in an inference, grouped by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FederatedRoles {
    pub roles: BTreeMap<String, Vec<String>>,
}

impl FederatedRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_party(mut self, role: impl Into<String>, party_id: impl Into<String>) -> Self {
        self.roles
            .entry(role.into())
            .or_default()
            .push(party_id.into());
        self
    }

    /// Stable textual identity of the role layout.
    ///
    /// Roles are rendered in sorted order as `role:id1,id2` with ids sorted,
    /// joined by `|`, so two layouts with the same members always render
    /// identically.
    pub fn identification(&self) -> String {
        self.roles
            .iter()
            .map(|(role, ids)| {
                let mut ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                ids.sort_unstable();
                format!("{role}:{}", ids.join(","))
            })
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// Parameters of a federated inference request sent to remote parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedParams {
    pub case_id: String,
    #[serde(default)]
    pub seq_no: String,
    pub local: FederatedParty,
    #[serde(default)]
    pub role: FederatedRoles,
    #[serde(default)]
    pub feature_id_map: HashMap<String, Value>,
    pub model_info: ModelInfo,
}

impl FederatedParams {
    pub fn new(case_id: impl Into<String>, local: FederatedParty, model_info: ModelInfo) -> Self {
        Self {
            case_id: case_id.into(),
            seq_no: String::new(),
            local,
            role: FederatedRoles::new(),
            feature_id_map: HashMap::new(),
            model_info,
        }
    }

    pub fn with_roles(mut self, roles: FederatedRoles) -> Self {
        self.role = roles;
        self
    }

    pub fn with_feature_id(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.feature_id_map.insert(key.into(), value.into());
        self
    }
}
