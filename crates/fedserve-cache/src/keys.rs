//! Cache key derivation.
//!
//! Keys must be identical across gateway processes for the shared tier to
//! be useful, so every derivation here depends only on request content and
//! never on map iteration order.

use std::collections::HashMap;

use fedserve_core::{FederatedParams, FederatedParty};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Key of a result produced by this party for one case.
pub fn inference_result_key(party_id: &str, case_id: &str) -> String {
    format!("{party_id}_{case_id}")
}

/// How remote inference results are keyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKeyStrategy {
    /// SHA-256 over model identity and sorted feature ids. Shared by every
    /// party that asks the same question.
    #[default]
    Hashed,
    /// Readable key that also pins the asking party and role layout.
    Composite,
}

impl RemoteKeyStrategy {
    /// Key for `params`, pinned to the local party under `Composite`.
    pub fn derive(&self, params: &FederatedParams) -> String {
        self.derive_for(params, &params.local)
    }

    /// Key for `params` as seen by `party`. `Hashed` ignores the party.
    pub fn derive_for(&self, params: &FederatedParams, party: &FederatedParty) -> String {
        match self {
            Self::Hashed => hashed_remote_key(params),
            Self::Composite => composite_remote_key(party, params),
        }
    }
}

/// Hex SHA-256 of `namespace + name + k1 + v1 + k2 + v2 ...` with feature
/// ids sorted by key.
pub fn hashed_remote_key(params: &FederatedParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(params.model_info.namespace.as_bytes());
    hasher.update(params.model_info.name.as_bytes());
    for (key, value) in sorted_features(&params.feature_id_map) {
        hasher.update(key.as_bytes());
        hasher.update(render_value(value).as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// `role#party_id#roles_ident#k1:v1_k2:v2` for `party`, with feature ids
/// sorted by key.
pub fn composite_remote_key(party: &FederatedParty, params: &FederatedParams) -> String {
    let features = sorted_features(&params.feature_id_map)
        .map(|(key, value)| format!("{key}:{}", render_value(value)))
        .collect::<Vec<_>>()
        .join("_");
    format!(
        "{}#{}#{}#{}",
        party.role,
        party.party_id,
        params.role.identification(),
        features
    )
}

fn sorted_features(map: &HashMap<String, Value>) -> impl Iterator<Item = (&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    entries.into_iter()
}

// Strings render without quotes so `"42"` and `42` share a key.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
