use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims shared by the REST middleware and the gateway's WebSocket
/// authentication. Token issuance belongs to the external auth service;
/// both sides here only validate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    #[serde(default = "default_role")]
    pub role: String,
    pub exp: usize,
}

fn default_role() -> String {
    "member".to_string()
}
