use serde::{Deserialize, Serialize};

/// The caller as established by the identity layer. `id` is the opaque
/// owner id every alert is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
}
