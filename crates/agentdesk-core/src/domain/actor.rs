//! The authenticated caller.

use agentdesk_state::MemberRole;
use serde::{Deserialize, Serialize};

/// A user acting on the desk, with their global roles.
///
/// Global roles gate catalog-wide operations (creating projects, managing
/// agents). Per-project rights come from membership, not from these roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    #[serde(default)]
    pub roles: Vec<MemberRole>,
}

impl Actor {
    pub fn new(user_id: i64, roles: impl IntoIterator<Item = MemberRole>) -> Self {
        let mut roles: Vec<MemberRole> = roles.into_iter().collect();
        roles.sort_unstable();
        roles.dedup();
        Self { user_id, roles }
    }

    pub fn has_any_role(&self, allowed: &[MemberRole]) -> bool {
        self.roles.iter().any(|role| allowed.contains(role))
    }
}
