//! Boot phase state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the boot a route belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BootPhase {
    /// Store bootstrap and deciding whether a cluster already exists
    InspectCluster,
    /// Adopting state published by an existing cluster
    JoinExisting,
    /// Seeding state for a brand new cluster
    FormNew,
    /// Daemons, heartbeat and watch loop
    SteadyState,
}

impl BootPhase {
    /// Whether a route in `self` may hand over to a route in `next`.
    ///
    /// Staying in the same phase is always allowed.
    pub fn can_transition_to(self, next: BootPhase) -> bool {
        use BootPhase::*;
        self == next
            || matches!(
                (self, next),
                (InspectCluster, JoinExisting)
                    | (InspectCluster, FormNew)
                    | (JoinExisting, SteadyState)
                    | (FormNew, SteadyState)
            )
    }
}

impl fmt::Display for BootPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootPhase::InspectCluster => "inspect-cluster",
            BootPhase::JoinExisting => "join-existing",
            BootPhase::FormNew => "form-new",
            BootPhase::SteadyState => "steady-state",
        };
        f.write_str(name)
    }
}
