use std::fmt;

use serde::Deserialize;

/// Application lifecycle points at which a non-route command runs once.
///
/// - `Startup`: after every handler validated, before the listener accepts
///   requests.
/// - `Shutdown`: after the listener stopped, before tracked processes are
///   terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Startup,
    Shutdown,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Startup => f.write_str("startup"),
            LifecycleEvent::Shutdown => f.write_str("shutdown"),
        }
    }
}
