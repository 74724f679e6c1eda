use serde::{Deserialize, Serialize};

/// The party on whose behalf an event is recorded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier (user id, service account, API key id).
    pub id: String,
    /// Name shown in audit trails at the time of the action.
    pub display_name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Actor for actions performed by the system itself.
    pub fn system() -> Self {
        Self::new("system", "System")
    }
}

/// Where a request came from. Both fields are optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OriginMeta {
    /// Caller network address.
    pub address: Option<String>,
    /// Caller agent string.
    pub agent: Option<String>,
}

impl OriginMeta {
    pub fn new(address: Option<String>, agent: Option<String>) -> Self {
        Self { address, agent }
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.agent.is_none()
    }
}

/// Caller identity and request context passed in for every event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub actor: Actor,
    #[serde(default)]
    pub origin: OriginMeta,
}

impl CallerContext {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            origin: OriginMeta::default(),
        }
    }

    pub fn with_origin(mut self, origin: OriginMeta) -> Self {
        self.origin = origin;
        self
    }
}
