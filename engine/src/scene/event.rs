use std::collections::BTreeMap;

use uuid::Uuid;

/// A message queued on a scene node, e.g. a collision report or a script
/// signal. Events are appended by any collaborator and drained once per frame
/// by the component that consumes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Node that raised the event, if any.
    pub sender: Option<Uuid>,
    pub kind: String,
    pub attributes: BTreeMap<String, String>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            sender: None,
            kind: kind.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn from_sender(mut self, sender: Uuid) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}
