use crate::AggregateId;

/// Which keys of a topic a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFilter {
    /// Only messages published under this key.
    Exact(AggregateId),
    /// Every message on the topic.
    Any,
}

impl KeyFilter {
    pub fn matches(&self, key: &AggregateId) -> bool {
        match self {
            Self::Exact(expected) => expected == key,
            Self::Any => true,
        }
    }
}

impl From<AggregateId> for KeyFilter {
    fn from(id: AggregateId) -> Self {
        Self::Exact(id)
    }
}
