use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Tokens the host issued for this plugin's slash command, one per team.
/// Filled during command registration and read by the command route.
#[derive(Clone, Debug, Default)]
pub struct CommandTokens {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl CommandTokens {
    pub fn insert(&self, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            return;
        }
        self.inner.write().unwrap_or_else(PoisonError::into_inner).insert(token.to_owned());
    }

    pub fn contains(&self, token: &str) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).contains(token)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
