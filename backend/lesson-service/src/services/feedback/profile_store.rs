// ============================================
// Profile Store (用戶畫像存儲)
// ============================================
//
// One mutex per user behind a sharded map: updates for the same user
// serialize, different users never contend.

use crate::models::UserProfile;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
pub struct ProfileStore {
    profiles: DashMap<String, Arc<Mutex<UserProfile>>>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored profile
    pub fn get(&self, user_id: &str) -> Option<UserProfile> {
        let handle = self.profiles.get(user_id).map(|entry| entry.value().clone())?;
        let profile = handle.lock().clone();
        Some(profile)
    }

    /// Lock handle for a user, creating a cold profile on first use
    ///
    /// The map guard is released before the caller locks the profile.
    pub fn handle(&self, user_id: &str) -> Arc<Mutex<UserProfile>> {
        self.profiles
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(UserProfile::new(user_id, Vec::new()))))
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_user_has_no_profile() {
        let store = ProfileStore::new();
        assert!(store.get("ghost").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_handle_creates_cold_profile() {
        let store = ProfileStore::new();
        let handle = store.handle("u1");
        assert!(handle.lock().is_cold());

        handle.lock().profile_vec = vec![1.0, 2.0];
        assert_eq!(store.get("u1").unwrap().profile_vec, vec![1.0, 2.0]);
        assert!(Arc::ptr_eq(&handle, &store.handle("u1")));
    }
}
