//! Location Directory (§4.2): the registrar's in-memory binding table.
//!
//! Seeded with the same static entries the original C server hard-codes,
//! so routing an INVITE to any of 1001–1008 works out of the box without a
//! prior REGISTER, exactly as the original demo deployment behaves.

use std::sync::RwLock;

/// A single user's registration state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationEntry {
    pub user_id: String,
    pub password: String,
    pub ip: String,
    pub port: u16,
    pub realm: String,
    pub registered: bool,
}

impl LocationEntry {
    fn seed(user_id: &str, ip: &str, port: u16) -> Self {
        LocationEntry {
            user_id: user_id.to_string(),
            password: "defaultpassword".to_string(),
            ip: ip.to_string(),
            port,
            realm: "192.168.32.131".to_string(),
            registered: false,
        }
    }
}

/// Static registrar, keyed by `user_id`. Single-writer by convention: only
/// REGISTER handling calls `update_binding`; INVITE routing only reads.
pub struct LocationDirectory {
    entries: RwLock<Vec<LocationEntry>>,
}

impl LocationDirectory {
    /// Build the directory with the original deployment's eight seed users.
    pub fn seeded() -> Self {
        let entries = vec![
            LocationEntry::seed("1001", "192.168.192.1", 5060),
            LocationEntry::seed("1002", "192.168.192.1", 5070),
            LocationEntry::seed("1003", "192.168.1.103", 5060),
            LocationEntry::seed("1004", "192.168.1.104", 5060),
            LocationEntry::seed("1005", "192.168.184.1", 5060),
            LocationEntry::seed("1006", "192.168.184.1", 5070),
            LocationEntry::seed("1007", "192.168.1.4", 5060),
            LocationEntry::seed("1008", "192.168.1.4", 5070),
        ];
        LocationDirectory { entries: RwLock::new(entries) }
    }

    /// Exact-match lookup by user id.
    pub fn find_by_user_id(&self, user_id: &str) -> Option<LocationEntry> {
        let entries = self.entries.read().expect("location directory poisoned");
        entries.iter().find(|e| e.user_id == user_id).cloned()
    }

    /// Update the binding for `user_id` from a successful REGISTER.
    /// Returns `false` if the user id is not in the directory.
    pub fn update_binding(&self, user_id: &str, ip: &str, port: u16) -> bool {
        let mut entries = self.entries.write().expect("location directory poisoned");
        match entries.iter_mut().find(|e| e.user_id == user_id) {
            Some(entry) => {
                entry.ip = ip.to_string();
                entry.port = port;
                entry.registered = true;
                true
            }
            None => false,
        }
    }
}

impl Default for LocationDirectory {
    fn default() -> Self {
        Self::seeded()
    }
}
