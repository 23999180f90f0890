//! External subscriber registry.
//!
//! Two JSON files owned by the chat-bot UI: `subscriptions.json` (users)
//! and `alert_groups.json` (groups). The core reads them and removes a
//! recipient only on a permanent delivery failure; that removal rewrites
//! the owning file with the same atomic-rename discipline as the log.

use crate::error::Result;
use crate::types::Tier;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    User,
    Group,
}

#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: String,
    pub tier_filter: BTreeSet<u8>,
    pub kind: SubscriberKind,
}

impl Subscriber {
    pub fn wants(&self, tier: Tier) -> bool {
        self.tier_filter.contains(&tier.number())
    }
}

pub struct SubscriberRegistry {
    users_path: PathBuf,
    groups_path: PathBuf,
    inner: RwLock<Vec<Subscriber>>,
}

impl SubscriberRegistry {
    pub fn load(users_path: PathBuf, groups_path: PathBuf) -> Self {
        let mut subscribers = Vec::new();
        subscribers.extend(read_entries(&users_path, "users", SubscriberKind::User));
        subscribers.extend(read_entries(&groups_path, "groups", SubscriberKind::Group));
        info!(count = subscribers.len(), "subscriber registry loaded");
        Self {
            users_path,
            groups_path,
            inner: RwLock::new(subscribers),
        }
    }

    pub fn recipients_for(&self, tier: Tier) -> Vec<Subscriber> {
        self.inner
            .read()
            .iter()
            .filter(|s| s.wants(tier))
            .cloned()
            .collect()
    }

    /// (users, groups)
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.read();
        let users = inner
            .iter()
            .filter(|s| s.kind == SubscriberKind::User)
            .count();
        (users, inner.len() - users)
    }

    /// Drop a permanently unreachable recipient and persist the change.
    pub fn remove(&self, id: &str) -> Result<()> {
        let kind = {
            let mut inner = self.inner.write();
            let before = inner.len();
            let kind = inner
                .iter()
                .find(|s| s.id == id)
                .map(|s| s.kind);
            inner.retain(|s| s.id != id);
            if inner.len() == before {
                return Ok(());
            }
            kind
        };
        info!(recipient = %id, "removed unreachable subscriber");
        match kind {
            Some(SubscriberKind::User) => self.persist(SubscriberKind::User),
            Some(SubscriberKind::Group) => self.persist(SubscriberKind::Group),
            None => Ok(()),
        }
    }

    fn persist(&self, kind: SubscriberKind) -> Result<()> {
        let (path, key) = match kind {
            SubscriberKind::User => (&self.users_path, "users"),
            SubscriberKind::Group => (&self.groups_path, "groups"),
        };
        let entries: Vec<Entry> = self
            .inner
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| Entry {
                id: s.id.clone(),
                tiers: s.tier_filter.iter().copied().collect(),
            })
            .collect();
        let mut doc = serde_json::Map::new();
        doc.insert(key.to_string(), serde_json::to_value(&entries)?);
        let doc = Value::Object(doc);
        let tmp = PathBuf::from(format!("{}.tmp.{}", path.display(), std::process::id()));
        fs::write(&tmp, serde_json::to_vec_pretty(&doc)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    id: String,
    tiers: Vec<u8>,
}

fn all_tiers() -> BTreeSet<u8> {
    BTreeSet::from([1, 2, 3])
}

/// Entries may be bare ids or `{id, tiers}` objects.
fn read_entries(path: &Path, key: &str, kind: SubscriberKind) -> Vec<Subscriber> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let doc: Value = match serde_json::from_str(&text) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "registry file unreadable");
            return Vec::new();
        }
    };
    let Some(items) = doc.get(key).and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(Subscriber {
                id: id.clone(),
                tier_filter: all_tiers(),
                kind,
            }),
            Value::Number(id) => Some(Subscriber {
                id: id.to_string(),
                tier_filter: all_tiers(),
                kind,
            }),
            Value::Object(obj) => {
                let id = match obj.get("id") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => return None,
                };
                let tiers = obj
                    .get("tiers")
                    .and_then(|t| t.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_u64())
                            .filter(|t| (1..=3).contains(t))
                            .map(|t| t as u8)
                            .collect::<BTreeSet<u8>>()
                    })
                    .filter(|set| !set.is_empty())
                    .unwrap_or_else(all_tiers);
                Some(Subscriber {
                    id,
                    tier_filter: tiers,
                    kind,
                })
            }
            _ => None,
        })
        .collect()
}
