//! Key/value persistence collaborator.
//!
//! The client's surrounding features (preferences, favorites, triggers,
//! chat log, chat members) live in an opaque key/value store; the
//! session core itself persists nothing. This module is the store
//! contract plus the typed records and their wire keys, which match the
//! original client's JSON documents field for field. Business logic on
//! top of these records (trigger matching, logon automation) is out of
//! scope here.

// Contract surface: the CLI touches only preferences, but embedders get
// the full record set.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const KEY_PREFERENCES: &str = "preferences";
pub const KEY_FAVORITES: &str = "favorites";
pub const KEY_TRIGGERS: &str = "triggers";
pub const KEY_CHATLOG: &str = "chatlog";
pub const KEY_CHAT_MEMBERS: &str = "chatMembers";
pub const KEY_LAST_SEEN: &str = "lastSeen";

/// The persistence contract the client depends on.
pub trait KvStore {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value);
}

/// Fetch a typed record, falling back to `default` when the key is
/// absent or no longer deserializes.
pub fn get_or<T>(store: &dyn KvStore, key: &str, default: T) -> T
where
    T: DeserializeOwned,
{
    store
        .get(key)
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(default)
}

fn set_record<T: Serialize>(store: &mut dyn KvStore, key: &str, record: &T) {
    match serde_json::to_value(record) {
        Ok(value) => store.set(key, value),
        Err(e) => log::warn!("Could not serialize {}: {}", key, e),
    }
}

// ── Typed records ──────────────────────────────────────────────────────────

/// User preferences, camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub remember_username: bool,
    pub remember_password: bool,
    pub username: String,
    pub password: String,
    pub keep_alive: bool,
    pub auto_login: bool,
    pub logon_automation: bool,
    pub font: String,
    pub font_size: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            remember_username: false,
            remember_password: false,
            username: String::new(),
            password: String::new(),
            keep_alive: false,
            auto_login: false,
            logon_automation: false,
            font: "Perfect DOS VGA 437".to_string(),
            font_size: 16,
        }
    }
}

/// A saved BBS address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub host: String,
    pub port: u16,
}

/// A stored auto-response rule (matching happens elsewhere).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger: String,
    pub response: String,
}

/// One logged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatlogEntry {
    pub timestamp: u64,
    pub message: String,
    pub recipient: String,
}

/// Chat log keyed by sender.
pub type Chatlog = BTreeMap<String, Vec<ChatlogEntry>>;

pub fn load_preferences(store: &dyn KvStore) -> Preferences {
    get_or(store, KEY_PREFERENCES, Preferences::default())
}

pub fn save_preferences(store: &mut dyn KvStore, prefs: &Preferences) {
    set_record(store, KEY_PREFERENCES, prefs);
}

pub fn load_favorites(store: &dyn KvStore) -> Vec<Favorite> {
    get_or(store, KEY_FAVORITES, Vec::new())
}

pub fn save_favorites(store: &mut dyn KvStore, favorites: &[Favorite]) {
    set_record(store, KEY_FAVORITES, &favorites);
}

pub fn load_triggers(store: &dyn KvStore) -> Vec<Trigger> {
    get_or(store, KEY_TRIGGERS, Vec::new())
}

pub fn save_triggers(store: &mut dyn KvStore, triggers: &[Trigger]) {
    set_record(store, KEY_TRIGGERS, &triggers);
}

pub fn load_chatlog(store: &dyn KvStore) -> Chatlog {
    get_or(store, KEY_CHATLOG, Chatlog::new())
}

pub fn save_chatlog(store: &mut dyn KvStore, chatlog: &Chatlog) {
    set_record(store, KEY_CHATLOG, chatlog);
}

/// Chat member roster plus last-seen timestamps, stored under two keys
/// the way the original split them.
pub fn load_chat_members(store: &dyn KvStore) -> (Vec<String>, BTreeMap<String, u64>) {
    (
        get_or(store, KEY_CHAT_MEMBERS, Vec::new()),
        get_or(store, KEY_LAST_SEEN, BTreeMap::new()),
    )
}

pub fn save_chat_members(
    store: &mut dyn KvStore,
    members: &[String],
    last_seen: &BTreeMap<String, u64>,
) {
    set_record(store, KEY_CHAT_MEMBERS, &members);
    set_record(store, KEY_LAST_SEEN, last_seen);
}

// ── Implementations ────────────────────────────────────────────────────────

/// In-memory store for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.map.insert(key.to_string(), value);
    }
}

/// One JSON document on disk, written through on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    map: serde_json::Map<String, Value>,
}

impl JsonFileStore {
    /// Open a store backed by `path`. A missing file starts empty; an
    /// unreadable one is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    log::warn!("Ignoring malformed store file {}", path.display());
                    serde_json::Map::new()
                }
            },
            Err(_) => serde_json::Map::new(),
        };
        Self { path, map }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let doc = Value::Object(self.map.clone());
        match serde_json::to_string_pretty(&doc) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    log::warn!("Could not write {}: {}", self.path.display(), e);
                }
            }
            Err(e) => log::warn!("Could not serialize store: {}", e),
        }
    }
}

impl KvStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.map.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.map.insert(key.to_string(), value);
        self.persist();
    }
}

/// Default on-disk location: `~/.bbs-client/store.json`.
pub fn default_store_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".bbs-client").join("store.json"))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
