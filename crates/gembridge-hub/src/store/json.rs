//! File-backed session store.
//!
//! State lives in two JSON files inside the data directory:
//! `sessions.json` maps each user id to an activity flag and timestamp,
//! and `history.json` maps each user id to the full conversation record.
//! Both files are rewritten whole on every save, via a temp file so a
//! crash mid-write never leaves a truncated snapshot behind.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use gembridge_core::error::{GemBridgeError, Result};
use gembridge_core::message::Turn;
use gembridge_core::session::{Session, SessionMap};
use gembridge_core::store::SessionStore;

const FLAGS_FILE: &str = "sessions.json";
const HISTORY_FILE: &str = "history.json";

/// One entry in the activity file.
#[derive(Debug, Serialize, Deserialize)]
struct FlagRecord {
    #[serde(rename = "OnSession")]
    on_session: bool,
    #[serde(rename = "lastActive")]
    last_active: DateTime<Utc>,
}

/// One entry in the history file.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryRecord {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(default)]
    history: Vec<Turn>,
}

/// Session store persisting to flat JSON files.
pub struct JsonSessionStore {
    flags_path: PathBuf,
    history_path: PathBuf,
}

impl JsonSessionStore {
    /// Open (and create if needed) the store under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| store_io(dir, &e))?;
        Ok(Self {
            flags_path: dir.join(FLAGS_FILE),
            history_path: dir.join(HISTORY_FILE),
        })
    }
}

#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn load(&self) -> Result<SessionMap> {
        let flags: BTreeMap<String, FlagRecord> = read_map(&self.flags_path)?;
        let mut histories: BTreeMap<String, HistoryRecord> = read_map(&self.history_path)?;

        let mut sessions = SessionMap::new();
        for (user_id, flag) in flags {
            let history = histories
                .remove(&user_id)
                .map(|r| r.history)
                .unwrap_or_default();
            sessions.insert(
                user_id.clone(),
                Session {
                    user_id,
                    active: flag.on_session,
                    last_active_at: flag.last_active,
                    history,
                },
            );
        }

        // A history with no activity entry (hand-edited or partial file)
        // still loads, as an idle session that can be resumed.
        for (user_id, record) in histories {
            sessions.insert(
                user_id.clone(),
                Session {
                    user_id,
                    active: false,
                    last_active_at: DateTime::UNIX_EPOCH,
                    history: record.history,
                },
            );
        }

        debug!(
            "Loaded {} session(s) from {}",
            sessions.len(),
            self.flags_path.display()
        );
        Ok(sessions)
    }

    async fn save(&self, sessions: &SessionMap) -> Result<()> {
        let mut flags = BTreeMap::new();
        let mut histories = BTreeMap::new();
        for (user_id, session) in sessions {
            flags.insert(
                user_id.clone(),
                FlagRecord {
                    on_session: session.active,
                    last_active: session.last_active_at,
                },
            );
            histories.insert(
                user_id.clone(),
                HistoryRecord {
                    session_id: user_id.clone(),
                    history: session.history.clone(),
                },
            );
        }

        write_map(&self.flags_path, &flags)?;
        write_map(&self.history_path, &histories)?;
        Ok(())
    }
}

fn store_io(path: &Path, err: &dyn std::fmt::Display) -> GemBridgeError {
    GemBridgeError::StoreIo(format!("{}: {}", path.display(), err))
}

/// Read a keyed JSON file, seeding an empty one when missing.
fn read_map<T: DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            write_map(path, &BTreeMap::<String, serde_json::Value>::new())?;
            return Ok(BTreeMap::new());
        }
        Err(e) => return Err(store_io(path, &e)),
    };
    serde_json::from_str(&raw).map_err(|e| store_io(path, &e))
}

/// Write a keyed JSON file whole, through a temp file and rename.
fn write_map<T: Serialize>(path: &Path, map: &BTreeMap<String, T>) -> Result<()> {
    let raw = serde_json::to_string_pretty(map).map_err(|e| store_io(path, &e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw).map_err(|e| store_io(&tmp, &e))?;
    fs::rename(&tmp, path).map_err(|e| store_io(path, &e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sessions() -> SessionMap {
        let mut alice = Session::new("alice@s.whatsapp.net");
        alice.push_exchange(Turn::user("hi"), Turn::assistant("hello!"));
        alice.push_exchange(
            Turn::user_with_image("image/jpeg", "aGVsbG8=", "what is this?"),
            Turn::assistant("a greeting"),
        );

        let mut bob = Session::new("bob@s.whatsapp.net");
        bob.active = false;

        let mut sessions = SessionMap::new();
        sessions.insert(alice.user_id.clone(), alice);
        sessions.insert(bob.user_id.clone(), bob);
        sessions
    }

    #[tokio::test]
    async fn test_round_trip_preserves_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::open(dir.path()).unwrap();

        let sessions = sample_sessions();
        store.save(&sessions).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, sessions);
    }

    #[tokio::test]
    async fn test_load_seeds_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::open(dir.path().join("nested")).unwrap();

        let sessions = store.load().await.unwrap();
        assert!(sessions.is_empty());
        assert_eq!(
            fs::read_to_string(dir.path().join("nested").join(FLAGS_FILE)).unwrap(),
            "{}"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("nested").join(HISTORY_FILE)).unwrap(),
            "{}"
        );
    }

    #[tokio::test]
    async fn test_file_layout_matches_wire_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::open(dir.path()).unwrap();
        store.save(&sample_sessions()).await.unwrap();

        let flags: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(FLAGS_FILE)).unwrap())
                .unwrap();
        let alice = &flags["alice@s.whatsapp.net"];
        assert_eq!(alice["OnSession"], serde_json::Value::Bool(true));
        assert!(alice["lastActive"].as_str().unwrap().contains('T'));

        let histories: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(HISTORY_FILE)).unwrap())
                .unwrap();
        let record = &histories["alice@s.whatsapp.net"];
        assert_eq!(record["sessionId"], "alice@s.whatsapp.net");
        assert_eq!(record["history"][1]["role"], "model");
        assert_eq!(
            record["history"][2]["parts"][0]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert_eq!(record["history"][2]["parts"][1]["text"], "what is this?");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::open(dir.path()).unwrap();
        fs::write(dir.path().join(FLAGS_FILE), "not json").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, GemBridgeError::StoreIo(_)));
    }

    #[tokio::test]
    async fn test_history_without_flag_loads_idle() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSessionStore::open(dir.path()).unwrap();

        fs::write(dir.path().join(FLAGS_FILE), "{}").unwrap();
        fs::write(
            dir.path().join(HISTORY_FILE),
            r#"{"carol": {"sessionId": "carol", "history": [{"role": "user", "parts": [{"text": "hi"}]}]}}"#,
        )
        .unwrap();

        let sessions = store.load().await.unwrap();
        let carol = &sessions["carol"];
        assert!(!carol.active);
        assert_eq!(carol.history.len(), 1);
        assert_eq!(carol.history[0].text(), "hi");
    }
}
