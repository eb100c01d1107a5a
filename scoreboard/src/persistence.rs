use log::*;
use scoreboard_common::{config::Ruleset, game_state::GameState};
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    fmt::Debug,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use thiserror::Error;

pub const STORAGE_KEY: &str = "basketball-scoreboard-state";

const LEGACY_BUZZER_KEY: &str = "buzzerEnabled";
const SPLIT_BUZZER_KEYS: [&str; 2] = ["gameBuzzerEnabled", "shotBuzzerEnabled"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage key {0:?} contains characters that can't be used in a file name")]
    InvalidKey(String),
    #[error("Storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Couldn't serialize the game state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("The storage lock was poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable string storage shared by every context of one user profile
pub trait KeyValueStore: Debug + Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Stores each key as `<key>.json` inside `dir`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        // Readers must never see a half written snapshot
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, value).map_err(io_err(&tmp_path))?;
        fs::rename(&tmp_path, &path).map_err(io_err(&path))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(io_err(&path)(e)),
            _ => Ok(()),
        }
    }
}

/// Process local storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}

/// Saves and restores the game state snapshot of one context. Storage problems are logged
/// and never reach the caller.
#[derive(Debug)]
pub struct Persistence {
    store: Arc<dyn KeyValueStore>,
    key: String,
    rules: Ruleset,
    degraded: bool,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, rules: Ruleset) -> Self {
        Self {
            store,
            key: key.into(),
            rules,
            degraded: false,
        }
    }

    /// True once a write failure has moved this adapter onto in-memory storage
    #[cfg(test)]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn save(&mut self, state: &GameState) {
        if let Err(e) = self.try_save(state) {
            error!("Failed to save the game state: {e}");
            if !self.degraded {
                warn!("Keeping the game state in memory for the rest of this session");
                self.degraded = true;
                self.store = Arc::new(MemoryStore::default());
                if let Err(e) = self.try_save(state) {
                    error!("Failed to save the game state in memory: {e}");
                }
            }
        }
    }

    fn try_save(&self, state: &GameState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        self.store.set(&self.key, &json)
    }

    /// Returns the stored game state, or a fresh game if there is nothing usable stored
    pub fn load(&self) -> GameState {
        match self.store.get(&self.key) {
            Ok(Some(raw)) => merge_snapshot(&self.rules, &raw),
            Ok(None) => {
                info!("No saved game state found, starting a new game");
                GameState::new(&self.rules)
            }
            Err(e) => {
                error!("Failed to read the saved game state: {e}");
                GameState::new(&self.rules)
            }
        }
    }

    pub fn clear(&mut self) {
        if let Err(e) = self.store.remove(&self.key) {
            error!("Failed to clear the saved game state: {e}");
        }
    }
}

/// Overlays a stored snapshot onto a fresh game. Fields that are missing keep their default,
/// fields that don't fit the current data model are dropped one at a time.
fn merge_snapshot(rules: &Ruleset, raw: &str) -> GameState {
    let defaults = GameState::new(rules);

    let stored = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(stored)) => stored,
        Ok(other) => {
            warn!("Saved game state is not an object ({other}), starting a new game");
            return defaults;
        }
        Err(e) => {
            warn!("Saved game state is not valid JSON ({e}), starting a new game");
            return defaults;
        }
    };

    let mut merged = match serde_json::to_value(&defaults) {
        Ok(value) => value,
        Err(e) => {
            error!("Couldn't serialize the default game state: {e}");
            return defaults;
        }
    };

    for (key, value) in migrate(stored) {
        match value {
            Value::Object(fields) if merged.get(&key).is_some_and(Value::is_object) => {
                for (field, value) in fields {
                    overlay_field(&mut merged, &[&key, &field], value);
                }
            }
            value => overlay_field(&mut merged, &[&key], value),
        }
    }

    match serde_json::from_value::<GameState>(merged) {
        Ok(state) => state.normalized(rules),
        Err(e) => {
            error!("Merged game state failed to deserialize: {e}");
            defaults
        }
    }
}

fn migrate(mut stored: Map<String, Value>) -> Map<String, Value> {
    if let Some(legacy) = stored.remove(LEGACY_BUZZER_KEY) {
        if legacy.is_boolean() {
            for key in SPLIT_BUZZER_KEYS {
                if !stored.contains_key(key) {
                    debug!("Migrating {LEGACY_BUZZER_KEY} to {key}");
                    stored.insert(key.to_string(), legacy.clone());
                }
            }
        }
    }
    stored
}

fn overlay_field(merged: &mut Value, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut candidate = merged.clone();
    let parent = parents
        .iter()
        .try_fold(&mut candidate, |node, key| node.get_mut(*key))
        .and_then(Value::as_object_mut);
    let Some(parent) = parent else {
        return;
    };
    parent.insert(last.to_string(), value);

    if serde_json::from_value::<GameState>(candidate.clone()).is_ok() {
        *merged = candidate;
    } else {
        warn!(
            "Dropping saved field {} because it doesn't match the game state",
            path.join(".")
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use scoreboard_common::{game_state::ShotClockRule, side::TeamSide};
    use serde_json::json;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn initialize() {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    #[derive(Debug, Default)]
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(StorageError::Poisoned)
        }

        fn set(&self, key: &str, _value: &str) -> Result<()> {
            Err(StorageError::Io {
                path: PathBuf::from(key),
                source: std::io::Error::new(ErrorKind::StorageFull, "quota exceeded"),
            })
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(StorageError::Poisoned)
        }
    }

    fn memory_persistence() -> (MemoryStore, Persistence) {
        let store = MemoryStore::default();
        let persistence =
            Persistence::new(Arc::new(store.clone()), STORAGE_KEY, Ruleset::default());
        (store, persistence)
    }

    #[test]
    fn test_round_trip() {
        initialize();
        let (_, mut persistence) = memory_persistence();

        let mut state = GameState::default();
        state.home.name = "Lakers".to_string();
        state.home.score = 88;
        state.away.logo = Some("data:image/png;base64,AAAA".to_string());
        state.period = 3;
        state.possession = TeamSide::Away;
        state.default_shot_clock_seconds = ShotClockRule::Fourteen;
        state.shot_clock_seconds = 9;
        state.game_clock_running = true;

        persistence.save(&state);
        assert_eq!(persistence.load(), state);
    }

    #[test]
    fn test_load_missing() {
        initialize();
        let (_, persistence) = memory_persistence();
        assert_eq!(persistence.load(), GameState::default());

        let fiba = Persistence::new(
            Arc::new(MemoryStore::default()),
            STORAGE_KEY,
            Ruleset::fiba(),
        );
        assert_eq!(fiba.load(), GameState::new(&Ruleset::fiba()));
    }

    #[test]
    fn test_load_garbage() {
        initialize();
        for raw in ["{not json", "[1, 2, 3]", "null", "42"] {
            let (store, persistence) = memory_persistence();
            store.set(STORAGE_KEY, raw).unwrap();
            assert_eq!(persistence.load(), GameState::default(), "raw {raw}");
        }
    }

    #[test]
    fn test_load_partial_and_unknown_fields() {
        initialize();
        let (store, persistence) = memory_persistence();
        let raw = json!({
            "home": { "name": "Bulls", "score": 12 },
            "period": 2,
            "shotClockSeconds": 11,
            "refereeName": "Pat",
            "away": { "mascot": "hawk" },
        });
        store.set(STORAGE_KEY, &raw.to_string()).unwrap();

        let state = persistence.load();
        let mut expected = GameState::default();
        expected.home.name = "Bulls".to_string();
        expected.home.score = 12;
        expected.period = 2;
        expected.shot_clock_seconds = 11;
        assert_eq!(state, expected);
    }

    #[test]
    fn test_load_drops_bad_fields() {
        initialize();
        let (store, persistence) = memory_persistence();
        let raw = json!({
            "home": { "score": "lots", "fouls": 3 },
            "away": "nobody",
            "period": -4,
            "possession": "black",
            "defaultShotClockSeconds": 25,
            "gameClockMinutes": 5,
        });
        store.set(STORAGE_KEY, &raw.to_string()).unwrap();

        let state = persistence.load();
        let mut expected = GameState::default();
        expected.home.fouls = 3;
        expected.game_clock_minutes = 5;
        assert_eq!(state, expected);
    }

    #[test]
    fn test_load_normalizes() {
        initialize();
        let (store, persistence) = memory_persistence();
        let raw = json!({
            "home": { "timeouts": 200 },
            "defaultShotClockSeconds": 14,
            "shotClockSeconds": 24,
            "shotClockEnabled": false,
            "shotClockRunning": true,
        });
        store.set(STORAGE_KEY, &raw.to_string()).unwrap();

        let state = persistence.load();
        assert_eq!(state.home.timeouts, 7);
        assert_eq!(state.shot_clock_seconds, 14);
        assert!(!state.shot_clock_running);
    }

    #[test]
    fn test_legacy_buzzer_flag() {
        initialize();
        let (store, persistence) = memory_persistence();
        store
            .set(STORAGE_KEY, &json!({ "buzzerEnabled": false }).to_string())
            .unwrap();
        let state = persistence.load();
        assert!(!state.game_buzzer_enabled);
        assert!(!state.shot_buzzer_enabled);

        store
            .set(
                STORAGE_KEY,
                &json!({ "buzzerEnabled": false, "shotBuzzerEnabled": true }).to_string(),
            )
            .unwrap();
        let state = persistence.load();
        assert!(!state.game_buzzer_enabled);
        assert!(state.shot_buzzer_enabled);
    }

    #[test]
    fn test_save_failure_degrades() {
        initialize();
        let mut persistence =
            Persistence::new(Arc::new(BrokenStore), STORAGE_KEY, Ruleset::default());
        assert_eq!(persistence.load(), GameState::default());

        let mut state = GameState::default();
        state.away.score = 3;
        persistence.save(&state);
        assert!(persistence.is_degraded());
        assert_eq!(persistence.load(), state);

        state.away.score = 5;
        persistence.save(&state);
        assert_eq!(persistence.load(), state);
    }

    #[test]
    fn test_clear() {
        initialize();
        let (store, mut persistence) = memory_persistence();
        let mut state = GameState::default();
        state.period = 4;
        persistence.save(&state);
        assert!(store.get(STORAGE_KEY).unwrap().is_some());

        persistence.clear();
        assert_eq!(store.get(STORAGE_KEY).unwrap(), None);
        assert_eq!(persistence.load(), GameState::default());
    }

    #[test]
    fn test_file_store() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.get(STORAGE_KEY).unwrap(), None);
        store.remove(STORAGE_KEY).unwrap();

        store.set(STORAGE_KEY, "{\"period\":2}").unwrap();
        assert_eq!(
            store.get(STORAGE_KEY).unwrap().as_deref(),
            Some("{\"period\":2}")
        );
        assert!(store.dir().join(format!("{STORAGE_KEY}.json")).exists());
        assert!(!store.dir().join(format!("{STORAGE_KEY}.json.tmp")).exists());

        store.remove(STORAGE_KEY).unwrap();
        assert_eq!(store.get(STORAGE_KEY).unwrap(), None);

        assert!(matches!(
            store.set("../escape", "{}"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_file_store_shared_between_persistences() {
        initialize();
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir.path()));
        let mut writer = Persistence::new(store.clone(), STORAGE_KEY, Ruleset::default());
        let reader = Persistence::new(store, STORAGE_KEY, Ruleset::default());

        let mut state = GameState::default();
        state.home.fouls = 2;
        writer.save(&state);
        assert_eq!(reader.load(), state);
    }
}
