//! Filesystem-backed persistence for Stockpile.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sp_core::{Category, CoreError, CoreResult, Inventory, Item, KeyValueStore};

/// Default directory name for the store.
pub const STORE_DIR_NAME: &str = "stockpile";

/// Key holding the serialized category collection.
pub const CATEGORIES_KEY: &str = "stockpile-cats";

/// Key holding the serialized item collection.
pub const ITEMS_KEY: &str = "stockpile-items";

const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default quiet period before a debounced save, in milliseconds.
pub const DEFAULT_SAVE_DELAY_MS: u64 = 300;

/// Default lifetime of a transient notice, in milliseconds.
pub const DEFAULT_NOTICE_MS: u64 = 2200;

/// Directory-backed key-value store: one JSON file per key.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create a store rooted at the provided directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the root path of the store.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve the default store path (~/.stockpile).
    pub fn default_path() -> CoreResult<PathBuf> {
        if let Some(dir) = dirs::home_dir() {
            return Ok(dir.join(format!(".{STORE_DIR_NAME}")));
        }
        Err(CoreError::Storage(
            "unable to determine a default store path".into(),
        ))
    }

    /// Create the store directory.
    pub fn init(&self) -> CoreResult<()> {
        fs::create_dir_all(&self.root).map_err(|err| CoreError::Storage(err.to_string()))
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FsStore {
    fn read(&self, key: &str) -> CoreResult<Option<String>> {
        let path = self.key_path(key);
        if !path.exists() {
            debug!(key, "key absent");
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).map_err(|err| CoreError::Storage(err.to_string()))?;
        debug!(key, bytes = contents.len(), "key read");
        Ok(Some(contents))
    }

    fn write(&self, key: &str, value: &str) -> CoreResult<()> {
        sp_utils::write_atomic(&self.key_path(key), value)
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        debug!(key, bytes = value.len(), "key written");
        Ok(())
    }
}

/// In-memory key-value store that counts writes per key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
    writes: RefCell<HashMap<String, usize>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with values.
    pub fn with_values<'a>(values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        store.values.borrow_mut().extend(
            values
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        );
        store
    }

    /// Current raw value of a key.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.borrow().get(key).cloned()
    }

    /// Number of writes made to a key so far.
    pub fn write_count(&self, key: &str) -> usize {
        self.writes.borrow().get(key).copied().unwrap_or_default()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, value: &str) -> CoreResult<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        *self.writes.borrow_mut().entry(key.to_string()).or_default() += 1;
        Ok(())
    }
}

/// Outcome of loading the inventory from a store.
#[derive(Debug)]
pub struct Loaded {
    /// The inventory to start the session with.
    pub inventory: Inventory,
    /// Set when stored data could not be read and an empty inventory was used.
    pub recovered_from: Option<CoreError>,
}

/// Load both collections. Missing keys are empty collections; any read or
/// parse failure resets both collections to empty.
pub fn load_inventory(store: &impl KeyValueStore) -> Loaded {
    match read_collections(store) {
        Ok((categories, items)) => Loaded {
            inventory: Inventory::from_parts(categories, items),
            recovered_from: None,
        },
        Err(err) => {
            warn!(error = %err, "stored inventory unreadable, starting empty");
            Loaded {
                inventory: Inventory::default(),
                recovered_from: Some(err),
            }
        }
    }
}

fn read_collections(store: &impl KeyValueStore) -> CoreResult<(Vec<Category>, Vec<Item>)> {
    let categories = read_collection(store, CATEGORIES_KEY)?;
    let items = read_collection(store, ITEMS_KEY)?;
    Ok((categories, items))
}

fn read_collection<T>(store: &impl KeyValueStore, key: &str) -> CoreResult<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    match store.read(key)? {
        Some(raw) => decode(&raw),
        None => Ok(Vec::new()),
    }
}

/// Persist both collections.
pub fn save_inventory(store: &impl KeyValueStore, inventory: &Inventory) -> CoreResult<()> {
    store.write(CATEGORIES_KEY, &encode(inventory.categories())?)?;
    store.write(ITEMS_KEY, &encode(inventory.items())?)?;
    Ok(())
}

/// Encode a collection the way it is stored.
pub fn encode<T: Serialize>(collection: &[T]) -> CoreResult<String> {
    serde_json::to_string(collection).map_err(|err| CoreError::Storage(err.to_string()))
}

/// Decode a stored collection.
pub fn decode<T>(raw: &str) -> CoreResult<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_str(raw).map_err(|err| CoreError::Storage(err.to_string()))
}

/// Both collections in one document, as written by `export`.
#[derive(Debug, Deserialize, Serialize)]
pub struct ExportDocument {
    /// Categories in stored order.
    pub categories: Vec<Category>,
    /// Items in stored order.
    pub items: Vec<Item>,
}

/// Render the whole inventory as pretty JSON.
pub fn render_export(inventory: &Inventory) -> CoreResult<String> {
    let document = ExportDocument {
        categories: inventory.categories().to_vec(),
        items: inventory.items().to_vec(),
    };
    serde_json::to_string_pretty(&document).map_err(|err| CoreError::Storage(err.to_string()))
}

/// User configuration read from `config.yaml`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Store directory.
    pub path: Option<String>,
    /// Quiet period before a debounced save.
    pub save_delay_ms: Option<u64>,
    /// Lifetime of a transient notice.
    pub notice_ms: Option<u64>,
}

impl StoreConfig {
    /// Debounce delay, falling back to the default.
    pub fn save_delay_ms(&self) -> u64 {
        self.save_delay_ms.unwrap_or(DEFAULT_SAVE_DELAY_MS)
    }

    /// Notice lifetime, falling back to the default.
    pub fn notice_ms(&self) -> u64 {
        self.notice_ms.unwrap_or(DEFAULT_NOTICE_MS)
    }
}

fn config_path() -> CoreResult<PathBuf> {
    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(STORE_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    Err(CoreError::Storage(
        "unable to determine config directory".into(),
    ))
}

/// Load the user configuration, or defaults when none exists.
pub fn load_config() -> CoreResult<StoreConfig> {
    read_config(&config_path()?)
}

fn read_config(path: &Path) -> CoreResult<StoreConfig> {
    if !path.exists() {
        return Ok(StoreConfig::default());
    }
    let contents =
        fs::read_to_string(path).map_err(|err| CoreError::Storage(err.to_string()))?;
    serde_yaml::from_str(&contents).map_err(|err| CoreError::Storage(err.to_string()))
}

fn write_config(path: &Path, config: &StoreConfig) -> CoreResult<()> {
    let contents =
        serde_yaml::to_string(config).map_err(|err| CoreError::Storage(err.to_string()))?;
    sp_utils::write_atomic(path, &contents).map_err(|err| CoreError::Storage(err.to_string()))
}

/// Record `path` as the store directory, keeping other settings.
pub fn set_config_path(path: &Path) -> CoreResult<()> {
    let config_file = config_path()?;
    let mut config = read_config(&config_file)?;
    config.path = Some(path.to_string_lossy().to_string());
    write_config(&config_file, &config)
}

/// Pick the store directory: explicit override, `STOCKPILE_PATH`, config,
/// then the default.
pub fn resolve_store_path(config: &StoreConfig, explicit: Option<&Path>) -> CoreResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(value) = std::env::var("STOCKPILE_PATH") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }

    if let Some(path) = &config.path {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    FsStore::default_path()
}
