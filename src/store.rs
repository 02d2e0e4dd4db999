use crate::bus::{EventBus, StoreEvent};
use crate::chat::{ChatSession, Message, MessageInput, SessionInput, SessionStatus, SessionUpdate};
use crate::config::Config;
use crate::entity::{
    is_supported_language, PreferencesUpdate, Product, ProductInput, ProductUpdate,
    UserPreferences,
};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Cleanup keeps at most this many products when the store outgrows its
/// size budget.
const CLEANUP_PRODUCT_LIMIT: usize = 50;

/// The single versioned envelope holding all durable application state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreData {
    pub products: Vec<Product>,
    pub user_preferences: UserPreferences,
    pub chat_sessions: Vec<ChatSession>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageInfo {
    pub used: usize,
    pub available: usize,
    pub total: usize,
}

/// Single source of truth for local state, persisted as one JSON blob.
///
/// Constructed once at the composition root and shared behind an `Arc`;
/// "one store per process" is an application invariant, not something this
/// type enforces. Every successful write is published on the event bus so
/// views can react without polling.
pub struct Store {
    path: PathBuf,
    version: String,
    max_size: usize,
    defaults: UserPreferences,
    data: Mutex<StoreData>,
    bus: Arc<EventBus>,
}

impl Store {
    pub fn new(config: &Config, bus: Arc<EventBus>) -> Result<Self> {
        let path = config.storage_path.clone();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("failed to create storage directory")?;
            }
        }

        let defaults = UserPreferences {
            language: config.default_language.clone(),
            currency: config.default_currency.clone(),
            location: None,
        };

        let data = Self::load(&path, &config.storage_version, &defaults);

        Ok(Self {
            path,
            version: config.storage_version.clone(),
            max_size: config.max_storage_size,
            defaults,
            data: Mutex::new(data),
            bus,
        })
    }

    fn default_data(version: &str, defaults: &UserPreferences) -> StoreData {
        StoreData {
            products: Vec::new(),
            user_preferences: defaults.clone(),
            chat_sessions: Vec::new(),
            version: version.to_string(),
        }
    }

    /// Load persisted state, falling back to an empty default store on any
    /// problem. Nothing in here is fatal to the caller.
    fn load(path: &Path, version: &str, defaults: &UserPreferences) -> StoreData {
        let raw = match std::fs::read_to_string(path) {
            // Missing file is the normal first-run case.
            Err(_) => return Self::default_data(version, defaults),
            Ok(raw) => raw,
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("stored data is not valid JSON, resetting to defaults: {e}");
                return Self::default_data(version, defaults);
            }
        };

        if value.get("version").and_then(Value::as_str) == Some(version) {
            match serde_json::from_value(value) {
                Ok(data) => data,
                Err(e) => {
                    warn!("stored data has an unexpected shape, resetting to defaults: {e}");
                    Self::default_data(version, defaults)
                }
            }
        } else {
            info!("storage version mismatch, migrating data");
            Self::migrate(value, version, defaults)
        }
    }

    /// Rewrite an old or unknown envelope to the current shape, preserving
    /// `products` when it is an array and `user_preferences` when it is an
    /// object. Everything else is discarded.
    fn migrate(old: Value, version: &str, defaults: &UserPreferences) -> StoreData {
        let mut data = Self::default_data(version, defaults);

        if let Value::Object(map) = old {
            if let Some(products) = map.get("products").filter(|v| v.is_array()) {
                data.products = serde_json::from_value(products.clone()).unwrap_or_default();
            }
            if let Some(prefs) = map.get("user_preferences").filter(|v| v.is_object()) {
                data.user_preferences =
                    serde_json::from_value(prefs.clone()).unwrap_or_else(|_| defaults.clone());
            }
        }

        data
    }

    /// Persist the current state synchronously. An oversized payload or a
    /// failed write triggers one cleanup-and-retry pass; a second failure is
    /// reported as `false` and the in-memory state keeps the change.
    fn persist(&self, data: &mut StoreData) -> bool {
        let mut payload = match serde_json::to_string(data) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to serialize store: {e}");
                return false;
            }
        };

        if payload.len() > self.max_size {
            warn!(
                "store payload ({} bytes) exceeds budget ({} bytes), cleaning up old data",
                payload.len(),
                self.max_size
            );
            Self::cleanup(data);
            payload = match serde_json::to_string(data) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("failed to serialize store after cleanup: {e}");
                    return false;
                }
            };
        }

        if let Err(e) = std::fs::write(&self.path, &payload) {
            warn!("store write failed, cleaning up and retrying once: {e}");
            Self::cleanup(data);
            let payload = match serde_json::to_string(data) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("failed to serialize store after cleanup: {e}");
                    return false;
                }
            };
            if let Err(e) = std::fs::write(&self.path, payload) {
                error!("failed to persist store even after cleanup: {e}");
                return false;
            }
        }

        true
    }

    /// Deterministic cleanup policy: keep the 50 most-recently-updated
    /// products, drop all non-active chat sessions.
    fn cleanup(data: &mut StoreData) {
        if data.products.len() > CLEANUP_PRODUCT_LIMIT {
            data.products
                .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            data.products.truncate(CLEANUP_PRODUCT_LIMIT);
        }
        data.chat_sessions
            .retain(|s| s.status == SessionStatus::Active);
    }

    /// A poisoned lock means some caller panicked mid-operation; the data
    /// itself is still a coherent `StoreData`, so keep serving it rather
    /// than cascading the panic.
    fn lock(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Products ---

    pub fn products(&self) -> Vec<Product> {
        self.lock().products.clone()
    }

    pub fn product(&self, id: &str) -> Option<Product> {
        self.lock()
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn add_product(&self, input: ProductInput) -> Result<Product> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            bail!("product name cannot be empty");
        }
        if !(input.quantity > 0.0) {
            bail!("quantity must be a positive number");
        }
        if !(input.price > 0.0) {
            bail!("price must be a positive number");
        }
        if let Some(language) = input.language.as_deref() {
            if !is_supported_language(language) {
                bail!("unsupported language code: {language}");
            }
        }

        let mut data = self.lock();

        let lowered = name.to_lowercase();
        if data
            .products
            .iter()
            .any(|p| p.name.trim().to_lowercase() == lowered)
        {
            bail!("product with name \"{name}\" already exists");
        }

        let now = Utc::now();
        let product = Product {
            id: format!("product_{}", Uuid::new_v4()),
            name,
            quantity: input.quantity,
            price: input.price,
            currency: input
                .currency
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| data.user_preferences.currency.clone()),
            language: input
                .language
                .filter(|l| !l.is_empty())
                .unwrap_or_else(|| data.user_preferences.language.clone()),
            created_at: now,
            updated_at: now,
        };

        data.products.push(product.clone());
        if !self.persist(&mut data) {
            data.products.retain(|p| p.id != product.id);
            bail!("failed to persist product to storage");
        }

        self.bus.publish(StoreEvent::ProductAdded(product.clone()));
        Ok(product)
    }

    pub fn update_product(&self, id: &str, updates: ProductUpdate) -> Option<Product> {
        let mut data = self.lock();
        let index = data.products.iter().position(|p| p.id == id)?;

        {
            let product = &mut data.products[index];
            if let Some(name) = updates.name {
                let name = name.trim().to_string();
                if !name.is_empty() {
                    product.name = name;
                }
            }
            if let Some(quantity) = updates.quantity.filter(|q| *q > 0.0) {
                product.quantity = quantity;
            }
            if let Some(price) = updates.price.filter(|p| *p > 0.0) {
                product.price = price;
            }
            if let Some(currency) = updates.currency.filter(|c| !c.is_empty()) {
                product.currency = currency;
            }
            if let Some(language) = updates
                .language
                .filter(|l| is_supported_language(l.as_str()))
            {
                product.language = language;
            }
            product.updated_at = Utc::now();
        }

        let product = data.products[index].clone();
        if self.persist(&mut data) {
            self.bus
                .publish(StoreEvent::ProductUpdated(product.clone()));
        }
        Some(product)
    }

    /// Delete a product. Its chat sessions are archived, never deleted, so
    /// session listings keep working with the now-dangling product id.
    pub fn delete_product(&self, id: &str) -> bool {
        let mut data = self.lock();
        let before = data.products.len();
        data.products.retain(|p| p.id != id);
        if data.products.len() == before {
            return false;
        }

        let mut archived = Vec::new();
        for session in data.chat_sessions.iter_mut() {
            if session.product_id == id && session.status == SessionStatus::Active {
                session.status = SessionStatus::Closed;
                archived.push(session.clone());
            }
        }

        if self.persist(&mut data) {
            self.bus
                .publish(StoreEvent::ProductDeleted { id: id.to_string() });
            for session in archived {
                self.bus.publish(StoreEvent::SessionUpdated(session));
            }
        }
        true
    }

    // --- Preferences ---

    pub fn preferences(&self) -> UserPreferences {
        self.lock().user_preferences.clone()
    }

    pub fn update_preferences(&self, updates: PreferencesUpdate) -> UserPreferences {
        let mut data = self.lock();

        if let Some(language) = updates
            .language
            .filter(|l| is_supported_language(l.as_str()))
        {
            data.user_preferences.language = language;
        }
        if let Some(currency) = updates.currency.filter(|c| !c.is_empty()) {
            data.user_preferences.currency = currency;
        }
        if let Some(location) = updates.location {
            data.user_preferences.location = if location.is_empty() {
                None
            } else {
                Some(location)
            };
        }

        let preferences = data.user_preferences.clone();
        if self.persist(&mut data) {
            self.bus
                .publish(StoreEvent::PreferencesUpdated(preferences.clone()));
        }
        preferences
    }

    // --- Chat sessions ---

    pub fn sessions(&self) -> Vec<ChatSession> {
        self.lock().chat_sessions.clone()
    }

    pub fn session(&self, id: &str) -> Option<ChatSession> {
        self.lock()
            .chat_sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn add_session(&self, input: SessionInput) -> ChatSession {
        let session = ChatSession {
            id: format!("chat_{}", Uuid::new_v4()),
            product_id: input.product_id,
            vendor_id: input.vendor_id,
            buyer_id: input.buyer_id,
            messages: Vec::new(),
            status: SessionStatus::Active,
            created_at: Utc::now(),
        };

        let mut data = self.lock();
        data.chat_sessions.push(session.clone());
        if self.persist(&mut data) {
            self.bus.publish(StoreEvent::SessionAdded(session.clone()));
        }
        session
    }

    pub fn update_session(&self, id: &str, updates: SessionUpdate) -> Option<ChatSession> {
        let mut data = self.lock();
        let index = data.chat_sessions.iter().position(|s| s.id == id)?;

        if let Some(status) = updates.status {
            data.chat_sessions[index].status = status;
        }

        let session = data.chat_sessions[index].clone();
        if self.persist(&mut data) {
            self.bus
                .publish(StoreEvent::SessionUpdated(session.clone()));
        }
        Some(session)
    }

    /// Append a message to a session. Messages are immutable once appended.
    pub fn append_message(&self, session_id: &str, input: MessageInput) -> Option<Message> {
        let mut data = self.lock();
        let index = data.chat_sessions.iter().position(|s| s.id == session_id)?;

        let message = Message {
            id: format!("msg_{}", Uuid::new_v4()),
            sender: input.sender,
            text: input.text,
            translated_text: input.translated_text,
            language: input.language,
            timestamp: Utc::now(),
        };

        data.chat_sessions[index].messages.push(message.clone());
        if self.persist(&mut data) {
            self.bus.publish(StoreEvent::MessageAppended {
                session_id: session_id.to_string(),
                message: message.clone(),
            });
        }
        Some(message)
    }

    // --- Whole-store operations ---

    pub fn export_data(&self) -> String {
        let data = self.lock();
        serde_json::to_string_pretty(&*data).unwrap_or_default()
    }

    pub fn import_data(&self, text: &str) -> bool {
        let imported: StoreData = match serde_json::from_str(text) {
            Ok(imported) => imported,
            Err(e) => {
                warn!("rejected import, not a valid store envelope: {e}");
                return false;
            }
        };

        let mut data = self.lock();
        *data = imported;
        let saved = self.persist(&mut data);
        if saved {
            self.bus.publish(StoreEvent::DataImported);
        }
        saved
    }

    pub fn clear_all(&self) -> bool {
        let mut data = self.lock();
        *data = Self::default_data(&self.version, &self.defaults);
        let saved = self.persist(&mut data);
        if saved {
            self.bus.publish(StoreEvent::DataCleared);
        }
        saved
    }

    /// Used/available/total bytes for display. Does not enforce any limit.
    pub fn storage_info(&self) -> StorageInfo {
        let data = self.lock();
        let used = serde_json::to_string(&*data).map(|s| s.len()).unwrap_or(0);
        StorageInfo {
            used,
            available: self.max_size.saturating_sub(used),
            total: self.max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::SenderRole;
    use crate::config::DEFAULT_GEMINI_BASE_URL;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        Config {
            bind_addr: "127.0.0.1:0".into(),
            gemini_api_key: None,
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.into(),
            storage_path: dir.path().join("mandi-data.json"),
            storage_version: "1.0.0".into(),
            max_storage_size: 5 * 1024 * 1024,
            default_language: "en".into(),
            default_currency: "INR".into(),
            default_location: "India".into(),
            environment: "test".into(),
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
        }
    }

    fn test_store(config: &Config) -> Store {
        Store::new(config, Arc::new(EventBus::new())).unwrap()
    }

    fn tomato() -> ProductInput {
        ProductInput {
            name: "Tomato".into(),
            quantity: 25.0,
            price: 30.0,
            currency: None,
            language: None,
        }
    }

    #[test]
    fn test_add_product_assigns_identity_and_timestamps() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&test_config(&dir));

        let a = store.add_product(tomato()).unwrap();
        let b = store
            .add_product(ProductInput {
                name: "Onion".into(),
                ..tomato()
            })
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.created_at, a.updated_at);
        assert_eq!(a.currency, "INR");
        assert_eq!(a.language, "en");
    }

    #[test]
    fn test_add_product_rejects_duplicate_name() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&test_config(&dir));

        store.add_product(tomato()).unwrap();
        let err = store
            .add_product(ProductInput {
                name: "  tomato ".into(),
                ..tomato()
            })
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_add_product_rejects_bad_numbers() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&test_config(&dir));

        assert!(store
            .add_product(ProductInput {
                quantity: 0.0,
                ..tomato()
            })
            .is_err());
        assert!(store
            .add_product(ProductInput {
                price: -3.0,
                ..tomato()
            })
            .is_err());
    }

    #[test]
    fn test_update_product_bumps_updated_at_only() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&test_config(&dir));

        let added = store.add_product(tomato()).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let updated = store
            .update_product(
                &added.id,
                ProductUpdate {
                    price: Some(35.0),
                    ..ProductUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(updated.id, added.id);
        assert_eq!(updated.created_at, added.created_at);
        assert!(updated.updated_at > added.updated_at);
        assert_eq!(updated.price, 35.0);
    }

    #[test]
    fn test_update_missing_product_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&test_config(&dir));
        assert!(store
            .update_product("product_nope", ProductUpdate::default())
            .is_none());
    }

    #[test]
    fn test_delete_product_archives_its_sessions() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&test_config(&dir));

        let product = store.add_product(tomato()).unwrap();
        let session = store.add_session(SessionInput {
            product_id: product.id.clone(),
            vendor_id: "vendor_1".into(),
            buyer_id: "buyer_1".into(),
        });

        assert!(store.delete_product(&product.id));
        assert!(store.product(&product.id).is_none());

        // Session survives with a dangling product id, archived.
        let archived = store.session(&session.id).unwrap();
        assert_eq!(archived.status, SessionStatus::Closed);
        assert_eq!(archived.product_id, product.id);
        assert_eq!(store.sessions().len(), 1);
    }

    #[test]
    fn test_export_import_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let store = test_store(&config);

        store.add_product(tomato()).unwrap();
        store.update_preferences(PreferencesUpdate {
            language: Some("hi".into()),
            currency: None,
            location: Some("Pune".into()),
        });
        let session = store.add_session(SessionInput {
            product_id: "product_x".into(),
            vendor_id: "vendor_1".into(),
            buyer_id: "buyer_1".into(),
        });
        store
            .append_message(
                &session.id,
                MessageInput {
                    sender: SenderRole::Buyer,
                    text: "kitna?".into(),
                    translated_text: Some("how much?".into()),
                    language: "hi".into(),
                },
            )
            .unwrap();

        let exported = store.export_data();

        assert!(store.clear_all());
        assert!(store.products().is_empty());

        assert!(store.import_data(&exported));
        assert_eq!(store.products().len(), 1);
        assert_eq!(store.products()[0].name, "Tomato");
        assert_eq!(store.preferences().language, "hi");
        assert_eq!(store.preferences().location.as_deref(), Some("Pune"));
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.sessions()[0].messages.len(), 1);
    }

    #[test]
    fn test_import_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&test_config(&dir));
        assert!(!store.import_data("not json at all"));
        assert!(!store.import_data(r#"{"products": "wrong shape"}"#));
    }

    #[test]
    fn test_corrupt_file_resets_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        std::fs::write(&config.storage_path, "{{{ definitely not json").unwrap();

        let store = test_store(&config);
        assert!(store.products().is_empty());
        assert_eq!(store.preferences().currency, "INR");
    }

    #[test]
    fn test_version_migration_preserves_products_and_preferences() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        // Seed an old-version envelope with extra junk.
        {
            let store = test_store(&config);
            store.add_product(tomato()).unwrap();
        }
        let mut old: Value =
            serde_json::from_str(&std::fs::read_to_string(&config.storage_path).unwrap()).unwrap();
        old["version"] = Value::String("0.9.0".into());
        old["user_preferences"]["language"] = Value::String("ta".into());
        old["chat_sessions"] = serde_json::json!(["junk that should be dropped"]);
        old["unknown_field"] = serde_json::json!({"x": 1});
        std::fs::write(&config.storage_path, old.to_string()).unwrap();

        let store = test_store(&config);
        assert_eq!(store.products().len(), 1);
        assert_eq!(store.products()[0].name, "Tomato");
        assert_eq!(store.preferences().language, "ta");
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn test_cleanup_keeps_most_recent_products_and_active_sessions() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        // A tiny budget forces the cleanup path on every write.
        config.max_storage_size = 64;
        let store = test_store(&config);

        let session = store.add_session(SessionInput {
            product_id: "product_x".into(),
            vendor_id: "vendor_1".into(),
            buyer_id: "buyer_1".into(),
        });
        store.update_session(
            &session.id,
            SessionUpdate {
                status: Some(SessionStatus::Closed),
            },
        );

        for i in 0..55 {
            store
                .add_product(ProductInput {
                    name: format!("Product {i}"),
                    ..tomato()
                })
                .unwrap();
        }

        let products = store.products();
        assert_eq!(products.len(), CLEANUP_PRODUCT_LIMIT);
        assert!(products.iter().any(|p| p.name == "Product 54"));
        assert!(!products.iter().any(|p| p.name == "Product 0"));
        // The closed session fell to the cleanup policy.
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn test_persist_failure_degrades_without_panic() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        // Writing to a directory fails, on the first attempt and the retry.
        config.storage_path = dir.path().to_path_buf();
        let bus = Arc::new(EventBus::new());
        let store = Store::new(&config, bus.clone()).unwrap();
        let mut rx = bus.subscribe();

        let err = store.add_product(tomato()).unwrap_err();
        assert!(err.to_string().contains("failed to persist"));
        // The failed add is rolled back and never announced.
        assert!(store.products().is_empty());
        assert!(rx.try_recv().is_err());

        assert!(!store.clear_all());
        assert!(!store.import_data(&store.export_data()));

        // Non-rollback mutations keep the in-memory change.
        store.add_session(SessionInput {
            product_id: "product_x".into(),
            vendor_id: "vendor_1".into(),
            buyer_id: "buyer_1".into(),
        });
        assert_eq!(store.sessions().len(), 1);
    }

    #[test]
    fn test_store_survives_poisoned_lock() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&test_config(&dir));
        store.add_product(tomato()).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.data.lock().unwrap();
            panic!("holder panics while the lock is live");
        }));
        assert!(result.is_err());

        // Reads and writes keep working on the poisoned mutex.
        assert_eq!(store.products().len(), 1);
        store
            .add_product(ProductInput {
                name: "Onion".into(),
                ..tomato()
            })
            .unwrap();
        assert_eq!(store.products().len(), 2);
    }

    #[test]
    fn test_successful_writes_publish_events() {
        let dir = TempDir::new().unwrap();
        let bus = Arc::new(EventBus::new());
        let store = Store::new(&test_config(&dir), bus.clone()).unwrap();
        let mut rx = bus.subscribe();

        store.add_product(tomato()).unwrap();
        match rx.try_recv().unwrap() {
            StoreEvent::ProductAdded(product) => assert_eq!(product.name, "Tomato"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_storage_info_reflects_serialized_size() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let store = test_store(&config);

        let info = store.storage_info();
        assert!(info.used > 0);
        assert_eq!(info.total, config.max_storage_size);
        assert_eq!(info.available, info.total - info.used);
    }
}
