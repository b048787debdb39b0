//! Process-wide holder of the three validated config records.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::RecordFields;
use super::agent::AgentConfig;
use super::model::ModelConfig;
use super::retrieval::RetrievalConfig;
use crate::error::ConfigError;

static GLOBAL: OnceLock<Arc<ConfigStore>> = OnceLock::new();

/// Identifies one of the stored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKind {
    /// [`ModelConfig`].
    Model,
    /// [`RetrievalConfig`].
    Retrieval,
    /// [`AgentConfig`].
    Agent,
}

impl ConfigKind {
    /// All kinds, in storage order.
    pub const ALL: [Self; 3] = [Self::Model, Self::Retrieval, Self::Agent];

    /// Canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Retrieval => "retrieval",
            Self::Agent => "agent",
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKind {
    type Err = ConfigError;

    /// Accepts the canonical names plus the aliases `llm` and `rag`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "model" | "llm" => Ok(Self::Model),
            "retrieval" | "rag" => Ok(Self::Retrieval),
            "agent" => Ok(Self::Agent),
            _ => Err(ConfigError::UnknownKind {
                kind: s.to_string(),
            }),
        }
    }
}

/// Snapshot of one stored record.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigRecord {
    /// Model parameters.
    Model(Arc<ModelConfig>),
    /// Retrieval parameters.
    Retrieval(Arc<RetrievalConfig>),
    /// Agent parameters.
    Agent(Arc<AgentConfig>),
}

impl ConfigRecord {
    /// The kind of this record.
    #[must_use]
    pub const fn kind(&self) -> ConfigKind {
        match self {
            Self::Model(_) => ConfigKind::Model,
            Self::Retrieval(_) => ConfigKind::Retrieval,
            Self::Agent(_) => ConfigKind::Agent,
        }
    }

    /// Serializes the record. API keys are included.
    pub fn to_json(&self) -> Result<Value, ConfigError> {
        match self {
            Self::Model(c) => to_value(c.as_ref()),
            Self::Retrieval(c) => to_value(c.as_ref()),
            Self::Agent(c) => to_value(c.as_ref()),
        }
    }
}

/// Holds one validated instance of each config record.
///
/// Reads return `Arc` snapshots and never block on each other. Updates are
/// serialized by a single mutex around merge, validate, and replace, so two
/// concurrent updates never lose each other's changes and a failed update
/// leaves every record untouched.
///
/// Share it as `Arc<ConfigStore>`. [`ConfigStore::global`] offers a lazily
/// created process-wide instance for code without an explicit handle.
pub struct ConfigStore {
    model: RwLock<Arc<ModelConfig>>,
    retrieval: RwLock<Arc<RetrievalConfig>>,
    agent: RwLock<Arc<AgentConfig>>,
    update_lock: Mutex<()>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(
            ModelConfig::default(),
            RetrievalConfig::default(),
            AgentConfig::default(),
        )
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("model", &*self.model.read())
            .field("retrieval", &*self.retrieval.read())
            .field("agent", &*self.agent.read())
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    /// Creates a store from already-validated records.
    #[must_use]
    pub fn new(model: ModelConfig, retrieval: RetrievalConfig, agent: AgentConfig) -> Self {
        Self {
            model: RwLock::new(Arc::new(model)),
            retrieval: RwLock::new(Arc::new(retrieval)),
            agent: RwLock::new(Arc::new(agent)),
            update_lock: Mutex::new(()),
        }
    }

    /// Loads `.env` (if present) and builds every record from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(ConfigError::Env {
                    var: ".env".to_string(),
                    message: e.to_string(),
                });
            }
        }
        Ok(Self::new(
            ModelConfig::from_env()?,
            RetrievalConfig::from_env()?,
            AgentConfig::from_env()?,
        ))
    }

    /// Returns the process-wide store, creating it from the environment on
    /// first access.
    ///
    /// An error is returned only if the first creation fails; later calls
    /// retry.
    pub fn global() -> Result<Arc<Self>, ConfigError> {
        if let Some(store) = GLOBAL.get() {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(Self::from_env()?);
        Ok(Arc::clone(GLOBAL.get_or_init(|| store)))
    }

    /// Installs `store` as the process-wide instance.
    ///
    /// Fails with the rejected store if one was already installed or lazily
    /// created.
    pub fn install(store: Arc<Self>) -> Result<(), Arc<Self>> {
        GLOBAL.set(store)
    }

    /// Returns a snapshot of the record for `kind`.
    #[must_use]
    pub fn get(&self, kind: ConfigKind) -> ConfigRecord {
        match kind {
            ConfigKind::Model => ConfigRecord::Model(self.model()),
            ConfigKind::Retrieval => ConfigRecord::Retrieval(self.retrieval()),
            ConfigKind::Agent => ConfigRecord::Agent(self.agent()),
        }
    }

    /// Current model record.
    #[must_use]
    pub fn model(&self) -> Arc<ModelConfig> {
        Arc::clone(&self.model.read())
    }

    /// Current retrieval record.
    #[must_use]
    pub fn retrieval(&self) -> Arc<RetrievalConfig> {
        Arc::clone(&self.retrieval.read())
    }

    /// Current agent record.
    #[must_use]
    pub fn agent(&self) -> Arc<AgentConfig> {
        Arc::clone(&self.agent.read())
    }

    /// Merges `patch` into the record named `kind` and replaces it.
    ///
    /// `kind` is `model`, `retrieval`, or `agent` (or the aliases `llm` and
    /// `rag`). `patch` must be a JSON object; nested objects merge
    /// recursively and `null` clears an optional field.
    pub fn update(&self, kind: &str, patch: &Value) -> Result<ConfigRecord, ConfigError> {
        self.update_kind(kind.parse()?, patch)
    }

    /// Typed variant of [`ConfigStore::update`].
    pub fn update_kind(
        &self,
        kind: ConfigKind,
        patch: &Value,
    ) -> Result<ConfigRecord, ConfigError> {
        if !patch.is_object() {
            return Err(ConfigError::Malformed {
                message: format!("patch for '{kind}' must be a JSON object"),
            });
        }
        let _guard = self.update_lock.lock();
        let record = match kind {
            ConfigKind::Model => ConfigRecord::Model(apply(&self.model, patch)?),
            ConfigKind::Retrieval => ConfigRecord::Retrieval(apply(&self.retrieval, patch)?),
            ConfigKind::Agent => ConfigRecord::Agent(apply(&self.agent, patch)?),
        };
        info!(kind = %kind, "Configuration updated");
        Ok(record)
    }
}

/// Merge, validate, and swap one slot. Caller holds the update lock.
fn apply<T>(slot: &RwLock<Arc<T>>, patch: &Value) -> Result<Arc<T>, ConfigError>
where
    T: RecordFields,
{
    let current = Arc::clone(&slot.read());
    let mut merged = to_value(current.as_ref())?;
    merge(&mut merged, patch);
    let fields: T::Fields = serde_json::from_value(merged).map_err(|e| ConfigError::Malformed {
        message: e.to_string(),
    })?;
    let next = Arc::new(T::from_fields(fields)?);
    *slot.write() = Arc::clone(&next);
    Ok(next)
}

fn to_value<T: Serialize>(record: &T) -> Result<Value, ConfigError> {
    serde_json::to_value(record).map_err(|e| ConfigError::Malformed {
        message: e.to_string(),
    })
}

fn merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge(existing, value);
                    }
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_update_merges_single_field() {
        let store = ConfigStore::default();
        let before = store.model();
        store
            .update("model", &json!({"temperature": 0.9}))
            .unwrap_or_else(|_| unreachable!());
        let after = store.model();
        assert!((after.temperature() - 0.9).abs() < f32::EPSILON);
        assert_eq!(after.model_name(), before.model_name());
        assert_eq!(after.max_tokens(), before.max_tokens());
        assert_eq!(after.request_timeout(), before.request_timeout());
        assert_eq!(after.max_retries(), before.max_retries());
    }

    #[test]
    fn test_unknown_kind_changes_nothing() {
        let store = ConfigStore::default();
        let before: Vec<_> = ConfigKind::ALL.iter().map(|k| store.get(*k)).collect();
        let err = store.update("bogus", &json!({})).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownKind {
                kind: "bogus".to_string()
            }
        );
        let after: Vec<_> = ConfigKind::ALL.iter().map(|k| store.get(*k)).collect();
        assert_eq!(before, after);
    }

    #[test_case("model", json!({"temperature": 2.5}) ; "temperature out of range")]
    #[test_case("model", json!({"api_key": "bad-key"}) ; "api key prefix")]
    #[test_case("retrieval", json!({"chunk_overlap": 1000}) ; "overlap not below size")]
    #[test_case("agent", json!({"max_iterations": 0}) ; "zero iterations")]
    #[test_case("agent", json!({"max_iteration": 3}) ; "unknown field")]
    #[test_case("model", json!({"temperature": "hot"}) ; "wrong type")]
    #[test_case("model", json!([1, 2]) ; "non object patch")]
    fn test_invalid_update_leaves_record(kind: &str, patch: Value) {
        let store = ConfigStore::default();
        let kind_enum: ConfigKind = kind.parse().unwrap_or_else(|_| unreachable!());
        let before = store.get(kind_enum);
        assert!(store.update(kind, &patch).is_err());
        assert_eq!(store.get(kind_enum), before);
    }

    #[test]
    fn test_nested_flags_merge() {
        let store = ConfigStore::default();
        store
            .update("agent", &json!({"tools": {"search": false}}))
            .unwrap_or_else(|_| unreachable!());
        let tools = store.agent().tools();
        assert!(!tools.search);
        assert!(tools.calculator);
        assert!(tools.wikipedia);
    }

    #[test]
    fn test_null_clears_optional_field() {
        let model = ModelConfig::builder()
            .api_key("sk-abc")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let store = ConfigStore::new(model, RetrievalConfig::default(), AgentConfig::default());
        store
            .update("llm", &json!({"api_key": null}))
            .unwrap_or_else(|_| unreachable!());
        assert!(store.model().api_key().is_none());
    }

    #[test]
    fn test_snapshot_survives_update() {
        let store = ConfigStore::default();
        let snapshot = store.retrieval();
        store
            .update("rag", &json!({"top_k": 9}))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(snapshot.top_k(), 4);
        assert_eq!(store.retrieval().top_k(), 9);
    }

    #[test]
    fn test_record_to_json() {
        let store = ConfigStore::default();
        let value = store
            .get(ConfigKind::Retrieval)
            .to_json()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(value["store_kind"], "sqlite");
        assert_eq!(value["chunk_size"], 1000);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("Model".parse::<ConfigKind>(), Ok(ConfigKind::Model));
        assert_eq!("rag".parse::<ConfigKind>(), Ok(ConfigKind::Retrieval));
        assert!("vector".parse::<ConfigKind>().is_err());
    }
}
