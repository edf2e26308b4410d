/// Versioned template store using ArcSwap
///
/// Reads are lock-free snapshots of the whole `(id -> version -> Template)` map.
/// Each write builds a new map and swaps the pointer atomically, so concurrent
/// readers never observe a half-applied update.

use super::types::Template;
use crate::error::{FlowError, Result};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage contract for versioned templates
///
/// Implementations must validate on ingest, keep versions monotonic, and
/// return copies that callers cannot use to mutate stored state.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Store a new `(id, version)`; fails on validation error or duplicate
    async fn create(&self, template: Template) -> Result<()>;

    /// Append a new version (`max + 1`) of an existing template, returning it
    async fn update(&self, id: &str, template: Template) -> Result<u32>;

    /// Fetch a version; `0` means latest
    async fn get(&self, id: &str, version: u32) -> Result<Template>;

    /// Remove every version of `id`
    async fn delete(&self, id: &str) -> Result<()>;

    /// All stored versions of `id`, ascending
    async fn list_versions(&self, id: &str) -> Result<Vec<u32>>;

    /// All template IDs, sorted
    async fn list_ids(&self) -> Result<Vec<String>>;
}

type VersionMap = HashMap<String, BTreeMap<u32, Arc<Template>>>;

/// In-memory template store
///
/// The map is published through `ArcSwap` for readers; writers serialise on
/// a mutex so read-modify-swap cycles never lose each other's updates.
#[derive(Debug)]
pub struct MemoryTemplateStore {
    templates: ArcSwap<VersionMap>,
    write_lock: Mutex<()>,
}

impl Default for MemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self {
            templates: ArcSwap::from_pointee(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl TemplateStore for MemoryTemplateStore {
    async fn create(&self, template: Template) -> Result<()> {
        template.validate()?;

        let _guard = self.write_lock.lock().await;
        let current = self.templates.load();

        if current
            .get(&template.id)
            .is_some_and(|versions| versions.contains_key(&template.version))
        {
            return Err(FlowError::DuplicateTemplate {
                id: template.id,
                version: template.version,
            });
        }

        let mut next = (**current).clone();
        let id = template.id.clone();
        let version = template.version;
        next.entry(id.clone())
            .or_default()
            .insert(version, Arc::new(template));
        self.templates.store(Arc::new(next));

        tracing::info!("📋 Stored template '{}' v{}", id, version);
        Ok(())
    }

    async fn update(&self, id: &str, mut template: Template) -> Result<u32> {
        let _guard = self.write_lock.lock().await;
        let current = self.templates.load();

        let versions = current.get(id).filter(|v| !v.is_empty()).ok_or_else(|| {
            FlowError::TemplateNotFound { id: id.to_string() }
        })?;
        let (&latest, first) = match (versions.keys().next_back(), versions.values().next()) {
            (Some(latest), Some(first)) => (latest, first),
            _ => return Err(FlowError::TemplateNotFound { id: id.to_string() }),
        };

        let version = latest + 1;
        template.id = id.to_string();
        template.version = version;
        template.created_at = first.created_at;
        template.updated_at = Utc::now();
        template.validate()?;

        let mut next = (**current).clone();
        next.entry(id.to_string())
            .or_default()
            .insert(version, Arc::new(template));
        self.templates.store(Arc::new(next));

        tracing::info!("🔥 Template '{}' updated to v{}", id, version);
        Ok(version)
    }

    async fn get(&self, id: &str, version: u32) -> Result<Template> {
        let current = self.templates.load();
        let versions = current
            .get(id)
            .ok_or_else(|| FlowError::TemplateNotFound { id: id.to_string() })?;

        let found = if version == 0 {
            versions.values().next_back()
        } else {
            versions.get(&version)
        };

        found
            .map(|template| Template::clone(template))
            .ok_or_else(|| FlowError::TemplateNotFound { id: id.to_string() })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let current = self.templates.load();
        if !current.contains_key(id) {
            return Err(FlowError::TemplateNotFound { id: id.to_string() });
        }

        let mut next = (**current).clone();
        next.remove(id);
        self.templates.store(Arc::new(next));

        tracing::info!("🗑️ Deleted all versions of template '{}'", id);
        Ok(())
    }

    async fn list_versions(&self, id: &str) -> Result<Vec<u32>> {
        Ok(self
            .templates
            .load()
            .get(id)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.templates.load().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
