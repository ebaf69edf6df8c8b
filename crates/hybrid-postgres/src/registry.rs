//! Record type registry and per-application binding.
//!
//! [`ModelRegistry`] maps normalized model names to declarations. It is an
//! ordinary value built at startup (one per process, or one per test) and
//! shared behind an `Arc`. [`AppModels`] binds declarations to one
//! application's handles on first access and hands out the same [`Model`] on
//! every later call.

use dashmap::DashMap;
use hybrid_common::normalize_model_name;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::app::AppContext;
use crate::model::{Model, ModelDef};
use crate::relationship::ManyToMany;
use crate::{HybridError, Result};

/// Declared record types by normalized name.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: DashMap<String, Arc<ModelDef>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `def` under its normalized name, replacing any earlier
    /// declaration with that name.
    pub fn declare(&self, def: ModelDef) -> Arc<ModelDef> {
        let key = def.key();
        let def = Arc::new(def);
        if self.models.insert(key.clone(), def.clone()).is_some() {
            warn!(model = %key, "Record type re-declared; previous declaration replaced");
        } else {
            debug!(model = %key, table = %def.table().name(), "Record type declared");
        }
        def
    }

    /// # Errors
    ///
    /// `UnknownModel` when nothing is declared under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<ModelDef>> {
        let key = normalize_model_name(name);
        self.models
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or(HybridError::UnknownModel(key))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(&normalize_model_name(name))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// The record types of one application.
pub struct AppModels {
    registry: Arc<ModelRegistry>,
    app: AppContext,
    bound: Mutex<HashMap<String, Model>>,
}

impl std::fmt::Debug for AppModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppModels")
            .field("app", &self.app.name())
            .field("bound", &self.bound.lock().keys().cloned().collect::<Vec<_>>())
            .finish()
    }
}

impl AppModels {
    pub fn new(registry: Arc<ModelRegistry>, app: AppContext) -> Self {
        Self { registry, app, bound: Mutex::new(HashMap::new()) }
    }

    pub fn app(&self) -> &AppContext {
        &self.app
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The bound type for `name`, binding it and its relationships on first use.
    ///
    /// # Errors
    ///
    /// `UnknownModel` when `name`, or the target of one of its
    /// relationships, is not declared.
    pub fn bind(&self, name: &str) -> Result<Model> {
        let mut bound = self.bound.lock();
        let before: HashSet<String> = bound.keys().cloned().collect();
        let result = self.bind_locked(&mut bound, &normalize_model_name(name));
        if result.is_err() {
            // Everything bound during this attempt goes, join types included.
            bound.retain(|key, model| {
                let keep = before.contains(key);
                if !keep {
                    model.detach_all();
                }
                keep
            });
        }
        result
    }

    /// An already bound type, without binding.
    pub fn get(&self, name: &str) -> Option<Model> {
        self.bound.lock().get(&normalize_model_name(name)).cloned()
    }

    /// Names bound so far, sorted.
    pub fn bound_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bound.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drops every binding and the resolvers linking them.
    ///
    /// Runs on drop as well.
    pub fn clear(&self) {
        let mut bound = self.bound.lock();
        for model in bound.values() {
            model.detach_all();
        }
        bound.clear();
    }

    fn bind_locked(&self, bound: &mut HashMap<String, Model>, key: &str) -> Result<Model> {
        if let Some(model) = bound.get(key) {
            return Ok(model.clone());
        }

        let def = self.registry.get(key)?;
        let model = Model::bind(def.clone(), self.app.clone());
        // Inserted before its relationships so self and mutual references resolve.
        bound.insert(key.to_string(), model.clone());
        debug!(model = %key, app = ?self.app.name(), "Record type bound");

        for (name, rel) in def.relationships() {
            let resolver = self.bind_relation(bound, rel)?;
            model.attach(name, resolver);
        }
        Ok(model)
    }

    fn bind_relation(
        &self,
        bound: &mut HashMap<String, Model>,
        rel: &crate::relationship::ManyToManyDef,
    ) -> Result<ManyToMany> {
        let join_key = normalize_model_name(&rel.join_model);
        let join = if bound.contains_key(&join_key) || self.registry.contains(&join_key) {
            self.bind_locked(bound, &join_key)?
        } else {
            // Undeclared join table: bound for this application only.
            let def = Arc::new(ModelDef::new(rel.join_model.clone(), rel.join_table.clone()));
            let model = Model::bind(def, self.app.clone());
            bound.insert(join_key.clone(), model.clone());
            debug!(model = %join_key, "Join record type created");
            model
        };
        let target = self.bind_locked(bound, &normalize_model_name(&rel.target))?;
        Ok(ManyToMany::new(join, target, rel.source_column.clone(), rel.target_column.clone()))
    }
}

impl Drop for AppModels {
    /// Resolvers hold their join and target types, so related bindings form
    /// reference cycles until detached.
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::relationship::ManyToManyDef;
    use crate::schema::Table;
    use crate::session::{Database, Session};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NoDatabase;

    #[async_trait]
    impl Database for NoDatabase {
        async fn acquire(&self) -> Result<Box<dyn Session>> {
            Err(HybridError::Connection("no database".to_string()))
        }
    }

    fn app() -> AppContext {
        AppContext::new(Arc::new(NoDatabase), Arc::new(MemoryCache::new()))
    }

    fn table(name: &str) -> Table {
        Table::new(name).unwrap()
    }

    fn tags_rel() -> ManyToManyDef {
        ManyToManyDef {
            join_model: "PostTags".to_string(),
            join_table: Table::new("post_tags").unwrap().columns(["id", "post_id", "tag_id"]).unwrap(),
            target: "Tag".to_string(),
            source_column: "post_id".to_string(),
            target_column: "tag_id".to_string(),
        }
    }

    #[test]
    fn test_declare_normalizes_and_overwrites() {
        let registry = ModelRegistry::new();
        registry.declare(ModelDef::new("OrderItem", table("items_v1")));
        registry.declare(ModelDef::new("order_item", table("items_v2")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("OrderItem").unwrap().table().name(), "items_v2");
    }

    #[test]
    fn test_get_unknown() {
        let registry = ModelRegistry::new();
        assert!(matches!(registry.get("Ghost"), Err(HybridError::UnknownModel(_))));
    }

    #[test]
    fn test_bind_is_idempotent() {
        let registry = Arc::new(ModelRegistry::new());
        registry.declare(ModelDef::new("User", table("users")));
        let models = AppModels::new(registry, app());
        let a = models.bind("User").unwrap();
        let b = models.bind("user").unwrap();
        assert!(a.same_binding(&b));
    }

    #[test]
    fn test_bind_per_application() {
        let registry = Arc::new(ModelRegistry::new());
        registry.declare(ModelDef::new("User", table("users")));
        let first = AppModels::new(registry.clone(), app().with_name("a"));
        let second = AppModels::new(registry, app().with_name("b"));
        let a = first.bind("User").unwrap();
        let b = second.bind("User").unwrap();
        assert!(!a.same_binding(&b));
        assert_eq!(b.app().name(), Some("b"));
    }

    #[test]
    fn test_bind_creates_join_model_once() {
        let registry = Arc::new(ModelRegistry::new());
        registry.declare(ModelDef::new("Tag", table("tags")));
        registry.declare(ModelDef::new("Post", table("posts")).relationship("tags", tags_rel()));
        registry.declare(ModelDef::new("Article", table("articles")).relationship("tags", tags_rel()));
        let models = AppModels::new(registry, app());

        let post = models.bind("Post").unwrap();
        let article = models.bind("Article").unwrap();
        let via_post = post.relation("tags").unwrap();
        let via_article = article.relation("tags").unwrap();
        assert!(via_post.join_model().same_binding(via_article.join_model()));
        assert_eq!(via_post.join_model().table().name(), "post_tags");
        assert!(models.get("post_tags").is_some());
    }

    #[test]
    fn test_bind_reuses_declared_join_model() {
        let registry = Arc::new(ModelRegistry::new());
        registry.declare(ModelDef::new("Tag", table("tags")));
        registry.declare(ModelDef::new("PostTags", table("post_tags")).fields_list(["post_id", "tag_id"]));
        registry.declare(ModelDef::new("Post", table("posts")).relationship("tags", tags_rel()));
        let models = AppModels::new(registry, app());

        let declared = models.bind("PostTags").unwrap();
        let post = models.bind("Post").unwrap();
        assert!(post.relation("tags").unwrap().join_model().same_binding(&declared));
    }

    #[test]
    fn test_bind_unknown_target_rolls_back() {
        let registry = Arc::new(ModelRegistry::new());
        registry.declare(ModelDef::new("Post", table("posts")).relationship("tags", tags_rel()));
        let models = AppModels::new(registry, app());
        assert!(matches!(models.bind("Post"), Err(HybridError::UnknownModel(_))));
        assert!(models.get("Post").is_none());
    }

    #[test]
    fn test_failed_bind_removes_everything_it_bound() {
        let registry = Arc::new(ModelRegistry::new());
        let ghosts = ManyToManyDef {
            join_model: "TagGhosts".to_string(),
            join_table: table("tag_ghosts"),
            target: "Ghost".to_string(),
            source_column: "tag_id".to_string(),
            target_column: "ghost_id".to_string(),
        };
        registry.declare(ModelDef::new("User", table("users")));
        registry.declare(ModelDef::new("Tag", table("tags")).relationship("ghosts", ghosts));
        registry.declare(ModelDef::new("Post", table("posts")).relationship("tags", tags_rel()));
        let models = AppModels::new(registry, app());
        let user = models.bind("User").unwrap();

        assert!(matches!(models.bind("Post"), Err(HybridError::UnknownModel(_))));
        assert_eq!(models.bound_names(), vec!["user".to_string()]);
        assert!(models.bind("User").unwrap().same_binding(&user));
    }

    struct DroppedDatabase(Arc<AtomicBool>);

    impl Drop for DroppedDatabase {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Database for DroppedDatabase {
        async fn acquire(&self) -> Result<Box<dyn Session>> {
            Err(HybridError::Connection("no database".to_string()))
        }
    }

    #[test]
    fn test_dropping_app_models_releases_related_bindings() {
        let registry = Arc::new(ModelRegistry::new());
        let friends = ManyToManyDef {
            join_model: "UserFriends".to_string(),
            join_table: table("user_friends"),
            target: "User".to_string(),
            source_column: "from_user_id".to_string(),
            target_column: "to_user_id".to_string(),
        };
        registry.declare(ModelDef::new("User", table("users")).relationship("friends", friends));
        let released = Arc::new(AtomicBool::new(false));
        let app = AppContext::new(Arc::new(DroppedDatabase(released.clone())), Arc::new(MemoryCache::new()));
        let models = AppModels::new(registry, app);
        models.bind("User").unwrap();

        drop(models);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_self_relation_and_clear() {
        let registry = Arc::new(ModelRegistry::new());
        let friends = ManyToManyDef {
            join_model: "UserFriends".to_string(),
            join_table: table("user_friends"),
            target: "User".to_string(),
            source_column: "from_user_id".to_string(),
            target_column: "to_user_id".to_string(),
        };
        registry.declare(ModelDef::new("User", table("users")).relationship("friends", friends));
        let models = AppModels::new(registry, app());

        let user = models.bind("User").unwrap();
        assert!(user.relation("friends").unwrap().target_model().same_binding(&user));

        models.clear();
        assert!(models.bound_names().is_empty());
        assert!(matches!(user.relation("friends"), Err(HybridError::Attribute(_))));
    }
}
