use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::descriptor::{EntityDescriptor, RelationDescriptor, TableDescriptor};
use crate::relations;

/// Names reserved for the built-in type categories.
pub const BUILTIN_TYPES: &[&str] = &["entity", "table", "relation"];

/// What happened to a registry item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Remove,
}

/// Change notification delivered synchronously to subscribed listeners,
/// in listener-registration order.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub item_type: String,
    pub name: String,
}

type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Typed payload of a registry item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemPayload {
    Entity(EntityDescriptor),
    Table(TableDescriptor),
    Relation(RelationDescriptor),
    /// Extension-type payload, kept as JSON for interop tooling.
    Custom(serde_json::Value),
}

/// One named, typed metadata item.
#[derive(Debug, Clone)]
pub struct RegistryItem {
    pub name: String,
    pub item_type: String,
    pub payload: ItemPayload,
    pub registered_at: SystemTime,
}

impl RegistryItem {
    pub fn entity(descriptor: EntityDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            item_type: "entity".into(),
            payload: ItemPayload::Entity(descriptor),
            registered_at: SystemTime::now(),
        }
    }

    pub fn table(descriptor: TableDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            item_type: "table".into(),
            payload: ItemPayload::Table(descriptor),
            registered_at: SystemTime::now(),
        }
    }

    pub fn relation(descriptor: RelationDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            item_type: "relation".into(),
            payload: ItemPayload::Relation(descriptor),
            registered_at: SystemTime::now(),
        }
    }

    pub fn custom(
        name: impl Into<String>,
        item_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            item_type: item_type.into(),
            payload: ItemPayload::Custom(payload),
            registered_at: SystemTime::now(),
        }
    }

    pub fn as_entity(&self) -> Option<&EntityDescriptor> {
        match &self.payload {
            ItemPayload::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableDescriptor> {
        match &self.payload {
            ItemPayload::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&RelationDescriptor> {
        match &self.payload {
            ItemPayload::Relation(r) => Some(r),
            _ => None,
        }
    }
}

/// Layer classification for a type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Declared domain metadata (entities, value objects).
    Model,
    /// Storage-side metadata (tables).
    Storage,
    /// Computed from other entries by a derivation function.
    Derived,
}

/// Derivation function: receives an immutable snapshot, returns the full set
/// of items for its derived type.
pub type DeriveFn = Arc<dyn Fn(&RegistrySnapshot) -> Vec<RegistryItem> + Send + Sync>;

/// Declaration of a type category.
#[derive(Clone)]
pub struct TypeConfig {
    pub name: String,
    pub layer: Layer,
    /// Types whose changes trigger recomputation of this one.
    pub sources: Vec<String>,
    pub derive: Option<DeriveFn>,
}

impl TypeConfig {
    pub fn new(name: impl Into<String>, layer: Layer) -> Self {
        Self {
            name: name.into(),
            layer,
            sources: Vec::new(),
            derive: None,
        }
    }

    /// Declare this type as derived from `sources` via `derive`.
    pub fn derived_from(
        mut self,
        sources: impl IntoIterator<Item = impl Into<String>>,
        derive: impl Fn(&RegistrySnapshot) -> Vec<RegistryItem> + Send + Sync + 'static,
    ) -> Self {
        self.sources = sources.into_iter().map(Into::into).collect();
        self.derive = Some(Arc::new(derive));
        self
    }
}

/// Immutable copy of the registry contents handed to derivation functions.
///
/// Derivations never see the live registry, so they can neither deadlock on
/// its locks nor trigger further derivations.
pub struct RegistrySnapshot {
    items: Vec<RegistryItem>,
}

impl RegistrySnapshot {
    pub fn items(&self) -> &[RegistryItem] {
        &self.items
    }

    pub fn get(&self, name: &str) -> Option<&RegistryItem> {
        self.items.iter().find(|i| i.name == name)
    }

    pub fn by_type<'a>(&'a self, item_type: &'a str) -> impl Iterator<Item = &'a RegistryItem> {
        self.items.iter().filter(move |i| i.item_type == item_type)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.items.iter().filter_map(RegistryItem::as_entity)
    }
}

#[derive(Default)]
struct Inner {
    items: BTreeMap<String, RegistryItem>,
    /// Secondary index, always mirroring `items`.
    by_type: BTreeMap<String, BTreeSet<String>>,
    types: BTreeMap<String, TypeConfig>,
    /// Declaration order, for a deterministic derivation sweep.
    type_order: Vec<String>,
}

impl Inner {
    fn declare_type(&mut self, config: TypeConfig) {
        if !self.types.contains_key(&config.name) {
            self.type_order.push(config.name.clone());
        }
        self.types.insert(config.name.clone(), config);
    }

    /// Insert or update one item, keeping the type index in sync.
    /// Returns the resulting change event.
    fn insert_item(&mut self, item: RegistryItem) -> ChangeEvent {
        let kind = match self.items.get(&item.name) {
            Some(existing) => {
                if existing.item_type != item.item_type {
                    if let Some(set) = self.by_type.get_mut(&existing.item_type) {
                        set.remove(&item.name);
                    }
                }
                ChangeKind::Update
            }
            None => ChangeKind::Add,
        };
        self.by_type
            .entry(item.item_type.clone())
            .or_default()
            .insert(item.name.clone());
        let event = ChangeEvent {
            kind,
            item_type: item.item_type.clone(),
            name: item.name.clone(),
        };
        self.items.insert(item.name.clone(), item);
        event
    }

    fn remove_item(&mut self, name: &str) -> Option<ChangeEvent> {
        let item = self.items.remove(name)?;
        if let Some(set) = self.by_type.get_mut(&item.item_type) {
            set.remove(name);
        }
        Some(ChangeEvent {
            kind: ChangeKind::Remove,
            item_type: item.item_type,
            name: item.name,
        })
    }
}

/// Resets the deriving flag even if a derivation function panics.
struct DerivingGuard<'a>(&'a AtomicBool);

impl Drop for DerivingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Process-wide catalog of declared entities, tables, and extension types.
///
/// Registration is idempotent by name; malformed registrations are dropped
/// with a warning instead of raised, because registration happens at
/// module-load time and must not take down unrelated code.
///
/// Read-mostly: lookups take a shared lock, mutation is expected only at
/// declaration time or during derivation recomputation.
pub struct MetaRegistry {
    inner: RwLock<Inner>,
    listeners: RwLock<Vec<Listener>>,
    deriving: AtomicBool,
}

impl MetaRegistry {
    /// A fresh registry with the built-in type categories declared:
    /// `entity` (Model), `table` (Storage), and `relation` (Derived, computed
    /// from entities by [`relations::derive_relations`]).
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.declare_type(TypeConfig::new("entity", Layer::Model));
        inner.declare_type(TypeConfig::new("table", Layer::Storage));
        inner.declare_type(
            TypeConfig::new("relation", Layer::Derived)
                .derived_from(["entity"], relations::derive_relations),
        );
        Self {
            inner: RwLock::new(inner),
            listeners: RwLock::new(Vec::new()),
            deriving: AtomicBool::new(false),
        }
    }

    /// The shared process-wide instance.
    ///
    /// Prefer injecting an `Arc<MetaRegistry>` where you can; this accessor
    /// exists for declaration sites that have no injection seam.
    pub fn global() -> Arc<MetaRegistry> {
        static GLOBAL: OnceLock<Arc<MetaRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(MetaRegistry::new())).clone()
    }

    /// Insert or update one named, typed item.
    ///
    /// Idempotent by name: re-registering fires an `Update` notification.
    /// Items with an empty name or an undeclared type are dropped (logged).
    pub fn register(&self, item: RegistryItem) {
        if item.name.is_empty() || item.item_type.is_empty() {
            warn!(
                name = %item.name,
                item_type = %item.item_type,
                "dropping registration without a resolvable name or type"
            );
            return;
        }
        let event = {
            let mut inner = self.inner.write().unwrap();
            if !inner.types.contains_key(&item.item_type) {
                warn!(
                    name = %item.name,
                    item_type = %item.item_type,
                    "dropping registration with undeclared type"
                );
                return;
            }
            inner.insert_item(item)
        };
        self.notify(&event);
        self.recompute_derived(&event.item_type);
    }

    /// Delete an item from both indices. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let event = {
            let mut inner = self.inner.write().unwrap();
            inner.remove_item(name)
        };
        match event {
            Some(event) => {
                self.notify(&event);
                self.recompute_derived(&event.item_type);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<RegistryItem> {
        self.inner.read().unwrap().items.get(name).cloned()
    }

    pub fn get_by_type(&self, item_type: &str) -> Vec<RegistryItem> {
        let inner = self.inner.read().unwrap();
        inner
            .by_type
            .get(item_type)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|n| inner.items.get(n).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_all(&self) -> Vec<RegistryItem> {
        self.inner.read().unwrap().items.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an entity descriptor by name.
    pub fn entity(&self, name: &str) -> Option<EntityDescriptor> {
        self.get(name).and_then(|i| match i.payload {
            ItemPayload::Entity(e) => Some(e),
            _ => None,
        })
    }

    /// Look up a table descriptor by name.
    pub fn table(&self, name: &str) -> Option<TableDescriptor> {
        self.get(name).and_then(|i| match i.payload {
            ItemPayload::Table(t) => Some(t),
            _ => None,
        })
    }

    /// All derived relation records.
    pub fn relations(&self) -> Vec<RelationDescriptor> {
        self.get_by_type("relation")
            .into_iter()
            .filter_map(|i| match i.payload {
                ItemPayload::Relation(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Declare a new type category.
    ///
    /// Colliding with a built-in type name is rejected (logged, no mutation).
    /// Re-declaring a non-built-in type replaces its configuration.
    pub fn register_type(&self, config: TypeConfig) {
        if config.name.is_empty() {
            warn!("dropping type registration without a name");
            return;
        }
        if BUILTIN_TYPES.contains(&config.name.as_str()) {
            warn!(item_type = %config.name, "type name collides with a built-in type");
            return;
        }
        self.inner.write().unwrap().declare_type(config);
    }

    /// Subscribe to change notifications.
    ///
    /// Listeners are invoked synchronously, in registration order, after the
    /// registry mutation is visible.
    pub fn subscribe(&self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.listeners.write().unwrap().push(Arc::new(listener));
    }

    /// Drop all items (type declarations survive). Intended for test isolation.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.items.clear();
        inner.by_type.clear();
    }

    /// Immutable copy of the current contents.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            items: self.inner.read().unwrap().items.values().cloned().collect(),
        }
    }

    fn notify(&self, event: &ChangeEvent) {
        let listeners: Vec<Listener> = self.listeners.read().unwrap().clone();
        for listener in listeners {
            listener(event);
        }
    }

    /// Recompute every derived type that lists `changed_type` as a source.
    ///
    /// Guarded against re-entrancy: a derivation whose re-registrations would
    /// transitively trigger itself (A -> B -> A) runs at most once per
    /// external change.
    fn recompute_derived(&self, changed_type: &str) {
        if self.deriving.load(Ordering::Acquire) {
            return;
        }
        let configs: Vec<TypeConfig> = {
            let inner = self.inner.read().unwrap();
            inner
                .type_order
                .iter()
                .filter_map(|name| inner.types.get(name))
                .filter(|cfg| {
                    cfg.derive.is_some() && cfg.sources.iter().any(|s| s == changed_type)
                })
                .cloned()
                .collect()
        };
        if configs.is_empty() {
            return;
        }
        if self.deriving.swap(true, Ordering::AcqRel) {
            return;
        }
        let _guard = DerivingGuard(&self.deriving);

        for cfg in configs {
            let derive = cfg.derive.as_ref().expect("filtered on derive.is_some()");
            let derived = derive(&self.snapshot());
            debug!(
                item_type = %cfg.name,
                count = derived.len(),
                "recomputing derived metadata"
            );

            let mut events = Vec::new();
            {
                let mut inner = self.inner.write().unwrap();
                let stale: Vec<String> = inner
                    .by_type
                    .get(&cfg.name)
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default();
                for name in stale {
                    events.extend(inner.remove_item(&name));
                }
                for item in derived {
                    if item.item_type != cfg.name {
                        warn!(
                            name = %item.name,
                            expected = %cfg.name,
                            actual = %item.item_type,
                            "derivation produced an item of the wrong type; skipping"
                        );
                        continue;
                    }
                    events.push(inner.insert_item(item));
                }
            }
            for event in &events {
                self.notify(event);
            }
        }
    }
}

impl Default for MetaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, FieldKind, RelationKind};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn order_entity() -> EntityDescriptor {
        EntityDescriptor::new("Order", "orders")
            .field(FieldDescriptor::new("id", FieldKind::Text).primary_key())
            .field(FieldDescriptor::new("total", FieldKind::Decimal))
    }

    #[test]
    fn register_and_lookup() {
        let reg = MetaRegistry::new();
        reg.register(RegistryItem::entity(order_entity()));

        assert_eq!(reg.len(), 1);
        assert_eq!(reg.entity("Order").unwrap().table, "orders");
        assert!(reg.get("Missing").is_none());
        assert!(reg.get_by_type("table").is_empty());
    }

    #[test]
    fn idempotent_registration_fires_single_update() {
        let reg = MetaRegistry::new();
        let updates = Arc::new(AtomicUsize::new(0));
        let adds = Arc::new(AtomicUsize::new(0));
        {
            let updates = updates.clone();
            let adds = adds.clone();
            reg.subscribe(move |ev| {
                if ev.item_type != "entity" {
                    return;
                }
                match ev.kind {
                    ChangeKind::Add => adds.fetch_add(1, Ordering::SeqCst),
                    ChangeKind::Update => updates.fetch_add(1, Ordering::SeqCst),
                    ChangeKind::Remove => 0,
                };
            });
        }

        reg.register(RegistryItem::entity(order_entity()));
        reg.register(RegistryItem::entity(order_entity()));

        assert_eq!(reg.len(), 1);
        assert_eq!(adds.load(Ordering::SeqCst), 1);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn malformed_registration_is_dropped() {
        let reg = MetaRegistry::new();
        reg.register(RegistryItem::custom("", "entity", serde_json::json!({})));
        reg.register(RegistryItem::custom("thing", "", serde_json::json!({})));
        reg.register(RegistryItem::custom("widget", "widget", serde_json::json!({})));
        assert!(reg.is_empty());
    }

    #[test]
    fn extension_type_roundtrip() {
        let reg = MetaRegistry::new();
        reg.register_type(TypeConfig::new("widget", Layer::Model));
        reg.register(RegistryItem::custom(
            "OrderList",
            "widget",
            serde_json::json!({"entity": "Order"}),
        ));
        assert_eq!(reg.get_by_type("widget").len(), 1);
    }

    #[test]
    fn builtin_type_collision_rejected() {
        let reg = MetaRegistry::new();
        reg.register_type(TypeConfig::new("entity", Layer::Derived).derived_from(
            ["table"],
            |_| Vec::new(),
        ));
        // The built-in config must be untouched: entities still register fine.
        reg.register(RegistryItem::entity(order_entity()));
        assert_eq!(reg.get_by_type("entity").len(), 1);
    }

    #[test]
    fn remove_keeps_indices_mirrored() {
        let reg = MetaRegistry::new();
        reg.register(RegistryItem::entity(order_entity()));
        assert!(reg.remove("Order"));
        assert!(!reg.remove("Order"));
        assert!(reg.get_by_type("entity").is_empty());
        assert!(reg.get("Order").is_none());
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let reg = MetaRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let log = log.clone();
            reg.subscribe(move |ev| {
                if ev.item_type == "entity" {
                    log.lock().unwrap().push(tag);
                }
            });
        }
        reg.register(RegistryItem::entity(order_entity()));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn relation_derivation_tracks_entities() {
        let reg = MetaRegistry::new();
        reg.register(RegistryItem::entity(
            order_entity().field(
                FieldDescriptor::new("customer", FieldKind::Relation)
                    .relation(RelationKind::ManyToOne, "Customer"),
            ),
        ));
        let relations = reg.relations();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].source, "Order");
        assert_eq!(relations[0].target, "Customer");
        assert_eq!(relations[0].kind, RelationKind::ManyToOne);

        // Re-register without the relation field: the stale record must go.
        reg.register(RegistryItem::entity(order_entity()));
        assert!(reg.relations().is_empty());
    }

    #[test]
    fn derivation_runs_once_per_trigger() {
        let reg = MetaRegistry::new();
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let runs = runs.clone();
            reg.register_type(TypeConfig::new("entity-summary", Layer::Derived).derived_from(
                ["entity"],
                move |snapshot| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    snapshot
                        .entities()
                        .map(|e| {
                            RegistryItem::custom(
                                format!("summary:{}", e.name),
                                "entity-summary",
                                serde_json::json!({"table": e.table}),
                            )
                        })
                        .collect()
                },
            ));
        }

        for i in 0..10 {
            let entity = EntityDescriptor::new(format!("Entity{i}"), format!("entity_{i}"))
                .field(FieldDescriptor::new("id", FieldKind::Text).primary_key());
            reg.register(RegistryItem::entity(entity));
        }

        assert_eq!(runs.load(Ordering::SeqCst), 10);
        assert_eq!(reg.get_by_type("entity-summary").len(), 10);
    }

    #[test]
    fn derivation_cycle_does_not_recurse() {
        // A derived type that lists itself as a source: the deriving flag must
        // stop its own re-registrations from triggering another pass.
        let reg = MetaRegistry::new();
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let runs = runs.clone();
            reg.register_type(TypeConfig::new("echo", Layer::Derived).derived_from(
                ["entity", "echo"],
                move |_| {
                    runs.fetch_add(1, Ordering::SeqCst);
                    vec![RegistryItem::custom("echo:1", "echo", serde_json::json!({}))]
                },
            ));
        }
        reg.register(RegistryItem::entity(order_entity()));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_preserves_type_declarations() {
        let reg = MetaRegistry::new();
        reg.register(RegistryItem::entity(order_entity()));
        reg.clear();
        assert!(reg.is_empty());
        // Built-in types survive a clear.
        reg.register(RegistryItem::entity(order_entity()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    #[serial_test::serial]
    fn global_instance_is_shared() {
        let a = MetaRegistry::global();
        let b = MetaRegistry::global();
        a.clear();
        a.register(RegistryItem::entity(order_entity()));
        assert_eq!(b.entity("Order").unwrap().table, "orders");
        a.clear();
    }
}
