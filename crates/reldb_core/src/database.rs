//! Database facade and client sessions.

use crate::algebra::{is_identifier, AttrType, AttrValue, Header, Relation, Row};
use crate::catalog::{check_rel_name, Catalog, RelEntry};
use crate::codec;
use crate::config::Config;
use crate::constraint::{check_key, check_rows};
use crate::error::{Error, Result};
use crate::expr::{eval_predicate, eval_scalar, Compiled, Scope};
use crate::namespace::{default_registry, Namespace};
use crate::relvar::{RelVar, Rows};
use crate::transaction::{Overlay, TxnStack};
use parking_lot::{Mutex, RwLock};
use reldb_storage::{FileStore, MemoryStore, StoreBackend, StoredRow};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Metadata key prefixes in the backing store.
const META_RELATIONS: &str = "__meta_relations__/";
const META_CONSTRAINTS: &str = "__meta_constraints__/";
const META_KEYS: &str = "__meta_keys__/";

fn header_key(name: &str) -> String {
    format!("{META_RELATIONS}{name}")
}

fn constraints_key(name: &str) -> String {
    format!("{META_CONSTRAINTS}{name}")
}

fn keys_key(name: &str) -> String {
    format!("{META_KEYS}{name}")
}

/// What [`Database::set`] accepts: a relation value, or a bare header
/// standing for the empty relation of that header.
#[derive(Debug, Clone)]
pub enum RelationSource {
    /// A relation value.
    Value(Relation),
    /// A type descriptor: header only, initial value empty.
    Header(Header),
}

impl From<Relation> for RelationSource {
    fn from(relation: Relation) -> Self {
        RelationSource::Value(relation)
    }
}

impl From<Header> for RelationSource {
    fn from(header: Header) -> Self {
        RelationSource::Header(header)
    }
}

/// A native row predicate, usable in memory but not persistable.
pub type NativePredicate = dyn Fn(&Row) -> bool + Send + Sync;

/// A predicate supplied to [`Database::constrain_rows`].
///
/// Only `Source` predicates are accepted: the predicate body must be
/// persisted as source text, so a `Native` closure is rejected with
/// [`Error::PredicateNotSerializable`].
#[derive(Clone)]
pub enum Predicate {
    /// Predicate source text.
    Source(String),
    /// A host-language closure. Always rejected.
    Native(Arc<NativePredicate>),
}

impl Predicate {
    /// Wraps a native closure, for callers that want the rejection path.
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&Row) -> bool + Send + Sync + 'static,
    {
        Predicate::Native(Arc::new(f))
    }
}

impl From<&str> for Predicate {
    fn from(source: &str) -> Self {
        Predicate::Source(source.to_string())
    }
}

impl From<String> for Predicate {
    fn from(source: String) -> Self {
        Predicate::Source(source)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Source(source) => f.debug_tuple("Source").field(source).finish(),
            Predicate::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// State shared by every session of one open database.
struct Shared {
    config: Config,
    catalog: RwLock<Catalog>,
    store: Mutex<Box<dyn StoreBackend>>,
    namespace: RwLock<Namespace>,
    open: RwLock<bool>,
}

/// One client's view of the database: the shared state plus this
/// client's private transaction stack.
pub(crate) struct Session {
    shared: Arc<Shared>,
    stack: Mutex<TxnStack>,
}

/// The database facade.
///
/// A `Database` value is one client session. [`Database::session`]
/// creates further sessions over the same shared state; each session has
/// its own transaction stack, and a session only ever observes its own
/// pending writes; everyone else reads the last committed catalog.
///
/// # Example
///
/// ```
/// use reldb_core::{header, row, AttrType, Database};
///
/// let db = Database::open_in_memory().unwrap();
/// db.set("is_called", header! { student: AttrType::Text, name: AttrType::Text })
///     .unwrap();
/// let is_called = db.get("is_called").unwrap();
/// is_called.insert(row! { student: "S1", name: "Anne" }).unwrap();
/// assert_eq!(is_called.count().unwrap(), 1);
/// ```
pub struct Database {
    session: Arc<Session>,
}

impl Database {
    /// Opens a persistent database in the given directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a persistent database with custom configuration.
    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let path = path.as_ref();
        if !config.create_if_missing && !FileStore::exists(path) {
            return Err(Error::Store(
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!(
                        "database {} does not exist and create_if_missing is false",
                        path.display()
                    ),
                )
                .into(),
            ));
        }
        if config.error_if_exists && FileStore::exists(path) {
            return Err(Error::Store(
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("database {} already exists", path.display()),
                )
                .into(),
            ));
        }
        let store = FileStore::open_with_options(path, config.sync_on_commit)?;
        Self::open_with_store(Box::new(store), config)
    }

    /// Opens a fresh in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_with_store(Box::new(MemoryStore::new()), Config::default())
    }

    /// Opens a database over a pre-configured store backend.
    pub fn open_with_store(store: Box<dyn StoreBackend>, config: Config) -> Result<Self> {
        let namespace = default_registry().read().clone();
        let catalog = load_catalog(store.as_ref(), &namespace)?;
        debug!(relations = catalog.iter().count(), "database open");

        let shared = Arc::new(Shared {
            config,
            catalog: RwLock::new(catalog),
            store: Mutex::new(store),
            namespace: RwLock::new(namespace),
            open: RwLock::new(true),
        });
        Ok(Self {
            session: Arc::new(Session {
                shared,
                stack: Mutex::new(TxnStack::default()),
            }),
        })
    }

    /// Creates another client session over the same database.
    #[must_use]
    pub fn session(&self) -> Database {
        Database {
            session: Arc::new(Session {
                shared: Arc::clone(&self.session.shared),
                stack: Mutex::new(TxnStack::default()),
            }),
        }
    }

    /// Closes the database: flushes the store and disconnects every
    /// session and handle. In-flight transactions are discarded.
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let shared = &self.session.shared;
        let mut open = shared.open.write();
        if !*open {
            return Ok(());
        }
        self.session.stack.lock().clear();
        let mut store = shared.store.lock();
        store.flush()?;
        store.close()?;
        *open = false;
        debug!("database closed");
        Ok(())
    }

    /// Checks whether the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.session.shared.open.read()
    }

    /// Returns the configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.session.shared.config
    }

    /// Binds `name` to a relation value or a bare header.
    ///
    /// A new name creates a persistent relation; an existing name gets
    /// wholesale assignment with header and constraint checks.
    pub fn set(&self, name: &str, source: impl Into<RelationSource>) -> Result<()> {
        self.session.set(name, source.into())
    }

    /// Returns a handle to the named relation.
    pub fn get(&self, name: &str) -> Result<RelVar> {
        self.session.ensure_open()?;
        // Existence check; the handle itself stays name-based.
        self.session.view_entry(name)?;
        Ok(RelVar::new(name.to_string(), Arc::downgrade(&self.session)))
    }

    /// Checks whether a relation exists.
    pub fn has(&self, name: &str) -> Result<bool> {
        self.session.ensure_open()?;
        Ok(self.session.view_relation(name).is_some())
    }

    /// Removes a relation from the catalog and the store.
    pub fn remove(&self, name: &str) -> Result<()> {
        self.session.remove(name)
    }

    /// Lists `(name, header)` for every relation, in name order.
    pub fn list_relations(&self) -> Result<Vec<(String, Header)>> {
        self.session.list_relations()
    }

    /// Adds or replaces row constraints on a relation.
    ///
    /// Every new predicate is compiled and evaluated against every
    /// current row before the constraint dictionary changes.
    pub fn constrain_rows<N, P, I>(&self, name: &str, predicates: I) -> Result<()>
    where
        N: Into<String>,
        P: Into<Predicate>,
        I: IntoIterator<Item = (N, P)>,
    {
        let predicates: Vec<(String, Predicate)> = predicates
            .into_iter()
            .map(|(n, p)| (n.into(), p.into()))
            .collect();
        self.session.constrain_rows(name, predicates)
    }

    /// Removes named row constraints from a relation.
    pub fn remove_row_constraints(&self, name: &str, constraint_names: &[&str]) -> Result<()> {
        self.session.remove_row_constraints(name, constraint_names)
    }

    /// A read-only copy of a relation's constraint dictionary.
    pub fn row_constraints(&self, name: &str) -> Result<BTreeMap<String, String>> {
        let entry = self.session.view_entry(name)?;
        Ok(entry
            .constraints
            .iter()
            .map(|(n, c)| (n.clone(), c.source().to_string()))
            .collect())
    }

    /// Declares the key of a relation, verifying uniqueness on the
    /// current rows.
    pub fn set_key(&self, name: &str, attrs: &[&str]) -> Result<()> {
        self.session.set_key(name, attrs)
    }

    /// The declared key attributes; empty means no key declared.
    pub fn key(&self, name: &str) -> Result<BTreeSet<String>> {
        Ok(self.session.view_entry(name)?.key)
    }

    /// Runs `f` inside a transaction frame.
    ///
    /// - normal return commits: the outermost frame flushes through the
    ///   store, an inner frame merges into its parent;
    /// - returning [`Error::Rollback`] discards this frame only and the
    ///   block evaluates to `Ok(())`;
    /// - any other error discards this frame and propagates, rolling the
    ///   enclosing frames back with it.
    pub fn transaction<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Database) -> Result<()>,
    {
        self.session.ensure_open()?;
        self.session.stack.lock().push();
        let result = f(self);
        let frame = self.session.stack.lock().pop();
        let Some(frame) = frame else {
            // The database was closed out from under the transaction.
            return Err(Error::Disconnected);
        };
        match result {
            Ok(()) => {
                let mut stack = self.session.stack.lock();
                if stack.in_txn() {
                    stack.merge(frame);
                    Ok(())
                } else {
                    drop(stack);
                    self.session.flush_frame(frame)
                }
            }
            Err(Error::Rollback) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Registers a domain type in this database's expression namespace.
    pub fn register_domain(&self, name: &str, base: AttrType) -> Result<()> {
        self.session.ensure_open()?;
        self.session.shared.namespace.write().register_domain(name, base)
    }

    /// Registers a domain type with a validation hook.
    pub fn register_domain_with<F>(
        &self,
        name: &str,
        base: AttrType,
        check: F,
    ) -> Result<()>
    where
        F: Fn(&AttrValue) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.session.ensure_open()?;
        self.session
            .shared
            .namespace
            .write()
            .register_domain_with(name, base, check)
    }

    /// Registers a plain value in this database's expression namespace.
    pub fn register_value(&self, name: &str, value: AttrValue) -> Result<()> {
        self.session.ensure_open()?;
        self.session.shared.namespace.write().register_value(name, value)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .field("txn_depth", &self.session.stack.lock().depth())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if *self.shared.open.read() {
            Ok(())
        } else {
            Err(Error::Disconnected)
        }
    }

    /// The state of `name` as seen by this client: innermost overlay
    /// first, then the committed catalog.
    pub(crate) fn view_entry(&self, name: &str) -> Result<RelEntry> {
        self.ensure_open()?;
        self.try_view_entry(name)?
            .ok_or_else(|| Error::unknown_relation(name))
    }

    fn try_view_entry(&self, name: &str) -> Result<Option<RelEntry>> {
        self.ensure_open()?;
        let stack = self.stack.lock();
        if let Some(overlay) = stack.view(name) {
            return Ok(match overlay {
                Overlay::Entry(entry) => Some(entry.clone()),
                Overlay::Removed => None,
            });
        }
        drop(stack);
        Ok(self.shared.catalog.read().get(name).cloned())
    }

    pub(crate) fn view_relation(&self, name: &str) -> Option<Relation> {
        self.try_view_entry(name)
            .ok()
            .flatten()
            .map(|entry| entry.relation)
    }

    fn in_txn(&self) -> bool {
        self.stack.lock().in_txn()
    }

    /// Records the new state of `name` into the innermost frame.
    fn record(&self, name: &str, entry: RelEntry) {
        if let Some(frame) = self.stack.lock().top_mut() {
            frame.set_entry(name, entry);
        }
    }

    fn record_removed(&self, name: &str) {
        if let Some(frame) = self.stack.lock().top_mut() {
            frame.set_removed(name);
        }
    }

    /// Runs one mutation, wrapping it in an implicit single-statement
    /// transaction when none is open.
    fn with_autocommit<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        self.ensure_open()?;
        if self.in_txn() {
            return f();
        }
        self.stack.lock().push();
        let result = f();
        let frame = self.stack.lock().pop();
        let Some(frame) = frame else {
            return Err(Error::Disconnected);
        };
        match result {
            Ok(()) => self.flush_frame(frame),
            Err(Error::Rollback) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn set(&self, name: &str, source: RelationSource) -> Result<()> {
        self.ensure_open()?;
        check_rel_name(name)?;
        self.with_autocommit(|| match self.try_view_entry(name)? {
            None => {
                let relation = match source {
                    RelationSource::Value(value) => value,
                    RelationSource::Header(header) => Relation::empty(header),
                };
                self.record(name, RelEntry::new(relation));
                Ok(())
            }
            Some(entry) => {
                let value = match source {
                    RelationSource::Value(value) => value,
                    RelationSource::Header(header) => {
                        return Err(Error::TypeMismatch {
                            relation: name.to_string(),
                            actual: format!("a bare header {header}"),
                        })
                    }
                };
                self.assign_entry(name, entry, value)
            }
        })
    }

    pub(crate) fn assign(&self, name: &str, value: Relation) -> Result<()> {
        self.with_autocommit(|| {
            let entry = self.view_entry(name)?;
            self.assign_entry(name, entry, value)
        })
    }

    /// Wholesale assignment: header must match, and the incoming value
    /// must satisfy every constraint. Nothing changes on failure.
    fn assign_entry(&self, name: &str, mut entry: RelEntry, value: Relation) -> Result<()> {
        if value.header() != &entry.header {
            return Err(Error::HeaderMismatch {
                relation: name.to_string(),
                expected: entry.header.clone(),
                actual: value.header().clone(),
            });
        }
        self.check_entry_value(name, &entry, &value)?;
        entry.relation = value;
        self.record(name, entry);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.with_autocommit(|| {
            self.view_entry(name)?;
            self.record_removed(name);
            Ok(())
        })
    }

    fn list_relations(&self) -> Result<Vec<(String, Header)>> {
        self.ensure_open()?;
        let mut names: BTreeSet<String> = self
            .shared
            .catalog
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        names.extend(self.stack.lock().overlaid_names());

        let mut result = Vec::new();
        for name in names {
            if let Some(entry) = self.try_view_entry(&name)? {
                result.push((name, entry.header));
            }
        }
        Ok(result)
    }

    pub(crate) fn insert(&self, name: &str, rows: Rows) -> Result<()> {
        self.with_autocommit(|| {
            let mut entry = self.view_entry(name)?;
            let incoming = match rows {
                Rows::One(row) => {
                    let header = row.header();
                    if header != entry.header {
                        return Err(Error::HeaderMismatch {
                            relation: name.to_string(),
                            expected: entry.header.clone(),
                            actual: header,
                        });
                    }
                    Relation::from_rows(entry.header.clone(), [row])?
                }
                Rows::Relation(value) => {
                    if value.header() != &entry.header {
                        return Err(Error::HeaderMismatch {
                            relation: name.to_string(),
                            expected: entry.header.clone(),
                            actual: value.header().clone(),
                        });
                    }
                    value
                }
            };
            let grown = entry.relation.union(&incoming)?;
            self.check_entry_value(name, &entry, &grown)?;
            entry.relation = grown;
            self.record(name, entry);
            Ok(())
        })
    }

    pub(crate) fn update(
        &self,
        name: &str,
        where_src: &str,
        assignments: &[(&str, &str)],
    ) -> Result<()> {
        self.with_autocommit(|| {
            let mut entry = self.view_entry(name)?;
            let condition = Compiled::compile(where_src)?;
            let mut compiled_assignments = Vec::with_capacity(assignments.len());
            for (attr, source) in assignments {
                let declared = entry
                    .header
                    .get(attr)
                    .ok_or_else(|| Error::unknown_attribute(name, *attr))?
                    .clone();
                compiled_assignments.push((*attr, declared, Compiled::compile(*source)?));
            }

            let ns = self.shared.namespace.read();
            let lookup = |n: &str| self.view_relation(n);
            let relations: Option<&dyn Fn(&str) -> Option<Relation>> = Some(&lookup);

            let mut updated = Relation::empty(entry.header.clone());
            for row in entry.relation.rows() {
                let scope = Scope {
                    row: Some(row),
                    relations,
                    ns: &ns,
                };
                if !eval_predicate(condition.expr(), &scope)? {
                    updated.insert_unchecked(row.clone());
                    continue;
                }
                let mut new_row = row.clone();
                for (attr, declared, compiled) in &compiled_assignments {
                    let value = eval_scalar(compiled.expr(), &scope)?;
                    let value = coerce(name, attr, declared, value, &ns)?;
                    new_row = new_row.with(*attr, value);
                }
                updated.insert_unchecked(new_row);
            }
            drop(ns);

            self.check_entry_value(name, &entry, &updated)?;
            entry.relation = updated;
            self.record(name, entry);
            Ok(())
        })
    }

    pub(crate) fn delete(&self, name: &str, where_src: &str) -> Result<()> {
        self.with_autocommit(|| {
            let mut entry = self.view_entry(name)?;
            let condition = Compiled::compile(where_src)?;

            let ns = self.shared.namespace.read();
            let lookup = |n: &str| self.view_relation(n);
            let relations: Option<&dyn Fn(&str) -> Option<Relation>> = Some(&lookup);

            let mut kept = Relation::empty(entry.header.clone());
            for row in entry.relation.rows() {
                let scope = Scope {
                    row: Some(row),
                    relations,
                    ns: &ns,
                };
                if !eval_predicate(condition.expr(), &scope)? {
                    kept.insert_unchecked(row.clone());
                }
            }
            drop(ns);

            // Deletion cannot violate row predicates or keys.
            entry.relation = kept;
            self.record(name, entry);
            Ok(())
        })
    }

    fn constrain_rows(&self, name: &str, predicates: Vec<(String, Predicate)>) -> Result<()> {
        self.with_autocommit(|| {
            let mut entry = self.view_entry(name)?;

            let mut additions = BTreeMap::new();
            for (cname, predicate) in predicates {
                if !is_identifier(&cname) {
                    return Err(Error::name_invalid(&cname, "not an identifier"));
                }
                let compiled = match predicate {
                    Predicate::Source(source) => Compiled::compile(source)?,
                    Predicate::Native(_) => {
                        return Err(Error::PredicateNotSerializable { name: cname })
                    }
                };
                additions.insert(cname, compiled);
            }

            // Only the new predicates need checking: current rows already
            // satisfy the existing set.
            let ns = self.shared.namespace.read();
            let lookup = |n: &str| self.view_relation(n);
            check_rows(name, &entry.relation, &additions, &ns, Some(&lookup))?;
            drop(ns);

            entry.constraints.extend(additions);
            self.record(name, entry);
            Ok(())
        })
    }

    fn remove_row_constraints(&self, name: &str, constraint_names: &[&str]) -> Result<()> {
        self.with_autocommit(|| {
            let mut entry = self.view_entry(name)?;
            for cname in constraint_names {
                if !entry.constraints.contains_key(*cname) {
                    return Err(Error::unknown_constraint(name, *cname));
                }
            }
            for cname in constraint_names {
                entry.constraints.remove(*cname);
            }
            self.record(name, entry);
            Ok(())
        })
    }

    fn set_key(&self, name: &str, attrs: &[&str]) -> Result<()> {
        self.with_autocommit(|| {
            let mut entry = self.view_entry(name)?;
            let mut key = BTreeSet::new();
            for attr in attrs {
                if !entry.header.contains(attr) {
                    return Err(Error::unknown_attribute(name, *attr));
                }
                key.insert((*attr).to_string());
            }
            check_key(name, &entry.relation, &key)?;
            entry.key = key;
            self.record(name, entry);
            Ok(())
        })
    }

    /// Validates a candidate relation value against an entry's
    /// constraints and key.
    fn check_entry_value(&self, name: &str, entry: &RelEntry, value: &Relation) -> Result<()> {
        let ns = self.shared.namespace.read();
        let lookup = |n: &str| self.view_relation(n);
        check_rows(name, value, &entry.constraints, &ns, Some(&lookup))?;
        check_key(name, value, &entry.key)?;
        Ok(())
    }

    /// Flushes an outermost frame: every overlay goes through the store
    /// under one store transaction, then the committed catalog is
    /// updated.
    fn flush_frame(&self, frame: crate::transaction::Frame) -> Result<()> {
        if frame.overlays().next().is_none() {
            return Ok(());
        }

        let ns = self.shared.namespace.read();
        let mut store = self.shared.store.lock();
        let mut catalog = self.shared.catalog.write();

        // Final all-invariants check over the frame's view of the world.
        {
            let catalog_ref = &*catalog;
            let lookup = |n: &str| -> Option<Relation> {
                match frame.get(n) {
                    Some(Overlay::Entry(entry)) => Some(entry.relation.clone()),
                    Some(Overlay::Removed) => None,
                    None => catalog_ref.get(n).map(|e| e.relation.clone()),
                }
            };
            for (name, overlay) in frame.overlays() {
                if let Overlay::Entry(entry) = overlay {
                    if entry.relation.header() != &entry.header {
                        return Err(Error::HeaderMismatch {
                            relation: name.clone(),
                            expected: entry.header.clone(),
                            actual: entry.relation.header().clone(),
                        });
                    }
                    check_rows(name, &entry.relation, &entry.constraints, &ns, Some(&lookup))?;
                    check_key(name, &entry.relation, &entry.key)?;
                }
            }
        }

        let flush = (|| -> Result<()> {
            let existing = store.relation_names()?;
            store.begin()?;
            for (name, overlay) in frame.overlays() {
                let exists = existing.iter().any(|n| n == name);
                match overlay {
                    Overlay::Removed => {
                        if exists {
                            store.drop_rel(name)?;
                            store.delete_meta(&header_key(name))?;
                            store.delete_meta(&constraints_key(name))?;
                            store.delete_meta(&keys_key(name))?;
                        }
                    }
                    Overlay::Entry(entry) => {
                        // Rebuild the table outright: the bulk-replace
                        // contract rewrites every row anyway, and a
                        // drop-then-set in one transaction may have
                        // changed the columns.
                        if exists {
                            store.drop_rel(name)?;
                        }
                        let columns: Vec<String> =
                            entry.header.names().map(str::to_string).collect();
                        store.create_rel(name, &columns)?;
                        let rows: Vec<StoredRow> = entry
                            .relation
                            .rows()
                            .map(codec::encode_row)
                            .collect::<Result<_>>()?;
                        store.bulk_replace(name, rows)?;
                        store.save_meta(&header_key(name), &codec::encode_header(&entry.header)?)?;
                        store.save_meta(
                            &constraints_key(name),
                            &codec::encode_constraints(&entry.constraints)?,
                        )?;
                        store.save_meta(&keys_key(name), &codec::encode_key(&entry.key)?)?;
                    }
                }
            }
            store.commit()?;
            Ok(())
        })();

        if let Err(err) = flush {
            let _ = store.rollback();
            return Err(match err {
                Error::Store(source) => Error::CommitFailed { source },
                other => other,
            });
        }

        for (name, overlay) in frame.overlays() {
            match overlay {
                Overlay::Entry(entry) => catalog.insert(name.clone(), entry.clone()),
                Overlay::Removed => {
                    catalog.remove(name);
                }
            }
        }
        debug!(relations = frame.overlays().count(), "transaction flushed");
        Ok(())
    }
}

/// Coerces an update expression's result into an attribute's declared
/// type. A domain attribute accepts its base type by running the
/// registered constructor, the way a row literal would.
fn coerce(
    relation: &str,
    attr: &str,
    declared: &AttrType,
    value: AttrValue,
    ns: &Namespace,
) -> Result<AttrValue> {
    let actual = value.attr_type();
    if actual == *declared {
        return Ok(value);
    }
    if let AttrType::Domain(domain) = declared {
        if let Ok(wrapped) = ns.wrap_domain(domain, value) {
            return Ok(wrapped);
        }
    }
    Err(Error::AttrTypeMismatch {
        relation: relation.to_string(),
        attr: attr.to_string(),
        expected: declared.clone(),
        actual,
    })
}

/// Loads the committed catalog from the store at open time.
fn load_catalog(store: &dyn StoreBackend, ns: &Namespace) -> Result<Catalog> {
    let mut catalog = Catalog::default();
    for (key, blob) in store.list_meta(META_RELATIONS)? {
        let Some(name) = key.strip_prefix(META_RELATIONS) else {
            continue;
        };
        let header = codec::decode_header(&blob)?;

        let constraints = match store.load_meta(&constraints_key(name))? {
            Some(bytes) => codec::decode_constraints(&bytes)?,
            None => BTreeMap::new(),
        };
        let key_attrs = match store.load_meta(&keys_key(name))? {
            Some(bytes) => codec::decode_key(&bytes)?,
            None => BTreeSet::new(),
        };

        let mut relation = Relation::empty(header.clone());
        for (_, cells) in store.scan(name)? {
            relation.insert_unchecked(codec::decode_row(&cells, &header, ns)?);
        }

        catalog.insert(
            name.to_string(),
            RelEntry {
                header,
                relation,
                key: key_attrs,
                constraints,
            },
        );
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{header, row};

    fn db_with_marks() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.set(
            "exam_marks",
            header! { course: AttrType::Text, mark: AttrType::Int, student: AttrType::Text },
        )
        .unwrap();
        let marks = db.get("exam_marks").unwrap();
        marks
            .insert(row! { course: "C1", mark: 85, student: "S1" })
            .unwrap();
        marks
            .insert(row! { course: "C1", mark: 49, student: "S2" })
            .unwrap();
        db
    }

    #[test]
    fn open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.is_open());
        assert!(db.list_relations().unwrap().is_empty());
    }

    #[test]
    fn set_header_creates_empty_relation() {
        let db = Database::open_in_memory().unwrap();
        db.set("r", header! { n: AttrType::Int }).unwrap();
        assert!(db.has("r").unwrap());
        assert_eq!(db.get("r").unwrap().count().unwrap(), 0);
    }

    #[test]
    fn set_value_creates_populated_relation() {
        let db = Database::open_in_memory().unwrap();
        let rel = Relation::from_rows(
            header! { n: AttrType::Int },
            [row! { n: 1 }, row! { n: 2 }],
        )
        .unwrap();
        db.set("r", rel.clone()).unwrap();
        assert_eq!(db.get("r").unwrap().value().unwrap(), rel);
    }

    #[test]
    fn relation_names_must_not_start_with_underscore() {
        let db = Database::open_in_memory().unwrap();
        let result = db.set("_hidden", header! { n: AttrType::Int });
        assert!(matches!(result, Err(Error::NameInvalid { .. })));
    }

    #[test]
    fn get_unknown_relation() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get("missing"),
            Err(Error::UnknownRelation { .. })
        ));
    }

    #[test]
    fn remove_drops_relation() {
        let db = Database::open_in_memory().unwrap();
        db.set("r", header! { n: AttrType::Int }).unwrap();
        db.remove("r").unwrap();
        assert!(!db.has("r").unwrap());
        assert!(matches!(db.remove("r"), Err(Error::UnknownRelation { .. })));
    }

    #[test]
    fn list_relations_in_name_order() {
        let db = Database::open_in_memory().unwrap();
        db.set("zoo", header! { n: AttrType::Int }).unwrap();
        db.set("ant", header! { n: AttrType::Int }).unwrap();
        let names: Vec<String> = db
            .list_relations()
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["ant".to_string(), "zoo".to_string()]);
    }

    #[test]
    fn assign_requires_equal_header() {
        let db = db_with_marks();
        let other = Relation::empty(header! { different: AttrType::Int });
        assert!(matches!(
            db.set("exam_marks", other),
            Err(Error::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn assigning_bare_header_to_existing_relation_is_type_mismatch() {
        let db = db_with_marks();
        let result = db.set(
            "exam_marks",
            header! { course: AttrType::Text, mark: AttrType::Int, student: AttrType::Text },
        );
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn wholesale_assign_is_idempotent() {
        let db = db_with_marks();
        let marks = db.get("exam_marks").unwrap();
        let before = marks.value().unwrap();
        db.set("exam_marks", before.clone()).unwrap();
        assert_eq!(marks.value().unwrap(), before);
    }

    #[test]
    fn insert_then_delete_is_identity() {
        let db = db_with_marks();
        let marks = db.get("exam_marks").unwrap();
        let before = marks.value().unwrap();
        let new_row = row! { course: "C9", mark: 77, student: "S9" };
        assert!(!before.contains(&new_row));

        marks.insert(new_row).unwrap();
        marks
            .delete("course == 'C9' and student == 'S9'")
            .unwrap();
        assert_eq!(marks.value().unwrap(), before);
    }

    #[test]
    fn insert_rejects_header_mismatch() {
        let db = db_with_marks();
        let marks = db.get("exam_marks").unwrap();
        let result = marks.insert(row! { course: "C1", mark: 85 });
        assert!(matches!(result, Err(Error::HeaderMismatch { .. })));
    }

    #[test]
    fn update_rewrites_matching_rows() {
        let db = db_with_marks();
        let marks = db.get("exam_marks").unwrap();
        marks
            .update("student == 'S2'", &[("mark", "mark + 1")])
            .unwrap();
        assert!(marks
            .value()
            .unwrap()
            .contains(&row! { course: "C1", mark: 50, student: "S2" }));
    }

    #[test]
    fn update_unknown_attribute() {
        let db = db_with_marks();
        let marks = db.get("exam_marks").unwrap();
        let result = marks.update("true", &[("missing", "1")]);
        assert!(matches!(result, Err(Error::UnknownAttribute { .. })));
    }

    #[test]
    fn update_rejects_wrong_result_type() {
        let db = db_with_marks();
        let marks = db.get("exam_marks").unwrap();
        let result = marks.update("student == 'S1'", &[("mark", "'high'")]);
        assert!(matches!(result, Err(Error::AttrTypeMismatch { .. })));
    }

    #[test]
    fn native_predicate_rejected_with_stable_wording() {
        let db = db_with_marks();
        let err = db
            .constrain_rows(
                "exam_marks",
                [("valid_mark", Predicate::native(|_| true))],
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "predicate for constraint \"valid_mark\" cannot be stored as source text"
        );
        assert!(db.row_constraints("exam_marks").unwrap().is_empty());
    }

    #[test]
    fn constraint_names_may_start_with_underscore() {
        let db = db_with_marks();
        db.constrain_rows("exam_marks", [("_positive", "mark >= 0")])
            .unwrap();
        assert!(db
            .row_constraints("exam_marks")
            .unwrap()
            .contains_key("_positive"));
    }

    #[test]
    fn constrain_rows_on_unknown_relation() {
        let db = Database::open_in_memory().unwrap();
        let result = db.constrain_rows("missing", [("c", "true")]);
        assert!(matches!(result, Err(Error::UnknownRelation { .. })));
    }

    #[test]
    fn remove_row_constraints_requires_existing_names() {
        let db = db_with_marks();
        db.constrain_rows("exam_marks", [("valid_mark", "0 <= mark <= 100")])
            .unwrap();
        let result = db.remove_row_constraints("exam_marks", &["valid_mark", "missing"]);
        assert!(matches!(result, Err(Error::UnknownConstraint { .. })));
        // Atomic: the existing name survives the failed removal.
        assert!(db
            .row_constraints("exam_marks")
            .unwrap()
            .contains_key("valid_mark"));

        db.remove_row_constraints("exam_marks", &["valid_mark"]).unwrap();
        assert!(db.row_constraints("exam_marks").unwrap().is_empty());
    }

    #[test]
    fn set_key_enforces_uniqueness_on_current_rows() {
        let db = db_with_marks();
        let marks = db.get("exam_marks").unwrap();
        marks
            .insert(row! { course: "C2", mark: 49, student: "S1" })
            .unwrap();

        assert!(matches!(
            db.set_key("exam_marks", &["mark"]),
            Err(Error::KeyViolated { .. })
        ));
        db.set_key("exam_marks", &["course", "student"]).unwrap();
        let key = db.key("exam_marks").unwrap();
        assert!(key.contains("course") && key.contains("student"));
    }

    #[test]
    fn set_key_unknown_attribute() {
        let db = db_with_marks();
        assert!(matches!(
            db.set_key("exam_marks", &["missing"]),
            Err(Error::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn declared_key_blocks_colliding_insert() {
        let db = db_with_marks();
        db.set_key("exam_marks", &["course", "student"]).unwrap();
        let marks = db.get("exam_marks").unwrap();
        let result = marks.insert(row! { course: "C1", mark: 60, student: "S1" });
        assert!(matches!(result, Err(Error::KeyViolated { .. })));
        // No partial effect.
        assert_eq!(marks.count().unwrap(), 2);
    }

    #[test]
    fn update_cannot_break_key() {
        let db = db_with_marks();
        db.set_key("exam_marks", &["student"]).unwrap();
        let marks = db.get("exam_marks").unwrap();
        let result = marks.update("student == 'S2'", &[("student", "'S1'")]);
        assert!(matches!(result, Err(Error::KeyViolated { .. })));
    }

    #[test]
    fn close_disconnects_handles_and_sessions() {
        let db = db_with_marks();
        let marks = db.get("exam_marks").unwrap();
        let session = db.session();
        db.close().unwrap();
        db.close().unwrap();

        assert!(!db.is_open());
        assert!(matches!(marks.value(), Err(Error::Disconnected)));
        assert!(matches!(marks.delete("true"), Err(Error::Disconnected)));
        assert!(matches!(session.has("exam_marks"), Err(Error::Disconnected)));
        assert!(matches!(
            db.set("r", header! { n: AttrType::Int }),
            Err(Error::Disconnected)
        ));
    }

    #[test]
    fn handle_outliving_database_is_disconnected() {
        let marks = {
            let db = db_with_marks();
            db.get("exam_marks").unwrap()
        };
        assert!(matches!(marks.count(), Err(Error::Disconnected)));
    }

    #[test]
    fn other_sessions_read_committed_state_only() {
        let db = db_with_marks();
        let observer = db.session();

        db.transaction(|tx| {
            let marks = tx.get("exam_marks").unwrap();
            marks
                .insert(row! { course: "C3", mark: 66, student: "S3" })
                .unwrap();
            // Pending write visible to this client...
            assert_eq!(marks.count().unwrap(), 3);
            // ...but not to a concurrent session.
            assert_eq!(observer.get("exam_marks").unwrap().count().unwrap(), 2);
            Ok(())
        })
        .unwrap();

        assert_eq!(observer.get("exam_marks").unwrap().count().unwrap(), 3);
    }

    #[test]
    fn facade_views_observe_identical_state() {
        let db = db_with_marks();
        let handle = db.get("exam_marks").unwrap();
        db.transaction(|tx| {
            let inner = tx.get("exam_marks").unwrap();
            inner
                .insert(row! { course: "C3", mark: 66, student: "S3" })
                .unwrap();
            // The pre-existing handle and a fresh lookup agree mid-transaction.
            assert_eq!(handle.count().unwrap(), 3);
            assert_eq!(
                tx.list_relations().unwrap().len(),
                1
            );
            Ok(())
        })
        .unwrap();
        assert_eq!(handle.count().unwrap(), 3);
    }

    #[test]
    fn relation_created_inside_rolled_back_transaction_vanishes() {
        let db = Database::open_in_memory().unwrap();
        let result = db.transaction(|tx| {
            tx.set("temp", header! { n: AttrType::Int })?;
            assert!(tx.has("temp")?);
            Err(Error::Rollback)
        });
        assert!(result.is_ok());
        assert!(!db.has("temp").unwrap());
    }

    #[test]
    fn remove_inside_transaction_is_transactional() {
        let db = db_with_marks();
        db.transaction(|tx| {
            tx.remove("exam_marks")?;
            assert!(!tx.has("exam_marks")?);
            Err(Error::Rollback)
        })
        .unwrap();
        assert!(db.has("exam_marks").unwrap());

        db.transaction(|tx| tx.remove("exam_marks")).unwrap();
        assert!(!db.has("exam_marks").unwrap());
    }

    #[test]
    fn transaction_relations_visible_to_predicates_by_name() {
        let db = db_with_marks();
        db.transaction(|tx| {
            let marks = tx.get("exam_marks")?;
            // `exam_marks` resolves inside the transaction scope; a
            // non-empty relation is truthy.
            marks.delete("exam_marks and mark < 50")?;
            assert_eq!(marks.count()?, 1);
            Ok(())
        })
        .unwrap();
    }
}
