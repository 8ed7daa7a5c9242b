//! Mutation tracking for bucket values.
//!
//! Every write to a bucket goes through a method on [`Bucket`], a typed
//! handle ([`Mapping`](crate::Mapping), [`Sequence`](crate::Sequence)) or a
//! tracked [`View`] of a nested value. Each of those methods updates the value
//! first and then notifies the flush scheduler, so callers never have to
//! remember to save.
//!
//! Nested objects and arrays are reached through views addressed by path.
//! Views are cached per path with weak references: reading the same nested
//! location twice while a view is alive returns the same view.
//!
//! Object keys are stable addresses; array indices are not. When elements of
//! an array are removed, or a subtree is rewritten wholesale, every view that
//! indexes into an affected array and was taken before the change becomes
//! stale: its reads return nothing and its writes fail with
//! [`StoreError::StaleView`] instead of landing on whichever element now sits
//! at the old index.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use carestate_types::{json_type_name, BucketKind, TypeError};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::pointer::{is_structured, parse_index, parse_pointer, resolve, resolve_mut, to_pointer};
use crate::scheduler::{FlushScheduler, FlushSlot};

/// What a write did to a bucket value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Change {
    /// Nothing changed; no flush is scheduled.
    None,
    /// Values changed without moving array elements.
    Edit,
    /// Array elements at or below the written path were removed or may have
    /// moved. Views indexing into those arrays go stale.
    Shift,
}

impl Change {
    pub(crate) fn edit_if(changed: bool) -> Self {
        if changed {
            Self::Edit
        } else {
            Self::None
        }
    }

    pub(crate) fn shift_if(changed: bool) -> Self {
        if changed {
            Self::Shift
        } else {
            Self::None
        }
    }
}

/// Where arrays were reshaped, stamped with a per-bucket epoch.
#[derive(Debug, Default)]
struct Layout {
    epoch: u64,
    shifted: HashMap<Vec<String>, u64>,
}

impl Layout {
    fn shift(&mut self, path: &[String]) {
        self.epoch += 1;
        self.shifted.insert(path.to_vec(), self.epoch);
    }

    /// Returns `false` if an array that `path` indexes into was reshaped
    /// after `born`, either directly or as part of a rewritten subtree.
    fn is_current(&self, root: &Value, path: &[String], born: u64) -> bool {
        let mut newest = 0;
        let mut node = root;
        for (depth, segment) in path.iter().enumerate() {
            if let Some(&at) = self.shifted.get(&path[..depth]) {
                newest = newest.max(at);
            }
            let next = match node {
                Value::Array(items) => {
                    if newest > born {
                        return false;
                    }
                    parse_index(segment).and_then(|i| items.get(i))
                }
                Value::Object(map) => map.get(segment),
                _ => None,
            };
            match next {
                Some(next) => node = next,
                // Unresolvable paths are reported by the caller.
                None => return true,
            }
        }
        true
    }

    /// Drop shift records that no live view predates.
    fn prune(&mut self, oldest_live: Option<u64>) {
        match oldest_live {
            Some(born) => self.shifted.retain(|_, at| *at > born),
            None => self.shifted.clear(),
        }
    }
}

/// The shared state behind every handle to one bucket.
pub(crate) struct BucketCell {
    name: String,
    kind: BucketKind,
    value: RwLock<Value>,
    views: Mutex<HashMap<Vec<String>, Weak<ViewNode>>>,
    layout: Mutex<Layout>,
    pub(crate) flush: FlushSlot,
    scheduler: Arc<FlushScheduler>,
}

impl BucketCell {
    pub(crate) fn new(
        name: String,
        kind: BucketKind,
        value: Value,
        scheduler: Arc<FlushScheduler>,
    ) -> Self {
        Self {
            name,
            kind,
            value: RwLock::new(value),
            views: Mutex::new(HashMap::new()),
            layout: Mutex::new(Layout::default()),
            flush: FlushSlot::new(),
            scheduler,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn scheduler(&self) -> &Arc<FlushScheduler> {
        &self.scheduler
    }

    /// Clone of the full current value.
    pub(crate) fn snapshot(&self) -> Value {
        self.value.read().expect("lock poisoned").clone()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.value.read().expect("lock poisoned"))
    }

    /// Mutate the root value. `f` reports what it changed; the scheduler is
    /// notified after the lock is released.
    pub(crate) fn write<R>(self: &Arc<Self>, f: impl FnOnce(&mut Value) -> (R, Change)) -> R {
        let (out, change) = {
            let mut root = self.value.write().expect("lock poisoned");
            let (out, change) = f(&mut root);
            self.record(&[], change);
            (out, change)
        };
        if change != Change::None {
            self.scheduler.notify(self);
        }
        out
    }

    /// Mutate the value a view points at, failing if the view is stale or
    /// nothing lives there.
    fn write_at<R>(
        self: &Arc<Self>,
        node: &ViewNode,
        f: impl FnOnce(&mut Value) -> StoreResult<(R, Change)>,
    ) -> StoreResult<R> {
        let (out, change) = {
            let mut root = self.value.write().expect("lock poisoned");
            let target = self.locate_mut(&mut root, node)?;
            let (out, change) = f(target)?;
            self.record(&node.path, change);
            (out, change)
        };
        if change != Change::None {
            self.scheduler.notify(self);
        }
        Ok(out)
    }

    /// Run `f` over the whole value at a view (or the root when `node` is
    /// `None`) as one reshaping write.
    ///
    /// A root update runs on a copy and is committed only if the result still
    /// matches the bucket's kind, so a bad closure leaves the bucket untouched
    /// and schedules nothing.
    fn update_at<R>(
        self: &Arc<Self>,
        node: Option<&ViewNode>,
        f: impl FnOnce(&mut Value) -> R,
    ) -> StoreResult<R> {
        let path: &[String] = match node {
            Some(node) => &node.path,
            None => &[],
        };
        let out = {
            let mut root = self.value.write().expect("lock poisoned");
            let target = match node {
                Some(node) => self.locate_mut(&mut root, node)?,
                None => &mut *root,
            };
            let out = if path.is_empty() {
                let mut draft = target.clone();
                let out = f(&mut draft);
                if !self.kind.accepts(&draft) {
                    return Err(self.kind_mismatch(&draft).into());
                }
                *target = draft;
                out
            } else {
                f(target)
            };
            self.record(path, Change::Shift);
            out
        };
        self.scheduler.notify(self);
        Ok(out)
    }

    /// Run `f` on the value a view points at, or `None` if the view is stale
    /// or the location is empty.
    fn read_at<R>(&self, node: &ViewNode, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let root = self.value.read().expect("lock poisoned");
        if self.is_stale(&root, node) {
            f(None)
        } else {
            f(resolve(&root, &node.path))
        }
    }

    /// Replace the whole value with a freshly loaded snapshot.
    ///
    /// Bypasses change notification and clears any pending flush: the loaded
    /// value is already durable. Views into arrays go stale.
    pub(crate) fn reload(&self, value: Value) -> StoreResult<()> {
        if !self.kind.accepts(&value) {
            return Err(self.kind_mismatch(&value).into());
        }
        {
            let mut root = self.value.write().expect("lock poisoned");
            *root = value;
            self.record(&[], Change::Shift);
        }
        self.scheduler.reset(self);
        Ok(())
    }

    /// The cached view for `path`, creating it if no live, current view
    /// exists.
    pub(crate) fn view_at(self: &Arc<Self>, path: Vec<String>) -> View {
        let mut views = self.views.lock().expect("lock poisoned");
        if let Some(node) = views.get(&path).and_then(Weak::upgrade) {
            if !self.read(|root| self.is_stale(root, &node)) {
                return View(node);
            }
        }
        views.retain(|_, node| node.strong_count() > 0);

        let mut layout = self.layout.lock().expect("lock poisoned");
        let node = Arc::new(ViewNode {
            cell: Arc::clone(self),
            path: path.clone(),
            born: layout.epoch,
            detached: AtomicBool::new(false),
        });
        views.insert(path, Arc::downgrade(&node));
        let oldest = views
            .values()
            .filter_map(Weak::upgrade)
            .map(|node| node.born)
            .min();
        layout.prune(oldest);
        View(node)
    }

    /// Number of live cached views.
    pub(crate) fn live_views(&self) -> usize {
        self.views
            .lock()
            .expect("lock poisoned")
            .values()
            .filter(|node| node.strong_count() > 0)
            .count()
    }

    /// Wrap a value read at `path`: structured values become views.
    pub(crate) fn field_at(self: &Arc<Self>, path: Vec<String>, value: &Value) -> Field {
        if is_structured(value) {
            Field::View(self.view_at(path))
        } else {
            Field::Value(value.clone())
        }
    }

    /// Must be called with the value lock held.
    fn record(&self, path: &[String], change: Change) {
        if change == Change::Shift {
            self.layout.lock().expect("lock poisoned").shift(path);
        }
    }

    /// Once stale, a view stays stale even after its shift record is pruned.
    fn is_stale(&self, root: &Value, node: &ViewNode) -> bool {
        if node.detached.load(Ordering::Acquire) {
            return true;
        }
        let current = self
            .layout
            .lock()
            .expect("lock poisoned")
            .is_current(root, &node.path, node.born);
        if !current {
            node.detached.store(true, Ordering::Release);
        }
        !current
    }

    fn locate_mut<'a>(&self, root: &'a mut Value, node: &ViewNode) -> StoreResult<&'a mut Value> {
        if self.is_stale(root, node) {
            return Err(StoreError::StaleView {
                bucket: self.name.clone(),
                pointer: to_pointer(&node.path),
            });
        }
        resolve_mut(root, &node.path).ok_or_else(|| StoreError::PathNotFound {
            bucket: self.name.clone(),
            pointer: to_pointer(&node.path),
        })
    }

    fn kind_mismatch(&self, value: &Value) -> TypeError {
        TypeError::KindMismatch {
            bucket: self.name.clone(),
            expected: self.kind,
            actual: json_type_name(value).to_string(),
        }
    }
}

/// Result of reading one field of a tracked value.
///
/// Primitives are returned by value. Objects and arrays are returned as a
/// [`View`] so writes through them are still tracked.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    Value(Value),
    View(View),
}

impl Field {
    /// The primitive value, if this field is not structured.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::View(_) => None,
        }
    }

    /// The tracked view, if this field is structured.
    pub fn as_view(&self) -> Option<&View> {
        match self {
            Self::View(v) => Some(v),
            Self::Value(_) => None,
        }
    }

    /// Owned copy of the field's current value.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::View(view) => view.snapshot().unwrap_or(Value::Null),
        }
    }
}

/// Untyped handle to one registered bucket.
///
/// Cheap to clone; all clones share the same underlying value.
#[derive(Clone)]
pub struct Bucket {
    cell: Arc<BucketCell>,
}

impl Bucket {
    pub(crate) fn from_cell(cell: Arc<BucketCell>) -> Self {
        Self { cell }
    }

    pub(crate) fn cell(&self) -> &Arc<BucketCell> {
        &self.cell
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    pub fn kind(&self) -> BucketKind {
        self.cell.kind
    }

    /// Clone of the bucket's full current value.
    pub fn snapshot(&self) -> Value {
        self.cell.snapshot()
    }

    /// Run `f` against the current value without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        self.cell.read(f)
    }

    /// Read, mutate and replace the whole value in one step.
    ///
    /// Counts as a single mutation. If `f` leaves a root that does not match
    /// the bucket's kind, nothing is committed and a
    /// [`TypeError::KindMismatch`] is returned.
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> StoreResult<R> {
        self.cell.update_at(None, f)
    }

    /// `true` from the first unflushed mutation until its flush completes.
    pub fn is_dirty(&self) -> bool {
        self.cell.flush.is_dirty()
    }

    /// Tracked view of the value at a JSON pointer such as `/p1/allergies`.
    ///
    /// Returns `None` if the pointer is malformed. The view may point at a
    /// location that does not exist yet.
    pub fn view(&self, pointer: &str) -> Option<View> {
        parse_pointer(pointer).map(|path| self.cell.view_at(path))
    }

    /// Returns `true` if both handles refer to the same bucket.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.cell.name)
            .field("kind", &self.cell.kind)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

pub(crate) struct ViewNode {
    cell: Arc<BucketCell>,
    path: Vec<String>,
    /// Layout epoch when the view was created.
    born: u64,
    /// Set once the view is known to be stale.
    detached: AtomicBool,
}

/// Tracked view of a nested object or array inside a bucket.
///
/// A view is addressed by its path from the bucket root. Writes through a
/// view notify the owning bucket exactly like top-level writes. Two views of
/// the same path obtained while either is alive are the same view and
/// compare equal, as long as no array on that path has been reshaped in
/// between.
#[derive(Clone)]
pub struct View(Arc<ViewNode>);

impl View {
    /// A view that is stale from birth, for children of a stale view.
    fn detached(cell: &Arc<BucketCell>, path: Vec<String>) -> Self {
        View(Arc::new(ViewNode {
            cell: Arc::clone(cell),
            path,
            born: 0,
            detached: AtomicBool::new(true),
        }))
    }

    pub fn bucket(&self) -> &str {
        &self.0.cell.name
    }

    pub fn path(&self) -> &[String] {
        &self.0.path
    }

    /// The view's location as a JSON pointer.
    pub fn pointer(&self) -> String {
        to_pointer(&self.0.path)
    }

    /// Returns `true` if something currently lives at this path and the
    /// view still addresses it.
    pub fn exists(&self) -> bool {
        self.0.cell.read_at(&self.0, |node| node.is_some())
    }

    /// Returns `true` if an array this view indexes into was reshaped after
    /// the view was taken.
    pub fn is_stale(&self) -> bool {
        self.0.cell.read(|root| self.0.cell.is_stale(root, &self.0))
    }

    /// Clone of the value at this path.
    pub fn snapshot(&self) -> Option<Value> {
        self.0.cell.read_at(&self.0, |node| node.cloned())
    }

    /// Clone of the child at `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .cell
            .read_at(&self.0, |node| node.and_then(|node| child(node, key)).cloned())
    }

    /// Read the child at `key` as a [`Field`].
    pub fn field(&self, key: &str) -> Option<Field> {
        let value = self.get(key)?;
        Some(self.0.cell.field_at(self.child_path(key), &value))
    }

    /// Tracked view of the child at `key`. The child of a stale view is
    /// stale too.
    pub fn view(&self, key: &str) -> View {
        let path = self.child_path(key);
        if self.is_stale() {
            return View::detached(&self.0.cell, path);
        }
        self.0.cell.view_at(path)
    }

    /// Set the child at `key`, returning the previous value.
    ///
    /// On an array, `key` must be an index no greater than its length; the
    /// length itself appends.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> StoreResult<Option<Value>> {
        let value = value.into();
        self.write(|node, this| match node {
            Value::Object(map) => Ok((map.insert(key.to_string(), value), Change::Edit)),
            Value::Array(items) => {
                let index = this.index(key, items.len() + 1)?;
                if index == items.len() {
                    items.push(value);
                    Ok((None, Change::Edit))
                } else {
                    Ok((Some(std::mem::replace(&mut items[index], value)), Change::Edit))
                }
            }
            other => Err(this.not_a_container(other)),
        })
    }

    /// Remove the child at `key`, returning it. Removing from an array shifts
    /// later elements down and makes views into this array stale. Removing a
    /// missing child is not a mutation.
    pub fn remove(&self, key: &str) -> StoreResult<Option<Value>> {
        self.write(|node, this| match node {
            Value::Object(map) => {
                let old = map.remove(key);
                let change = Change::edit_if(old.is_some());
                Ok((old, change))
            }
            Value::Array(items) => match parse_index(key) {
                Some(index) if index < items.len() => Ok((Some(items.remove(index)), Change::Shift)),
                Some(_) => Ok((None, Change::None)),
                None => Err(this.invalid_index(key)),
            },
            other => Err(this.not_a_container(other)),
        })
    }

    /// Append to the array at this path, returning the new element's index.
    pub fn push(&self, value: impl Into<Value>) -> StoreResult<usize> {
        let value = value.into();
        self.write(|node, this| match node {
            Value::Array(items) => {
                items.push(value);
                Ok((items.len() - 1, Change::Edit))
            }
            other => Err(this.not_a_container(other)),
        })
    }

    /// Mutate the value at this path in place. Always counts as a mutation,
    /// and makes views into arrays below this path stale.
    ///
    /// On the root view, a result that does not match the bucket's kind is
    /// rejected and nothing is committed.
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> StoreResult<R> {
        self.0.cell.update_at(Some(&self.0), f)
    }

    /// Returns `true` if both views are the same tracked view.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn write<R>(
        &self,
        f: impl FnOnce(&mut Value, &Self) -> StoreResult<(R, Change)>,
    ) -> StoreResult<R> {
        self.0.cell.write_at(&self.0, |node| f(node, self))
    }

    fn child_path(&self, key: &str) -> Vec<String> {
        let mut path = self.0.path.clone();
        path.push(key.to_string());
        path
    }

    fn index(&self, key: &str, bound: usize) -> StoreResult<usize> {
        let index = parse_index(key).ok_or_else(|| self.invalid_index(key))?;
        if index >= bound {
            return Err(StoreError::IndexOutOfRange {
                bucket: self.bucket().to_string(),
                pointer: self.pointer(),
                index,
                len: bound.saturating_sub(1),
            });
        }
        Ok(index)
    }

    fn invalid_index(&self, key: &str) -> StoreError {
        StoreError::InvalidIndex {
            bucket: self.bucket().to_string(),
            pointer: self.pointer(),
            key: key.to_string(),
        }
    }

    fn not_a_container(&self, found: &Value) -> StoreError {
        StoreError::NotAContainer {
            bucket: self.bucket().to_string(),
            pointer: self.pointer(),
            found: json_type_name(found),
        }
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("bucket", &self.bucket())
            .field("pointer", &self.pointer())
            .finish()
    }
}

fn child<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => map.get(key),
        Value::Array(items) => parse_index(key).and_then(|i| items.get(i)),
        _ => None,
    }
}
