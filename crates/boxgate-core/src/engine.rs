//! Bulk operation engine
//!
//! Moves, copies and deletes single entries or whole folder trees. An
//! operation is first validated (nothing is mutated when validation fails)
//! and then executed by walking the tree with a bounded number of driver
//! calls in flight. Folders are finalized post-order: a folder is deleted
//! only after every child has been handled.

use crate::conflict::rename_candidates;
use crate::{Bridge, CoreError, Result};
use boxgate_driver::{path, Entry};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::ControlFlow;
use tracing::{debug, instrument, warn};

/// What to do when the destination already exists
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Fail with a conflict
    #[default]
    Add,
    /// Replace an entry of the same kind
    Overwrite,
    /// Pick a free sibling name
    Rename,
}

/// A requested bulk operation on backend-global paths
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Delete { path: String },
    Copy { from: String, to: String, mode: WriteMode },
    Move { from: String, to: String, mode: WriteMode },
    /// Only validated here; the caller writes the content
    Upload { to: String, mode: WriteMode },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Delete,
    Copy,
    Move,
    Upload,
}

impl Action {
    /// Whether folders are removed once their children are done
    fn finalizes_folders(self) -> bool {
        matches!(self, Action::Delete | Action::Move)
    }

    fn writes_destination(self) -> bool {
        matches!(self, Action::Copy | Action::Move)
    }
}

impl Operation {
    pub fn action(&self) -> Action {
        match self {
            Operation::Delete { .. } => Action::Delete,
            Operation::Copy { .. } => Action::Copy,
            Operation::Move { .. } => Action::Move,
            Operation::Upload { .. } => Action::Upload,
        }
    }

    fn source(&self) -> Option<&str> {
        match self {
            Operation::Delete { path } => Some(path),
            Operation::Copy { from, .. } | Operation::Move { from, .. } => Some(from),
            Operation::Upload { .. } => None,
        }
    }

    fn destination(&self) -> Option<(&str, WriteMode)> {
        match self {
            Operation::Delete { .. } => None,
            Operation::Copy { to, mode, .. }
            | Operation::Move { to, mode, .. }
            | Operation::Upload { to, mode } => Some((to, *mode)),
        }
    }
}

/// An operation that passed validation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedOperation {
    pub action: Action,
    /// Entries below a folder source when a ceiling was enforced, else 1
    pub item_count: usize,
    /// Resolved source, `None` for uploads
    pub source: Option<Entry>,
    /// Final destination after conflict resolution
    pub destination: Option<String>,
}

/// Engine configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum driver calls in flight per operation
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

type WorkId = usize;

/// One node of the operation tree
#[derive(Debug)]
struct WorkItem {
    /// Enclosing folder, only tracked when folders are finalized
    parent: Option<WorkId>,
    source: Entry,
    destination: Option<String>,
    /// Children still in flight; set when a folder is expanded
    remaining_children: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    /// First visit: act on a file or list a folder
    Visit,
    /// All children are done: remove the folder itself
    Finalize,
}

enum Outcome {
    Done,
    Expanded(Vec<Entry>),
    EmptyFolder,
}

/// Validates and executes bulk operations against a [`Bridge`]
#[derive(Clone, Debug)]
pub struct BulkEngine {
    bridge: Bridge,
    config: EngineConfig,
}

impl BulkEngine {
    pub fn new(bridge: Bridge, config: EngineConfig) -> Self {
        Self { bridge, config }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validate and execute, then look up the resulting entry
    pub async fn run(&self, operation: &Operation, max_items: Option<usize>) -> Result<Entry> {
        let validated = self.validate_operation(operation, max_items).await?;
        self.do_operation(&validated).await?;
        self.result_metadata(&validated).await
    }

    /// Check that `operation` can run, resolving its destination.
    ///
    /// Fails before anything is mutated, except that a missing destination
    /// parent (or destination folder) is created on success.
    pub async fn validate_operation(
        &self,
        operation: &Operation,
        max_items: Option<usize>,
    ) -> Result<ValidatedOperation> {
        self.validate_reserving(operation, max_items, &HashSet::new())
            .await
    }

    /// Validate operations that will run one after another.
    ///
    /// Each resolved destination is reserved for the rest of the batch: a
    /// later entry aiming at it conflicts, or is renamed past it under
    /// [`WriteMode::Rename`].
    pub async fn validate_batch(&self, operations: &[Operation]) -> Result<Vec<ValidatedOperation>> {
        let mut reserved = HashSet::new();
        let mut validated = Vec::with_capacity(operations.len());
        for operation in operations {
            let checked = self.validate_reserving(operation, None, &reserved).await?;
            if let Some(destination) = &checked.destination {
                reserved.insert(destination.to_lowercase());
            }
            validated.push(checked);
        }
        Ok(validated)
    }

    #[instrument(skip(self, reserved))]
    async fn validate_reserving(
        &self,
        operation: &Operation,
        max_items: Option<usize>,
        reserved: &HashSet<String>,
    ) -> Result<ValidatedOperation> {
        let action = operation.action();

        // 1. Source
        let source = match operation.source() {
            Some(from) => Some(self.resolve_source(from).await?),
            None => None,
        };

        // 2. Nesting
        if let (Some(source), Some((to, _))) = (&source, operation.destination()) {
            let to = path::normalize(to);
            if source.path_lower == to.to_lowercase() {
                return Err(if source.is_folder() {
                    CoreError::IntoItself(to)
                } else {
                    CoreError::Conflict(to)
                });
            }
            if source.is_folder() && path::is_strict_descendant(&to, &source.path_display) {
                return Err(CoreError::IntoItself(to));
            }
        }

        // 3. Item ceiling
        let item_count = match (&source, max_items) {
            (Some(source), Some(limit)) if source.is_folder() => {
                self.count_items(&source.path_display, limit).await?
            }
            _ => 1,
        };

        // 4. Destination and conflicts
        let destination = match operation.destination() {
            Some((to, mode)) => Some(
                self.resolve_destination(action, source.as_ref(), &path::normalize(to), mode, reserved)
                    .await?,
            ),
            None => None,
        };

        debug!(?action, item_count, ?destination, "Operation validated");
        Ok(ValidatedOperation {
            action,
            item_count,
            source,
            destination,
        })
    }

    async fn resolve_source(&self, from: &str) -> Result<Entry> {
        let from = path::normalize(from);
        if path::is_root(&from) {
            return Err(CoreError::MalformedPath("the root folder cannot be modified".into()));
        }
        match self.bridge.get_metadata(&from).await {
            Ok(entry) => Ok(entry),
            Err(e) if e.is_not_found() => Err(CoreError::SourceNotFound(from)),
            Err(e) => Err(e),
        }
    }

    /// Count entries below `folder`, stopping as soon as `limit` is exceeded
    async fn count_items(&self, folder: &str, limit: usize) -> Result<usize> {
        let mut count = 0usize;
        self.bridge
            .traverse_directory(folder, true, &mut |_entry: Entry| {
                count += 1;
                if count > limit {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await?;
        if count > limit {
            return Err(CoreError::TooManyFiles { limit });
        }
        Ok(count)
    }

    async fn resolve_destination(
        &self,
        action: Action,
        source: Option<&Entry>,
        to: &str,
        mode: WriteMode,
        reserved: &HashSet<String>,
    ) -> Result<String> {
        let is_file = source.is_none_or(Entry::is_file);
        let existing = match self.bridge.get_metadata(to).await {
            Ok(entry) => Some(entry),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        let is_reserved = reserved.contains(&to.to_lowercase());

        let (destination, exists) = match (existing, mode) {
            (_, WriteMode::Rename) if is_reserved => {
                (self.available_name(to, is_file, reserved).await?, false)
            }
            _ if is_reserved => return Err(CoreError::Conflict(to.to_string())),
            (None, _) => (to.to_string(), false),
            (Some(_), WriteMode::Add) => return Err(CoreError::Conflict(to.to_string())),
            (Some(existing), WriteMode::Overwrite) => {
                let same_kind = match (action, source) {
                    (Action::Upload, _) | (_, None) => existing.is_file(),
                    (_, Some(source)) => existing.tag == source.tag,
                };
                if !same_kind {
                    return Err(CoreError::Conflict(to.to_string()));
                }
                (to.to_string(), true)
            }
            (Some(_), WriteMode::Rename) => {
                (self.available_name(to, is_file, reserved).await?, false)
            }
        };

        if !exists {
            if is_file {
                self.bridge.create_directory(path::parent(&destination)).await?;
            } else {
                self.bridge.create_directory(&destination).await?;
            }
        }
        Ok(destination)
    }

    /// First free autorename candidate for `path`
    pub async fn find_available_name(&self, path: &str, is_file: bool) -> Result<String> {
        self.available_name(path, is_file, &HashSet::new()).await
    }

    async fn available_name(
        &self,
        path: &str,
        is_file: bool,
        reserved: &HashSet<String>,
    ) -> Result<String> {
        for candidate in rename_candidates(path, is_file) {
            if reserved.contains(&candidate.to_lowercase()) {
                continue;
            }
            match self.bridge.get_metadata(&candidate).await {
                Ok(_) => continue,
                Err(e) if e.is_not_found() => return Ok(candidate),
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::NoAvailableRename(path.to_string()))
    }

    /// Execute a validated operation.
    ///
    /// Stops dispatching on the first error and returns it once the calls
    /// already in flight have settled. Completed steps are not rolled back.
    #[instrument(skip(self, validated), fields(action = ?validated.action))]
    pub async fn do_operation(&self, validated: &ValidatedOperation) -> Result<()> {
        let action = validated.action;
        let Some(source) = validated.source.clone() else {
            // Uploads carry their own body and are written by the caller
            return Ok(());
        };

        let mut arena: HashMap<WorkId, WorkItem> = HashMap::new();
        let mut next_id: WorkId = 0;
        let mut ready: VecDeque<(WorkId, Step)> = VecDeque::new();
        let mut in_flight = FuturesUnordered::new();
        let mut failure: Option<CoreError> = None;
        let concurrency = self.config.concurrency.max(1);

        arena.insert(
            next_id,
            WorkItem {
                parent: None,
                source,
                destination: validated.destination.clone(),
                remaining_children: None,
            },
        );
        ready.push_back((next_id, Step::Visit));
        next_id += 1;

        loop {
            while failure.is_none() && in_flight.len() < concurrency {
                let Some((id, step)) = ready.pop_front() else {
                    break;
                };
                let Some(item) = arena.get(&id) else {
                    continue;
                };
                in_flight.push(self.run_step(
                    action,
                    id,
                    step,
                    item.source.clone(),
                    item.destination.clone(),
                ));
            }

            let Some((id, result)) = in_flight.next().await else {
                break;
            };
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    if failure.is_none() {
                        warn!(error = %e, "Bulk operation failed, draining in-flight work");
                        ready.clear();
                        failure = Some(e);
                    }
                    continue;
                }
            };
            if failure.is_some() {
                continue;
            }

            match outcome {
                Outcome::Done => complete(&mut arena, &mut ready, id),
                Outcome::EmptyFolder if action.finalizes_folders() => {
                    if let Some(item) = arena.get_mut(&id) {
                        item.remaining_children = Some(0);
                    }
                    ready.push_back((id, Step::Finalize));
                }
                Outcome::EmptyFolder => complete(&mut arena, &mut ready, id),
                Outcome::Expanded(children) => {
                    let (parent_destination, tracked) = match arena.get_mut(&id) {
                        Some(item) => {
                            if action.finalizes_folders() {
                                item.remaining_children = Some(children.len());
                            }
                            (item.destination.clone(), action.finalizes_folders())
                        }
                        None => continue,
                    };
                    for child in children {
                        let destination = parent_destination
                            .as_deref()
                            .map(|dir| path::join(dir, &child.name));
                        arena.insert(
                            next_id,
                            WorkItem {
                                parent: tracked.then_some(id),
                                source: child,
                                destination,
                                remaining_children: None,
                            },
                        );
                        ready.push_back((next_id, Step::Visit));
                        next_id += 1;
                    }
                    if !tracked {
                        complete(&mut arena, &mut ready, id);
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => {
                debug!(remaining = arena.len(), "Bulk operation finished");
                Ok(())
            }
        }
    }

    fn run_step(
        &self,
        action: Action,
        id: WorkId,
        step: Step,
        source: Entry,
        destination: Option<String>,
    ) -> BoxFuture<'_, (WorkId, Result<Outcome>)> {
        Box::pin(async move {
            let result = self.perform(action, step, &source, destination.as_deref()).await;
            (id, result)
        })
    }

    async fn perform(
        &self,
        action: Action,
        step: Step,
        source: &Entry,
        destination: Option<&str>,
    ) -> Result<Outcome> {
        let from = source.path_display.as_str();
        if step == Step::Finalize {
            self.bridge.delete_directory(from).await?;
            return Ok(Outcome::Done);
        }

        if source.is_folder() {
            let children = self.bridge.list_children(from).await?;
            if !children.is_empty() {
                return Ok(Outcome::Expanded(children));
            }
            if action.writes_destination() {
                let to = destination.ok_or_else(|| missing_destination(from))?;
                self.bridge.create_directory(to).await?;
            }
            return Ok(Outcome::EmptyFolder);
        }

        match action {
            Action::Delete => self.bridge.delete_object(from).await?,
            Action::Copy => {
                let to = destination.ok_or_else(|| missing_destination(from))?;
                self.bridge.copy_object(from, to).await?
            }
            Action::Move => {
                let to = destination.ok_or_else(|| missing_destination(from))?;
                self.bridge.move_object(from, to).await?
            }
            Action::Upload => {}
        }
        Ok(Outcome::Done)
    }

    /// Entry describing the outcome: the deleted source for deletes, the
    /// destination (waiting for it to become visible) otherwise
    pub async fn result_metadata(&self, validated: &ValidatedOperation) -> Result<Entry> {
        let source = validated
            .source
            .as_ref()
            .ok_or_else(|| CoreError::Internal("operation has no source".into()))?;
        let Some(destination) = validated.destination.as_deref() else {
            return Ok(source.clone());
        };
        let visible = self
            .bridge
            .get_object_metadata_with_retry(destination, source.is_folder())
            .await?;
        Ok(visible.unwrap_or_else(|| source.clone().relocated(destination)))
    }
}

/// Drop a finished item and release its parent once the last child is done
fn complete(arena: &mut HashMap<WorkId, WorkItem>, ready: &mut VecDeque<(WorkId, Step)>, id: WorkId) {
    let Some(item) = arena.remove(&id) else {
        return;
    };
    let Some(parent_id) = item.parent else {
        return;
    };
    if let Some(parent) = arena.get_mut(&parent_id) {
        if let Some(remaining) = parent.remaining_children.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                ready.push_back((parent_id, Step::Finalize));
            }
        }
    }
}

fn missing_destination(from: &str) -> CoreError {
    CoreError::Internal(format!("no destination for {from}"))
}
