//! Bookkeeping of output paths and running builds.
//!
//! The registry maps output bases and build IDs to output path state and
//! keeps all output paths on a ring ordered by cookie, which directory
//! enumeration walks. The ring lives in an arena: slot 0 is the sentinel and
//! every other slot links to its neighbours by index. Slots are recycled, so
//! a [`SlotId`] carries the generation of the slot at the time it was handed
//! out and is recognised as stale once that slot has been freed.
//!
//! The registry itself never calls into collaborators. Callers lock it,
//! capture what they need, and release the lock before touching trees.
//! [`compute_act_commit`] packages that pattern for operations that must
//! commit their result afterwards.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cas_digest::Function;
use rustc_hash::FxHashMap;
use vfs::{CasFileFactory, PrepopulatedDirectory};
use vpath::{Component, VirtualRootFactory};

use crate::output_path::OutputPath;

const SENTINEL: usize = 0;

/// State of a running build.
#[derive(Debug)]
pub(crate) struct BuildState {
    pub(crate) build_id: String,
    pub(crate) digest_function: Function,
    pub(crate) virtual_root: Arc<VirtualRootFactory>,
}

/// State of an output base known to the service.
pub(crate) struct OutputPathState {
    pub(crate) output_base: Component,
    pub(crate) output_path: Arc<dyn OutputPath>,
    pub(crate) cas_file_factory: Arc<dyn CasFileFactory>,
    pub(crate) cookie: u64,
    pub(crate) build: Option<BuildState>,
}

/// Stable reference to a registry slot.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) struct SlotId {
    index: usize,
    generation: u64,
}

struct Slot {
    generation: u64,
    previous: usize,
    next: usize,
    state: Option<OutputPathState>,
}

/// An output path as seen by directory enumeration.
pub(crate) struct RingEntry {
    pub(crate) cookie: u64,
    pub(crate) output_base: Component,
    pub(crate) root: Arc<dyn PrepopulatedDirectory>,
}

/// A build that was detached from its output path by
/// [`Registry::finish_build`].
pub(crate) struct FinishedBuild {
    pub(crate) output_base: Component,
    pub(crate) output_path: Arc<dyn OutputPath>,
    pub(crate) build: BuildState,
}

pub(crate) struct Registry {
    slots: Vec<Slot>,
    free: Vec<usize>,
    output_bases: FxHashMap<Component, SlotId>,
    build_ids: FxHashMap<String, SlotId>,
    change_id: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                previous: SENTINEL,
                next: SENTINEL,
                state: None,
            }],
            free: Vec::new(),
            output_bases: FxHashMap::default(),
            build_ids: FxHashMap::default(),
            change_id: 0,
        }
    }

    /// Incremented whenever an output path is added or removed.
    pub(crate) const fn change_id(&self) -> u64 {
        self.change_id
    }

    pub(crate) fn len(&self) -> usize {
        self.output_bases.len()
    }

    pub(crate) fn get(&self, id: SlotId) -> Option<&OutputPathState> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.state.as_ref())
    }

    fn get_mut(&mut self, id: SlotId) -> Option<&mut OutputPathState> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.state.as_mut())
    }

    pub(crate) fn is_live(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn lookup_output_base(&self, output_base: &Component) -> Option<SlotId> {
        self.output_bases.get(output_base).copied()
    }

    pub(crate) fn lookup_build(&self, build_id: &str) -> Option<SlotId> {
        self.build_ids.get(build_id).copied()
    }

    /// Registers a new output path at the tail of the ring.
    pub(crate) fn insert(
        &mut self,
        output_base: Component,
        output_path: Arc<dyn OutputPath>,
        cas_file_factory: Arc<dyn CasFileFactory>,
    ) -> SlotId {
        let state = OutputPathState {
            output_base: output_base.clone(),
            output_path,
            cas_file_factory,
            cookie: self.change_id,
            build: None,
        };
        self.change_id += 1;

        let tail = self.slots[SENTINEL].previous;
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.previous = tail;
                slot.next = SENTINEL;
                slot.state = Some(state);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    previous: tail,
                    next: SENTINEL,
                    state: Some(state),
                });
                self.slots.len() - 1
            }
        };
        self.slots[tail].next = index;
        self.slots[SENTINEL].previous = index;

        let id = SlotId {
            index,
            generation: self.slots[index].generation,
        };
        self.output_bases.insert(output_base, id);
        id
    }

    /// Detaches an output path from the ring and both maps. Any running build
    /// is dropped along with it.
    pub(crate) fn remove(&mut self, id: SlotId) -> Option<OutputPathState> {
        if !self.is_live(id) {
            return None;
        }
        let slot = &mut self.slots[id.index];
        let state = slot.state.take()?;
        let (previous, next) = (slot.previous, slot.next);
        slot.generation += 1;
        slot.previous = SENTINEL;
        slot.next = SENTINEL;
        self.slots[previous].next = next;
        self.slots[next].previous = previous;
        self.free.push(id.index);

        self.output_bases.remove(&state.output_base);
        if let Some(build) = &state.build {
            self.build_ids.remove(&build.build_id);
        }
        self.change_id += 1;
        Some(state)
    }

    /// Attaches a build to a live output path, returning the build it
    /// replaces. Nothing is registered if `id` is stale.
    pub(crate) fn install_build(&mut self, id: SlotId, build: BuildState) -> Option<BuildState> {
        let build_id = build.build_id.clone();
        let state = self.get_mut(id)?;
        let stale = state.build.replace(build);
        if let Some(stale) = &stale {
            self.build_ids.remove(&stale.build_id);
        }
        self.build_ids.insert(build_id, id);
        stale
    }

    /// Detaches a running build from its output path.
    pub(crate) fn finish_build(&mut self, build_id: &str) -> Option<FinishedBuild> {
        let id = self.build_ids.remove(build_id)?;
        let state = self.get_mut(id)?;
        let build = state.build.take()?;
        Some(FinishedBuild {
            output_base: state.output_base.clone(),
            output_path: Arc::clone(&state.output_path),
            build,
        })
    }

    /// Returns the output paths whose cookie is at least `first_cookie`, in
    /// ring order.
    pub(crate) fn entries_from(&self, first_cookie: u64) -> Vec<RingEntry> {
        let mut entries = Vec::new();
        let mut index = self.slots[SENTINEL].next;
        while index != SENTINEL {
            let slot = &self.slots[index];
            if let Some(state) = slot.state.as_ref().filter(|state| state.cookie >= first_cookie) {
                entries.push(RingEntry {
                    cookie: state.cookie,
                    output_base: state.output_base.clone(),
                    root: state.output_path.root(),
                });
            }
            index = slot.next;
        }
        entries
    }
}

pub(crate) fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of [`compute_act_commit`].
#[derive(Debug)]
pub(crate) enum Commit<T> {
    /// `compute` found nothing to act upon.
    Absent,
    /// The action ran and its result was committed.
    Committed(T),
    /// The action ran, but the slot was freed before the commit.
    Stale,
}

/// Captures a value under the registry lock, acts upon it without the lock,
/// and commits the result under the lock if the captured slot is still live.
pub(crate) fn compute_act_commit<C, A, T, E>(
    registry: &Mutex<Registry>,
    compute: impl FnOnce(&Registry) -> Option<(SlotId, C)>,
    act: impl FnOnce(C) -> Result<A, E>,
    commit: impl FnOnce(&mut Registry, SlotId, A) -> T,
) -> Result<Commit<T>, E> {
    let computed = {
        let guard = lock(registry);
        compute(&guard)
    };
    let Some((id, captured)) = computed else {
        return Ok(Commit::Absent);
    };
    let acted = act(captured)?;
    let mut guard = lock(registry);
    if !guard.is_live(id) {
        return Ok(Commit::Stale);
    }
    Ok(Commit::Committed(commit(&mut guard, id, acted)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output_path::{InMemoryOutputPathFactory, OutputPathFactory};
    use blobstore::MemoryBlobAccess;
    use cas_digest::{DigestFunction, InstanceName};
    use std::collections::BTreeMap;
    use vfs::{BlobAccessCasFileFactory, TracingErrorLogger};

    fn sha256() -> Function {
        Function::new(InstanceName::default(), DigestFunction::Sha256)
    }

    fn name(value: &str) -> Component {
        Component::new(value).expect("valid component")
    }

    fn insert(registry: &mut Registry, output_base: &str) -> SlotId {
        let logger = Arc::new(TracingErrorLogger::new(output_base));
        let cas_file_factory: Arc<dyn CasFileFactory> = Arc::new(BlobAccessCasFileFactory::new(
            Arc::new(MemoryBlobAccess::new()),
            logger.clone(),
        ));
        let output_path = InMemoryOutputPathFactory.start_initial_build(
            &name(output_base),
            cas_file_factory.clone(),
            &sha256(),
            logger,
        );
        registry.insert(name(output_base), output_path, cas_file_factory)
    }

    fn build(build_id: &str) -> BuildState {
        BuildState {
            build_id: build_id.to_owned(),
            digest_function: sha256(),
            virtual_root: Arc::new(
                VirtualRootFactory::new("/out/ob", &BTreeMap::new()).expect("virtual root"),
            ),
        }
    }

    fn ring(registry: &Registry, first_cookie: u64) -> Vec<(u64, String)> {
        registry
            .entries_from(first_cookie)
            .into_iter()
            .map(|entry| (entry.cookie, entry.output_base.as_str().to_owned()))
            .collect()
    }

    #[test]
    fn cookies_increase_and_survive_removal() {
        let mut registry = Registry::new();
        insert(&mut registry, "a");
        let b = insert(&mut registry, "b");
        insert(&mut registry, "c");
        assert_eq!(
            ring(&registry, 0),
            [(0, "a".to_owned()), (1, "b".to_owned()), (2, "c".to_owned())]
        );

        registry.remove(b).expect("b is live");
        assert_eq!(registry.change_id(), 4);
        insert(&mut registry, "d");
        assert_eq!(
            ring(&registry, 1),
            [(2, "c".to_owned()), (4, "d".to_owned())]
        );
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn recycled_slots_invalidate_old_ids() {
        let mut registry = Registry::new();
        let first = insert(&mut registry, "a");
        registry.remove(first).expect("live");
        let second = insert(&mut registry, "a");

        assert_eq!(first.index, second.index);
        assert!(!registry.is_live(first));
        assert!(registry.remove(first).is_none());
        assert!(registry.is_live(second));
        assert_eq!(registry.lookup_output_base(&name("a")), Some(second));
    }

    #[test]
    fn installing_a_build_replaces_the_previous_one() {
        let mut registry = Registry::new();
        let id = insert(&mut registry, "ob1");
        assert!(registry.install_build(id, build("b1")).is_none());
        let stale = registry
            .install_build(id, build("b2"))
            .expect("b1 is replaced");

        assert_eq!(stale.build_id, "b1");
        assert_eq!(registry.lookup_build("b1"), None);
        assert_eq!(registry.lookup_build("b2"), Some(id));
    }

    #[test]
    fn finishing_a_build_is_one_shot() {
        let mut registry = Registry::new();
        let id = insert(&mut registry, "ob1");
        registry.install_build(id, build("b1"));

        let finished = registry.finish_build("b1").expect("running");
        assert_eq!(finished.output_base.as_str(), "ob1");
        assert_eq!(finished.build.build_id, "b1");
        assert!(registry.finish_build("b1").is_none());
        assert!(registry.get(id).expect("live").build.is_none());
    }

    #[test]
    fn removal_drops_build_registration() {
        let mut registry = Registry::new();
        let id = insert(&mut registry, "ob1");
        registry.install_build(id, build("b1"));
        let removed = registry.remove(id).expect("live");

        assert!(removed.build.is_some());
        assert_eq!(registry.lookup_build("b1"), None);
        assert!(registry.entries_from(0).is_empty());
    }

    #[test]
    fn commit_is_skipped_for_stale_slots() {
        let registry = Mutex::new(Registry::new());
        let id = insert(&mut lock(&registry), "ob1");

        let outcome: Result<Commit<()>, ()> = compute_act_commit(
            &registry,
            |registry| registry.get(id).map(|_| (id, ())),
            |()| {
                lock(&registry).remove(id);
                Ok(())
            },
            |_, _, ()| panic!("slot was freed"),
        );
        assert!(matches!(outcome, Ok(Commit::Stale)));

        let outcome: Result<Commit<()>, ()> = compute_act_commit(
            &registry,
            |registry| registry.get(id).map(|_| (id, ())),
            |()| Ok(()),
            |_, _, ()| (),
        );
        assert!(matches!(outcome, Ok(Commit::Absent)));
    }
}
