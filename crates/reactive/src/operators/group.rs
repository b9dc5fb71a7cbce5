//! Grouping into immutable snapshots, and the one-to-many left join built on it.

use super::join::LeftJoin;
use super::serial::Serialized;
use crate::observable_cache::{Connect, ObservableCache};
use crate::stream::{ChangeStream, Terminal};
use crate::subscription::{Subscriber, Subscription};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use rivulet_core::{ChangeReason, ChangeSet};
use rivulet_incremental::Group;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type GroupSelector<V, G> = Box<dyn Fn(&V) -> G + Send + Sync>;

/// Group members and the group each key currently belongs to.
struct GroupState<K, V, G> {
    members: HashMap<G, HashMap<K, V>>,
    membership: HashMap<K, G>,
}

/// Groups affected by one upstream batch, in first-touched order.
struct Touched<G> {
    order: Vec<G>,
    seen: HashSet<G>,
}

impl<G: Eq + Hash + Clone> Touched<G> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            seen: HashSet::new(),
        }
    }

    fn touch(&mut self, group: &G) {
        if self.seen.insert(group.clone()) {
            self.order.push(group.clone());
        }
    }

    fn contains(&self, group: &G) -> bool {
        self.seen.contains(group)
    }
}

impl<K, V, G> GroupState<K, V, G>
where
    K: Eq + Hash + Clone,
    V: Clone,
    G: Eq + Hash + Clone,
{
    fn insert(&mut self, key: &K, value: &V, group: G, touched: &mut Touched<G>) {
        if let Some(old) = self.membership.get(key) {
            if *old != group {
                let old = old.clone();
                self.detach(key, &old);
                touched.touch(&old);
            }
        }
        self.members
            .entry(group.clone())
            .or_default()
            .insert(key.clone(), value.clone());
        touched.touch(&group);
        self.membership.insert(key.clone(), group);
    }

    fn remove(&mut self, key: &K, touched: &mut Touched<G>) {
        if let Some(old) = self.membership.remove(key) {
            self.detach(key, &old);
            touched.touch(&old);
        }
    }

    fn reset(&mut self) {
        self.members.clear();
        self.membership.clear();
    }

    fn detach(&mut self, key: &K, group: &G) {
        if let Some(members) = self.members.get_mut(group) {
            members.remove(key);
        }
    }
}

struct GroupCore<K, V, G> {
    state: Serialized<GroupState<K, V, G>, ChangeSet<K, V>>,
    selector: GroupSelector<V, G>,
    output: ObservableCache<G, Group<K, V, G>>,
    upstream: Mutex<Option<Subscription>>,
    disposed: AtomicBool,
}

impl<K, V, G> GroupCore<K, V, G>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    G: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn on_changes(&self, changes: &ChangeSet<K, V>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.state.apply(changes.clone(), |state, changes| {
            if self.disposed.load(Ordering::Acquire) {
                return;
            }
            self.regroup(state, &changes);
            if self.disposed.load(Ordering::Acquire) {
                state.reset();
            }
        });
    }

    fn regroup(&self, state: &mut GroupState<K, V, G>, changes: &ChangeSet<K, V>) {
        let mut touched = Touched::new();
        let mut refreshed = Touched::new();
        for change in changes {
            let key = change.key();
            let current = change.current();
            match change.reason() {
                ChangeReason::Add | ChangeReason::Update => {
                    let group = (self.selector)(current);
                    state.insert(key, current, group, &mut touched);
                }
                ChangeReason::Remove => state.remove(key, &mut touched),
                ChangeReason::Refresh => {
                    let group = (self.selector)(current);
                    if state.membership.get(key) == Some(&group) {
                        refreshed.touch(&group);
                    } else {
                        state.insert(key, current, group, &mut touched);
                    }
                }
                ChangeReason::Moved => {}
            }
        }

        self.output.edit(|out| {
            for group in &touched.order {
                let members = state.members.get(group).filter(|m| !m.is_empty()).cloned();
                match members {
                    Some(members) => out.add_or_update(group.clone(), Group::new(group.clone(), members)),
                    None => {
                        state.members.remove(group);
                        out.remove(group);
                    }
                }
            }
            for group in refreshed.order.iter().filter(|g| !touched.contains(g)) {
                out.refresh(group);
            }
        });
    }
}

/// Groups a keyed stream by a value-derived key.
///
/// Publishes one immutable [`Group`] per group key. After each upstream
/// batch every group whose membership changed is replaced by a new snapshot:
/// added when it first appears, updated while it has members, removed once
/// it is empty. Snapshots already handed out never change.
pub struct ImmutableGroups<K, V, G> {
    core: Arc<GroupCore<K, V, G>>,
}

impl<K, V, G> ImmutableGroups<K, V, G>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    G: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new<S, F>(source: &S, group_selector: F) -> Self
    where
        S: ChangeStream<ChangeSet<K, V>> + ?Sized,
        F: Fn(&V) -> G + Send + Sync + 'static,
    {
        let core = Arc::new(GroupCore {
            state: Serialized::new(GroupState {
                members: HashMap::new(),
                membership: HashMap::new(),
            }),
            selector: Box::new(group_selector),
            output: ObservableCache::new(),
            upstream: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });

        let on_next = Arc::downgrade(&core);
        let on_error = on_next.clone();
        let on_completed = on_next.clone();
        let subscriber = Subscriber::new(move |changes: &ChangeSet<K, V>| {
            if let Some(core) = on_next.upgrade() {
                core.on_changes(changes);
            }
        })
        .on_error(move |error| {
            if let Some(core) = on_error.upgrade() {
                warn!(%error, "group upstream failed");
                core.output.fail(error.clone());
            }
        })
        .on_completed(move || {
            if let Some(core) = on_completed.upgrade() {
                core.output.complete();
            }
        });

        let upstream = source.subscribe(subscriber);
        *core.upstream.lock() = Some(upstream);
        debug!("grouping attached to upstream");
        Self { core }
    }

    /// The current groups.
    #[inline]
    pub fn output(&self) -> &ObservableCache<G, Group<K, V, G>> {
        &self.core.output
    }

    pub fn connect(&self) -> Connect<G, Group<K, V, G>> {
        self.core.output.connect()
    }

    /// Returns the current snapshot of `group`, if it has members.
    pub fn lookup(&self, group: &G) -> Option<Group<K, V, G>> {
        self.core.output.lookup(group)
    }

    /// Detaches from the upstream and completes the output. Idempotent.
    pub fn dispose(&self) {
        if self.core.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("disposing grouping");
        self.core.output.dispose();
        let upstream = self.core.upstream.lock().take();
        drop(upstream);
        // busy means a batch is being applied on this thread; it resets the
        // state itself once its output edit returns
        self.core.state.reset_with(GroupState::reset);
        self.core.output.edit(|store| store.clear());
    }

    pub fn terminal(&self) -> Option<Terminal> {
        self.core.output.terminal()
    }
}

impl<K, V, G> ChangeStream<ChangeSet<G, Group<K, V, G>>> for ImmutableGroups<K, V, G>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    G: Eq + Hash + Clone + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Subscriber<ChangeSet<G, Group<K, V, G>>>) -> Subscription {
        self.core.output.connect().subscribe(subscriber)
    }
}

/// Left join of a keyed stream with the groups of another.
///
/// Right items are grouped by `right_key_selector`, which yields the left
/// key. Every left row receives the current group for its key, or an empty
/// group when no right item matches.
pub struct LeftJoinMany<K1, L, K2, R, D> {
    groups: ImmutableGroups<K2, R, K1>,
    join: LeftJoin<K1, L, Group<K2, R, K1>, D>,
}

impl<K1, L, K2, R, D> LeftJoinMany<K1, L, K2, R, D>
where
    K1: Eq + Hash + Clone + Send + Sync + 'static,
    L: Clone + Send + Sync + 'static,
    K2: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    pub fn new<SL, SR, FK, FC>(left: &SL, right: &SR, right_key_selector: FK, combinator: FC) -> Self
    where
        SL: ChangeStream<ChangeSet<K1, L>> + ?Sized,
        SR: ChangeStream<ChangeSet<K2, R>> + ?Sized,
        FK: Fn(&R) -> K1 + Send + Sync + 'static,
        FC: Fn(&K1, &L, &Group<K2, R, K1>) -> D + Send + Sync + 'static,
    {
        let groups = ImmutableGroups::new(right, right_key_selector);
        let join = LeftJoin::new(
            left,
            &groups,
            |group: &Group<K2, R, K1>| group.key().clone(),
            move |key: &K1, left: &L, group: Option<&Group<K2, R, K1>>| match group {
                Some(group) => combinator(key, left, group),
                None => combinator(key, left, &Group::empty(key.clone())),
            },
        );
        Self { groups, join }
    }

    /// The joined rows.
    #[inline]
    pub fn output(&self) -> &ObservableCache<K1, D> {
        self.join.output()
    }

    pub fn connect(&self) -> Connect<K1, D> {
        self.join.connect()
    }

    /// Detaches from both upstreams and completes the output. Idempotent.
    pub fn dispose(&self) {
        self.join.dispose();
        self.groups.dispose();
    }

    pub fn terminal(&self) -> Option<Terminal> {
        self.join.terminal()
    }
}

impl<K1, L, K2, R, D> ChangeStream<ChangeSet<K1, D>> for LeftJoinMany<K1, L, K2, R, D>
where
    K1: Eq + Hash + Clone + Send + Sync + 'static,
    L: Clone + Send + Sync + 'static,
    K2: Eq + Hash + Clone + Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Subscriber<ChangeSet<K1, D>>) -> Subscription {
        self.join.connect().subscribe(subscriber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Broadcaster;
    use rivulet_core::{Change, Error};

    fn first_letter(name: &&'static str) -> char {
        name.chars().next().unwrap_or(' ')
    }

    fn make_fruit() -> ObservableCache<u32, &'static str> {
        let fruit = ObservableCache::new();
        fruit.edit(|s| {
            s.add_or_update(1, "apple");
            s.add_or_update(2, "avocado");
            s.add_or_update(3, "banana");
        });
        fruit
    }

    fn sorted_members(group: &Group<u32, &'static str, char>) -> Vec<u32> {
        let mut keys: Vec<u32> = group.keys().copied().collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_groups_initial() {
        let fruit = make_fruit();
        let groups = ImmutableGroups::new(&fruit, first_letter);

        let a = groups.lookup(&'a').unwrap();
        assert_eq!(sorted_members(&a), vec![1, 2]);
        assert_eq!(groups.lookup(&'b').unwrap().len(), 1);
        assert_eq!(groups.output().count(), 2);
    }

    #[test]
    fn test_groups_snapshot_never_changes() {
        let fruit = make_fruit();
        let groups = ImmutableGroups::new(&fruit, first_letter);
        let before = groups.lookup(&'a').unwrap();

        fruit.edit(|s| s.add_or_update(4, "apricot"));

        let after = groups.lookup(&'a').unwrap();
        assert_eq!(sorted_members(&before), vec![1, 2]);
        assert_eq!(sorted_members(&after), vec![1, 2, 4]);
        assert!(!before.ptr_eq(&after));
    }

    #[test]
    fn test_groups_move_between_groups() {
        let fruit = make_fruit();
        let groups = ImmutableGroups::new(&fruit, first_letter);
        let batches = Arc::new(Mutex::new(Vec::new()));
        let batches_clone = Arc::clone(&batches);
        let _handle = groups
            .output()
            .preview()
            .subscribe_fn(move |cs: &ChangeSet<char, Group<u32, &'static str, char>>| {
                batches_clone.lock().push(cs.clone());
            });

        fruit.edit(|s| s.add_or_update(3, "cherry"));

        let batches = batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].removes(), 1);
        assert_eq!(batches[0].adds(), 1);
        assert!(groups.lookup(&'b').is_none());
        assert_eq!(sorted_members(&groups.lookup(&'c').unwrap()), vec![3]);
    }

    #[test]
    fn test_groups_refresh_same_group() {
        let fruit = make_fruit();
        let groups = ImmutableGroups::new(&fruit, first_letter);
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let reasons_clone = Arc::clone(&reasons);
        let _handle = groups
            .output()
            .preview()
            .subscribe_fn(move |cs: &ChangeSet<char, Group<u32, &'static str, char>>| {
                reasons_clone.lock().extend(cs.iter().map(|c| (*c.key(), c.reason())));
            });

        fruit.edit(|s| s.refresh(&1));
        assert_eq!(*reasons.lock(), vec![('a', ChangeReason::Refresh)]);
    }

    #[test]
    fn test_groups_remove_last_member() {
        let fruit = make_fruit();
        let groups = ImmutableGroups::new(&fruit, first_letter);

        fruit.edit(|s| {
            s.remove(&3);
        });
        assert!(groups.lookup(&'b').is_none());

        fruit.edit(|s| s.add_or_update(5, "blueberry"));
        assert_eq!(sorted_members(&groups.lookup(&'b').unwrap()), vec![5]);
    }

    #[test]
    fn test_groups_error_propagates() {
        let source: Broadcaster<ChangeSet<u32, &'static str>> = Broadcaster::new();
        let groups = ImmutableGroups::new(&source, first_letter);
        source.fail(Error::upstream("gone"));
        assert_eq!(
            groups.terminal(),
            Some(Terminal::Failed(Error::upstream("gone")))
        );
    }

    #[test]
    fn test_left_join_many() {
        let people: ObservableCache<u32, &'static str> = ObservableCache::new();
        let pets: ObservableCache<u32, (u32, &'static str)> = ObservableCache::new();
        let join = LeftJoinMany::new(
            &people,
            &pets,
            |pet: &(u32, &'static str)| pet.0,
            |_, person: &&'static str, pets: &Group<u32, (u32, &'static str), u32>| {
                (*person, pets.len())
            },
        );

        people.edit(|s| {
            s.add_or_update(1, "ann");
            s.add_or_update(2, "bob");
        });
        assert_eq!(join.output().lookup(&1), Some(("ann", 0)));

        pets.edit(|s| {
            s.add_or_update(10, (1, "cat"));
            s.add_or_update(11, (1, "dog"));
            s.add_or_update(12, (2, "fish"));
        });
        assert_eq!(join.output().lookup(&1), Some(("ann", 2)));
        assert_eq!(join.output().lookup(&2), Some(("bob", 1)));

        pets.edit(|s| {
            s.remove(&12);
        });
        assert_eq!(join.output().lookup(&2), Some(("bob", 0)));

        people.edit(|s| {
            s.remove(&1);
        });
        assert_eq!(join.output().count(), 1);
    }

    #[test]
    fn test_left_join_many_dispose() {
        let people: ObservableCache<u32, &'static str> = ObservableCache::new();
        let pets: ObservableCache<u32, (u32, &'static str)> = ObservableCache::new();
        let join = LeftJoinMany::new(&people, &pets, |pet: &(u32, &'static str)| pet.0, |_, p: &&'static str, g: &Group<u32, (u32, &'static str), u32>| (*p, g.len()));

        people.edit(|s| s.add_or_update(1, "ann"));
        join.dispose();
        join.dispose();
        assert_eq!(join.terminal(), Some(Terminal::Completed));

        let mut batch = ChangeSet::new();
        batch.push(Change::add(10, (1, "cat")));
        pets.edit(|s| s.clone_changes(&batch));
        assert_eq!(join.output().lookup(&1), None);
        assert!(join.output().is_empty());
    }

    #[test]
    fn test_groups_dispose_releases_groups() {
        let fruit = make_fruit();
        let groups = ImmutableGroups::new(&fruit, first_letter);
        assert_eq!(groups.output().count(), 2);

        groups.dispose();
        assert!(groups.output().is_empty());
        assert_eq!(groups.terminal(), Some(Terminal::Completed));

        fruit.edit(|s| s.add_or_update(9, "cherry"));
        assert!(groups.lookup(&'c').is_none());
    }

    #[test]
    fn test_groups_subscriber_edits_source() {
        let fruit = make_fruit();
        let groups = ImmutableGroups::new(&fruit, first_letter);

        // every new banana brings a blueberry along
        let feedback = fruit.clone();
        let _handle = groups
            .output()
            .preview()
            .subscribe_fn(move |cs: &ChangeSet<char, Group<u32, &'static str, char>>| {
                for change in cs {
                    if *change.key() == 'b' && !change.current().contains_key(&20) {
                        feedback.edit(|s| s.add_or_update(20, "blueberry"));
                    }
                }
            });

        fruit.edit(|s| s.add_or_update(10, "blackberry"));

        let b = groups.lookup(&'b').unwrap();
        assert_eq!(sorted_members(&b), vec![3, 10, 20]);
    }
}
