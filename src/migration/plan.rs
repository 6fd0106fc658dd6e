//! MigrationPlan - the declared, ordered sequence of migrations
//!
//! The plan is a doubly-linked chain stored in an arena: every node lives in a
//! `Vec` owned by the plan and refers to its neighbours by index. Nodes are only
//! ever created by copying a [`Migration`] value into the arena, so two plans never
//! share a node and composing plans with [`MigrationPlan::concat`] leaves the
//! sources untouched.

use super::{Migration, MigrationError};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone)]
struct Node {
    migration: Migration,
    previous: Option<usize>,
    next: Option<usize>,
}

/// An ordered, linear sequence of migrations
///
/// # Example
///
/// ```
/// use stepwise::migration::{Migration, MigrationPlan};
///
/// let mut accounts = MigrationPlan::new();
/// accounts
///     .add(Migration::new("create_accounts", "CREATE TABLE accounts (id INT)", "DROP TABLE accounts"))
///     .add(Migration::new("index_accounts", "CREATE INDEX idx_accounts ON accounts (id)", "DROP INDEX idx_accounts"));
///
/// let mut plan = MigrationPlan::new();
/// plan.add(Migration::new("create_users", "CREATE TABLE users (id INT)", "DROP TABLE users"))
///     .concat([&accounts]);
///
/// let names: Vec<&str> = plan.iter().map(|entry| entry.name()).collect();
/// assert_eq!(names, ["create_users", "create_accounts", "index_accounts"]);
/// assert_eq!(accounts.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    nodes: Vec<Node>,
    first: Option<usize>,
    last: Option<usize>,
}

impl MigrationPlan {
    /// Create an empty plan
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a migration to the end of the plan
    ///
    /// The migration is moved into a fresh node; clone it first to keep using it.
    pub fn add(&mut self, migration: Migration) -> &mut Self {
        let index = self.nodes.len();
        let mut node = Node {
            migration,
            previous: None,
            next: None,
        };

        match self.last {
            None => self.first = Some(index),
            Some(last) => {
                node.previous = Some(last);
                self.nodes[last].next = Some(index);
            }
        }

        self.nodes.push(node);
        self.last = Some(index);
        self
    }

    /// Append copies of every migration of `plans`, in order
    ///
    /// The source plans are only borrowed and stay exactly as they were.
    pub fn concat<'a, I>(&mut self, plans: I) -> &mut Self
    where
        I: IntoIterator<Item = &'a MigrationPlan>,
    {
        for plan in plans {
            for entry in plan.iter() {
                self.add(entry.migration().clone());
            }
        }
        self
    }

    /// Number of migrations in the plan
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    /// First migration of the chain, `None` for an empty plan
    #[must_use]
    pub fn first(&self) -> Option<PlanEntry<'_>> {
        self.first.map(|index| self.entry(index))
    }

    /// Last migration of the chain, `None` for an empty plan
    #[must_use]
    pub fn last(&self) -> Option<PlanEntry<'_>> {
        self.last.map(|index| self.entry(index))
    }

    /// Find a migration by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<PlanEntry<'_>> {
        self.iter().find(|entry| entry.name() == name)
    }

    /// Walk the chain from first to last (`.rev()` walks it backwards)
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            plan: self,
            front: self.first,
            back: self.last,
            remaining: self.nodes.len(),
        }
    }

    /// Check that migration names are unique
    ///
    /// [`MigrationPlan::add`] does not enforce uniqueness; tooling calls this
    /// before touching storage.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::DuplicateName` for the first repeated name.
    pub fn validate(&self) -> Result<(), MigrationError> {
        let mut seen = HashSet::new();
        for entry in self.iter() {
            if !seen.insert(entry.name()) {
                return Err(MigrationError::DuplicateName(entry.name().to_string()));
            }
        }
        Ok(())
    }

    fn entry(&self, index: usize) -> PlanEntry<'_> {
        PlanEntry { plan: self, index }
    }
}

impl FromIterator<Migration> for MigrationPlan {
    fn from_iter<T: IntoIterator<Item = Migration>>(iter: T) -> Self {
        let mut plan = MigrationPlan::new();
        plan.extend(iter);
        plan
    }
}

impl Extend<Migration> for MigrationPlan {
    fn extend<T: IntoIterator<Item = Migration>>(&mut self, iter: T) {
        for migration in iter {
            self.add(migration);
        }
    }
}

impl<'a> IntoIterator for &'a MigrationPlan {
    type Item = PlanEntry<'a>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A borrowed view of one node of a [`MigrationPlan`]
///
/// Two entries are equal when they refer to the same node of the same plan.
#[derive(Clone, Copy)]
pub struct PlanEntry<'a> {
    plan: &'a MigrationPlan,
    index: usize,
}

impl<'a> PlanEntry<'a> {
    pub fn migration(&self) -> &'a Migration {
        &self.plan.nodes[self.index].migration
    }

    pub fn name(&self) -> &'a str {
        self.migration().name()
    }

    pub fn previous(&self) -> Option<PlanEntry<'a>> {
        self.plan.nodes[self.index].previous.map(|index| self.plan.entry(index))
    }

    pub fn next(&self) -> Option<PlanEntry<'a>> {
        self.plan.nodes[self.index].next.map(|index| self.plan.entry(index))
    }

    /// Zero-based position of the node in the plan's arena
    pub fn position(&self) -> usize {
        self.index
    }
}

impl PartialEq for PlanEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.plan, other.plan) && self.index == other.index
    }
}

impl Eq for PlanEntry<'_> {}

impl fmt::Debug for PlanEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanEntry")
            .field("position", &self.index)
            .field("name", &self.name())
            .finish()
    }
}

/// Iterator over the entries of a [`MigrationPlan`], following the links
pub struct Iter<'a> {
    plan: &'a MigrationPlan,
    front: Option<usize>,
    back: Option<usize>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = PlanEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.front?;
        self.front = self.plan.nodes[index].next;
        self.remaining -= 1;
        Some(self.plan.entry(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.back?;
        self.back = self.plan.nodes[index].previous;
        self.remaining -= 1;
        Some(self.plan.entry(index))
    }
}

impl ExactSizeIterator for Iter<'_> {}
