use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

/// Reference to a class by canonical name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassReference {
    pub class_name: String,
}

/// Reference to a field or method of a class.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberReference {
    pub owner: String,
    pub member_name: String,
    pub signature: String,
}

/// Key of the reference map: a class or one of its members.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityReference {
    Class(ClassReference),
    Member(MemberReference),
}

impl EntityReference {
    pub fn class(class_name: impl Into<String>) -> Self {
        EntityReference::Class(ClassReference {
            class_name: class_name.into(),
        })
    }

    pub fn member(
        owner: impl Into<String>,
        member_name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        EntityReference::Member(MemberReference {
            owner: owner.into(),
            member_name: member_name.into(),
            signature: signature.into(),
        })
    }

    /// The referenced class, or the owner of the referenced member.
    pub fn class_name(&self) -> &str {
        match self {
            EntityReference::Class(reference) => &reference.class_name,
            EntityReference::Member(reference) => &reference.owner,
        }
    }
}

impl fmt::Display for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityReference::Class(reference) => f.write_str(&reference.class_name),
            EntityReference::Member(reference) if reference.signature.starts_with('(') => write!(
                f,
                "{}.{}{}",
                reference.owner, reference.member_name, reference.signature
            ),
            EntityReference::Member(reference) => write!(
                f,
                "{}.{}:{}",
                reference.owner, reference.member_name, reference.signature
            ),
        }
    }
}

/// Where a reference was observed.
///
/// Member name and signature are empty for class-level references. The source
/// file and line are informational and do not take part in location lookups.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLocation {
    pub class_name: String,
    pub member_name: String,
    pub signature: String,
    pub source_file: String,
    pub line_number: u32,
}

impl SourceLocation {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            ..Self::default()
        }
    }

    pub fn with_member(
        mut self,
        member_name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        self.member_name = member_name.into();
        self.signature = signature.into();
        self
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = source_file.into();
        self
    }

    pub fn with_line(mut self, line_number: u32) -> Self {
        self.line_number = line_number;
        self
    }

    pub fn is_class_level(&self) -> bool {
        self.member_name.trim().is_empty()
    }

    fn key(&self) -> LocationKey {
        LocationKey {
            class_name: self.class_name.clone(),
            member_name: self.member_name.clone(),
            signature: self.signature.clone(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.class_name)?;
        if !self.is_class_level() {
            write!(f, ".{}{}", self.member_name, self.signature)?;
        }
        if self.line_number > 0 {
            write!(f, ":{}", self.line_number)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct LocationKey {
    class_name: String,
    member_name: String,
    signature: String,
}

impl LocationKey {
    fn class_only(class_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            member_name: String::new(),
            signature: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Index {
    locations: HashMap<EntityReference, BTreeSet<SourceLocation>>,
    references: HashMap<LocationKey, BTreeSet<EntityReference>>,
}

/// Every discovered reference with the locations it was reached from.
///
/// `add` may be called from several discovery threads. Each distinct
/// reference is queued exactly once for `process`, which must have a single
/// consumer.
#[derive(Debug, Default)]
pub struct ReferenceMap {
    index: RwLock<Index>,
    queue: Mutex<VecDeque<EntityReference>>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `reference` is reached from `location`.
    pub fn add(&self, reference: EntityReference, location: SourceLocation) {
        let mut index = self.index.write();
        let is_new = !index.locations.contains_key(&reference);
        trace!(%reference, %location, is_new, "recording reference");

        if !location.is_class_level() {
            index
                .references
                .entry(LocationKey::class_only(&location.class_name))
                .or_default()
                .insert(reference.clone());
        }
        index
            .references
            .entry(location.key())
            .or_default()
            .insert(reference.clone());
        index
            .locations
            .entry(reference.clone())
            .or_default()
            .insert(location);

        if is_new {
            self.queue.lock().push_back(reference);
        }
    }

    /// Locations `reference` was reached from; empty when never seen.
    pub fn locations_from_reference(&self, reference: &EntityReference) -> BTreeSet<SourceLocation> {
        self.index
            .read()
            .locations
            .get(reference)
            .cloned()
            .unwrap_or_default()
    }

    /// References made from a location. Omitting the member answers for the
    /// whole class.
    pub fn references_from_location(
        &self,
        class_name: &str,
        member_name: Option<&str>,
        signature: Option<&str>,
    ) -> BTreeSet<EntityReference> {
        let key = LocationKey {
            class_name: class_name.to_string(),
            member_name: member_name.unwrap_or_default().to_string(),
            signature: signature.unwrap_or_default().to_string(),
        };
        self.index
            .read()
            .references
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Drains newly discovered references. `action` may add more references;
    /// they are drained in the same call.
    pub fn process<F>(&self, mut action: F)
    where
        F: FnMut(&EntityReference),
    {
        while let Some(reference) = self.next_pending() {
            action(&reference);
        }
    }

    /// Like [`ReferenceMap::process`], stopping at the first error. References
    /// not yet drained stay queued.
    pub fn try_process<F, E>(&self, mut action: F) -> Result<(), E>
    where
        F: FnMut(&EntityReference) -> Result<(), E>,
    {
        while let Some(reference) = self.next_pending() {
            action(&reference)?;
        }
        Ok(())
    }

    /// Number of distinct references ever added.
    pub fn size(&self) -> usize {
        self.index.read().locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// References queued but not yet processed.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// All distinct references in sorted order.
    pub fn references(&self) -> Vec<EntityReference> {
        let mut references: Vec<_> = self.index.read().locations.keys().cloned().collect();
        references.sort();
        references
    }

    fn next_pending(&self) -> Option<EntityReference> {
        self.queue.lock().pop_front()
    }
}
