use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, btree_map};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::descriptor::{OBJECT, TypeName};
use crate::ir::{ClassRepresentation, Member};
use crate::member::{ARRAY_LENGTH, DeterminismMarkers};

/// Registered classes of one analysis session, with memoized ancestry.
///
/// Registration needs `&mut self`; queries take `&self` and may run from
/// several threads once registration is over. The ancestor cache is the only
/// state a query writes, and it is dropped wholesale on every registration
/// because a new or replaced class can change the ancestry of any descendant
/// already cached.
#[derive(Debug, Default)]
pub struct ClassHierarchy {
    classes: BTreeMap<String, ClassRepresentation>,
    ancestors: RwLock<HashMap<String, Arc<[String]>>>,
    markers: DeterminismMarkers,
}

impl ClassHierarchy {
    pub fn new(markers: DeterminismMarkers) -> Self {
        Self {
            classes: BTreeMap::new(),
            ancestors: RwLock::new(HashMap::new()),
            markers,
        }
    }

    pub fn markers(&self) -> &DeterminismMarkers {
        &self.markers
    }

    /// Registers a class, replacing any previous class with the same name.
    pub fn add(&mut self, mut class: ClassRepresentation) {
        let cache = self.ancestors.get_mut();
        if !cache.is_empty() {
            debug!(entries = cache.len(), "invalidating ancestor cache");
            cache.clear();
        }
        class.determinism = self.markers.classify(&class.annotations);
        for member in class.members.values_mut() {
            member.owner.clone_from(&class.name);
            member.determinism = self.markers.classify(&member.annotations);
        }
        debug!(
            class = %class.name,
            members = class.members.len(),
            determinism = ?class.determinism,
            "registering class"
        );
        self.classes.insert(class.name.clone(), class);
    }

    /// Looks up a class; array types resolve to the root type.
    pub fn get(&self, name: &str) -> Option<&ClassRepresentation> {
        self.classes.get(registered_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(registered_name(name))
    }

    /// Source file of a class, falling back to its name, or empty when the
    /// class is unknown.
    pub fn location(&self, name: &str) -> &str {
        match self.get(name) {
            Some(class) if !class.source_file.trim().is_empty() => &class.source_file,
            Some(class) => &class.name,
            None => "",
        }
    }

    /// Resolves a member through the ancestor chain of `class_name`.
    ///
    /// The array length pseudo-member is available on every array type,
    /// whether or not its element type is known.
    pub fn get_member(
        &self,
        class_name: &str,
        member_name: &str,
        signature: &str,
    ) -> Option<Cow<'_, Member>> {
        if TypeName::parse(class_name).is_array() && member_name == ARRAY_LENGTH {
            return Some(Cow::Owned(Member::new(class_name, ARRAY_LENGTH, signature)));
        }
        self.ancestor_chain(class_name)
            .iter()
            .filter_map(|ancestor| self.classes.get(ancestor))
            .find_map(|class| class.member(member_name, signature))
            .map(Cow::Borrowed)
    }

    /// Self-first ancestry of a class followed by the root type.
    ///
    /// Superclasses come before interfaces, each expanded depth-first.
    /// Diamond inheritance may list an interface more than once.
    pub fn ancestor_chain(&self, class_name: &str) -> Vec<String> {
        let mut chain = self.find_ancestors(registered_name(class_name)).to_vec();
        chain.push(OBJECT.to_string());
        chain
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Values<'_, String, ClassRepresentation> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    fn find_ancestors(&self, name: &str) -> Arc<[String]> {
        let mut path = Vec::new();
        self.resolve_ancestors(name, &mut path).0
    }

    // Concurrent readers may compute the same entry twice; the first one
    // stored wins and both results are identical. The flag reports a cut
    // made by the cycle guard: such a result depends on `path` and is never
    // cached.
    fn resolve_ancestors(&self, name: &str, path: &mut Vec<String>) -> (Arc<[String]>, bool) {
        if let Some(cached) = self.ancestors.read().get(name) {
            return (Arc::clone(cached), false);
        }
        let Some(class) = self.classes.get(name) else {
            return (Arc::from(Vec::new()), false);
        };
        if path.iter().any(|entry| entry == name) {
            trace!(class = name, "cyclic inheritance");
            return (Arc::from(Vec::new()), true);
        }

        path.push(name.to_string());
        let mut ancestors = vec![class.name.clone()];
        let mut truncated = false;
        let parents = std::iter::once(&class.super_name)
            .filter(|super_name| !super_name.is_empty())
            .chain(&class.interfaces);
        for parent in parents {
            let (inherited, cut) = self.resolve_ancestors(parent, path);
            ancestors.extend(inherited.iter().cloned());
            truncated |= cut;
        }
        path.pop();

        let ancestors: Arc<[String]> = ancestors.into();
        if truncated {
            return (ancestors, true);
        }
        let mut cache = self.ancestors.write();
        (Arc::clone(cache.entry(name.to_string()).or_insert(ancestors)), false)
    }
}

impl<'a> IntoIterator for &'a ClassHierarchy {
    type Item = &'a ClassRepresentation;
    type IntoIter = btree_map::Values<'a, String, ClassRepresentation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Extend<ClassRepresentation> for ClassHierarchy {
    fn extend<T: IntoIterator<Item = ClassRepresentation>>(&mut self, classes: T) {
        for class in classes {
            self.add(class);
        }
    }
}

fn registered_name(name: &str) -> &str {
    match TypeName::parse(name) {
        TypeName::Array { .. } => OBJECT,
        TypeName::Ordinary(name) => name,
    }
}
