use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::trace;

use crate::descriptor::{self, OBJECT, STRING, TypeName};
use crate::error::{ClassificationFailure, FailureReason};
use crate::hierarchy::ClassHierarchy;
use crate::ir::{ClassRepresentation, Determinism};
use crate::member::DeterminismMarkers;
use crate::references::EntityReference;

/// Externally supplied determinism policy.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Canonical names allowed through unmodified. Entries ending in `*` match
    /// every name starting with the rest of the entry.
    pub allow_list: Vec<String>,
    pub markers: DeterminismMarkers,
}

impl Policy {
    pub fn new(allow_list: Vec<String>, markers: DeterminismMarkers) -> Self {
        Self {
            allow_list,
            markers,
        }
    }

    pub fn allow(mut self, entry: impl Into<String>) -> Self {
        self.allow_list.push(entry.into());
        self
    }

    pub fn is_allow_listed(&self, name: &str) -> bool {
        self.allow_list
            .iter()
            .any(|entry| match entry.strip_suffix('*') {
                Some(prefix) => name.starts_with(prefix),
                None => entry == name,
            })
    }
}

/// Decides whether a class or member may be used unmodified.
///
/// Primitives always pass. Marker annotations are evaluated next
/// (non-deterministic rejects, deterministic accepts), then the allow-list.
/// The root type, strings and abstract types are never rejected for missing
/// the allow-list.
#[derive(Clone, Debug)]
pub struct DeterminismGate {
    policy: Arc<Policy>,
}

impl DeterminismGate {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Checks a referenced class or member.
    pub fn check(
        &self,
        hierarchy: &ClassHierarchy,
        reference: &EntityReference,
    ) -> Result<(), ClassificationFailure> {
        match reference {
            EntityReference::Class(class) => self.check_class(hierarchy, &class.class_name),
            EntityReference::Member(member) => self.check_member(
                hierarchy,
                &member.owner,
                &member.member_name,
                &member.signature,
            ),
        }
    }

    pub fn check_class(
        &self,
        hierarchy: &ClassHierarchy,
        name: &str,
    ) -> Result<(), ClassificationFailure> {
        let type_name = TypeName::parse(name);
        if type_name.is_array() {
            return self.check_class(hierarchy, &type_name.element_name());
        }
        if descriptor::is_primitive(name) {
            return Ok(());
        }

        let class = hierarchy.get(name).map(|class| declaring_class(hierarchy, class));
        let resolved = class.map_or(name, |class| class.name.as_str());
        let determinism = class.map(|class| {
            self.determinism(hierarchy, class.determinism, &class.annotations)
        });
        match determinism {
            Some(Determinism::NonDeterministic) => {
                return Err(ClassificationFailure::new(
                    EntityReference::class(resolved),
                    FailureReason::NonDeterministic,
                ));
            }
            Some(Determinism::Deterministic) => return Ok(()),
            _ => {}
        }
        if is_exempt(name) {
            return Ok(());
        }
        if self.policy.is_allow_listed(resolved) || self.policy.is_allow_listed(name) {
            trace!(class = name, "allow-listed");
            return Ok(());
        }
        if class.is_some_and(|class| class.is_abstract() || class.is_interface()) {
            trace!(class = name, "abstract type passes through");
            return Ok(());
        }
        Err(ClassificationFailure::new(
            EntityReference::class(resolved),
            FailureReason::NotAllowListed,
        ))
    }

    /// Checks a member reference against the member's own markers, then
    /// against its declaring class.
    pub fn check_member(
        &self,
        hierarchy: &ClassHierarchy,
        owner: &str,
        name: &str,
        signature: &str,
    ) -> Result<(), ClassificationFailure> {
        if TypeName::parse(owner).is_array() {
            return self.check_class(hierarchy, owner);
        }
        let Some(member) = hierarchy.get_member(owner, name, signature) else {
            return self.check_class(hierarchy, owner);
        };
        match self.determinism(hierarchy, member.determinism, &member.annotations) {
            Determinism::NonDeterministic => Err(ClassificationFailure::new(
                EntityReference::member(&member.owner, &member.name, &member.signature),
                FailureReason::NonDeterministic,
            )),
            Determinism::Deterministic => Ok(()),
            Determinism::Unclassified => self.check_class(hierarchy, &member.owner),
        }
    }

    /// Rejects only entities carrying the non-deterministic marker. Used for
    /// classes of the analyzed unit, which are rewritten rather than passed
    /// through.
    pub fn check_markers(
        &self,
        hierarchy: &ClassHierarchy,
        reference: &EntityReference,
    ) -> Result<(), ClassificationFailure> {
        match reference {
            EntityReference::Class(class) => match hierarchy.get(&class.class_name) {
                Some(found)
                    if self.determinism(hierarchy, found.determinism, &found.annotations)
                        == Determinism::NonDeterministic =>
                {
                    Err(ClassificationFailure::new(
                        EntityReference::class(&found.name),
                        FailureReason::NonDeterministic,
                    ))
                }
                _ => Ok(()),
            },
            EntityReference::Member(member) => {
                match hierarchy.get_member(&member.owner, &member.member_name, &member.signature)
                {
                    Some(found)
                        if self.determinism(hierarchy, found.determinism, &found.annotations)
                            == Determinism::NonDeterministic =>
                    {
                        Err(ClassificationFailure::new(
                            EntityReference::member(&found.owner, &found.name, &found.signature),
                            FailureReason::NonDeterministic,
                        ))
                    }
                    _ => Ok(()),
                }
            }
        }
    }

    /// The policy's markers decide. The classification cached at
    /// registration is reused only when the hierarchy was built with the
    /// same markers.
    fn determinism(
        &self,
        hierarchy: &ClassHierarchy,
        cached: Determinism,
        annotations: &BTreeSet<String>,
    ) -> Determinism {
        if hierarchy.markers() == &self.policy.markers {
            cached
        } else {
            self.policy.markers.classify(annotations)
        }
    }
}

fn is_exempt(name: &str) -> bool {
    name == OBJECT || name == STRING
}

/// Resolves the synthetic subclass generated for an enum constant with a body
/// to the enum that declares the constant.
fn declaring_class<'a>(
    hierarchy: &'a ClassHierarchy,
    class: &'a ClassRepresentation,
) -> &'a ClassRepresentation {
    if !class.is_enum() || class.super_name.is_empty() {
        return class;
    }
    match hierarchy.get(&class.super_name) {
        Some(parent) if parent.is_enum() => parent,
        _ => class,
    }
}
