use std::collections::BTreeSet;

use serde::Deserialize;

use crate::ir::{Determinism, Member};

/// Name of instance initializers.
pub const CONSTRUCTOR: &str = "<init>";
/// Name of static initializers.
pub const STATIC_INITIALIZER: &str = "<clinit>";
/// Name of the pseudo-member exposing an array's length.
pub const ARRAY_LENGTH: &str = "length";

/// Annotation-name suffixes that mark types and members.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct DeterminismMarkers {
    pub deterministic: String,
    pub non_deterministic: String,
}

impl Default for DeterminismMarkers {
    fn default() -> Self {
        Self {
            deterministic: "/Deterministic".to_string(),
            non_deterministic: "/NonDeterministic".to_string(),
        }
    }
}

impl DeterminismMarkers {
    /// Classifies an annotation set.
    ///
    /// The non-deterministic marker is tested first and wins when both are
    /// present.
    pub fn classify(&self, annotations: &BTreeSet<String>) -> Determinism {
        if self.is_non_deterministic(annotations) {
            Determinism::NonDeterministic
        } else if self.is_deterministic(annotations) {
            Determinism::Deterministic
        } else {
            Determinism::Unclassified
        }
    }

    /// Whether any annotation carries the deterministic marker without also
    /// carrying the non-deterministic one.
    pub fn is_deterministic(&self, annotations: &BTreeSet<String>) -> bool {
        annotations.iter().any(|annotation| {
            has_marker(annotation, &self.deterministic)
                && !has_marker(annotation, &self.non_deterministic)
        })
    }

    pub fn is_non_deterministic(&self, annotations: &BTreeSet<String>) -> bool {
        annotations
            .iter()
            .any(|annotation| has_marker(annotation, &self.non_deterministic))
    }
}

fn has_marker(annotation: &str, suffix: &str) -> bool {
    if suffix.is_empty() {
        return false;
    }
    let annotation = annotation.trim_end_matches(';').to_ascii_lowercase();
    annotation.ends_with(&suffix.to_ascii_lowercase())
}

/// Counts the top-level arguments of a method descriptor.
pub fn number_of_arguments(signature: &str) -> usize {
    let mut count = 0;
    let mut depth = 0;
    let mut in_reference = false;
    for c in signature.chars() {
        if in_reference {
            if c == ';' {
                in_reference = false;
            }
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '[' => {}
            'L' => {
                if depth == 1 {
                    count += 1;
                }
                in_reference = true;
            }
            _ => {
                if depth == 1 {
                    count += 1;
                }
            }
        }
    }
    count
}

/// Whether a method descriptor returns anything.
pub fn returns_value_or_reference(signature: &str) -> bool {
    !signature.ends_with(")V")
}

impl Member {
    /// Instance and static initializers.
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR || self.name == STATIC_INITIALIZER
    }

    pub fn is_method(&self) -> bool {
        self.signature.starts_with('(')
    }

    pub fn is_field(&self) -> bool {
        !self.is_method()
    }

    /// Key of this member within its class.
    pub fn qualifying_identifier(&self) -> String {
        format!("{}{}", self.name, self.signature)
    }

    pub fn number_of_arguments(&self) -> usize {
        number_of_arguments(&self.signature)
    }

    pub fn returns_value_or_reference(&self) -> bool {
        returns_value_or_reference(&self.signature)
    }

    pub fn is_deterministic(&self) -> bool {
        self.determinism == Determinism::Deterministic
    }

    pub fn is_non_deterministic(&self) -> bool {
        self.determinism == Determinism::NonDeterministic
    }

    /// Reference types named by the signature, without generics or
    /// annotations.
    pub fn find_referenced_classes(&self) -> BTreeSet<String> {
        let mut classes = BTreeSet::new();
        let mut current = String::new();
        let mut in_reference = false;
        for c in self.signature.chars() {
            match (in_reference, c) {
                (false, 'L') => in_reference = true,
                (true, ';') => {
                    classes.insert(std::mem::take(&mut current));
                    in_reference = false;
                }
                (true, other) => current.push(other),
                _ => {}
            }
        }
        classes
    }
}
