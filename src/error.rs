use std::fmt;

use crate::references::{EntityReference, SourceLocation};

/// Why the determinism policy rejected an entity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FailureReason {
    /// Carries the non-deterministic marker.
    NonDeterministic,
    /// Concrete, unmarked and absent from the allow-list.
    NotAllowListed,
}

impl FailureReason {
    /// Stable identifier used as the SARIF rule id.
    pub fn rule_id(self) -> &'static str {
        match self {
            FailureReason::NonDeterministic => "NON_DETERMINISTIC",
            FailureReason::NotAllowListed => "NOT_ALLOW_LISTED",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NonDeterministic => f.write_str("marked non-deterministic"),
            FailureReason::NotAllowListed => {
                f.write_str("not annotated as deterministic or allow-listed")
            }
        }
    }
}

/// Fatal policy violation that aborts an analysis session.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{entity} is {reason}")]
pub struct ClassificationFailure {
    pub entity: EntityReference,
    pub reason: FailureReason,
    /// Locations the entity was reached from, when known.
    pub trail: Vec<SourceLocation>,
}

impl ClassificationFailure {
    pub fn new(entity: EntityReference, reason: FailureReason) -> Self {
        Self {
            entity,
            reason,
            trail: Vec::new(),
        }
    }

    pub fn with_trail<I>(mut self, trail: I) -> Self
    where
        I: IntoIterator<Item = SourceLocation>,
    {
        self.trail.extend(trail);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_names_entity_and_reason() {
        let failure = ClassificationFailure::new(
            EntityReference::member("java/lang/System", "currentTimeMillis", "()J"),
            FailureReason::NonDeterministic,
        );

        assert_eq!(
            "java/lang/System.currentTimeMillis()J is marked non-deterministic",
            failure.to_string()
        );
        assert_eq!("NON_DETERMINISTIC", failure.reason.rule_id());
    }

    #[test]
    fn trail_is_appended() {
        let failure = ClassificationFailure::new(
            EntityReference::class("java/util/Random"),
            FailureReason::NotAllowListed,
        )
        .with_trail([SourceLocation::new("com/example/A")]);

        assert_eq!(1, failure.trail.len());
        assert_eq!("NOT_ALLOW_LISTED", failure.reason.rule_id());
    }
}
