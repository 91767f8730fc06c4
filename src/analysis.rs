use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cost::{CostSummary, ExecutionProfile, RuntimeCostLedger};
use crate::descriptor::{self, ARRAY_SUFFIX};
use crate::error::ClassificationFailure;
use crate::hierarchy::ClassHierarchy;
use crate::ir::{ClassRepresentation, InstructionKind, Member};
use crate::policy::{DeterminismGate, Policy};
use crate::references::{EntityReference, ReferenceMap, SourceLocation};

/// Settings for one analysis session.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfiguration {
    #[serde(flatten)]
    pub policy: Policy,
    /// Treat annotations as class references instead of opaque markers.
    pub derive_annotation_references: bool,
    pub profile: ExecutionProfile,
}

impl AnalysisConfiguration {
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// An empty hierarchy classifying classes with this configuration's
    /// markers.
    pub fn new_hierarchy(&self) -> ClassHierarchy {
        ClassHierarchy::new(self.policy.markers.clone())
    }
}

/// Outcome of a successful session.
#[derive(Debug, Default)]
pub struct AnalysisReport {
    /// Every reference discovered, with the locations it came from.
    pub references: ReferenceMap,
    /// Unit classes whose members were walked.
    pub analyzed: BTreeSet<String>,
    /// Classes outside the unit allowed through unmodified.
    pub passed_through: BTreeSet<String>,
    /// Ceilings an execution of the analyzed unit is metered against.
    pub profile: ExecutionProfile,
}

impl AnalysisReport {
    pub fn reference_count(&self) -> usize {
        self.references.size()
    }

    /// Measures a finished execution against the configured ceilings.
    pub fn cost_summary(&self, ledger: &RuntimeCostLedger) -> CostSummary {
        ledger.summary(&self.profile)
    }
}

/// Walks the classes of an analyzed unit and everything they reach.
#[derive(Clone, Debug)]
pub struct Analyzer {
    configuration: AnalysisConfiguration,
    gate: DeterminismGate,
}

impl Analyzer {
    pub fn new(configuration: AnalysisConfiguration) -> Self {
        let gate = DeterminismGate::new(Arc::new(configuration.policy.clone()));
        Self {
            configuration,
            gate,
        }
    }

    pub fn configuration(&self) -> &AnalysisConfiguration {
        &self.configuration
    }

    pub fn gate(&self) -> &DeterminismGate {
        &self.gate
    }

    /// Analyzes `unit`, the classes that will be rewritten, against the
    /// classes registered in `hierarchy`.
    ///
    /// Stops at the first policy violation.
    pub fn analyze(
        &self,
        hierarchy: &ClassHierarchy,
        unit: &BTreeSet<String>,
    ) -> Result<AnalysisReport, ClassificationFailure> {
        info!(
            registered = hierarchy.len(),
            unit = unit.len(),
            "starting analysis"
        );
        let mut report = AnalysisReport {
            profile: self.configuration.profile,
            ..AnalysisReport::default()
        };

        for name in unit {
            let Some(class) = hierarchy.get(name) else {
                warn!(class = %name, "unit class is not registered");
                continue;
            };
            self.gate
                .check_markers(hierarchy, &EntityReference::class(name))
                .inspect_err(|failure| warn!(%failure, "analysis aborted"))?;
            if report.analyzed.insert(name.clone()) {
                self.visit_class(class, &report.references);
            }
        }

        let references = &report.references;
        let analyzed = &mut report.analyzed;
        let passed_through = &mut report.passed_through;
        references
            .try_process(|reference| {
                self.process_reference(hierarchy, unit, reference, references, analyzed, passed_through)
                    .map_err(|failure| {
                        failure.with_trail(references.locations_from_reference(reference))
                    })
            })
            .inspect_err(|failure| warn!(%failure, "analysis aborted"))?;

        info!(
            analyzed = report.analyzed.len(),
            passed_through = report.passed_through.len(),
            references = report.reference_count(),
            "analysis finished"
        );
        Ok(report)
    }

    fn process_reference(
        &self,
        hierarchy: &ClassHierarchy,
        unit: &BTreeSet<String>,
        reference: &EntityReference,
        references: &ReferenceMap,
        analyzed: &mut BTreeSet<String>,
        passed_through: &mut BTreeSet<String>,
    ) -> Result<(), ClassificationFailure> {
        match reference {
            EntityReference::Class(class) if unit.contains(&class.class_name) => {
                self.gate.check_markers(hierarchy, reference)?;
                if analyzed.insert(class.class_name.clone()) {
                    if let Some(found) = hierarchy.get(&class.class_name) {
                        self.visit_class(found, references);
                    }
                }
            }
            EntityReference::Class(class) => {
                self.gate.check_class(hierarchy, &class.class_name)?;
                passed_through.insert(class.class_name.clone());
            }
            EntityReference::Member(member) if unit.contains(&member.owner) => {
                self.gate.check_markers(hierarchy, reference)?;
            }
            EntityReference::Member(_) => self.gate.check(hierarchy, reference)?,
        }
        Ok(())
    }

    fn visit_class(&self, class: &ClassRepresentation, references: &ReferenceMap) {
        if self.gate.policy().is_allow_listed(&class.name) {
            debug!(class = %class.name, "allow-listed class is not walked");
            return;
        }
        debug!(class = %class.name, members = class.members.len(), "visiting class");
        let location = SourceLocation::new(&class.name).with_source_file(&class.source_file);
        for name in self.class_level_references(class) {
            record_type(references, &name, &location);
        }
        for member in class.members.values() {
            self.visit_member(member, &location, references);
        }
    }

    fn visit_member(
        &self,
        member: &Member,
        class_location: &SourceLocation,
        references: &ReferenceMap,
    ) {
        let location = class_location
            .clone()
            .with_member(&member.name, &member.signature);
        let derive = self.configuration.derive_annotation_references;

        let mut names = descriptor::class_references_from_signature(&member.signature);
        names.extend(descriptor::class_references_from_generics(&member.generics));
        names.extend(descriptor::class_references_from_annotations(&member.annotations, derive));
        names.extend(member.exceptions.iter().cloned());
        for name in names {
            record_type(references, &name, &location);
        }

        for instruction in &member.body {
            let location = location.clone().with_line(instruction.line);
            match &instruction.kind {
                InstructionKind::Invoke(call) => {
                    record_member(references, &call.owner, &call.name, &call.descriptor, &location);
                }
                InstructionKind::Field(field) => {
                    record_member(references, &field.owner, &field.name, &field.descriptor, &location);
                }
                InstructionKind::Type { name } => record_type(references, name, &location),
                InstructionKind::InvokeDynamic {
                    descriptor: call_descriptor,
                    ..
                } => {
                    for name in descriptor::class_references_from_signature(call_descriptor) {
                        record_type(references, &name, &location);
                    }
                }
                InstructionKind::Throw | InstructionKind::Jump | InstructionKind::Other { .. } => {}
            }
        }
    }

    /// Superclass, interfaces, generics and (optionally) annotations.
    fn class_level_references(&self, class: &ClassRepresentation) -> Vec<String> {
        let mut names = Vec::new();
        if !class.super_name.is_empty() {
            names.push(class.super_name.clone());
        }
        names.extend(class.interfaces.iter().cloned());
        names.extend(descriptor::class_references_from_annotations(
            &class.annotations,
            self.configuration.derive_annotation_references,
        ));
        names.extend(descriptor::class_references_from_generics(&class.generics));
        names
    }
}

fn record_type(references: &ReferenceMap, name: &str, location: &SourceLocation) {
    let name = descriptor::normalize(name).replace(ARRAY_SUFFIX, "");
    if name.is_empty() {
        return;
    }
    references.add(EntityReference::class(name), location.clone());
}

fn record_member(
    references: &ReferenceMap,
    owner: &str,
    name: &str,
    signature: &str,
    location: &SourceLocation,
) {
    record_type(references, owner, location);
    references.add(EntityReference::member(owner, name, signature), location.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::OBJECT;
    use crate::error::FailureReason;
    use crate::ir::{CallKind, CallSite, FieldAccess};

    const NON_DETERMINISTIC: &str = "net/corda/NonDeterministic";

    fn invoke(owner: &str, name: &str, descriptor: &str) -> InstructionKind {
        InstructionKind::Invoke(CallSite {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            kind: CallKind::Static,
        })
    }

    fn unit(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn analyzer(allow_list: &[&str]) -> Analyzer {
        let mut configuration = AnalysisConfiguration::default();
        configuration.policy.allow_list = allow_list.iter().map(|entry| entry.to_string()).collect();
        Analyzer::new(configuration)
    }

    fn library() -> Vec<ClassRepresentation> {
        vec![
            ClassRepresentation::new(OBJECT, ""),
            ClassRepresentation::new("java/lang/Math", OBJECT)
                .with_member(Member::new("java/lang/Math", "abs", "(I)I")),
            ClassRepresentation::new("java/util/Random", OBJECT)
                .with_member(Member::new("java/util/Random", "<init>", "()V")),
            ClassRepresentation::new("java/lang/System", OBJECT).with_member(
                Member::new("java/lang/System", "nanoTime", "()J")
                    .with_annotation(NON_DETERMINISTIC),
            ),
        ]
    }

    fn hierarchy_with(classes: Vec<ClassRepresentation>) -> ClassHierarchy {
        let mut hierarchy = AnalysisConfiguration::default().new_hierarchy();
        hierarchy.extend(library());
        hierarchy.extend(classes);
        hierarchy
    }

    #[test]
    fn clean_unit_passes_and_records_references() {
        let hierarchy = hierarchy_with(vec![
            ClassRepresentation::new("com/example/App", OBJECT).with_member(
                Member::new("com/example/App", "run", "(I)I")
                    .with_instruction(3, invoke("java/lang/Math", "abs", "(I)I")),
            ),
        ]);

        let report = analyzer(&["java/lang/Math"])
            .analyze(&hierarchy, &unit(&["com/example/App"]))
            .expect("analysis succeeds");

        assert_eq!(unit(&["com/example/App"]), report.analyzed);
        assert!(report.passed_through.contains("java/lang/Math"));
        assert!(report.passed_through.contains("java/lang/Integer"));
        let abs = EntityReference::member("java/lang/Math", "abs", "(I)I");
        let locations = report.references.locations_from_reference(&abs);
        assert_eq!(
            vec![SourceLocation::new("com/example/App").with_member("run", "(I)I").with_line(3)],
            locations.into_iter().collect::<Vec<_>>()
        );
        assert!(
            report
                .references
                .references_from_location("com/example/App", None, None)
                .contains(&abs)
        );
    }

    #[test]
    fn violation_reached_transitively_carries_its_trail() {
        let hierarchy = hierarchy_with(vec![
            ClassRepresentation::new("com/example/App", OBJECT).with_member(
                Member::new("com/example/App", "run", "()V")
                    .with_instruction(5, invoke("com/example/Helper", "dice", "()V")),
            ),
            ClassRepresentation::new("com/example/Helper", OBJECT)
                .with_source_file("com/example/Helper.java")
                .with_member(
                    Member::new("com/example/Helper", "dice", "()V")
                        .with_instruction(
                            9,
                            InstructionKind::Type {
                                name: "java/util/Random".to_string(),
                            },
                        )
                        .with_instruction(10, invoke("java/util/Random", "<init>", "()V")),
                ),
        ]);

        let failure = analyzer(&[])
            .analyze(&hierarchy, &unit(&["com/example/App", "com/example/Helper"]))
            .expect_err("random is rejected");

        assert_eq!(FailureReason::NotAllowListed, failure.reason);
        assert_eq!(EntityReference::class("java/util/Random"), failure.entity);
        assert!(failure.trail.contains(
            &SourceLocation::new("com/example/Helper")
                .with_member("dice", "()V")
                .with_source_file("com/example/Helper.java")
                .with_line(9)
        ));
    }

    #[test]
    fn non_deterministic_member_is_rejected_even_when_class_is_allowed() {
        let hierarchy = hierarchy_with(vec![
            ClassRepresentation::new("com/example/App", OBJECT).with_member(
                Member::new("com/example/App", "now", "()J")
                    .with_instruction(12, invoke("java/lang/System", "nanoTime", "()J")),
            ),
        ]);

        let failure = analyzer(&["java/lang/System"])
            .analyze(&hierarchy, &unit(&["com/example/App"]))
            .expect_err("nanoTime is rejected");

        assert_eq!(FailureReason::NonDeterministic, failure.reason);
        assert_eq!(
            EntityReference::member("java/lang/System", "nanoTime", "()J"),
            failure.entity
        );
        assert_eq!(1, failure.trail.len());
        assert_eq!(12, failure.trail[0].line_number);
    }

    #[test]
    fn non_deterministic_unit_class_is_rejected() {
        let hierarchy = hierarchy_with(vec![
            ClassRepresentation::new("com/example/Clock", OBJECT).with_annotation(NON_DETERMINISTIC),
        ]);

        let failure = analyzer(&[])
            .analyze(&hierarchy, &unit(&["com/example/Clock"]))
            .expect_err("clock is rejected");

        assert_eq!(EntityReference::class("com/example/Clock"), failure.entity);
        assert!(failure.trail.is_empty());
    }

    #[test]
    fn annotations_are_references_only_when_derived() {
        let classes = vec![
            ClassRepresentation::new("com/example/App", OBJECT).with_annotation("com/lib/Marker"),
        ];
        let hierarchy = hierarchy_with(classes);

        assert!(
            analyzer(&[])
                .analyze(&hierarchy, &unit(&["com/example/App"]))
                .is_ok()
        );

        let mut configuration = AnalysisConfiguration::default();
        configuration.derive_annotation_references = true;
        let failure = Analyzer::new(configuration)
            .analyze(&hierarchy, &unit(&["com/example/App"]))
            .expect_err("marker class is rejected");
        assert_eq!(EntityReference::class("com/lib/Marker"), failure.entity);
    }

    #[test]
    fn superclass_generics_and_fields_are_followed() {
        let hierarchy = hierarchy_with(vec![
            ClassRepresentation::new("com/example/Base", OBJECT),
            ClassRepresentation::new("com/example/App", "com/example/Base")
                .with_interfaces(["java/lang/Runnable"])
                .with_generics("Ljava/lang/Object;Ljava/lang/Comparable<Lcom/example/App;>;")
                .with_member(
                    Member::new("com/example/App", "values", "[Ljava/lang/Long;")
                        .with_instruction(
                            1,
                            InstructionKind::Field(FieldAccess {
                                owner: "com/example/Base".to_string(),
                                name: "count".to_string(),
                                descriptor: "I".to_string(),
                                is_static: false,
                            }),
                        ),
                ),
        ]);

        let report = analyzer(&["java/lang/Runnable", "java/lang/Comparable"])
            .analyze(&hierarchy, &unit(&["com/example/App", "com/example/Base"]))
            .expect("analysis succeeds");

        let touched = report
            .references
            .references_from_location("com/example/App", None, None);
        for name in [
            "com/example/Base",
            "java/lang/Runnable",
            "java/lang/Comparable",
            "java/lang/Long",
        ] {
            assert!(touched.contains(&EntityReference::class(name)), "{name}");
        }
        assert!(report.passed_through.contains("java/lang/Comparable"));
        assert!(!report.passed_through.contains("com/example/Base"));
    }

    #[test]
    fn report_meters_against_configured_profile() {
        let hierarchy = hierarchy_with(vec![ClassRepresentation::new("com/example/App", OBJECT)]);
        let mut configuration = AnalysisConfiguration::default();
        configuration.profile.jump = 2;

        let report = Analyzer::new(configuration)
            .analyze(&hierarchy, &unit(&["com/example/App"]))
            .expect("analysis succeeds");
        let mut ledger = RuntimeCostLedger::new();
        ledger.record_cost(crate::cost::CostKind::Jump, 3);
        let summary = report.cost_summary(&ledger);

        assert_eq!(2, report.profile.jump);
        assert!(summary.any_exceeded());
        assert!(
            summary
                .entries
                .iter()
                .all(|entry| entry.exceeded == (entry.kind == crate::cost::CostKind::Jump))
        );
    }

    #[test]
    fn configuration_reads_flattened_policy() {
        let configuration: AnalysisConfiguration = serde_json::from_str(
            r#"{
                "allow_list": ["java/lang/Math"],
                "markers": {"deterministic": "/Pure"},
                "derive_annotation_references": true,
                "profile": {"jump": 10}
            }"#,
        )
        .expect("configuration json");

        assert_eq!(vec!["java/lang/Math"], configuration.policy.allow_list);
        assert_eq!("/Pure", configuration.policy.markers.deterministic);
        assert_eq!("/NonDeterministic", configuration.policy.markers.non_deterministic);
        assert!(configuration.derive_annotation_references);
        assert_eq!(10, configuration.profile.jump);
        assert_eq!(ExecutionProfile::DEFAULT.throw, configuration.profile.throw);
    }
}
