use serde_json::json;
use serde_sarif::sarif::{
    Artifact, ArtifactLocation, Invocation, Location, LogicalLocation, Message, PhysicalLocation,
    Region, Result as SarifResult, Run, SCHEMA_URL, Sarif, Tool, ToolComponent,
};

use crate::analysis::AnalysisReport;
use crate::error::ClassificationFailure;
use crate::references::{EntityReference, SourceLocation};

pub const TOOL_NAME: &str = "detguard";
pub const INFORMATION_URI: &str = "https://github.com/detguard/detguard";

/// Builds the SARIF log for one analysis. A success has no results; a failure
/// is reported as a single result located at every place the rejected entity
/// was reached from.
pub fn build_sarif(
    outcome: &Result<AnalysisReport, ClassificationFailure>,
    artifacts: Vec<Artifact>,
    invocation: Invocation,
) -> Sarif {
    let results = match outcome {
        Ok(_) => Vec::new(),
        Err(failure) => vec![failure_result(failure)],
    };
    let driver = ToolComponent::builder()
        .name(TOOL_NAME)
        .information_uri(INFORMATION_URI)
        .build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };
    let run = if artifacts.is_empty() {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .build()
    } else {
        Run::builder()
            .tool(tool)
            .invocations(vec![invocation])
            .results(results)
            .artifacts(artifacts)
            .build()
    };

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

fn failure_result(failure: &ClassificationFailure) -> SarifResult {
    let locations = if failure.trail.is_empty() {
        vec![entity_location(&failure.entity)]
    } else {
        failure.trail.iter().map(trail_location).collect()
    };
    SarifResult::builder()
        .rule_id(failure.reason.rule_id())
        .message(result_message(failure.to_string()))
        .locations(locations)
        .build()
}

fn trail_location(location: &SourceLocation) -> Location {
    let logical = if location.is_class_level() {
        class_logical_location(&location.class_name)
    } else {
        method_logical_location(&location.class_name, &location.member_name, &location.signature)
    };
    if location.source_file.is_empty() || location.line_number == 0 {
        return Location::builder().logical_locations(vec![logical]).build();
    }
    let physical = PhysicalLocation::builder()
        .artifact_location(
            ArtifactLocation::builder()
                .uri(location.source_file.clone())
                .build(),
        )
        .region(
            Region::builder()
                .start_line(i64::from(location.line_number))
                .build(),
        )
        .build();
    Location::builder()
        .logical_locations(vec![logical])
        .physical_location(physical)
        .build()
}

fn entity_location(entity: &EntityReference) -> Location {
    let logical = match entity {
        EntityReference::Class(class) => class_logical_location(&class.class_name),
        EntityReference::Member(member) => {
            method_logical_location(&member.owner, &member.member_name, &member.signature)
        }
    };
    Location::builder().logical_locations(vec![logical]).build()
}

fn method_logical_location(class_name: &str, member_name: &str, signature: &str) -> LogicalLocation {
    LogicalLocation::builder()
        .name(format!("{class_name}.{member_name}{signature}"))
        .kind("function")
        .build()
}

fn class_logical_location(class_name: &str) -> LogicalLocation {
    LogicalLocation::builder()
        .name(class_name)
        .kind("type")
        .build()
}

fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;

    fn invocation() -> Invocation {
        Invocation::builder()
            .execution_successful(true)
            .arguments(Vec::<String>::new())
            .build()
    }

    #[test]
    fn success_is_minimal_and_valid_shape() {
        let outcome = Ok(AnalysisReport::default());
        let sarif = build_sarif(&outcome, Vec::new(), invocation());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        assert_eq!(value["version"], "2.1.0");
        assert_eq!(value["$schema"], SCHEMA_URL);
        assert_eq!(value["runs"][0]["tool"]["driver"]["name"], TOOL_NAME);
        assert_eq!(
            value["runs"][0]["tool"]["driver"]["informationUri"],
            INFORMATION_URI
        );
        assert!(
            value["runs"][0]["results"]
                .as_array()
                .expect("results array")
                .is_empty()
        );
        assert_eq!(value["runs"][0]["invocations"][0]["executionSuccessful"], true);
    }

    #[test]
    fn failure_is_located_at_its_trail() {
        let failure = ClassificationFailure::new(
            EntityReference::class("java/util/Random"),
            FailureReason::NotAllowListed,
        )
        .with_trail([
            SourceLocation::new("com/example/App"),
            SourceLocation::new("com/example/App")
                .with_member("roll", "()I")
                .with_source_file("com/example/App.java")
                .with_line(7),
        ]);
        let outcome = Err(failure);

        let sarif = build_sarif(&outcome, Vec::new(), invocation());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");
        let result = &value["runs"][0]["results"][0];

        assert_eq!(result["ruleId"], "NOT_ALLOW_LISTED");
        assert_eq!(
            result["message"]["text"],
            "java/util/Random is not annotated as deterministic or allow-listed"
        );
        let locations = result["locations"].as_array().expect("locations array");
        assert_eq!(2, locations.len());
        assert_eq!(locations[0]["logicalLocations"][0]["kind"], "type");
        assert_eq!(locations[0]["logicalLocations"][0]["name"], "com/example/App");
        assert_eq!(locations[1]["logicalLocations"][0]["kind"], "function");
        assert_eq!(locations[1]["logicalLocations"][0]["name"], "com/example/App.roll()I");
        assert_eq!(
            locations[1]["physicalLocation"]["artifactLocation"]["uri"],
            "com/example/App.java"
        );
        assert_eq!(locations[1]["physicalLocation"]["region"]["startLine"], 7);
    }

    #[test]
    fn failure_without_trail_points_at_entity() {
        let outcome = Err(ClassificationFailure::new(
            EntityReference::member("java/lang/System", "nanoTime", "()J"),
            FailureReason::NonDeterministic,
        ));

        let sarif = build_sarif(&outcome, Vec::new(), invocation());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");
        let location = &value["runs"][0]["results"][0]["locations"][0];

        assert_eq!(value["runs"][0]["results"][0]["ruleId"], "NON_DETERMINISTIC");
        assert_eq!(
            location["logicalLocations"][0]["name"],
            "java/lang/System.nanoTime()J"
        );
    }
}
