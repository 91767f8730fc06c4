use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jdescriptor::{MethodDescriptor, TypeDescriptor};
use serde::Deserialize;
use serde_json::Value;
use serde_sarif::sarif::{Artifact, ArtifactLocation, ArtifactRoles};
use tracing::{debug, warn};

use crate::descriptor::{self, OBJECT};
use crate::ir::{AccessFlags, ClassRepresentation, Instruction, InstructionKind, Member};

/// Classes decoded from the input and classpath manifests.
pub struct LoadOutput {
    /// Every class, input first, in load order.
    pub classes: Vec<ClassRepresentation>,
    /// Names of the classes that came from the input.
    pub unit: BTreeSet<String>,
    pub artifacts: Vec<Artifact>,
}

/// Manifest file as written by the class decoder.
#[derive(Debug, Deserialize)]
struct Manifest {
    classes: Vec<ClassEntry>,
}

#[derive(Debug, Deserialize)]
struct ClassEntry {
    name: String,
    /// Missing means the root type for every class but the root itself.
    #[serde(default)]
    super_name: Option<String>,
    #[serde(default)]
    interfaces: Vec<String>,
    #[serde(default)]
    access: AccessFlags,
    #[serde(default)]
    annotations: Vec<String>,
    #[serde(default)]
    generics: String,
    #[serde(default)]
    source_file: String,
    #[serde(default)]
    members: Vec<MemberEntry>,
}

#[derive(Debug, Deserialize)]
struct MemberEntry {
    name: String,
    signature: String,
    #[serde(default)]
    access: AccessFlags,
    #[serde(default)]
    generics: String,
    #[serde(default)]
    annotations: Vec<String>,
    #[serde(default)]
    exceptions: Vec<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    body: Vec<Instruction>,
}

pub fn load_inputs(input: &Path, classpath: &[PathBuf]) -> Result<LoadOutput> {
    let mut output = LoadOutput {
        classes: Vec::new(),
        unit: BTreeSet::new(),
        artifacts: Vec::new(),
    };

    load_path(input, true, true, &mut output)?;

    // Sorted so that the first definition of a duplicated class is stable.
    let mut classpath_entries = classpath.to_vec();
    classpath_entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in classpath_entries {
        load_path(&entry, false, true, &mut output)?;
    }

    debug!(
        classes = output.classes.len(),
        unit = output.unit.len(),
        "loaded manifests"
    );
    Ok(output)
}

fn load_path(path: &Path, is_input: bool, strict: bool, output: &mut LoadOutput) -> Result<()> {
    if path.is_dir() {
        return load_dir(path, is_input, output);
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    match extension {
        "json" => load_manifest(path, is_input, output),
        _ if strict => anyhow::bail!("unsupported input file: {}", path.display()),
        _ => Ok(()),
    }
}

fn load_dir(path: &Path, is_input: bool, output: &mut LoadOutput) -> Result<()> {
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(path).with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }

    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));

    for entry in entries {
        load_path(&entry, is_input, false, output)?;
    }

    Ok(())
}

fn load_manifest(path: &Path, is_input: bool, output: &mut LoadOutput) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: Manifest = serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    for entry in manifest.classes {
        let class = convert_class(entry)
            .with_context(|| format!("invalid class in {}", path.display()))?;
        if output.classes.iter().any(|known| known.name == class.name) {
            warn!(class = %class.name, path = %path.display(), "duplicate class ignored");
            continue;
        }
        if is_input {
            output.unit.insert(class.name.clone());
        }
        output.classes.push(class);
    }

    let roles = if is_input {
        Some(vec![
            serde_json::to_value(ArtifactRoles::AnalysisTarget)
                .context("failed to serialize artifact role")?,
        ])
    } else {
        None
    };
    push_artifact(path_key(path), data.len() as u64, roles, &mut output.artifacts);
    Ok(())
}

fn convert_class(entry: ClassEntry) -> Result<ClassRepresentation> {
    let name = internal_name(&entry.name);
    let super_name = match entry.super_name {
        Some(super_name) => internal_name(&super_name),
        None if name == OBJECT => String::new(),
        None => OBJECT.to_string(),
    };
    let source_file = source_path(&name, &entry.source_file);

    let mut class = ClassRepresentation::new(&name, super_name)
        .with_interfaces(entry.interfaces.iter().map(|interface| internal_name(interface)))
        .with_access(entry.access.bits())
        .with_generics(entry.generics)
        .with_source_file(source_file);
    for annotation in &entry.annotations {
        class = class.with_annotation(descriptor::normalize(annotation));
    }
    for member in entry.members {
        let member = convert_member(&name, member)?;
        class.add_member(member);
    }
    Ok(class)
}

fn convert_member(owner: &str, entry: MemberEntry) -> Result<Member> {
    validate_signature(&entry.signature)
        .with_context(|| format!("member {owner}.{}", entry.name))?;
    for instruction in &entry.body {
        let checked = match &instruction.kind {
            InstructionKind::Invoke(call) => validate_signature(&call.descriptor),
            InstructionKind::Field(field) => validate_signature(&field.descriptor),
            InstructionKind::InvokeDynamic { descriptor, .. } => validate_signature(descriptor),
            _ => Ok(()),
        };
        checked.with_context(|| {
            format!("instruction at line {} of {owner}.{}", instruction.line, entry.name)
        })?;
    }

    let mut member = Member::new(owner, entry.name, entry.signature)
        .with_access(entry.access.bits())
        .with_generics(entry.generics);
    for annotation in &entry.annotations {
        member = member.with_annotation(descriptor::normalize(annotation));
    }
    for exception in &entry.exceptions {
        member = member.with_exception(internal_name(&descriptor::normalize(exception)));
    }
    member.value = entry.value;
    member.body = entry.body;
    Ok(member)
}

fn validate_signature(signature: &str) -> Result<()> {
    if signature.starts_with('(') {
        signature
            .parse::<MethodDescriptor>()
            .map_err(|err| anyhow::anyhow!("malformed method descriptor {signature}: {err:?}"))?;
    } else {
        signature
            .parse::<TypeDescriptor>()
            .map_err(|err| anyhow::anyhow!("malformed type descriptor {signature}: {err:?}"))?;
    }
    Ok(())
}

/// Accepts both binary (`java.lang.String`) and internal names.
fn internal_name(name: &str) -> String {
    name.replace('.', "/")
}

/// Joins the class's package with its bare source file name.
fn source_path(class_name: &str, source_file: &str) -> String {
    if source_file.is_empty() || source_file.contains('/') {
        return source_file.to_string();
    }
    match class_name.rsplit_once('/') {
        Some((package, _)) => format!("{package}/{source_file}"),
        None => source_file.to_string(),
    }
}

fn push_artifact(uri: String, len: u64, roles: Option<Vec<Value>>, artifacts: &mut Vec<Artifact>) {
    let location = ArtifactLocation::builder().uri(uri).build();
    let artifact = match roles {
        Some(roles) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .roles(roles)
            .build(),
        None => Artifact::builder()
            .location(location)
            .length(len as i64)
            .build(),
    };
    artifacts.push(artifact);
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
