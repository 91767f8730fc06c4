use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

/// Access flag bitset shared by classes and members.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize)]
#[serde(transparent)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const PUBLIC: u16 = 0x0001;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const ENUM: u16 = 0x4000;

    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub const fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub const fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub const fn is_enum(self) -> bool {
        self.contains(Self::ENUM)
    }
}

/// Determinism classification derived from a marker annotation.
///
/// Classification is opt-in: an entity carrying neither marker is
/// `Unclassified`, never implicitly deterministic.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Determinism {
    Deterministic,
    NonDeterministic,
    #[default]
    Unclassified,
}

/// Registered representation of a JVM class or interface.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClassRepresentation {
    pub name: String,
    /// Empty for the root type.
    pub super_name: String,
    pub interfaces: Vec<String>,
    pub access: AccessFlags,
    /// Canonical annotation type names.
    pub annotations: BTreeSet<String>,
    pub generics: String,
    pub source_file: String,
    /// Members keyed by qualifying identifier (name followed by signature).
    pub members: BTreeMap<String, Member>,
    /// Filled in when the class is registered with a hierarchy.
    pub determinism: Determinism,
}

impl ClassRepresentation {
    pub fn new(name: impl Into<String>, super_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            super_name: super_name.into(),
            ..Self::default()
        }
    }

    pub fn with_interfaces<I, S>(mut self, interfaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for interface in interfaces {
            let interface = interface.into();
            if !self.interfaces.contains(&interface) {
                self.interfaces.push(interface);
            }
        }
        self
    }

    pub fn with_access(mut self, access: u16) -> Self {
        self.access = AccessFlags::new(access);
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.insert(annotation.into());
        self
    }

    pub fn with_generics(mut self, generics: impl Into<String>) -> Self {
        self.generics = generics.into();
        self
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = source_file.into();
        self
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.add_member(member);
        self
    }

    /// Adds a member, replacing any member with the same name and signature.
    pub fn add_member(&mut self, mut member: Member) {
        member.owner = self.name.clone();
        self.members.insert(member.qualifying_identifier(), member);
    }

    /// Looks up a member declared directly by this class.
    pub fn member(&self, name: &str, signature: &str) -> Option<&Member> {
        self.members.get(&format!("{name}{signature}"))
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    pub fn is_abstract(&self) -> bool {
        self.access.is_abstract()
    }

    pub fn is_enum(&self) -> bool {
        self.access.is_enum()
    }
}

/// Field, method, or initializer declared by a class.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Member {
    pub owner: String,
    pub access: AccessFlags,
    pub name: String,
    pub signature: String,
    pub generics: String,
    pub annotations: BTreeSet<String>,
    pub exceptions: Vec<String>,
    /// Constant value, fields only.
    pub value: Option<serde_json::Value>,
    /// Decoded code-body fragments, methods only.
    pub body: Vec<Instruction>,
    pub determinism: Determinism,
}

impl Member {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            signature: signature.into(),
            ..Self::default()
        }
    }

    pub fn with_access(mut self, access: u16) -> Self {
        self.access = AccessFlags::new(access);
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.insert(annotation.into());
        self
    }

    pub fn with_generics(mut self, generics: impl Into<String>) -> Self {
        self.generics = generics.into();
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exceptions.push(exception.into());
        self
    }

    pub fn with_instruction(mut self, line: u32, kind: InstructionKind) -> Self {
        self.body.push(Instruction { line, kind });
        self
    }
}

/// Code-body fragment captured for reference discovery.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Instruction {
    #[serde(default)]
    pub line: u32,
    #[serde(flatten)]
    pub kind: InstructionKind,
}

/// Instruction kinds that can reach other classes or members.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InstructionKind {
    Invoke(CallSite),
    Field(FieldAccess),
    /// `new`, `anewarray`, `checkcast` and `instanceof` operands.
    Type { name: String },
    InvokeDynamic { name: String, descriptor: String },
    Throw,
    Jump,
    Other { opcode: u8 },
}

/// Call site extracted from bytecode.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CallSite {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    #[serde(default)]
    pub kind: CallKind,
}

/// Call opcode classification.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    #[default]
    Virtual,
    Interface,
    Special,
    Static,
}

/// Field read or write extracted from bytecode.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct FieldAccess {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    #[serde(default)]
    pub is_static: bool,
}
