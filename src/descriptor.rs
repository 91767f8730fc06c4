//! Parsing of JVM type descriptors into canonical type names.
//!
//! Canonical names use the internal slash-separated form (`java/lang/String`).
//! Primitive codes map to their boxed types and each array dimension appends a
//! `[]` suffix. Nothing here validates descriptors; malformed input is rejected
//! by the loader before it reaches this module.

/// Name of the universal root type.
pub const OBJECT: &str = "java/lang/Object";
/// Name of the string type.
pub const STRING: &str = "java/lang/String";
/// Suffix appended once per array dimension in canonical names.
pub const ARRAY_SUFFIX: &str = "[]";

const ARRAY_MARKER: char = '[';
const REFERENCE_START: char = 'L';
const REFERENCE_END: char = ';';

/// Boxed type name for a primitive descriptor code.
pub fn primitive_name(code: char) -> Option<&'static str> {
    match code {
        'V' => Some("java/lang/Void"),
        'Z' => Some("java/lang/Boolean"),
        'B' => Some("java/lang/Byte"),
        'C' => Some("java/lang/Character"),
        'S' => Some("java/lang/Short"),
        'I' => Some("java/lang/Integer"),
        'J' => Some("java/lang/Long"),
        'F' => Some("java/lang/Float"),
        'D' => Some("java/lang/Double"),
        _ => None,
    }
}

/// Whether `name` is a primitive code or the canonical name of one.
pub fn is_primitive(name: &str) -> bool {
    let mut chars = name.chars();
    if let (Some(code), None) = (chars.next(), chars.next()) {
        return primitive_name(code).is_some();
    }
    "VZBCSIJFD"
        .chars()
        .filter_map(primitive_name)
        .any(|boxed| boxed == name)
}

/// Maps a descriptor (or an already canonical name) to its canonical name.
pub fn normalize(descriptor: &str) -> String {
    if let Some(element) = descriptor.strip_prefix(ARRAY_MARKER) {
        return format!("{}{ARRAY_SUFFIX}", normalize(element));
    }
    if let Some(inner) = descriptor
        .strip_prefix(REFERENCE_START)
        .and_then(|rest| rest.strip_suffix(REFERENCE_END))
    {
        return inner.to_string();
    }
    let mut chars = descriptor.chars();
    if let (Some(code), None) = (chars.next(), chars.next()) {
        if let Some(boxed) = primitive_name(code) {
            return boxed.to_string();
        }
    }
    descriptor.to_string()
}

/// Maps a canonical name back to a field descriptor.
///
/// Primitive types are canonically boxed, so they come back as the descriptor
/// of their boxed class.
pub fn to_descriptor(name: &str) -> String {
    let mut base = name;
    let mut depth = 0;
    while let Some(stripped) = base.strip_suffix(ARRAY_SUFFIX) {
        base = stripped;
        depth += 1;
    }
    let mut descriptor = "[".repeat(depth);
    descriptor.push(REFERENCE_START);
    descriptor.push_str(base);
    descriptor.push(REFERENCE_END);
    descriptor
}

/// A type name resolved once into ordinary or array form.
///
/// Accepts both descriptor arrays (`[Ljava/lang/String;`) and canonical
/// arrays (`java/lang/String[]`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TypeName<'a> {
    Ordinary(&'a str),
    Array { element: &'a str, depth: usize },
}

impl<'a> TypeName<'a> {
    pub fn parse(name: &'a str) -> Self {
        let prefix = name.chars().take_while(|c| *c == ARRAY_MARKER).count();
        if prefix > 0 {
            return TypeName::Array {
                element: &name[prefix..],
                depth: prefix,
            };
        }
        let mut element = name;
        let mut depth = 0;
        while let Some(stripped) = element.strip_suffix(ARRAY_SUFFIX) {
            element = stripped;
            depth += 1;
        }
        if depth > 0 {
            TypeName::Array { element, depth }
        } else {
            TypeName::Ordinary(name)
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeName::Array { .. })
    }

    /// Canonical name of the element type, or of the type itself when it is
    /// not an array.
    pub fn element_name(&self) -> String {
        match self {
            TypeName::Ordinary(name) => (*name).to_string(),
            TypeName::Array { element, .. } => normalize(element),
        }
    }
}

/// Every type mentioned in a signature, in order of appearance.
///
/// Array types keep their `[]` suffixes here; the `class_references_*`
/// functions strip them.
pub fn types_in(signature: &str) -> Vec<String> {
    let mut types = Vec::new();
    let mut current = String::new();
    let mut in_reference = false;
    let mut array_depth = 0;
    for c in signature.chars() {
        if in_reference {
            if c == REFERENCE_END {
                types.push(with_array_suffix(&current, array_depth));
                current.clear();
                in_reference = false;
                array_depth = 0;
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            '(' | ')' => {}
            ARRAY_MARKER => array_depth += 1,
            REFERENCE_START => in_reference = true,
            other => {
                let name = match primitive_name(other) {
                    Some(boxed) => boxed.to_string(),
                    None => other.to_string(),
                };
                if !name.trim().is_empty() {
                    types.push(with_array_suffix(&name, array_depth));
                }
                array_depth = 0;
            }
        }
    }
    types
}

/// Classes referenced by a member or field signature.
pub fn class_references_from_signature(signature: &str) -> Vec<String> {
    filter_references(types_in(signature))
}

/// Classes referenced by an annotation set.
///
/// Annotations are opaque markers unless `derive` is set.
pub fn class_references_from_annotations<'a, I>(annotations: I, derive: bool) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    if !derive {
        return Vec::new();
    }
    filter_references(annotations.into_iter().map(|name| normalize(name)).collect())
}

/// Classes referenced by a generics signature.
///
/// Bare type variables are dropped by keeping only names with a package.
pub fn class_references_from_generics(generics: &str) -> Vec<String> {
    let rewritten: String = generics
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' => REFERENCE_END,
            other => other,
        })
        .collect();
    filter_references(
        types_in(&rewritten)
            .into_iter()
            .filter(|name| name.contains('/'))
            .collect(),
    )
}

/// Strips array brackets, drops single-character noise and removes duplicates
/// while keeping first-seen order.
fn filter_references(names: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for name in names {
        let name = name.replace(ARRAY_SUFFIX, "");
        if name.chars().count() <= 1 || result.contains(&name) {
            continue;
        }
        result.push(name);
    }
    result
}

fn with_array_suffix(name: &str, depth: usize) -> String {
    format!("{name}{}", ARRAY_SUFFIX.repeat(depth))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_maps_primitives_references_and_arrays() {
        assert_eq!("java/lang/Integer", normalize("I"));
        assert_eq!("java/lang/Void", normalize("V"));
        assert_eq!("java/lang/String", normalize("Ljava/lang/String;"));
        assert_eq!("java/lang/String[][]", normalize("[[Ljava/lang/String;"));
        assert_eq!("java/lang/Long[]", normalize("[J"));
        assert_eq!("com/example/Already", normalize("com/example/Already"));
    }

    #[test]
    fn to_descriptor_reverses_reference_names() {
        assert_eq!("Ljava/lang/String;", to_descriptor("java/lang/String"));
        assert_eq!("[[Lcom/example/A;", to_descriptor("com/example/A[][]"));
        assert_eq!("com/example/A[]", normalize(&to_descriptor("com/example/A[]")));
    }

    #[test]
    fn types_in_scans_method_signature_in_order() {
        let types = types_in("(I[Ljava/lang/String;J)Ljava/util/List;");

        assert_eq!(
            vec![
                "java/lang/Integer",
                "java/lang/String[]",
                "java/lang/Long",
                "java/util/List",
            ],
            types
        );
    }

    #[test]
    fn types_in_yields_one_name_per_reference_encoding() {
        let names = ["com/a/One", "com/b/Two", "com/c/Three", "com/a/One"];
        let signature: String = names.iter().map(|name| format!("L{name};")).collect();

        let types = types_in(&signature);

        assert_eq!(names.to_vec(), types);
        assert!(types.iter().all(|name| !name.contains('[') && !name.contains(';')));
    }

    #[test]
    fn signature_references_are_deduplicated_and_stripped() {
        let references =
            class_references_from_signature("([Ljava/lang/String;Ljava/lang/String;I)V");

        assert_eq!(
            vec!["java/lang/String", "java/lang/Integer", "java/lang/Void"],
            references
        );
    }

    #[test]
    fn annotation_references_require_derive_flag() {
        let annotations: Vec<String> = vec![
            "Lcom/example/Marker;".to_string(),
            "com/example/Other".to_string(),
        ];

        assert!(class_references_from_annotations(&annotations, false).is_empty());
        assert_eq!(
            vec!["com/example/Marker", "com/example/Other"],
            class_references_from_annotations(&annotations, true)
        );
    }

    #[test]
    fn generics_references_drop_type_variables() {
        let references = class_references_from_generics(
            "<T:Ljava/lang/Object;>Ljava/util/Map<TT;[Ljava/lang/Integer;>;",
        );

        assert_eq!(
            vec!["java/lang/Object", "java/util/Map", "java/lang/Integer"],
            references
        );
    }

    #[test]
    fn type_name_folds_both_array_forms() {
        assert_eq!(
            TypeName::Array {
                element: "Ljava/lang/String;",
                depth: 2
            },
            TypeName::parse("[[Ljava/lang/String;")
        );
        assert_eq!(
            TypeName::Array {
                element: "java/lang/String",
                depth: 1
            },
            TypeName::parse("java/lang/String[]")
        );
        assert_eq!("java/lang/String", TypeName::parse("[[Ljava/lang/String;").element_name());
        assert_eq!("java/lang/Integer", TypeName::parse("[I").element_name());
        assert!(!TypeName::parse("java/lang/String").is_array());
    }

    #[test]
    fn primitive_detection_covers_codes_and_boxed_names() {
        assert!(is_primitive("I"));
        assert!(is_primitive("java/lang/Boolean"));
        assert!(!is_primitive("java/lang/String"));
        assert!(!is_primitive("X"));
    }
}
