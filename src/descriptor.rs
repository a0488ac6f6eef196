//! Helpers for JVM type descriptors.
//!
//! Class names inside descriptors are internal names (`net/minecraft/src/Block`),
//! wrapped as `Lnet/minecraft/src/Block;`.

use std::borrow::Cow;

fn is_base_type(encoded_ty: char) -> bool {
    matches!(encoded_ty, 'Z' | 'B' | 'C' | 'S' | 'I' | 'J' | 'F' | 'D')
}

/// Rewrites every class name inside a field or method descriptor.
///
/// `map_class` returns the new internal name of a class, or `None` to keep it.
/// Returns `None` if the descriptor is malformed, and a borrowed value when
/// nothing changed.
///
/// # Examples
///
/// ```
/// let mapped = jarremap::remap_descriptor("(La;[Lb;I)La;", |class| match class {
///     "a" => Some("net/Foo".to_string()),
///     _ => None,
/// });
/// assert_eq!(mapped.as_deref(), Some("(Lnet/Foo;[Lb;I)Lnet/Foo;"));
/// ```
pub fn remap_descriptor<F>(descriptor: &str, mut map_class: F) -> Option<Cow<'_, str>>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out: Option<String> = None;
    let mut rest = descriptor;
    let mut copied = 0;

    while let Some(pos) = rest.find('L') {
        let class_start = descriptor.len() - rest.len() + pos + 1;
        let class_len = descriptor[class_start..].find(';')?;
        let class = &descriptor[class_start..class_start + class_len];
        if class.is_empty() {
            return None;
        }

        if let Some(mapped) = map_class(class) {
            let out = out.get_or_insert_with(|| String::with_capacity(descriptor.len() + 16));
            out.push_str(&descriptor[copied..class_start]);
            out.push_str(&mapped);
            copied = class_start + class_len;
        }
        rest = &descriptor[class_start + class_len + 1..];
    }

    if !only_primitive_tokens(descriptor) {
        return None;
    }

    Some(match out {
        Some(mut out) => {
            out.push_str(&descriptor[copied..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(descriptor),
    })
}

/// Checks that everything outside `L...;` segments is a descriptor token.
fn only_primitive_tokens(descriptor: &str) -> bool {
    let mut chrs = descriptor.chars();
    while let Some(token) = chrs.next() {
        match token {
            'L' => {
                if !chrs.by_ref().any(|c| c == ';') {
                    return false;
                }
            }
            '(' | ')' | '[' | 'V' => {}
            c if is_base_type(c) => {}
            _ => return false,
        }
    }
    true
}

/// Splits a method descriptor into its parameter types and return type.
///
/// # Examples
///
/// ```
/// let (params, ret) = jarremap::parse_method_descriptor("(I[La;J)V").unwrap();
/// assert_eq!(params, vec!["I", "[La;", "J"]);
/// assert_eq!(ret, "V");
/// ```
pub fn parse_method_descriptor(descriptor: &str) -> Option<(Vec<&str>, &str)> {
    let descriptor = descriptor.strip_prefix('(')?;
    let (parameter_types, return_type) = descriptor.split_once(')')?;
    if return_type != "V" && !is_valid_field_descriptor(return_type) {
        return None;
    }

    let mut types = Vec::new();
    let mut first_idx = 0;
    let mut param_chrs = parameter_types.char_indices();
    while let Some((idx, token)) = param_chrs.next() {
        if token == 'L' {
            let mut last_idx = None;
            for (i, c) in param_chrs.by_ref() {
                if c == ';' {
                    last_idx = Some(i);
                    break;
                }
            }
            let last_idx = last_idx?;
            types.push(parameter_types.get(first_idx..last_idx + 1)?);
            first_idx = last_idx + 1;
        } else if token == '[' {
            continue;
        } else if is_base_type(token) {
            types.push(parameter_types.get(first_idx..idx + 1)?);
            first_idx = idx + 1;
        } else {
            return None;
        }
    }
    if first_idx != parameter_types.len() {
        // dangling array prefix
        return None;
    }

    Some((types, return_type))
}

/// Whether `descriptor` is exactly one field type.
pub fn is_valid_field_descriptor(descriptor: &str) -> bool {
    let element = descriptor.trim_start_matches('[');
    let mut chrs = element.chars();
    match chrs.next() {
        Some('L') => {
            let class = &element[1..];
            class.len() > 1 && class.find(';') == Some(class.len() - 1)
        }
        Some(c) if is_base_type(c) => chrs.next().is_none(),
        _ => false,
    }
}

/// Rewrites the name stored in a `CONSTANT_Class` entry.
///
/// These hold plain internal names, except for array classes which hold a
/// field descriptor (`[Lnet/Foo;`).
pub(crate) fn remap_class_reference<F>(name: &str, mut map_class: F) -> Option<Cow<'_, str>>
where
    F: FnMut(&str) -> Option<String>,
{
    if name.starts_with('[') {
        remap_descriptor(name, map_class)
    } else {
        Some(match map_class(name) {
            Some(mapped) => Cow::Owned(mapped),
            None => Cow::Borrowed(name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(class: &str) -> Option<String> {
        match class {
            "a" => Some("net/minecraft/src/Block".into()),
            "b" => Some("net/minecraft/src/World".into()),
            _ => None,
        }
    }

    #[test]
    fn test_remap_descriptor() {
        let tests = HashMap::from([
            ("I", "I"),
            ("[[J", "[[J"),
            ("La;", "Lnet/minecraft/src/Block;"),
            ("[La;", "[Lnet/minecraft/src/Block;"),
            ("Ljava/lang/String;", "Ljava/lang/String;"),
            (
                "(Lb;IIILa;)V",
                "(Lnet/minecraft/src/World;IIILnet/minecraft/src/Block;)V",
            ),
            ("()La;", "()Lnet/minecraft/src/Block;"),
            // class names that only start with a mapped name are left alone
            ("Lab;", "Lab;"),
        ]);

        for (descriptor, expected) in tests {
            assert_eq!(
                remap_descriptor(descriptor, lookup).as_deref(),
                Some(expected),
                "{descriptor}"
            );
        }
    }

    #[test]
    fn test_remap_descriptor_borrowed_when_unchanged() {
        let mapped = remap_descriptor("(Ljava/lang/Object;)V", lookup).unwrap();
        assert!(matches!(mapped, Cow::Borrowed(_)));
    }

    #[test]
    fn test_remap_descriptor_invalid() {
        for descriptor in ["La", "L;", "(Q)V", "Lfoo"] {
            assert!(remap_descriptor(descriptor, lookup).is_none(), "{descriptor}");
        }
    }

    #[test]
    fn test_parse_method_descriptor() {
        let (params, ret) = parse_method_descriptor("(Ljava/lang/String;[[IZ)La;").unwrap();
        assert_eq!(params, vec!["Ljava/lang/String;", "[[I", "Z"]);
        assert_eq!(ret, "La;");

        let (params, ret) = parse_method_descriptor("()V").unwrap();
        assert!(params.is_empty());
        assert_eq!(ret, "V");

        for invalid in ["", "()", "(L)V", "(I", "([)V", "(I)Q"] {
            assert!(parse_method_descriptor(invalid).is_none(), "{invalid}");
        }
    }

    #[test]
    fn test_field_descriptor() {
        assert!(is_valid_field_descriptor("I"));
        assert!(is_valid_field_descriptor("[[La;"));
        assert!(!is_valid_field_descriptor("V"));
        assert!(!is_valid_field_descriptor("II"));
        assert!(!is_valid_field_descriptor("L;"));
        assert!(!is_valid_field_descriptor("La;I"));
    }

    #[test]
    fn test_remap_class_reference() {
        assert_eq!(
            remap_class_reference("a", lookup).as_deref(),
            Some("net/minecraft/src/Block")
        );
        assert_eq!(
            remap_class_reference("[[La;", lookup).as_deref(),
            Some("[[Lnet/minecraft/src/Block;")
        );
        assert_eq!(remap_class_reference("c", lookup).as_deref(), Some("c"));
    }
}
