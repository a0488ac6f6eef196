//! A Parser for symbol mapping tables.
//!
//! Two line grammars are understood, selected through [`MappingSyntax`]:
//!
//! - [`MappingSyntax::Srg`], the MCP convention:
//!   `CL: a net/minecraft/src/Block`,
//!   `FD: a/b net/minecraft/src/Block/field_71990_ca`,
//!   `MD: a/c (I)La; net/minecraft/src/Block/func_71899_b (I)Lnet/minecraft/src/Block;`
//! - [`MappingSyntax::Columns`], one whitespace separated rule per line:
//!   `TYPE OLD_OWNER OLD_NAME [DESCRIPTOR] NEW_NAME`.
//!
//! Blank lines and lines starting with `#` are skipped by both.

use std::fmt;
use std::str;

use serde::{Deserialize, Serialize};

/// Error when parsing a mapping line.
///
/// Since the mapping is parsed line-by-line, an error will also contain
/// the offending line and its 1-based line number.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ParseError<'s> {
    line: &'s [u8],
    line_number: usize,
    kind: ParseErrorKind,
}

impl<'s> ParseError<'s> {
    /// The offending line that caused the error.
    pub fn line(&self) -> &'s [u8] {
        self.line
    }

    /// The 1-based line number of the offending line.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// The specific parse Error.
    pub fn kind(&self) -> ParseErrorKind {
        self.kind
    }
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParseErrorKind::Utf8Error(e) => e.fmt(f),
            ParseErrorKind::ParseError(d) => d.fmt(f),
        }
    }
}

impl std::error::Error for ParseError<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind {
            ParseErrorKind::Utf8Error(ref e) => Some(e),
            ParseErrorKind::ParseError(_) => None,
        }
    }
}

/// The specific parse Error.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParseErrorKind {
    /// The line failed utf-8 conversion.
    Utf8Error(str::Utf8Error),
    /// The line failed parsing.
    ParseError(&'static str),
}

/// The line grammar of a mapping table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSyntax {
    /// `CL:`/`FD:`/`MD:`/`PK:` lines as written by MCP.
    #[default]
    Srg,
    /// `TYPE OLD_OWNER OLD_NAME [DESCRIPTOR] NEW_NAME` lines.
    Columns,
}

/// A single rename rule as written in a mapping table.
///
/// All names are internal (slash separated) names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MappingRecord<'s> {
    /// A Package Mapping.
    Package {
        /// Original package name.
        original: &'s str,
        /// Renamed package name.
        renamed: &'s str,
    },
    /// A Class Mapping.
    Class {
        /// Original name of the class.
        original: &'s str,
        /// Renamed name of the class.
        renamed: &'s str,
    },
    /// A Field Mapping.
    Field {
        /// Original owner of the field.
        owner: &'s str,
        /// Original name of the field.
        original: &'s str,
        /// Renamed name of the field.
        renamed: &'s str,
    },
    /// A Method Mapping.
    Method {
        /// Original owner of the method.
        owner: &'s str,
        /// Original name of the method.
        original: &'s str,
        /// Original descriptor of the method.
        descriptor: &'s str,
        /// Renamed name of the method.
        renamed: &'s str,
    },
}

impl<'s> MappingRecord<'s> {
    /// Parses a single line of a mapping table.
    ///
    /// # Examples
    ///
    /// ```
    /// use jarremap::{MappingRecord, MappingSyntax};
    ///
    /// let parsed = MappingRecord::try_parse(
    ///     b"MD: a/c (I)V net/minecraft/src/Block/func_71899_b (I)V",
    ///     MappingSyntax::Srg,
    /// );
    /// assert_eq!(
    ///     parsed,
    ///     Ok(MappingRecord::Method {
    ///         owner: "a",
    ///         original: "c",
    ///         descriptor: "(I)V",
    ///         renamed: "func_71899_b",
    ///     })
    /// );
    ///
    /// let parsed = MappingRecord::try_parse(b"FD a b field_1", MappingSyntax::Columns);
    /// assert_eq!(
    ///     parsed,
    ///     Ok(MappingRecord::Field {
    ///         owner: "a",
    ///         original: "b",
    ///         renamed: "field_1",
    ///     })
    /// );
    /// ```
    pub fn try_parse(line: &'s [u8], syntax: MappingSyntax) -> Result<Self, ParseError<'s>> {
        parse_mapping_record(line, 1, syntax)
    }
}

/// Summary of a mapping table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MappingSummary {
    package_count: usize,
    class_count: usize,
    field_count: usize,
    method_count: usize,
    error_count: usize,
}

impl MappingSummary {
    fn new(mapping: &MappingSource<'_>) -> Self {
        let mut summary = Self::default();
        for record in mapping.iter() {
            match record {
                Ok(MappingRecord::Package { .. }) => summary.package_count += 1,
                Ok(MappingRecord::Class { .. }) => summary.class_count += 1,
                Ok(MappingRecord::Field { .. }) => summary.field_count += 1,
                Ok(MappingRecord::Method { .. }) => summary.method_count += 1,
                Err(_) => summary.error_count += 1,
            }
        }
        summary
    }

    /// Returns the number of package lines.
    pub fn package_count(&self) -> usize {
        self.package_count
    }

    /// Returns the number of class lines.
    pub fn class_count(&self) -> usize {
        self.class_count
    }

    /// Returns the number of field lines.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Returns the number of method lines.
    pub fn method_count(&self) -> usize {
        self.method_count
    }

    /// Returns the number of lines that failed to parse.
    pub fn error_count(&self) -> usize {
        self.error_count
    }
}

/// The raw contents of one mapping table file.
#[derive(Clone, Default)]
pub struct MappingSource<'s> {
    source: &'s [u8],
    syntax: MappingSyntax,
}

impl fmt::Debug for MappingSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingSource")
            .field("syntax", &self.syntax)
            .finish()
    }
}

impl<'s> MappingSource<'s> {
    /// Create a new mapping source using the given line grammar.
    pub fn new(source: &'s [u8], syntax: MappingSyntax) -> Self {
        Self { source, syntax }
    }

    /// The line grammar this source is parsed with.
    pub fn syntax(&self) -> MappingSyntax {
        self.syntax
    }

    /// Whether the source looks like a mapping table in its grammar.
    ///
    /// Only the first 50 rule lines are inspected.
    ///
    /// # Examples
    ///
    /// ```
    /// use jarremap::{MappingSource, MappingSyntax};
    ///
    /// let valid = MappingSource::new(b"CL: a net/minecraft/src/Block", MappingSyntax::Srg);
    /// assert!(valid.is_valid());
    ///
    /// let invalid = MappingSource::new(b"a -> b:", MappingSyntax::Srg);
    /// assert!(!invalid.is_valid());
    /// ```
    pub fn is_valid(&self) -> bool {
        let mut seen_rule = false;
        for record in self.iter().take(50) {
            match record {
                Ok(_) => seen_rule = true,
                Err(_) => return false,
            }
        }
        seen_rule
    }

    /// Returns a summary of the file.
    pub fn summary(&self) -> MappingSummary {
        MappingSummary::new(self)
    }

    /// Create an Iterator over [`MappingRecord`]s.
    pub fn iter(&self) -> MappingRecordIter<'s> {
        MappingRecordIter {
            slice: self.source,
            syntax: self.syntax,
            line_number: 0,
        }
    }
}

/// An Iterator yielding [`MappingRecord`]s, created by [`MappingSource::iter`].
///
/// Blank lines and comments are skipped.
#[derive(Clone, Default)]
pub struct MappingRecordIter<'s> {
    slice: &'s [u8],
    syntax: MappingSyntax,
    line_number: usize,
}

impl fmt::Debug for MappingRecordIter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingRecordIter")
            .field("line_number", &self.line_number)
            .finish()
    }
}

impl<'s> Iterator for MappingRecordIter<'s> {
    type Item = Result<MappingRecord<'s>, ParseError<'s>>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.slice.is_empty() {
            let (line, rest) = split_line(self.slice);
            self.slice = rest;
            self.line_number += 1;

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() || trimmed.starts_with(b"#") {
                continue;
            }
            return Some(parse_mapping_record(trimmed, self.line_number, self.syntax));
        }
        None
    }
}

fn parse_mapping_record(
    line: &[u8],
    line_number: usize,
    syntax: MappingSyntax,
) -> Result<MappingRecord<'_>, ParseError<'_>> {
    let text = str::from_utf8(line).map_err(|err| ParseError {
        line,
        line_number,
        kind: ParseErrorKind::Utf8Error(err),
    })?;

    let result = match syntax {
        MappingSyntax::Srg => parse_srg_record(text.trim()),
        MappingSyntax::Columns => parse_columns_record(text.trim()),
    };

    result.map_err(|message| ParseError {
        line,
        line_number,
        kind: ParseErrorKind::ParseError(message),
    })
}

/// Parses a single SRG line.
fn parse_srg_record(line: &str) -> Result<MappingRecord<'_>, &'static str> {
    // `packaged.srg` tags lines with a trailing ` #C` or ` #S` side marker
    let line = match line.find(" #") {
        Some(pos) => &line[..pos],
        None => line,
    };
    let (tag, rest) = line
        .split_once(':')
        .ok_or("line is missing a record tag")?;
    let tokens = collect_tokens::<4>(rest)?;

    match (tag.trim(), tokens.as_slice()) {
        ("PK", &[original, renamed]) => Ok(MappingRecord::Package {
            original: normalize_package(original),
            renamed: normalize_package(renamed),
        }),
        ("CL", &[original, renamed]) => Ok(MappingRecord::Class { original, renamed }),
        ("FD", &[original, renamed]) => {
            let (owner, original) = split_member(original)?;
            let (_, renamed) = split_member(renamed)?;
            Ok(MappingRecord::Field {
                owner,
                original,
                renamed,
            })
        }
        ("MD", &[original, descriptor, renamed, _renamed_descriptor]) => {
            let (owner, original) = split_member(original)?;
            let (_, renamed) = split_member(renamed)?;
            Ok(MappingRecord::Method {
                owner,
                original,
                descriptor,
                renamed,
            })
        }
        ("PK" | "CL" | "FD" | "MD", _) => Err("unexpected number of tokens"),
        _ => Err("unknown record tag"),
    }
}

/// Parses a single `TYPE OLD_OWNER OLD_NAME [DESCRIPTOR] NEW_NAME` line.
fn parse_columns_record(line: &str) -> Result<MappingRecord<'_>, &'static str> {
    let tokens = collect_tokens::<5>(line)?;

    match tokens.as_slice() {
        &["PK", original, renamed] => Ok(MappingRecord::Package {
            original: normalize_package(original),
            renamed: normalize_package(renamed),
        }),
        &["CL", original, renamed] => Ok(MappingRecord::Class { original, renamed }),
        &["FD", owner, original, renamed] => Ok(MappingRecord::Field {
            owner,
            original,
            renamed,
        }),
        &["MD", owner, original, descriptor, renamed] => Ok(MappingRecord::Method {
            owner,
            original,
            descriptor,
            renamed,
        }),
        &["PK" | "CL" | "FD" | "MD", ..] => Err("unexpected number of tokens"),
        _ => Err("unknown record tag"),
    }
}

/// Splits on whitespace, failing once more than `N` tokens are seen.
fn collect_tokens<const N: usize>(line: &str) -> Result<Vec<&str>, &'static str> {
    let mut tokens = Vec::with_capacity(N);
    for token in line.split_whitespace() {
        if tokens.len() == N {
            return Err("unexpected number of tokens");
        }
        tokens.push(token);
    }
    Ok(tokens)
}

/// Splits `owner/name` into its owner and member name.
fn split_member(qualified: &str) -> Result<(&str, &str), &'static str> {
    match qualified.rsplit_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok((owner, name)),
        _ => Err("member is not qualified with its owner"),
    }
}

/// MCP writes the default package as `.`.
fn normalize_package(package: &str) -> &str {
    if package == "." {
        ""
    } else {
        package.trim_end_matches('/')
    }
}

fn split_line(bytes: &[u8]) -> (&[u8], &[u8]) {
    match bytes.iter().position(|c| *c == b'\n') {
        Some(pos) => (&bytes[..pos], &bytes[pos + 1..]),
        None => (bytes, &[] as &[u8]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_parse_srg_class() {
        let parsed = MappingRecord::try_parse(b"CL: a net/minecraft/src/Block", MappingSyntax::Srg);
        assert_eq!(
            parsed,
            Ok(MappingRecord::Class {
                original: "a",
                renamed: "net/minecraft/src/Block",
            })
        );
    }

    #[test]
    fn try_parse_srg_package_default() {
        let parsed = MappingRecord::try_parse(b"PK: . net/minecraft/src", MappingSyntax::Srg);
        assert_eq!(
            parsed,
            Ok(MappingRecord::Package {
                original: "",
                renamed: "net/minecraft/src",
            })
        );
    }

    #[test]
    fn try_parse_srg_field() {
        let parsed = MappingRecord::try_parse(
            b"FD: a/b net/minecraft/src/Block/field_71990_ca",
            MappingSyntax::Srg,
        );
        assert_eq!(
            parsed,
            Ok(MappingRecord::Field {
                owner: "a",
                original: "b",
                renamed: "field_71990_ca",
            })
        );
    }

    #[test]
    fn try_parse_srg_nested_owner() {
        let parsed =
            MappingRecord::try_parse(b"FD: a/b/c net/Foo/field_1", MappingSyntax::Srg);
        assert_eq!(
            parsed,
            Ok(MappingRecord::Field {
                owner: "a/b",
                original: "c",
                renamed: "field_1",
            })
        );
    }

    #[test]
    fn try_parse_srg_side_marker() {
        let parsed = MappingRecord::try_parse(b"CL: a net/Foo #C", MappingSyntax::Srg);
        assert_eq!(
            parsed,
            Ok(MappingRecord::Class {
                original: "a",
                renamed: "net/Foo",
            })
        );
    }

    #[test]
    fn try_parse_srg_method_missing_descriptor() {
        let parsed = MappingRecord::try_parse(b"MD: a/b (I)V net/Foo/func_1", MappingSyntax::Srg);
        assert_eq!(
            parsed.unwrap_err().kind(),
            ParseErrorKind::ParseError("unexpected number of tokens")
        );
    }

    #[test]
    fn try_parse_srg_unqualified_field() {
        let parsed = MappingRecord::try_parse(b"FD: b field_1", MappingSyntax::Srg);
        assert!(parsed.is_err());
    }

    #[test]
    fn try_parse_srg_unknown_tag() {
        let parsed = MappingRecord::try_parse(b"XX: a b", MappingSyntax::Srg);
        assert_eq!(
            parsed.unwrap_err().kind(),
            ParseErrorKind::ParseError("unknown record tag")
        );
    }

    #[test]
    fn try_parse_columns_method() {
        let parsed = MappingRecord::try_parse(b"MD a foo (La;)V bar", MappingSyntax::Columns);
        assert_eq!(
            parsed,
            Ok(MappingRecord::Method {
                owner: "a",
                original: "foo",
                descriptor: "(La;)V",
                renamed: "bar",
            })
        );
    }

    #[test]
    fn try_parse_columns_too_many_tokens() {
        let parsed = MappingRecord::try_parse(b"CL a b c", MappingSyntax::Columns);
        assert!(parsed.is_err());
    }

    #[test]
    fn iter_skips_blank_and_comment_lines() {
        let source = b"# header\n\nCL: a Foo\r\n   \n# trailing\nCL: b Bar\n";
        let mapping = MappingSource::new(source, MappingSyntax::Srg);
        let records: Vec<_> = mapping.iter().collect();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(Result::is_ok));
    }

    #[test]
    fn iter_reports_line_numbers() {
        let source = b"CL: a Foo\n\nFD: broken\n";
        let mapping = MappingSource::new(source, MappingSyntax::Srg);
        let error = mapping.iter().find_map(Result::err).unwrap();
        assert_eq!(error.line_number(), 3);
        assert_eq!(error.line(), b"FD: broken");
    }

    #[test]
    fn summary_counts_records() {
        let source = b"PK: . net\nCL: a Foo\nFD: a/b Foo/c\nMD: a/d ()V Foo/e ()V\nbogus\n";
        let summary = MappingSource::new(source, MappingSyntax::Srg).summary();
        assert_eq!(summary.package_count(), 1);
        assert_eq!(summary.class_count(), 1);
        assert_eq!(summary.field_count(), 1);
        assert_eq!(summary.method_count(), 1);
        assert_eq!(summary.error_count(), 1);
    }
}
