//! Conversion between the host's newline-delimited path-list strings and
//! ordered lists of entries.
//!
//! A mapping list stores one `LOCAL#REMOTE` pair per line, a single list
//! stores one bare path per line. Decoding always yields at least one
//! entry so an editor always has an insertion point.

use rmcp::schemars;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{PathListError, StrmHelperError, StrmHelperResult};

const PAIR_DELIMITER: char = '#';

/// Shape of the lines held by a path-list field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PathListKind {
    /// `LOCAL#REMOTE` per line
    Mapping,
    /// One bare path per line
    Single,
}

/// A local filesystem path paired with a remote (cloud) path
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(default, deny_unknown_fields)]
pub struct PathPair {
    pub local: String,
    pub remote: String,
}

impl PathPair {
    pub fn new(local: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
        }
    }
}

/// A single path, used by exclusion and transfer lists
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(default, deny_unknown_fields)]
pub struct ExcludePathEntry {
    pub path: String,
}

impl ExcludePathEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// One line of a path list.
pub trait PathListEntry: Sized + Default {
    const KIND: PathListKind;

    fn from_line(line: &str) -> Self;

    /// Render the entry trimmed; `None` when it carries nothing.
    fn to_line(&self) -> Option<String>;
}

impl PathListEntry for PathPair {
    const KIND: PathListKind = PathListKind::Mapping;

    fn from_line(line: &str) -> Self {
        match line.split_once(PAIR_DELIMITER) {
            Some((local, remote)) => Self::new(local, remote),
            None => Self::new(line, ""),
        }
    }

    fn to_line(&self) -> Option<String> {
        let line = format!("{}{}{}", self.local.trim(), PAIR_DELIMITER, self.remote.trim());
        (line.len() > 1).then_some(line)
    }
}

impl PathListEntry for ExcludePathEntry {
    const KIND: PathListKind = PathListKind::Single;

    fn from_line(line: &str) -> Self {
        Self::new(line)
    }

    fn to_line(&self) -> Option<String> {
        let path = self.path.trim();
        (!path.is_empty()).then(|| path.to_string())
    }
}

/// Decode a path-list string. Blank lines are dropped; an empty result
/// becomes a single placeholder entry.
pub fn decode<E: PathListEntry>(text: &str) -> Vec<E> {
    let entries: Vec<E> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(E::from_line)
        .collect();

    if entries.is_empty() {
        placeholder()
    } else {
        entries
    }
}

/// Decode raw bytes, falling back to the placeholder list when they are
/// not valid UTF-8.
pub fn decode_bytes<E: PathListEntry>(bytes: &[u8]) -> Vec<E> {
    match try_decode_bytes(bytes) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(kind = ?E::KIND, error = %e, "Failed to decode path list, using placeholder");
            placeholder()
        }
    }
}

fn try_decode_bytes<E: PathListEntry>(bytes: &[u8]) -> Result<Vec<E>, PathListError> {
    let text = std::str::from_utf8(bytes)?;
    Ok(decode(text))
}

/// Encode entries back into the host's string form.
pub fn encode<E: PathListEntry>(entries: &[E]) -> String {
    entries
        .iter()
        .filter_map(|entry| entry.to_line())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The list handed to an editor when there is nothing to show.
pub fn placeholder<E: PathListEntry>() -> Vec<E> {
    vec![E::default()]
}

/// A decoded entry of either kind, for callers that pick the kind at runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(untagged)]
pub enum PathEntry {
    Pair(PathPair),
    Path(ExcludePathEntry),
}

/// Decode `text` as a list of `kind` entries.
pub fn decode_entries(text: &str, kind: PathListKind) -> Vec<PathEntry> {
    match kind {
        PathListKind::Mapping => decode::<PathPair>(text)
            .into_iter()
            .map(PathEntry::Pair)
            .collect(),
        PathListKind::Single => decode::<ExcludePathEntry>(text)
            .into_iter()
            .map(PathEntry::Path)
            .collect(),
    }
}

/// Encode `entries` as a `kind` list. Every entry must match `kind`.
pub fn encode_entries(entries: &[PathEntry], kind: PathListKind) -> StrmHelperResult<String> {
    match kind {
        PathListKind::Mapping => {
            let pairs = entries
                .iter()
                .map(|entry| match entry {
                    PathEntry::Pair(pair) => Ok(pair.clone()),
                    PathEntry::Path(entry) => Err(mismatch(&entry.path, kind)),
                })
                .collect::<StrmHelperResult<Vec<_>>>()?;
            Ok(encode(&pairs))
        }
        PathListKind::Single => {
            let paths = entries
                .iter()
                .map(|entry| match entry {
                    PathEntry::Path(entry) => Ok(entry.clone()),
                    PathEntry::Pair(pair) => Err(mismatch(&pair.local, kind)),
                })
                .collect::<StrmHelperResult<Vec<_>>>()?;
            Ok(encode(&paths))
        }
    }
}

fn mismatch(value: &str, kind: PathListKind) -> StrmHelperError {
    let expected = match kind {
        PathListKind::Mapping => "{local, remote}",
        PathListKind::Single => "{path}",
    };
    StrmHelperError::validation(
        "entries",
        format!("entry `{value}` does not match the {expected} shape of a {kind:?} list"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<PathPair> {
        items.iter().map(|(l, r)| PathPair::new(*l, *r)).collect()
    }

    #[test]
    fn test_decode_empty_yields_placeholder() {
        assert_eq!(decode::<PathPair>(""), vec![PathPair::default()]);
        assert_eq!(
            decode::<ExcludePathEntry>(""),
            vec![ExcludePathEntry::default()]
        );
    }

    #[test]
    fn test_decode_only_blank_lines_yields_placeholder() {
        assert_eq!(decode::<PathPair>("\n  \n\t\n"), vec![PathPair::default()]);
    }

    #[test]
    fn test_decode_mapping_lines() {
        assert_eq!(
            decode::<PathPair>("a#b\nc#d"),
            pairs(&[("a", "b"), ("c", "d")])
        );
    }

    #[test]
    fn test_decode_mapping_splits_on_first_delimiter() {
        assert_eq!(
            decode::<PathPair>("/media/tv#/115/tv#extra"),
            pairs(&[("/media/tv", "/115/tv#extra")])
        );
    }

    #[test]
    fn test_decode_mapping_without_delimiter_has_empty_remote() {
        assert_eq!(decode::<PathPair>("/media/tv"), pairs(&[("/media/tv", "")]));
    }

    #[test]
    fn test_decode_single_lines() {
        assert_eq!(
            decode::<ExcludePathEntry>("/x\n/y"),
            vec![ExcludePathEntry::new("/x"), ExcludePathEntry::new("/y")]
        );
    }

    #[test]
    fn test_decode_handles_crlf() {
        assert_eq!(
            decode::<PathPair>("a#b\r\n\r\nc#d\r\n"),
            pairs(&[("a", "b"), ("c", "d")])
        );
    }

    #[test]
    fn test_decode_bytes_invalid_utf8_yields_placeholder() {
        let bytes = [b'/', b'a', 0xff, 0xfe, b'#', b'b'];
        assert_eq!(decode_bytes::<PathPair>(&bytes), vec![PathPair::default()]);
    }

    #[test]
    fn test_decode_bytes_valid_utf8() {
        assert_eq!(
            decode_bytes::<ExcludePathEntry>("/电影\n/剧集".as_bytes()),
            vec![ExcludePathEntry::new("/电影"), ExcludePathEntry::new("/剧集")]
        );
    }

    #[test]
    fn test_encode_placeholder_is_empty() {
        assert_eq!(encode(&[PathPair::default()]), "");
        assert_eq!(encode(&[ExcludePathEntry::default()]), "");
    }

    #[test]
    fn test_encode_trims_and_drops_blank_entries() {
        let entries = vec![
            PathPair::new("  /media/movies ", " /115/movies"),
            PathPair::new("   ", ""),
            PathPair::new("/media/tv", ""),
            PathPair::new("", "/115/anime"),
        ];
        assert_eq!(
            encode(&entries),
            "/media/movies#/115/movies\n/media/tv#\n#/115/anime"
        );
    }

    #[test]
    fn test_encode_single_drops_empty_paths() {
        let entries = vec![
            ExcludePathEntry::new(" /tmp "),
            ExcludePathEntry::new(""),
            ExcludePathEntry::new("/cache"),
        ];
        assert_eq!(encode(&entries), "/tmp\n/cache");
    }

    #[test]
    fn test_round_trip_well_formed_mapping() {
        let list = pairs(&[
            ("/media/movies", "/115/movies"),
            ("/media/tv", "/115/tv"),
            ("/media/anime", "/115/anime"),
        ]);
        assert_eq!(decode::<PathPair>(&encode(&list)), list);
    }

    #[test]
    fn test_round_trip_well_formed_single() {
        let list = vec![ExcludePathEntry::new("/a"), ExcludePathEntry::new("/b")];
        assert_eq!(decode::<ExcludePathEntry>(&encode(&list)), list);
    }

    #[test]
    fn test_reencode_normalizes_noise() {
        let text = "a#b\n\n   \nc\n";
        assert_eq!(encode(&decode::<PathPair>(text)), "a#b\nc#");
    }

    #[test]
    fn test_decode_entries_by_kind() {
        assert_eq!(
            decode_entries("a#b", PathListKind::Mapping),
            vec![PathEntry::Pair(PathPair::new("a", "b"))]
        );
        assert_eq!(
            decode_entries("a#b", PathListKind::Single),
            vec![PathEntry::Path(ExcludePathEntry::new("a#b"))]
        );
    }

    #[test]
    fn test_encode_entries_rejects_mismatched_shape() {
        let entries = vec![PathEntry::Path(ExcludePathEntry::new("/x"))];
        let result = encode_entries(&entries, PathListKind::Mapping);
        assert!(matches!(result, Err(StrmHelperError::Validation { .. })));
    }

    #[test]
    fn test_path_entry_untagged_deserialization() {
        let entries: Vec<PathEntry> =
            serde_json::from_str(r#"[{"local": "/a", "remote": "/b"}, {"path": "/c"}]"#).unwrap();
        assert_eq!(
            entries,
            vec![
                PathEntry::Pair(PathPair::new("/a", "/b")),
                PathEntry::Path(ExcludePathEntry::new("/c")),
            ]
        );
    }

    #[test]
    fn test_entries_accept_missing_sides() {
        let entries: Vec<PathEntry> =
            serde_json::from_str(r#"[{"local": "/a"}, {"remote": "/b"}, {"path": "/c"}]"#)
                .unwrap();
        assert_eq!(
            entries,
            vec![
                PathEntry::Pair(PathPair::new("/a", "")),
                PathEntry::Pair(PathPair::new("", "/b")),
                PathEntry::Path(ExcludePathEntry::new("/c")),
            ]
        );
    }
}
