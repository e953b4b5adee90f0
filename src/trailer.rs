//! Byte-level splice of a private annex after the plan's trailer marker.
//!
//! The annex lives outside the parsed dataset, so it is attached to the
//! written file bytes instead of going through the record model.

use crate::{enums::OutputKind, plan_io::PlanIo};

use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

/// Approval status value that anchors the annex.
pub const APPROVED_MARKER: &[u8; 8] = b"APPROVED";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("marker {marker:?} not found in {searched} bytes")]
pub struct MarkerNotFoundError {
    pub marker: String,
    pub searched: usize,
}

#[derive(Debug, Error)]
pub enum TrailerError {
    #[error(transparent)]
    MarkerNotFound(#[from] MarkerNotFoundError),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Offset of the last occurrence of `marker` in `bytes`.
pub fn find_last(bytes: &[u8], marker: &[u8]) -> Option<usize> {
    if marker.is_empty() || marker.len() > bytes.len() {
        return None;
    }
    bytes.windows(marker.len()).rposition(|window| window == marker)
}

/// Keep `file_bytes` up to and including the last `marker`, drop whatever
/// followed it, and append `payload`.
pub fn append_after_marker(
    file_bytes: &[u8],
    marker: &[u8],
    payload: &[u8],
) -> Result<Vec<u8>, MarkerNotFoundError> {
    let start = find_last(file_bytes, marker).ok_or_else(|| MarkerNotFoundError {
        marker: String::from_utf8_lossy(marker).into_owned(),
        searched: file_bytes.len(),
    })?;
    let end = start + marker.len();

    let mut out = Vec::with_capacity(end + payload.len());
    out.extend_from_slice(&file_bytes[..end]);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Splice `annex` after the `APPROVED` marker of the plan file at `plan_path`
/// and write the result next to it with the `_private` suffix.
///
/// Nothing is written when the marker cannot be found.
pub fn patch_file(plan_path: &Path, annex: &[u8]) -> Result<PathBuf, TrailerError> {
    let bytes = fs::read(plan_path).map_err(|source| TrailerError::Read {
        path: plan_path.to_path_buf(),
        source,
    })?;
    let patched = append_after_marker(&bytes, APPROVED_MARKER, annex)?;

    let output = PlanIo::output_path(plan_path, OutputKind::Private);
    fs::write(&output, &patched).map_err(|source| TrailerError::Write {
        path: output.clone(),
        source,
    })?;
    info!(
        output = %output.display(),
        dropped = bytes.len() + annex.len() - patched.len(),
        annex = annex.len(),
        "appended private annex"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_bytes_after_marker_are_replaced() {
        let out = append_after_marker(b"headerAPPROVEDXYZ", APPROVED_MARKER, b"P").unwrap();
        assert_eq!(out, b"headerAPPROVEDP");
    }

    #[test]
    fn marker_at_end_just_appends() {
        let out = append_after_marker(b"..APPROVED", APPROVED_MARKER, b"<xml/>").unwrap();
        assert_eq!(out, b"..APPROVED<xml/>");
    }

    #[test]
    fn last_occurrence_wins() {
        let out = append_after_marker(b"APPROVED-mid-APPROVED-tail", APPROVED_MARKER, b"!").unwrap();
        assert_eq!(out, b"APPROVED-mid-APPROVED!");
    }

    #[test]
    fn missing_marker_is_an_error() {
        let err = append_after_marker(b"UNAPPROVE", APPROVED_MARKER, b"P").unwrap_err();
        assert_eq!(
            err,
            MarkerNotFoundError {
                marker: "APPROVED".into(),
                searched: 9
            }
        );
    }

    #[test]
    fn works_for_any_marker_length() {
        assert_eq!(append_after_marker(b"a|b|c", b"|", b"Z").unwrap(), b"a|b|Z");
        assert!(append_after_marker(b"abc", b"", b"Z").is_err());
        assert!(append_after_marker(b"ab", b"abc", b"Z").is_err());
    }

    #[test]
    fn patch_file_writes_private_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("plan_mod.dcm");
        fs::write(&plan, b"\x00\x01APPROVED\x00\x00").unwrap();

        let output = patch_file(&plan, b"<annex/>").unwrap();

        assert_eq!(output, dir.path().join("plan_mod_private.dcm"));
        assert_eq!(fs::read(&output).unwrap(), b"\x00\x01APPROVED<annex/>");
    }

    #[test]
    fn patch_file_without_marker_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("plan.dcm");
        fs::write(&plan, b"no marker here").unwrap();

        let err = patch_file(&plan, b"<annex/>").unwrap_err();

        assert!(matches!(err, TrailerError::MarkerNotFound(_)));
        assert!(!dir.path().join("plan_private.dcm").exists());
    }
}
