use crate::{
    enums::{BareSyntax, Encoding, OutputKind},
    record::Plan,
};

use dicom::{
    encoding::TransferSyntax,
    object::{FileMetaTableBuilder, InMemDicomObject, from_reader},
    transfer_syntax::entries::{EXPLICIT_VR_LITTLE_ENDIAN, IMPLICIT_VR_LITTLE_ENDIAN},
};
use dicom_dictionary_std::{tags, uids};
use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const RT_PLAN_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.481.5";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("empty input")]
    Empty,

    #[error("not a readable DICOM record: {0}")]
    Malformed(String),

    #[error("could not build file meta group: {0}")]
    Meta(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM read error: {0}")]
    Read(#[from] dicom::object::ReadError),

    #[error("DICOM write error: {0}")]
    Write(#[from] dicom::object::WriteError),
}

pub struct PlanIo;

impl PlanIo {
    /// Decode a plan from the bytes of a file.
    ///
    /// Accepts a standard file (preamble, `DICM`, meta group), a file without
    /// preamble, and as a last resort a bare Implicit or Explicit VR Little
    /// Endian dataset.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError`] if none of these layouts can be decoded
    pub fn deserialize(bytes: &[u8]) -> Result<Plan, FormatError> {
        if bytes.is_empty() {
            return Err(FormatError::Empty);
        }

        if bytes.len() >= PREAMBLE_LEN + MAGIC.len()
            && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
        {
            let object = from_reader(Cursor::new(bytes[PREAMBLE_LEN..].to_vec()))?;
            let preamble = bytes[..PREAMBLE_LEN].to_vec();
            return Ok(Plan::from_parts(object, Encoding::Preamble(preamble)));
        }

        if bytes.starts_with(MAGIC) {
            let object = from_reader(Cursor::new(bytes.to_vec()))?;
            return Ok(Plan::from_parts(object, Encoding::MetaOnly));
        }

        warn!("no DICOM file header found, reading as bare little endian dataset");
        Self::read_bare(bytes)
    }

    fn read_bare(bytes: &[u8]) -> Result<Plan, FormatError> {
        // explicit VR puts the two-letter VR right after the first tag
        let looks_explicit = bytes
            .get(4..6)
            .is_some_and(|vr| vr.iter().all(u8::is_ascii_uppercase));
        let candidates = if looks_explicit {
            [BareSyntax::ExplicitVrLittleEndian, BareSyntax::ImplicitVrLittleEndian]
        } else {
            [BareSyntax::ImplicitVrLittleEndian, BareSyntax::ExplicitVrLittleEndian]
        };

        let mut last_error = None;
        for syntax in candidates {
            match Self::read_bare_with(bytes, syntax) {
                Ok(dataset) => {
                    debug!(transfer_syntax = syntax.uid(), "read bare dataset");
                    return Self::with_meta(dataset, syntax.uid(), Encoding::Bare(syntax));
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| FormatError::Malformed("no transfer syntax to try".into())))
    }

    fn read_bare_with(bytes: &[u8], syntax: BareSyntax) -> Result<InMemDicomObject, FormatError> {
        let dataset =
            InMemDicomObject::read_dataset_with_ts(Cursor::new(bytes.to_vec()), &Self::bare_ts(syntax))
                .map_err(|e| FormatError::Malformed(e.to_string()))?;

        // a run of zero bytes decodes as group length elements only
        let is_plan = [tags::SOP_CLASS_UID, tags::BEAM_SEQUENCE]
            .into_iter()
            .any(|tag| matches!(dataset.element_opt(tag), Ok(Some(_))));
        if !is_plan {
            return Err(FormatError::Malformed(
                "dataset has neither SOPClassUID nor BeamSequence".into(),
            ));
        }
        Ok(dataset)
    }

    fn bare_ts(syntax: BareSyntax) -> TransferSyntax {
        match syntax {
            BareSyntax::ImplicitVrLittleEndian => IMPLICIT_VR_LITTLE_ENDIAN.erased(),
            BareSyntax::ExplicitVrLittleEndian => EXPLICIT_VR_LITTLE_ENDIAN.erased(),
        }
    }

    /// Wrap an in-memory dataset into a plan written as a standard Explicit VR
    /// Little Endian file.
    pub fn from_dataset(dataset: InMemDicomObject) -> Result<Plan, FormatError> {
        Self::with_meta(
            dataset,
            uids::EXPLICIT_VR_LITTLE_ENDIAN,
            Encoding::default(),
        )
    }

    fn with_meta(
        dataset: InMemDicomObject,
        transfer_syntax: &str,
        encoding: Encoding,
    ) -> Result<Plan, FormatError> {
        let sop_uid = |tag| {
            dataset
                .element_opt(tag)
                .ok()
                .flatten()
                .and_then(|element| element.to_str().ok())
                .map(|uid| uid.trim_end_matches(['\0', ' ']).to_string())
        };
        let class_uid = sop_uid(tags::SOP_CLASS_UID).unwrap_or_else(|| RT_PLAN_STORAGE.to_string());
        let instance_uid = sop_uid(tags::SOP_INSTANCE_UID).unwrap_or_default();

        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(transfer_syntax)
            .media_storage_sop_class_uid(class_uid)
            .media_storage_sop_instance_uid(instance_uid)
            .build()
            .map_err(|e| FormatError::Meta(e.to_string()))?;

        Ok(Plan::from_parts(dataset.with_exact_meta(meta), encoding))
    }

    /// Encode a plan with the layout and transfer syntax it was read with.
    pub fn serialize(plan: &Plan) -> Result<Vec<u8>, FormatError> {
        let mut out = Vec::new();

        match plan.encoding() {
            Encoding::Bare(syntax) => {
                plan.dataset()
                    .write_dataset_with_ts(&mut out, &Self::bare_ts(*syntax))?;
            }
            Encoding::MetaOnly | Encoding::Preamble(_) => {
                let mut file = Vec::new();
                plan.object().write_all(&mut file)?;
                let body = Self::strip_preamble(&file)?;
                if let Encoding::Preamble(preamble) = plan.encoding() {
                    out.extend_from_slice(preamble);
                }
                out.extend_from_slice(body);
            }
        }

        Ok(out)
    }

    fn strip_preamble(file: &[u8]) -> Result<&[u8], FormatError> {
        if file.starts_with(MAGIC) {
            Ok(file)
        } else if file.len() >= PREAMBLE_LEN + MAGIC.len()
            && &file[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
        {
            Ok(&file[PREAMBLE_LEN..])
        } else {
            Err(FormatError::Malformed("encoder produced no DICM header".into()))
        }
    }

    /// Load a plan from a file path
    pub fn open(path: impl AsRef<Path>) -> Result<Plan, FormatError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let plan = Self::deserialize(&bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "loaded plan");
        Ok(plan)
    }

    /// Write a plan to a file path
    pub fn save(plan: &Plan, path: impl AsRef<Path>) -> Result<(), FormatError> {
        let path = path.as_ref();
        let bytes = Self::serialize(plan)?;
        fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "saved plan");
        Ok(())
    }

    /// Sibling path of `input` with the output kind's suffix before the extension.
    pub fn output_path(input: &Path, kind: OutputKind) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = input
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dcm".to_string());
        let path = input.with_file_name(format!("{stem}{}.{extension}", kind.suffix()));
        debug!(input = %input.display(), output = %path.display(), "derived output path");
        path
    }
}
