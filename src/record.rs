//! Typed views over an RT Plan held as a dicom-rs object.
//!
//! Every attribute the workflow touches is either required, in which case the
//! accessor returns [`RecordError::MissingAttribute`] when it is absent, or
//! optional, in which case the accessor returns `None`.

use crate::enums::Encoding;

use dicom::core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::mem::InMemElement;
use dicom::object::{FileDicomObject, InMemDicomObject};
use dicom::pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption};
use dicom_dictionary_std::{StandardDataDictionary, tags};
use ndarray::{Array2, s};
use thiserror::Error;

/// RT Image SID (3002,0026), the source-to-imager distance of a portal image.
pub const RT_IMAGE_SID: Tag = Tag(0x3002, 0x0026);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing required attribute {0}")]
    MissingAttribute(String),

    #[error("attribute {0} is not a sequence")]
    NotASequence(String),

    #[error("attribute {attribute} has an invalid value: {reason}")]
    InvalidValue { attribute: String, reason: String },

    #[error("{sequence} has no item at index {index} (length {len})")]
    NoSuchItem {
        sequence: String,
        index: usize,
        len: usize,
    },
}

impl RecordError {
    pub(crate) fn missing(tag: Tag) -> Self {
        RecordError::MissingAttribute(keyword(tag))
    }

    pub(crate) fn invalid(tag: Tag, reason: impl ToString) -> Self {
        RecordError::InvalidValue {
            attribute: keyword(tag),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn no_such_item(tag: Tag, index: usize, len: usize) -> Self {
        RecordError::NoSuchItem {
            sequence: keyword(tag),
            index,
            len,
        }
    }
}

/// Dictionary keyword of a tag, or its `(gggg,eeee)` form when unknown.
pub fn keyword(tag: Tag) -> String {
    StandardDataDictionary
        .by_tag(tag)
        .map(|entry| entry.alias().to_string())
        .unwrap_or_else(|| tag.to_string())
}

pub(crate) fn optional_str(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let element = obj.element_opt(tag).ok()??;
    let value = element.to_str().ok()?;
    Some(value.trim_end_matches(['\0', ' ']).to_string())
}

pub(crate) fn required_str(obj: &InMemDicomObject, tag: Tag) -> Result<String, RecordError> {
    optional_str(obj, tag).ok_or_else(|| RecordError::missing(tag))
}

fn is_blank(element: &InMemElement) -> bool {
    element
        .to_str()
        .map(|value| value.trim_matches(['\0', ' ']).is_empty())
        .unwrap_or(false)
}

pub(crate) fn optional_f64(obj: &InMemDicomObject, tag: Tag) -> Result<Option<f64>, RecordError> {
    match obj.element_opt(tag) {
        Ok(Some(element)) if !is_blank(element) => element
            .to_float64()
            .map(Some)
            .map_err(|e| RecordError::invalid(tag, e)),
        _ => Ok(None),
    }
}

pub(crate) fn required_f64(obj: &InMemDicomObject, tag: Tag) -> Result<f64, RecordError> {
    optional_f64(obj, tag)?.ok_or_else(|| RecordError::missing(tag))
}

pub(crate) fn optional_i32(obj: &InMemDicomObject, tag: Tag) -> Result<Option<i32>, RecordError> {
    match obj.element_opt(tag) {
        Ok(Some(element)) if !is_blank(element) => element
            .to_int::<i32>()
            .map(Some)
            .map_err(|e| RecordError::invalid(tag, e)),
        _ => Ok(None),
    }
}

pub(crate) fn required_i32(obj: &InMemDicomObject, tag: Tag) -> Result<i32, RecordError> {
    optional_i32(obj, tag)?.ok_or_else(|| RecordError::missing(tag))
}

/// Items of a sequence attribute, deep copied. `None` when the attribute is absent.
pub(crate) fn sequence_items(
    obj: &InMemDicomObject,
    tag: Tag,
) -> Result<Option<Vec<InMemDicomObject>>, RecordError> {
    match obj.element_opt(tag) {
        Ok(Some(element)) => element
            .items()
            .map(|items| Some(items.to_vec()))
            .ok_or_else(|| RecordError::NotASequence(keyword(tag))),
        _ => Ok(None),
    }
}

pub(crate) fn put_sequence(obj: &mut InMemDicomObject, tag: Tag, items: Vec<InMemDicomObject>) {
    obj.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
}

pub(crate) fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

/// Maximum length of a Decimal String value.
const DS_MAX_LEN: usize = 16;

/// Decimal string rendering used for DS attributes (angles, distances, tolerances),
/// rounded as needed to fit in 16 characters.
pub(crate) fn format_decimal(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    let plain = format!("{value}");
    if plain.len() <= DS_MAX_LEN {
        return plain;
    }
    (0..DS_MAX_LEN)
        .rev()
        .map(|digits| trim_fraction(format!("{value:.digits$}")))
        .find(|rendered| rendered.len() <= DS_MAX_LEN)
        .unwrap_or_else(|| format!("{value:.6e}"))
}

fn trim_fraction(rendered: String) -> String {
    if !rendered.contains('.') {
        return rendered;
    }
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn put_decimal(obj: &mut InMemDicomObject, tag: Tag, value: f64) {
    put_str(obj, tag, VR::DS, &format_decimal(value));
}

pub(crate) fn put_integer(obj: &mut InMemDicomObject, tag: Tag, value: i32) {
    put_str(obj, tag, VR::IS, &value.to_string());
}

/// Identity of a treatment machine as written on every beam.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachineIdentity {
    pub manufacturer: String,
    pub institution: String,
    pub model: String,
    pub serial: String,
    pub machine_name: String,
}

/// One item of `BeamSequence`.
#[derive(Clone, Debug, PartialEq)]
pub struct Beam {
    pub(crate) item: InMemDicomObject,
}

impl Beam {
    pub fn from_item(item: InMemDicomObject) -> Self {
        Self { item }
    }

    pub fn item(&self) -> &InMemDicomObject {
        &self.item
    }

    pub fn into_item(self) -> InMemDicomObject {
        self.item
    }

    pub fn name(&self) -> Option<String> {
        optional_str(&self.item, tags::BEAM_NAME)
    }

    /// Beam name, or `NN` for unnamed beams.
    pub fn display_name(&self) -> String {
        self.name().unwrap_or_else(|| "NN".to_string())
    }

    pub fn number(&self) -> Result<Option<i32>, RecordError> {
        optional_i32(&self.item, tags::BEAM_NUMBER)
    }

    pub fn treatment_machine_name(&self) -> Result<String, RecordError> {
        required_str(&self.item, tags::TREATMENT_MACHINE_NAME)
    }

    pub fn manufacturer(&self) -> Option<String> {
        optional_str(&self.item, tags::MANUFACTURER)
    }

    pub fn institution_name(&self) -> Option<String> {
        optional_str(&self.item, tags::INSTITUTION_NAME)
    }

    pub fn model_name(&self) -> Option<String> {
        optional_str(&self.item, tags::MANUFACTURER_MODEL_NAME)
    }

    pub fn serial_number(&self) -> Option<String> {
        optional_str(&self.item, tags::DEVICE_SERIAL_NUMBER)
    }

    pub fn referenced_tolerance_table_number(&self) -> Result<Option<i32>, RecordError> {
        optional_i32(&self.item, tags::REFERENCED_TOLERANCE_TABLE_NUMBER)
    }

    pub(crate) fn first_control_point(&self) -> Result<InMemDicomObject, RecordError> {
        let tag = tags::CONTROL_POINT_SEQUENCE;
        let items = sequence_items(&self.item, tag)?.ok_or_else(|| RecordError::missing(tag))?;
        items
            .into_iter()
            .next()
            .ok_or_else(|| RecordError::no_such_item(tag, 0, 0))
    }

    /// Run `f` on a copy of control point 0 and store the result back.
    pub(crate) fn update_first_control_point(
        &mut self,
        f: impl FnOnce(&mut InMemDicomObject),
    ) -> Result<(), RecordError> {
        let tag = tags::CONTROL_POINT_SEQUENCE;
        let mut items =
            sequence_items(&self.item, tag)?.ok_or_else(|| RecordError::missing(tag))?;
        let first = items
            .first_mut()
            .ok_or_else(|| RecordError::no_such_item(tag, 0, 0))?;
        f(first);
        put_sequence(&mut self.item, tag, items);
        Ok(())
    }

    /// Gantry angle of control point 0.
    pub fn gantry_angle(&self) -> Result<f64, RecordError> {
        required_f64(&self.first_control_point()?, tags::GANTRY_ANGLE)
    }

    /// Collimator (beam limiting device) angle of control point 0.
    pub fn collimator_angle(&self) -> Result<f64, RecordError> {
        required_f64(&self.first_control_point()?, tags::BEAM_LIMITING_DEVICE_ANGLE)
    }

    /// Planned portal images. Empty when the beam has none.
    pub fn verification_images(&self) -> Result<Vec<VerificationImage>, RecordError> {
        Ok(
            sequence_items(&self.item, tags::PLANNED_VERIFICATION_IMAGE_SEQUENCE)?
                .unwrap_or_default()
                .into_iter()
                .map(VerificationImage::from_item)
                .collect(),
        )
    }

    pub(crate) fn update_verification_image(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut InMemDicomObject),
    ) -> Result<(), RecordError> {
        let tag = tags::PLANNED_VERIFICATION_IMAGE_SEQUENCE;
        let mut items = sequence_items(&self.item, tag)?.unwrap_or_default();
        let len = items.len();
        let image = items
            .get_mut(index)
            .ok_or_else(|| RecordError::no_such_item(tag, index, len))?;
        f(image);
        put_sequence(&mut self.item, tag, items);
        Ok(())
    }
}

/// One item of `PlannedVerificationImageSequence`.
#[derive(Clone, Debug, PartialEq)]
pub struct VerificationImage {
    item: InMemDicomObject,
}

impl VerificationImage {
    pub fn from_item(item: InMemDicomObject) -> Self {
        Self { item }
    }

    pub fn item(&self) -> &InMemDicomObject {
        &self.item
    }

    /// Raw encoded RT Image SID.
    pub fn sid(&self) -> Result<Option<f64>, RecordError> {
        optional_f64(&self.item, RT_IMAGE_SID)
    }
}

/// One item of `ToleranceTableSequence`.
#[derive(Clone, Debug, PartialEq)]
pub struct ToleranceTable {
    pub(crate) item: InMemDicomObject,
}

impl ToleranceTable {
    pub fn from_item(item: InMemDicomObject) -> Self {
        Self { item }
    }

    pub fn item(&self) -> &InMemDicomObject {
        &self.item
    }

    pub fn into_item(self) -> InMemDicomObject {
        self.item
    }

    pub fn number(&self) -> Result<i32, RecordError> {
        required_i32(&self.item, tags::TOLERANCE_TABLE_NUMBER)
    }

    pub fn label(&self) -> Option<String> {
        optional_str(&self.item, tags::TOLERANCE_TABLE_LABEL)
    }

    /// Value of one tolerance attribute, e.g. `tags::GANTRY_ANGLE_TOLERANCE`.
    pub fn tolerance(&self, tag: Tag) -> Result<Option<f64>, RecordError> {
        optional_f64(&self.item, tag)
    }
}

/// An RT Plan (or machine template) together with the byte layout it was read from.
#[derive(Clone, Debug)]
pub struct Plan {
    object: FileDicomObject<InMemDicomObject>,
    encoding: Encoding,
}

impl Plan {
    pub(crate) fn from_parts(object: FileDicomObject<InMemDicomObject>, encoding: Encoding) -> Self {
        Self { object, encoding }
    }

    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    pub fn object(&self) -> &FileDicomObject<InMemDicomObject> {
        &self.object
    }

    pub fn dataset(&self) -> &InMemDicomObject {
        &self.object
    }

    pub(crate) fn dataset_mut(&mut self) -> &mut InMemDicomObject {
        &mut self.object
    }

    pub fn uid(&self, tag: Tag) -> Option<String> {
        optional_str(self.dataset(), tag)
    }

    pub fn patient_name(&self) -> Option<String> {
        optional_str(self.dataset(), tags::PATIENT_NAME)
    }

    pub fn patient_id(&self) -> Option<String> {
        optional_str(self.dataset(), tags::PATIENT_ID)
    }

    pub fn label(&self) -> Option<String> {
        optional_str(self.dataset(), tags::RT_PLAN_LABEL)
    }

    pub fn approval_status(&self) -> Option<String> {
        optional_str(self.dataset(), tags::APPROVAL_STATUS)
    }

    pub fn has_beams(&self) -> bool {
        matches!(self.dataset().element_opt(tags::BEAM_SEQUENCE), Ok(Some(_)))
    }

    /// Beams of the plan, deep copied. Empty when the plan has no `BeamSequence`.
    pub fn beams(&self) -> Result<Vec<Beam>, RecordError> {
        Ok(sequence_items(self.dataset(), tags::BEAM_SEQUENCE)?
            .unwrap_or_default()
            .into_iter()
            .map(Beam::from_item)
            .collect())
    }

    pub fn set_beams(&mut self, beams: Vec<Beam>) {
        let items = beams.into_iter().map(Beam::into_item).collect();
        put_sequence(self.dataset_mut(), tags::BEAM_SEQUENCE, items);
    }

    pub fn tolerance_tables(&self) -> Result<Vec<ToleranceTable>, RecordError> {
        Ok(
            sequence_items(self.dataset(), tags::TOLERANCE_TABLE_SEQUENCE)?
                .unwrap_or_default()
                .into_iter()
                .map(ToleranceTable::from_item)
                .collect(),
        )
    }

    pub fn set_tolerance_tables(&mut self, tables: Vec<ToleranceTable>) {
        let items = tables.into_iter().map(ToleranceTable::into_item).collect();
        put_sequence(self.dataset_mut(), tags::TOLERANCE_TABLE_SEQUENCE, items);
    }

    /// Treatment machine of the first beam.
    pub fn current_machine(&self) -> Result<Option<String>, RecordError> {
        self.beams()?
            .first()
            .map(Beam::treatment_machine_name)
            .transpose()
    }

    /// Keep the file meta group's media storage UIDs in line with the dataset.
    pub(crate) fn sync_meta_sop_uids(&mut self) {
        let class_uid = self.uid(tags::SOP_CLASS_UID);
        let instance_uid = self.uid(tags::SOP_INSTANCE_UID);
        if class_uid.is_none() && instance_uid.is_none() {
            return;
        }
        self.object.update_meta(|meta| {
            if let Some(uid) = class_uid {
                meta.media_storage_sop_class_uid = uid;
            }
            if let Some(uid) = instance_uid {
                meta.media_storage_sop_instance_uid = uid;
            }
        });
    }

    /// Decode the first frame of the pixel data, if the record carries any.
    pub fn pixel_array(&self) -> Result<Array2<u16>, RecordError> {
        let pixel_data = self
            .object
            .decode_pixel_data()
            .map_err(|e| RecordError::invalid(tags::PIXEL_DATA, e))?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
            .map_err(|e| RecordError::invalid(tags::PIXEL_DATA, e))
    }

    /// Replace the pixel data and recompute `Rows` and `Columns` from its shape.
    pub fn set_pixel_data(&mut self, pixels: &Array2<u16>) -> Result<(), RecordError> {
        let (rows, columns) = pixels.dim();
        let rows = u16::try_from(rows).map_err(|e| RecordError::invalid(tags::ROWS, e))?;
        let columns =
            u16::try_from(columns).map_err(|e| RecordError::invalid(tags::COLUMNS, e))?;
        let samples: Vec<u16> = pixels.iter().copied().collect();

        let dataset = self.dataset_mut();
        dataset.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)));
        dataset.put(DataElement::new(
            tags::COLUMNS,
            VR::US,
            PrimitiveValue::from(columns),
        ));
        dataset.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U16(samples.into()),
        ));
        Ok(())
    }
}
