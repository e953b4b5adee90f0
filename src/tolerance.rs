//! Canonical QA tolerance table and the beam-to-table cross-reference.

use crate::record::{Plan, RecordError, ToleranceTable, put_decimal, put_integer, put_str};

use dicom::core::{Tag, VR};
use dicom::object::InMemDicomObject;
use dicom_dictionary_std::tags;
use tracing::info;

pub const QA_TABLE_NUMBER: i32 = 3;
pub const QA_TABLE_LABEL: &str = "T_QA";

/// Tolerance limits of the QA table.
pub const QA_TOLERANCES: [(Tag, f64); 6] = [
    (tags::GANTRY_ANGLE_TOLERANCE, 180.0),
    (tags::BEAM_LIMITING_DEVICE_ANGLE_TOLERANCE, 90.0),
    (tags::PATIENT_SUPPORT_ANGLE_TOLERANCE, 90.0),
    (tags::TABLE_TOP_VERTICAL_POSITION_TOLERANCE, 2000.0),
    (tags::TABLE_TOP_LONGITUDINAL_POSITION_TOLERANCE, 2000.0),
    (tags::TABLE_TOP_LATERAL_POSITION_TOLERANCE, 200.0),
];

impl ToleranceTable {
    /// A table holding only the QA definition.
    pub fn qa() -> Self {
        let mut table = ToleranceTable::from_item(InMemDicomObject::new_empty());
        table.apply_qa_definition();
        table
    }

    /// Overwrite number, label and limits with the QA definition, keeping any
    /// other attribute of the table.
    pub fn apply_qa_definition(&mut self) {
        put_integer(&mut self.item, tags::TOLERANCE_TABLE_NUMBER, QA_TABLE_NUMBER);
        put_str(&mut self.item, tags::TOLERANCE_TABLE_LABEL, VR::SH, QA_TABLE_LABEL);
        for (tag, value) in QA_TOLERANCES {
            put_decimal(&mut self.item, tag, value);
        }
    }

    pub fn is_qa(&self) -> bool {
        self.label().as_deref() == Some(QA_TABLE_LABEL)
    }
}

/// Make table 0 the QA table and point every beam at it.
///
/// A plan without tolerance tables gets a sequence holding the QA table, so
/// the beams never reference a table that does not exist.
pub fn normalize(plan: &mut Plan) -> Result<(), RecordError> {
    let mut tables = plan.tolerance_tables()?;
    match tables.first_mut() {
        Some(first) => first.apply_qa_definition(),
        None => tables.push(ToleranceTable::qa()),
    }

    let mut beams = plan.beams()?;
    for beam in &mut beams {
        put_integer(
            &mut beam.item,
            tags::REFERENCED_TOLERANCE_TABLE_NUMBER,
            QA_TABLE_NUMBER,
        );
    }

    let beam_count = beams.len();
    plan.set_tolerance_tables(tables);
    if plan.has_beams() {
        plan.set_beams(beams);
    }
    info!(beams = beam_count, "normalized tolerance table to {QA_TABLE_LABEL}");
    Ok(())
}

/// Whether table 0 is something other than the QA table. The operator decides
/// whether such a plan gets normalized.
pub fn label_differs_from_qa(plan: &Plan) -> Result<bool, RecordError> {
    Ok(!plan
        .tolerance_tables()?
        .first()
        .is_some_and(ToleranceTable::is_qa))
}

/// Whether any beam references a table number other than that of table 0.
/// Such a plan is always normalized.
pub fn has_reference_mismatch(plan: &Plan) -> Result<bool, RecordError> {
    let beams = plan.beams()?;
    if beams.is_empty() {
        return Ok(false);
    }
    let active = match plan.tolerance_tables()?.first() {
        Some(table) => table.number()?,
        None => return Ok(true),
    };
    for beam in &beams {
        if beam.referenced_tolerance_table_number()? != Some(active) {
            return Ok(true);
        }
    }
    Ok(false)
}
