//! Builders for small in-memory RT Plans used across unit tests.

use crate::{plan_io::PlanIo, record::Plan, record::RT_IMAGE_SID};

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::InMemDicomObject;
use dicom_dictionary_std::tags;

pub(crate) const SOP_CLASS_UID: &str = "1.2.840.10008.5.1.4.1.1.481.5";
pub(crate) const SOP_INSTANCE_UID: &str = "1.2.3.4.5.6";

fn text(tag: dicom::core::Tag, vr: VR, value: &str) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

fn sequence(tag: dicom::core::Tag, items: Vec<InMemDicomObject>) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, VR::SQ, DataSetSequence::from(items))
}

pub(crate) fn beam_item(
    name: &str,
    machine: &str,
    gantry: f64,
    collimator: f64,
    tolerance_ref: Option<i32>,
    sids: &[f64],
) -> InMemDicomObject {
    let control_point = InMemDicomObject::from_element_iter([
        text(tags::CONTROL_POINT_INDEX, VR::IS, "0"),
        text(tags::GANTRY_ANGLE, VR::DS, &gantry.to_string()),
        text(tags::BEAM_LIMITING_DEVICE_ANGLE, VR::DS, &collimator.to_string()),
    ]);
    let second_point = InMemDicomObject::from_element_iter([
        text(tags::CONTROL_POINT_INDEX, VR::IS, "1"),
    ]);

    let mut beam = InMemDicomObject::from_element_iter([
        text(tags::BEAM_NUMBER, VR::IS, "1"),
        text(tags::BEAM_NAME, VR::LO, name),
        text(tags::TREATMENT_MACHINE_NAME, VR::SH, machine),
        text(tags::MANUFACTURER, VR::LO, "Source Vendor"),
        text(tags::INSTITUTION_NAME, VR::LO, "Source Institution"),
        sequence(tags::CONTROL_POINT_SEQUENCE, vec![control_point, second_point]),
    ]);
    if let Some(number) = tolerance_ref {
        beam.put(text(
            tags::REFERENCED_TOLERANCE_TABLE_NUMBER,
            VR::IS,
            &number.to_string(),
        ));
    }
    if !sids.is_empty() {
        let images = sids
            .iter()
            .map(|sid| {
                InMemDicomObject::from_element_iter([text(RT_IMAGE_SID, VR::DS, &sid.to_string())])
            })
            .collect();
        beam.put(sequence(tags::PLANNED_VERIFICATION_IMAGE_SEQUENCE, images));
    }
    beam
}

pub(crate) fn tolerance_item(number: i32, label: &str) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([
        text(tags::TOLERANCE_TABLE_NUMBER, VR::IS, &number.to_string()),
        text(tags::TOLERANCE_TABLE_LABEL, VR::SH, label),
        text(tags::GANTRY_ANGLE_TOLERANCE, VR::DS, "1"),
        text(tags::TABLE_TOP_LATERAL_POSITION_TOLERANCE, VR::DS, "5"),
    ])
}

/// A source plan with UIDs, patient identity and the given sequences.
pub(crate) fn plan_with(beams: Vec<InMemDicomObject>, tables: Vec<InMemDicomObject>) -> Plan {
    let mut dataset = InMemDicomObject::from_element_iter([
        text(tags::SOP_CLASS_UID, VR::UI, SOP_CLASS_UID),
        text(tags::SOP_INSTANCE_UID, VR::UI, SOP_INSTANCE_UID),
        text(tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3.4.100"),
        text(tags::SERIES_INSTANCE_UID, VR::UI, "1.2.3.4.200"),
        text(tags::FRAME_OF_REFERENCE_UID, VR::UI, "1.2.3.4.300"),
        text(tags::PATIENT_NAME, VR::PN, "Doe^Jane"),
        text(tags::PATIENT_ID, VR::LO, "HC-4711"),
        text(tags::RT_PLAN_LABEL, VR::SH, "Pelvis"),
        text(tags::APPROVAL_STATUS, VR::CS, "APPROVED"),
    ]);
    if !beams.is_empty() {
        dataset.put(sequence(tags::BEAM_SEQUENCE, beams));
    }
    if !tables.is_empty() {
        dataset.put(sequence(tags::TOLERANCE_TABLE_SEQUENCE, tables));
    }
    dataset.put(sequence(
        tags::FRACTION_GROUP_SEQUENCE,
        vec![InMemDicomObject::from_element_iter([text(
            tags::FRACTION_GROUP_NUMBER,
            VR::IS,
            "1",
        )])],
    ));
    PlanIo::from_dataset(dataset).expect("test plan should get a meta group")
}

/// A machine template: its own UIDs, QA patient and a single placeholder beam.
pub(crate) fn template_plan(machine: &str) -> Plan {
    let dataset = InMemDicomObject::from_element_iter([
        text(tags::SOP_CLASS_UID, VR::UI, SOP_CLASS_UID),
        text(tags::SOP_INSTANCE_UID, VR::UI, "9.9.9.1"),
        text(tags::STUDY_INSTANCE_UID, VR::UI, "9.9.9.2"),
        text(tags::SERIES_INSTANCE_UID, VR::UI, "9.9.9.3"),
        text(tags::FRAME_OF_REFERENCE_UID, VR::UI, "9.9.9.4"),
        text(tags::PATIENT_NAME, VR::PN, "Template^QA"),
        text(tags::PATIENT_ID, VR::LO, "T-0"),
        text(tags::APPROVAL_STATUS, VR::CS, "APPROVED"),
        sequence(
            tags::BEAM_SEQUENCE,
            vec![beam_item("Template", machine, 0.0, 0.0, Some(3), &[])],
        ),
        sequence(tags::TOLERANCE_TABLE_SEQUENCE, vec![tolerance_item(3, "T_QA")]),
    ]);
    PlanIo::from_dataset(dataset).expect("template plan should get a meta group")
}
