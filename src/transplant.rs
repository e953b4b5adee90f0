//! Moving the clinical content of a plan into a destination machine's template.

use crate::{
    enums::MachineSelection,
    record::{Plan, RecordError, put_str},
    templates::{ConfigurationError, MachineProfile, TemplateStore},
};

use dicom::core::{Tag, VR};
use dicom_dictionary_std::tags;
use thiserror::Error;
use tracing::info;

/// Attributes taken from the source plan when present. Everything else keeps
/// the template's value.
pub const TRANSPLANTED_ATTRIBUTES: [Tag; 8] = [
    tags::SOP_CLASS_UID,
    tags::SOP_INSTANCE_UID,
    tags::STUDY_INSTANCE_UID,
    tags::SERIES_INSTANCE_UID,
    tags::FRAME_OF_REFERENCE_UID,
    tags::FRACTION_GROUP_SEQUENCE,
    tags::BEAM_SEQUENCE,
    tags::REFERENCED_STRUCTURE_SET_SEQUENCE,
];

#[derive(Debug, Error)]
pub enum TransplantError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Build a new plan from `template` carrying the clinical content of `source`,
/// with every beam rebranded to `profile`'s machine.
///
/// Sequences are deep copied; the result shares nothing with either input.
pub fn transplant(
    source: &Plan,
    template: &Plan,
    profile: &MachineProfile,
) -> Result<Plan, RecordError> {
    let mut result = template.clone();

    let mut copied = 0;
    for tag in TRANSPLANTED_ATTRIBUTES {
        if let Ok(Some(element)) = source.dataset().element_opt(tag) {
            result.dataset_mut().put(element.clone());
            copied += 1;
        }
    }

    if let Some(name) = &profile.patient_name {
        put_str(result.dataset_mut(), tags::PATIENT_NAME, VR::PN, name);
    }
    if let Some(id) = &profile.patient_id {
        put_str(result.dataset_mut(), tags::PATIENT_ID, VR::LO, id);
    }

    if result.has_beams() {
        let identity = profile.identity();
        let mut beams = result.beams()?;
        for beam in &mut beams {
            beam.set_machine_identity(&identity);
        }
        result.set_beams(beams);
    }

    result.sync_meta_sop_uids();
    info!(
        machine = %profile.machine_name,
        attributes = copied,
        "transplanted plan into template"
    );
    Ok(result)
}

/// Retarget `source` to the selected machine. `MachineSelection::Keep` returns
/// a copy of `source` unchanged.
pub fn retarget(
    source: &Plan,
    store: &TemplateStore,
    selection: &MachineSelection,
) -> Result<Plan, TransplantError> {
    match selection {
        MachineSelection::Keep => Ok(source.clone()),
        MachineSelection::Machine(label) => {
            let profile = store.profile(label)?;
            let template = store.template(label)?;
            Ok(transplant(source, &template, profile)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::tests::profile;
    use crate::test_support::{SOP_INSTANCE_UID, beam_item, plan_with, template_plan, tolerance_item};

    fn source() -> Plan {
        plan_with(
            vec![
                beam_item("Field 1", "OLD_LINAC", 90.0, 10.0, Some(5), &[1150.0]),
                beam_item("Field 2", "OLD_LINAC", 270.0, 350.0, Some(5), &[]),
            ],
            vec![tolerance_item(5, "Clinical")],
        )
    }

    #[test]
    fn uids_and_sequences_come_from_source() {
        let source = source();
        let template = template_plan("QBA_600CD_523");
        let result = transplant(&source, &template, &profile("Equipo 1", "QBA_600CD_523")).unwrap();

        for tag in [
            tags::SOP_CLASS_UID,
            tags::SOP_INSTANCE_UID,
            tags::STUDY_INSTANCE_UID,
            tags::SERIES_INSTANCE_UID,
            tags::FRAME_OF_REFERENCE_UID,
        ] {
            assert_eq!(result.uid(tag), source.uid(tag));
        }

        let beams = result.beams().unwrap();
        assert_eq!(beams.len(), 2);
        assert_eq!(beams[0].gantry_angle().unwrap(), 90.0);
        assert_eq!(beams[1].collimator_angle().unwrap(), 350.0);
        assert_eq!(beams[0].portal_distance(0).unwrap(), Some(15.0));
        assert_eq!(
            result.object().meta().media_storage_sop_instance_uid(),
            SOP_INSTANCE_UID
        );
    }

    #[test]
    fn identity_never_comes_from_source() {
        let source = source();
        let template = template_plan("QBA_600CD_523");
        let profile = profile("Equipo 1", "QBA_600CD_523");
        let result = transplant(&source, &template, &profile).unwrap();

        assert_eq!(result.patient_name().as_deref(), Some("QBA_600CD_523_QA"));
        assert_eq!(result.patient_id().as_deref(), Some("1-000000-1"));
        assert_ne!(result.patient_name(), source.patient_name());

        for beam in result.beams().unwrap() {
            assert_eq!(beam.treatment_machine_name().unwrap(), "QBA_600CD_523");
            assert_eq!(beam.manufacturer().as_deref(), Some("Varian Medical Systems"));
            assert_eq!(beam.institution_name().as_deref(), Some("Mevaterapia Quilmes"));
            assert_eq!(beam.model_name().as_deref(), Some("600CD"));
            assert_eq!(beam.serial_number().as_deref(), Some("523"));
        }
    }

    #[test]
    fn template_patient_is_kept_without_profile_override() {
        let mut profile = profile("Equipo 2", "EQ2_iX_827");
        profile.patient_name = None;
        profile.patient_id = None;
        let result = transplant(&source(), &template_plan("EQ2_iX_827"), &profile).unwrap();

        assert_eq!(result.patient_name().as_deref(), Some("Template^QA"));
        assert_eq!(result.patient_id().as_deref(), Some("T-0"));
    }

    #[test]
    fn tolerance_tables_stay_with_template() {
        let result = transplant(
            &source(),
            &template_plan("QBA_600CD_523"),
            &profile("Equipo 1", "QBA_600CD_523"),
        )
        .unwrap();

        let tables = result.tolerance_tables().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].label().as_deref(), Some("T_QA"));
    }

    #[test]
    fn absent_source_fields_keep_template_values() {
        let mut source = source();
        source.dataset_mut().remove_element(tags::FRAME_OF_REFERENCE_UID);
        source.dataset_mut().remove_element(tags::BEAM_SEQUENCE);
        let template = template_plan("QBA_600CD_523");

        let result = transplant(&source, &template, &profile("Equipo 1", "QBA_600CD_523")).unwrap();

        assert_eq!(result.uid(tags::FRAME_OF_REFERENCE_UID).as_deref(), Some("9.9.9.4"));
        let beams = result.beams().unwrap();
        assert_eq!(beams.len(), 1);
        assert_eq!(beams[0].name().as_deref(), Some("Template"));
    }

    #[test]
    fn result_does_not_alias_source() {
        let source = source();
        let mut result = transplant(
            &source,
            &template_plan("QBA_600CD_523"),
            &profile("Equipo 1", "QBA_600CD_523"),
        )
        .unwrap();

        let mut beams = result.beams().unwrap();
        beams[0].set_gantry_angle(0.0).unwrap();
        result.set_beams(beams);

        assert_eq!(source.beams().unwrap()[0].gantry_angle().unwrap(), 90.0);
        assert_eq!(
            source.beams().unwrap()[0].treatment_machine_name().unwrap(),
            "OLD_LINAC"
        );
    }

    #[test]
    fn keep_returns_source_unchanged() {
        let source = source();
        let store = TemplateStore::default();
        let result = retarget(&source, &store, &MachineSelection::Keep).unwrap();

        assert_eq!(result.dataset(), source.dataset());
    }

    #[test]
    fn unknown_machine_is_a_configuration_error() {
        let store = TemplateStore::new(vec![profile("Equipo 1", "QBA_600CD_523")]).unwrap();
        let result = retarget(&source(), &store, &MachineSelection::machine("Equipo 3"));

        assert!(matches!(
            result,
            Err(TransplantError::Configuration(ConfigurationError::UnknownMachine(_)))
        ));
    }
}
