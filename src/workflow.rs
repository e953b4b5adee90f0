//! The edit pipeline over already-resolved operator decisions:
//! retarget, per-beam edits, tolerance normalization.

use crate::{
    editor::EditError,
    enums::MachineSelection,
    record::{Plan, RecordError},
    templates::TemplateStore,
    tolerance,
    transplant::{TransplantError, retarget},
};

use dicom_dictionary_std::tags;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Transplant(#[from] TransplantError),

    #[error("beam {beam}: {source}")]
    Edit {
        beam: usize,
        #[source]
        source: EditError,
    },

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Decisions taken by the operator, keyed by beam index.
#[derive(Clone, Debug, Default)]
pub struct EditRequest {
    pub machine: MachineSelection,
    pub gantry_angles: BTreeMap<usize, f64>,
    pub collimator_angles: BTreeMap<usize, f64>,
    /// Portal distance in whole cm below isocenter, applied to every
    /// verification image of the beam that carries an RT Image SID.
    pub portal_distances: BTreeMap<usize, i32>,
    /// Operator agreed to replace a non-QA tolerance table.
    pub adopt_qa_tolerance: bool,
}

impl EditRequest {
    fn edited_beams(&self) -> impl Iterator<Item = usize> + '_ {
        self.gantry_angles
            .keys()
            .chain(self.collimator_angles.keys())
            .chain(self.portal_distances.keys())
            .copied()
    }
}

#[derive(Clone, Debug)]
pub struct Outcome {
    pub plan: Plan,
    pub retargeted_to: Option<String>,
    pub edited_beams: usize,
    pub normalized: bool,
}

impl Outcome {
    /// One-line status message for the operator.
    pub fn summary(&self) -> String {
        let machine = match &self.retargeted_to {
            Some(machine) => format!("retargeted to {machine}"),
            None => "machine unchanged".to_string(),
        };
        let tolerance = if self.normalized {
            format!("tolerance table set to {}", tolerance::QA_TABLE_LABEL)
        } else {
            "tolerance table unchanged".to_string()
        };
        format!(
            "{machine}; {} beam(s) edited; {tolerance}",
            self.edited_beams
        )
    }
}

/// Apply `request` to a copy of `plan`. The input is never modified; on error
/// nothing of the partial result is returned.
pub fn apply(
    plan: &Plan,
    store: &TemplateStore,
    request: &EditRequest,
) -> Result<Outcome, WorkflowError> {
    let mut plan = retarget(plan, store, &request.machine)?;
    let retargeted_to = match &request.machine {
        MachineSelection::Keep => None,
        MachineSelection::Machine(_) => plan.current_machine()?,
    };

    let mut beams = plan.beams()?;
    let count = beams.len();
    let mut edited = BTreeSet::new();
    for index in request.edited_beams() {
        if index >= count {
            return Err(RecordError::no_such_item(tags::BEAM_SEQUENCE, index, count).into());
        }
        edited.insert(index);
    }

    let edit_error = |beam: usize| move |source: EditError| WorkflowError::Edit { beam, source };
    for (&index, &angle) in &request.gantry_angles {
        beams[index].set_gantry_angle(angle).map_err(edit_error(index))?;
    }
    for (&index, &angle) in &request.collimator_angles {
        beams[index]
            .set_collimator_angle(angle)
            .map_err(edit_error(index))?;
    }
    for (&index, &distance) in &request.portal_distances {
        beams[index]
            .set_all_portal_distances(distance)
            .map_err(edit_error(index))?;
    }
    if !edited.is_empty() {
        plan.set_beams(beams);
    }

    let mut normalized = false;
    if request.adopt_qa_tolerance && tolerance::label_differs_from_qa(&plan)? {
        tolerance::normalize(&mut plan)?;
        normalized = true;
    }
    if tolerance::has_reference_mismatch(&plan)? {
        tolerance::normalize(&mut plan)?;
        normalized = true;
    }

    let outcome = Outcome {
        plan,
        retargeted_to,
        edited_beams: edited.len(),
        normalized,
    };
    info!("{}", outcome.summary());
    Ok(outcome)
}
