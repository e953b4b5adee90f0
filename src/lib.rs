//! # RT Plan retargeting library
//!
//! This crate edits radiotherapy treatment plans stored as DICOM RT Plan
//! files and moves them between treatment machines.
//!
//! It builds on the dicom-rs ecosystem for parsing and encoding and adds a
//! typed view of the parts of an RT Plan a retargeting workflow touches.
//! A plan goes through these steps:
//!  - Loading, permissive about missing preambles and file meta groups
//!  - Transplant of the clinical content (UIDs, beams, fraction groups,
//!    structure set reference) into the template plan of a destination machine
//!  - Per-beam edits of gantry angle, collimator angle and portal imager
//!    distance
//!  - Normalization of the tolerance table to the `T_QA` definition
//!  - Writing with the byte layout and transfer syntax of the input
//!
//! A separate pass appends a vendor-private annex after the `APPROVED`
//! marker of an already written file. The record model is not involved there,
//! only the file bytes.
//!
//! Edits never clamp: an out-of-range value is rejected and the plan stays as
//! it was.
//!
//! # Examples
//!
//! ## Retargeting a plan and setting the gantry angle of the first beam
//!
//! ```no_run
//! # use rtplan_retarget::{Config, EditRequest, MachineSelection, OutputKind, PlanIo, workflow};
//! # use std::collections::BTreeMap;
//! # use std::path::Path;
//! let config = Config::resolve(None, None);
//! let store = config
//!     .template_store()
//!     .expect("should have loaded machine profiles");
//! let input = Path::new("RP.plan.dcm");
//! let plan = PlanIo::open(input).expect("should have loaded plan");
//! let request = EditRequest {
//!     machine: MachineSelection::machine("Equipo 2"),
//!     gantry_angles: BTreeMap::from([(0, 90.0)]),
//!     ..Default::default()
//! };
//! let outcome = workflow::apply(&plan, &store, &request).expect("should have edited plan");
//! PlanIo::save(&outcome.plan, PlanIo::output_path(input, OutputKind::Modified))
//!     .expect("should have written plan");
//! println!("{}", outcome.summary());
//! ```

pub mod config;
pub mod editor;
pub mod enums;
pub mod plan_io;
pub mod record;
pub mod templates;
pub mod tolerance;
pub mod trailer;
pub mod transplant;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use editor::{EditError, ValidationError, decode_portal_distance, encode_portal_distance};
pub use enums::{BareSyntax, Encoding, MachineSelection, OutputKind};
pub use plan_io::{FormatError, PlanIo};
pub use record::{Beam, MachineIdentity, Plan, RecordError, ToleranceTable, VerificationImage};
pub use templates::{ConfigurationError, MachineProfile, TemplateStore};
pub use tolerance::normalize;
pub use trailer::{APPROVED_MARKER, MarkerNotFoundError, TrailerError, append_after_marker};
pub use transplant::{TransplantError, transplant};
pub use workflow::{EditRequest, Outcome, WorkflowError};
