//! Bounded edits of per-beam geometry and machine identity.
//!
//! Setters validate before touching the beam. Out-of-range input is rejected
//! with a [`ValidationError`] and never clamped; the caller decides whether to
//! ask again or give up on that edit.

use crate::record::{
    Beam, MachineIdentity, RT_IMAGE_SID, RecordError, put_decimal, put_str,
};

use dicom::core::VR;
use dicom_dictionary_std::tags;
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::debug;

pub const GANTRY_ANGLE_RANGE: RangeInclusive<f64> = 0.0..=360.0;
pub const COLLIMATOR_ANGLE_RANGES: [RangeInclusive<f64>; 2] = [0.0..=100.0, 260.0..=360.0];

/// Encoded RT Image SID of an imager at isocenter.
pub const ISOCENTER_SID: i32 = 1000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("gantry angle {0} is outside 0-360")]
    GantryAngle(f64),

    #[error("collimator angle {0} is outside 0-100 and 260-360")]
    CollimatorAngle(f64),

    #[error("portal distance {0} cm is too large to encode as an RT Image SID")]
    PortalDistance(i32),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EditError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Portal distance below isocenter (whole cm) to its RT Image SID encoding.
/// `None` when the encoding overflows.
pub fn encode_portal_distance(distance_cm: i32) -> Option<i32> {
    distance_cm.checked_mul(10)?.checked_add(ISOCENTER_SID)
}

/// RT Image SID encoding to portal distance below isocenter (cm).
pub fn decode_portal_distance(sid: f64) -> f64 {
    (sid - f64::from(ISOCENTER_SID)) / 10.0
}

pub fn validate_gantry_angle(angle: f64) -> Result<f64, ValidationError> {
    if GANTRY_ANGLE_RANGE.contains(&angle) {
        Ok(angle)
    } else {
        Err(ValidationError::GantryAngle(angle))
    }
}

pub fn validate_collimator_angle(angle: f64) -> Result<f64, ValidationError> {
    if COLLIMATOR_ANGLE_RANGES
        .iter()
        .any(|range| range.contains(&angle))
    {
        Ok(angle)
    } else {
        Err(ValidationError::CollimatorAngle(angle))
    }
}

/// Encoded SID for `distance_cm`.
pub fn validate_portal_distance(distance_cm: i32) -> Result<i32, ValidationError> {
    encode_portal_distance(distance_cm).ok_or(ValidationError::PortalDistance(distance_cm))
}

impl Beam {
    pub fn set_gantry_angle(&mut self, angle: f64) -> Result<(), EditError> {
        let angle = validate_gantry_angle(angle)?;
        self.update_first_control_point(|cp| put_decimal(cp, tags::GANTRY_ANGLE, angle))?;
        debug!(beam = %self.display_name(), angle, "set gantry angle");
        Ok(())
    }

    pub fn set_collimator_angle(&mut self, angle: f64) -> Result<(), EditError> {
        let angle = validate_collimator_angle(angle)?;
        self.update_first_control_point(|cp| {
            put_decimal(cp, tags::BEAM_LIMITING_DEVICE_ANGLE, angle)
        })?;
        debug!(beam = %self.display_name(), angle, "set collimator angle");
        Ok(())
    }

    /// Decoded portal distance (cm) of verification image `image`, `None` when
    /// that image has no RT Image SID.
    pub fn portal_distance(&self, image: usize) -> Result<Option<f64>, RecordError> {
        let images = self.verification_images()?;
        let len = images.len();
        let image = images.get(image).ok_or_else(|| {
            RecordError::no_such_item(tags::PLANNED_VERIFICATION_IMAGE_SEQUENCE, image, len)
        })?;
        Ok(image.sid()?.map(decode_portal_distance))
    }

    /// Decoded portal distances of every verification image, in sequence order.
    pub fn portal_distances(&self) -> Result<Vec<Option<f64>>, RecordError> {
        self.verification_images()?
            .iter()
            .map(|image| Ok(image.sid()?.map(decode_portal_distance)))
            .collect()
    }

    pub fn set_portal_distance(&mut self, image: usize, distance_cm: i32) -> Result<(), EditError> {
        let sid = validate_portal_distance(distance_cm)?;
        self.update_verification_image(image, |item| {
            put_str(item, RT_IMAGE_SID, VR::DS, &sid.to_string())
        })?;
        debug!(beam = %self.display_name(), image, distance_cm, sid, "set portal distance");
        Ok(())
    }

    /// Set the distance on every verification image that carries an RT Image SID.
    /// Returns how many images were changed.
    pub fn set_all_portal_distances(&mut self, distance_cm: i32) -> Result<usize, EditError> {
        validate_portal_distance(distance_cm)?;
        let targets: Vec<usize> = self
            .verification_images()?
            .iter()
            .enumerate()
            .filter(|(_, image)| matches!(image.sid(), Ok(Some(_))))
            .map(|(index, _)| index)
            .collect();

        let mut edited = self.clone();
        for &index in &targets {
            edited.set_portal_distance(index, distance_cm)?;
        }
        *self = edited;
        Ok(targets.len())
    }

    pub fn set_machine_identity(&mut self, identity: &MachineIdentity) {
        put_str(&mut self.item, tags::MANUFACTURER, VR::LO, &identity.manufacturer);
        put_str(&mut self.item, tags::INSTITUTION_NAME, VR::LO, &identity.institution);
        put_str(&mut self.item, tags::MANUFACTURER_MODEL_NAME, VR::LO, &identity.model);
        put_str(&mut self.item, tags::DEVICE_SERIAL_NUMBER, VR::LO, &identity.serial);
        put_str(
            &mut self.item,
            tags::TREATMENT_MACHINE_NAME,
            VR::SH,
            &identity.machine_name,
        );
    }
}
