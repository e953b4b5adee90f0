/// Destination machine chosen by the operator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MachineSelection {
    /// No retargeting; the plan keeps its current machine.
    #[default]
    Keep,
    /// Retarget to the machine profile with this label.
    Machine(String),
}

impl MachineSelection {
    pub fn machine(label: impl Into<String>) -> Self {
        MachineSelection::Machine(label.into())
    }
}

impl From<Option<String>> for MachineSelection {
    fn from(label: Option<String>) -> Self {
        match label {
            Some(label) => MachineSelection::Machine(label),
            None => MachineSelection::Keep,
        }
    }
}

/// Byte layout of the file a plan was read from, reproduced on write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// 128-byte preamble, `DICM` magic, file meta group, dataset.
    Preamble(Vec<u8>),
    /// `DICM` magic, file meta group, dataset.
    MetaOnly,
    /// Bare dataset without any file meta group.
    Bare(BareSyntax),
}

/// Transfer syntax of a dataset read without a file meta group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BareSyntax {
    #[default]
    ImplicitVrLittleEndian,
    ExplicitVrLittleEndian,
}

impl BareSyntax {
    pub fn uid(self) -> &'static str {
        match self {
            BareSyntax::ImplicitVrLittleEndian => dicom_dictionary_std::uids::IMPLICIT_VR_LITTLE_ENDIAN,
            BareSyntax::ExplicitVrLittleEndian => dicom_dictionary_std::uids::EXPLICIT_VR_LITTLE_ENDIAN,
        }
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Preamble(vec![0; crate::plan_io::PREAMBLE_LEN])
    }
}

/// Suffix appended to the file stem of an output file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Modified,
    Private,
}

impl OutputKind {
    pub fn suffix(self) -> &'static str {
        match self {
            OutputKind::Modified => "_mod",
            OutputKind::Private => "_private",
        }
    }
}
