use serde::Serialize;

use crate::error::AppError;

/// Sample attrition through the exclusion stages, in pipeline order
/// web standardization → EO → ANN. Each `remaining_*` is the previous stage's
/// count minus that stage's exclusions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowchartCounts {
    pub input_count: u64,
    pub excluded_by_web: u64,
    pub remaining_after_web: u64,
    pub excluded_by_eo: u64,
    pub remaining_after_eo: u64,
    pub excluded_by_ann: u64,
    pub remaining_after_ann: u64,
}

impl FlowchartCounts {
    /// Fails with an assembly error when a stage excludes more samples than
    /// reached it.
    pub fn compute(
        input_count: u64,
        excluded_by_web: u64,
        excluded_by_eo: u64,
        excluded_by_ann: u64,
    ) -> Result<Self, AppError> {
        let remaining_after_web = subtract("web", input_count, excluded_by_web)?;
        let remaining_after_eo = subtract("eo", remaining_after_web, excluded_by_eo)?;
        let remaining_after_ann = subtract("ann", remaining_after_eo, excluded_by_ann)?;

        Ok(Self {
            input_count,
            excluded_by_web,
            remaining_after_web,
            excluded_by_eo,
            remaining_after_eo,
            excluded_by_ann,
            remaining_after_ann,
        })
    }
}

fn subtract(stage: &str, available: u64, excluded: u64) -> Result<u64, AppError> {
    available.checked_sub(excluded).ok_or_else(|| {
        AppError::Assembly(format!(
            "{stage} stage excluded {excluded} samples but only {available} reached it"
        ))
    })
}
