//! Master-set sealing: phase targets derived from the actual concept count.
//!
//! practice = C, archive = exam simulation = ceil(C / 4). Practice being
//! full is what seals a chunk.

use super::types::{PhaseCounts, Quota};

/// Share of the practice set reserved for each secondary phase, as 1/N.
const SECONDARY_DIVISOR: u32 = 4;

pub fn phase_targets(concept_count: u32) -> PhaseCounts {
    let secondary = concept_count.div_ceil(SECONDARY_DIVISOR);
    PhaseCounts {
        practice: concept_count,
        archive: secondary,
        exam_simulation: secondary,
    }
}

pub fn plan_quota(concept_count: u32, existing: PhaseCounts) -> Quota {
    Quota {
        concept_count,
        targets: phase_targets(concept_count),
        existing,
    }
}
