//! Entitlement calculation.

use eduq_model::{Course, QuotaProfile};

/// Fold the baseline and every active course's profile into one entitlement.
///
/// Each field sums independently and course order does not matter. An empty
/// course list yields the baseline unchanged.
pub fn compute_effective(baseline: QuotaProfile, active_courses: &[Course]) -> QuotaProfile {
    baseline
        + active_courses
            .iter()
            .map(|course| course.quota_profile)
            .sum::<QuotaProfile>()
}
