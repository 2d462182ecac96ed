use crate::error::ReconError;
use crate::plan::ChangePlan;

/// Result of the mass-deletion check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeletionCheck {
    pub planned: usize,
    pub managed: usize,
    pub fraction: f64,
}

/// Abort when planned deletes / managed nodes exceeds `ceiling`.
pub fn check_mass_deletion(
    plan: &ChangePlan,
    managed: usize,
    ceiling: f64,
) -> Result<DeletionCheck, ReconError> {
    let planned = plan.delete.len();
    let fraction = if managed == 0 {
        0.0
    } else {
        planned as f64 / managed as f64
    };
    if fraction > ceiling {
        log::error!(
            "refusing to delete {planned} of {managed} managed nodes ({:.1}% > {:.1}%)",
            fraction * 100.0,
            ceiling * 100.0
        );
        return Err(ReconError::MassDeletion {
            planned,
            managed,
            ceiling,
        });
    }
    Ok(DeletionCheck {
        planned,
        managed,
        fraction,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{PlannedDelete, PlannedNode};
    use crate::tags::Tags;

    fn plan_with_deletes(n: usize) -> ChangePlan {
        let mut plan = ChangePlan::default();
        for i in 0..n {
            plan.delete.push(PlannedDelete {
                register_ref: format!("r{i}"),
                node: PlannedNode {
                    id: i as i64 + 1,
                    lat: 0.0,
                    lon: 0.0,
                    version: Some(1),
                    tags: Tags::new(),
                },
            });
        }
        plan
    }

    #[test]
    fn at_ceiling_passes() {
        let check = check_mass_deletion(&plan_with_deletes(1), 10, 0.1).unwrap();
        assert_eq!(check.planned, 1);
        assert!((check.fraction - 0.1).abs() < 1e-12);
    }

    #[test]
    fn above_ceiling_aborts() {
        let err = check_mass_deletion(&plan_with_deletes(2), 10, 0.1).unwrap_err();
        assert!(matches!(err, ReconError::MassDeletion { planned: 2, managed: 10, .. }));
    }

    #[test]
    fn no_managed_nodes_means_nothing_to_guard() {
        assert!(check_mass_deletion(&ChangePlan::default(), 0, 0.1).is_ok());
    }
}
