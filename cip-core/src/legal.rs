//! Legal intervention enumeration.

use rustc_hash::FxHashSet;

use crate::action::{Intervention, SWAP_SENTINEL};
use crate::config::InterventionSpace;

/// Legal next interventions given the sequence applied so far.
///
/// Rules:
/// - every `(object, action)` pair of `space`, in space order
/// - minus pairs recorded in `violations`
/// - minus objects already intervened on in `history` (the swap sentinel is reusable)
pub fn legal_actions(
    space: &InterventionSpace,
    history: &[Intervention],
    violations: &FxHashSet<Intervention>,
) -> Vec<Intervention> {
    let touched: FxHashSet<&str> = history.iter().map(|i| i.object.as_str()).collect();

    let mut out = Vec::new();
    for (object, actions) in space {
        if object != SWAP_SENTINEL && touched.contains(object.as_str()) {
            continue;
        }
        for action in actions {
            let candidate = Intervention::new(object.as_str(), action.as_str());
            if violations.contains(&candidate) {
                continue;
            }
            out.push(candidate);
        }
    }
    out
}
