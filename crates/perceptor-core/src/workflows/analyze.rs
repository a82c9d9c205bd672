use crate::analysis::aromatic::annotate_aromaticity;
use crate::analysis::bond_orders::{assign_bond_orders_and_formal_charges, AssignFlags};
use crate::analysis::guess::guess_bond_connectivity;
use crate::core::models::system::MolecularSystem;
use tracing::{debug, warn};

/// Runs the standard perception pipeline over a freshly built or imported
/// system:
///
/// 1. connectivity from interatomic distances, when the system has atoms but
///    no bonds at all;
/// 2. fragment ids;
/// 3. bond-order and formal-charge refinement, independently per fragment
///    and best-effort: a fragment whose chemistry cannot be reconciled is
///    left untouched with a warning;
/// 4. ring perception and aromaticity annotation.
///
/// Aromaticity classification reads the assigned in-ring bond orders, so
/// the annotation pass must come after refinement.
///
/// The pipeline is idempotent; running it twice leaves the system unchanged
/// after the first pass.
pub fn analyze(system: &mut MolecularSystem) {
    if system.bond_count() == 0 && system.atom_count() > 1 {
        guess_bond_connectivity(system);
    }

    let fragments = system.update_fragids();
    debug!(fragments = fragments.len(), "analyze");
    for (fragid, fragment) in fragments.iter().enumerate() {
        if let Err(error) = assign_bond_orders_and_formal_charges(
            system,
            fragment,
            None,
            AssignFlags::empty(),
        ) {
            warn!(fragid, %error, "bond order refinement skipped");
        }
    }

    annotate_aromaticity(system);
}
