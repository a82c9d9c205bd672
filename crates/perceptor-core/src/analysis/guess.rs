use crate::core::models::element::Element;
use crate::core::models::ids::AtomId;
use crate::core::models::system::MolecularSystem;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Rotation3, Unit, Vector3};
use tracing::debug;

/// Slack added to the sum of covalent radii when deciding whether two atoms
/// are bonded.
const BOND_TOLERANCE: f64 = 0.3;

/// Pairs closer than this are overlapping records (typically unset
/// coordinates), not bonds.
const MIN_BOND_DISTANCE: f64 = 0.1;

/// Ideal tetrahedral angle, used when a hydrogen is placed off a singly
/// coordinated heavy atom.
const TETRAHEDRAL_ANGLE_DEG: f64 = 109.471_220_6;

fn covalent_radius(atomic_number: u8) -> f64 {
    Element::from_atomic_number(atomic_number)
        .map(|e| e.radius())
        .unwrap_or(0.0)
}

/// Infers covalent bonds from interatomic distances: two non-pseudo atoms
/// are bonded when they lie within the sum of their covalent radii plus a
/// tolerance. H-H pairs are never bonded. Existing bonds are kept, so the
/// operation is idempotent.
pub fn guess_bond_connectivity(system: &mut MolecularSystem) {
    let entries: Vec<(AtomId, [f64; 3], f64, u8)> = system
        .atoms_iter()
        .filter(|(_, atom)| !atom.is_pseudo())
        .map(|(id, atom)| {
            let p = atom.position;
            (id, [p.x, p.y, p.z], covalent_radius(atom.atomic_number), atom.atomic_number)
        })
        .collect();

    let mut tree: KdTree<f64, 3> = KdTree::new();
    for (i, entry) in entries.iter().enumerate() {
        tree.add(&entry.1, i as u64);
    }
    let max_radius = entries.iter().map(|e| e.2).fold(0.0, f64::max);

    let mut added = 0usize;
    for (i, &(id, position, radius, z)) in entries.iter().enumerate() {
        let reach = radius + max_radius + BOND_TOLERANCE;
        for neighbor in tree.within_unsorted::<SquaredEuclidean>(&position, reach * reach) {
            let j = neighbor.item as usize;
            if j <= i {
                continue;
            }
            let (other_id, _, other_radius, other_z) = entries[j];
            if z == 1 && other_z == 1 {
                continue;
            }
            let cutoff = radius + other_radius + BOND_TOLERANCE;
            if neighbor.distance < MIN_BOND_DISTANCE * MIN_BOND_DISTANCE
                || neighbor.distance > cutoff * cutoff
            {
                continue;
            }
            if system.bond(id, other_id).is_none() {
                system.add_bond(id, other_id, 1).ok();
                added += 1;
            }
        }
    }
    debug!(bonds = added, "bond connectivity guess");
}

fn any_perpendicular(direction: &Vector3<f64>) -> Vector3<f64> {
    let candidate = direction.cross(&Vector3::x());
    if candidate.norm() > 1e-6 {
        candidate.normalize()
    } else {
        direction.cross(&Vector3::y()).normalize()
    }
}

/// Repositions the selected hydrogens at an ideal bond length from their
/// single heavy neighbor, pointing away from that neighbor's remaining
/// substituents. Hydrogens with zero or multiple bonds are left untouched.
pub fn guess_hydrogen_positions(system: &mut MolecularSystem, hydrogens: &[AtomId]) {
    for &h in hydrogens {
        let Some(atom) = system.atom(h) else { continue };
        if atom.atomic_number != 1 {
            continue;
        }
        let neighbors = system.filtered_neighbors(h);
        let [parent] = neighbors.as_slice() else {
            continue;
        };
        let parent = *parent;
        let parent_atom = system.atom(parent).unwrap();
        let parent_position = parent_atom.position;
        let bond_length = covalent_radius(parent_atom.atomic_number) + covalent_radius(1);

        let substituents: Vec<Vector3<f64>> = system
            .filtered_neighbors(parent)
            .into_iter()
            .filter(|&other| other != h)
            .filter_map(|other| {
                let v = system.atom(other).unwrap().position - parent_position;
                (v.norm() > 1e-6).then(|| v.normalize())
            })
            .collect();

        let direction = match substituents.len() {
            0 => {
                let current = system.atom(h).unwrap().position - parent_position;
                if current.norm() > 1e-6 {
                    current.normalize()
                } else {
                    Vector3::x()
                }
            }
            1 => {
                // Bend away from the lone substituent at the tetrahedral
                // angle.
                let axis = Unit::new_normalize(any_perpendicular(&substituents[0]));
                let rotation =
                    Rotation3::from_axis_angle(&axis, TETRAHEDRAL_ANGLE_DEG.to_radians());
                rotation * substituents[0]
            }
            _ => {
                let sum: Vector3<f64> = substituents.iter().sum();
                if sum.norm() > 1e-6 {
                    -sum.normalize()
                } else {
                    // Substituents cancel (linear or planar-symmetric
                    // center); step out perpendicular to the first.
                    any_perpendicular(&substituents[0])
                }
            }
        };

        system.atom_mut(h).unwrap().position = parent_position + direction * bond_length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atom::Atom;
    use crate::core::models::ids::ResidueId;
    use nalgebra::Point3;

    fn new_residue(system: &mut MolecularSystem) -> ResidueId {
        let chain = system.add_chain("A");
        system.add_residue(chain, 1, "LIG").unwrap()
    }

    fn add_atom(
        system: &mut MolecularSystem,
        residue: ResidueId,
        z: u8,
        position: Point3<f64>,
    ) -> AtomId {
        let mut atom = Atom::new("X", residue);
        atom.atomic_number = z;
        atom.position = position;
        system.add_atom(residue, atom).unwrap()
    }

    #[test]
    fn water_connectivity_is_recovered_from_distances() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let o = add_atom(&mut system, residue, 8, Point3::new(0.0, 0.0, 0.0));
        let h1 = add_atom(&mut system, residue, 1, Point3::new(0.96, 0.0, 0.0));
        let h2 = add_atom(&mut system, residue, 1, Point3::new(-0.24, 0.93, 0.0));

        guess_bond_connectivity(&mut system);
        assert!(system.bond(o, h1).is_some());
        assert!(system.bond(o, h2).is_some());
        assert!(system.bond(h1, h2).is_none(), "H-H pairs are never bonded");

        // Idempotent: a second pass adds nothing.
        guess_bond_connectivity(&mut system);
        assert_eq!(system.bond_count(), 2);
    }

    #[test]
    fn distant_and_overlapping_atoms_are_not_bonded() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c1 = add_atom(&mut system, residue, 6, Point3::new(0.0, 0.0, 0.0));
        let c2 = add_atom(&mut system, residue, 6, Point3::new(4.0, 0.0, 0.0));
        let c3 = add_atom(&mut system, residue, 6, Point3::new(0.0, 0.0, 0.0));

        guess_bond_connectivity(&mut system);
        assert!(system.bond(c1, c2).is_none());
        assert!(system.bond(c1, c3).is_none(), "coincident atoms are records, not bonds");
    }

    #[test]
    fn pseudo_particles_are_invisible_to_the_guess() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c = add_atom(&mut system, residue, 6, Point3::new(0.0, 0.0, 0.0));
        let ep = add_atom(&mut system, residue, 0, Point3::new(0.5, 0.0, 0.0));

        guess_bond_connectivity(&mut system);
        assert!(system.bond(c, ep).is_none());
    }

    #[test]
    fn hydroxyl_hydrogen_lands_at_the_ideal_bond_length() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c = add_atom(&mut system, residue, 6, Point3::new(-1.4, 0.0, 0.0));
        let o = add_atom(&mut system, residue, 8, Point3::new(0.0, 0.0, 0.0));
        let h = add_atom(&mut system, residue, 1, Point3::new(0.2, 0.2, 0.2));
        system.add_bond(c, o, 1).unwrap();
        system.add_bond(o, h, 1).unwrap();

        guess_hydrogen_positions(&mut system, &[h]);

        let o_position = system.atom(o).unwrap().position;
        let h_position = system.atom(h).unwrap().position;
        let bond = h_position - o_position;
        let expected = covalent_radius(8) + covalent_radius(1);
        assert!((bond.norm() - expected).abs() < 1e-9);

        // Tetrahedral-ish: well away from the C-O axis.
        let to_c = (system.atom(c).unwrap().position - o_position).normalize();
        let angle = bond.normalize().dot(&to_c).acos().to_degrees();
        assert!((angle - TETRAHEDRAL_ANGLE_DEG).abs() < 1e-6);
    }

    #[test]
    fn methyl_hydrogen_points_away_from_the_other_substituents() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c = add_atom(&mut system, residue, 6, Point3::new(0.0, 0.0, 0.0));
        let a = add_atom(&mut system, residue, 6, Point3::new(1.5, 0.0, 0.0));
        let b = add_atom(&mut system, residue, 6, Point3::new(-0.7, 1.3, 0.0));
        let h = add_atom(&mut system, residue, 1, Point3::new(0.1, 0.1, 0.1));
        system.add_bond(c, a, 1).unwrap();
        system.add_bond(c, b, 1).unwrap();
        system.add_bond(c, h, 1).unwrap();

        guess_hydrogen_positions(&mut system, &[h]);
        let direction = (system.atom(h).unwrap().position - system.atom(c).unwrap().position)
            .normalize();
        for &heavy in &[a, b] {
            let other = (system.atom(heavy).unwrap().position
                - system.atom(c).unwrap().position)
                .normalize();
            assert!(direction.dot(&other) < 0.0, "hydrogen must avoid substituents");
        }
    }

    #[test]
    fn non_hydrogens_and_multiply_bonded_hydrogens_are_skipped() {
        let mut system = MolecularSystem::new();
        let residue = new_residue(&mut system);
        let c = add_atom(&mut system, residue, 6, Point3::new(0.0, 0.0, 0.0));
        let o = add_atom(&mut system, residue, 8, Point3::new(1.4, 0.0, 0.0));
        let bridging = add_atom(&mut system, residue, 1, Point3::new(0.7, 0.5, 0.0));
        system.add_bond(c, bridging, 1).unwrap();
        system.add_bond(o, bridging, 1).unwrap();

        let before_c = system.atom(c).unwrap().position;
        let before_h = system.atom(bridging).unwrap().position;
        guess_hydrogen_positions(&mut system, &[c, bridging]);
        assert_eq!(system.atom(c).unwrap().position, before_c);
        assert_eq!(system.atom(bridging).unwrap().position, before_h);
    }
}
