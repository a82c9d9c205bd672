use crate::core::models::atom::Atom;
use crate::core::models::element::Element;
use crate::core::models::ids::{AtomId, ParamId};
use crate::core::models::system::{MolecularSystem, SystemError};
use crate::core::tables::{ColumnKind, ParamTable, TableError, Value};
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Amber stores charges premultiplied by sqrt of the Coulomb constant in its
/// internal units; dividing by this factor recovers electrons.
pub const AMBER_CHARGE_FACTOR: f64 = 18.2223;

#[derive(Debug, Error)]
pub enum PrmtopError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Missing required section {0}")]
    MissingSection(String),
    #[error("Expected %FORMAT(fmt), got '{0}'")]
    BadFormat(String),
    #[error("Parse error in section {flag}: bad field '{field}'")]
    Parse { flag: String, field: String },
    #[error("Unsupported input: {0}")]
    Unsupported(String),
    #[error("multiple dihedral term contains conflicting force constant for period {period}")]
    DihedralConflict { period: usize },
    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
    #[error(transparent)]
    System(#[from] SystemError),
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Import atoms, residues, and bonds only; skip every parameter and term
    /// table.
    pub structure_only: bool,
}

#[derive(Debug, Clone, Copy)]
struct Format {
    width: usize,
    kind: char,
}

#[derive(Debug)]
struct Section {
    flag: String,
    fmt: Format,
    data: String,
}

type SectionMap = BTreeMap<String, Section>;

/// Offsets into the POINTERS section.
mod pointers {
    pub const NATOM: usize = 0;
    pub const NTYPES: usize = 1;
    pub const NBONH: usize = 2;
    pub const NBONA: usize = 3;
    pub const NTHETH: usize = 4;
    pub const NTHETA: usize = 5;
    pub const NPHIH: usize = 6;
    pub const NPHIA: usize = 7;
    pub const NNB: usize = 10;
    pub const NRES: usize = 11;
    pub const NUMBND: usize = 15;
    pub const NUMANG: usize = 16;
    pub const NPTRA: usize = 17;
    pub const NPHB: usize = 19;
    pub const IFPERT: usize = 20;
    pub const COUNT: usize = 30;
}

fn parse_format_line(line: &str) -> Result<Format, PrmtopError> {
    let bad = || PrmtopError::BadFormat(line.to_string());
    let open = line.find('(').ok_or_else(bad)?;
    let close = line[open..].find(')').ok_or_else(bad)? + open;
    let inner = &line[open + 1..close];

    let digits: String = inner.chars().take_while(|c| c.is_ascii_digit()).collect();
    let rest = &inner[digits.len()..];
    let kind = rest.chars().next().ok_or_else(bad)?;
    let width_digits: String = rest[kind.len_utf8()..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() || width_digits.is_empty() {
        return Err(bad());
    }
    Ok(Format {
        width: width_digits.parse().map_err(|_| bad())?,
        kind: kind.to_ascii_uppercase(),
    })
}

/// Slurps the file into a section map. `%FLAG` and `%FORMAT` are assumed to
/// be on their own lines; blank lines and `%COMMENT` lines are skipped.
fn read_sections<R: BufRead>(reader: R) -> Result<SectionMap, PrmtopError> {
    let mut lines = reader.lines();
    // First line is the version stamp.
    let _ = lines.next().transpose()?;

    let mut sections = SectionMap::new();
    let mut pending_flag: Option<String> = None;
    loop {
        // Find the next %FLAG line (or resume from the one that terminated
        // the previous section body).
        let flag = match pending_flag.take() {
            Some(flag) => flag,
            None => {
                let mut found = None;
                for line in lines.by_ref() {
                    let line = line?;
                    if line.starts_with("%FLAG") {
                        found = Some(line[5..].trim().to_string());
                        break;
                    }
                }
                match found {
                    Some(flag) => flag,
                    None => break,
                }
            }
        };

        let mut fmt = None;
        for line in lines.by_ref() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with("%COMMENT") {
                continue;
            }
            fmt = Some(parse_format_line(&line)?);
            break;
        }
        let fmt = fmt.ok_or_else(|| PrmtopError::BadFormat(format!("<eof> after {}", flag)))?;

        let mut data = String::new();
        for line in lines.by_ref() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with("%COMMENT") {
                continue;
            }
            if line.starts_with("%FLAG") {
                pending_flag = Some(line[5..].trim().to_string());
                break;
            }
            data.push_str(&line);
        }

        debug!(flag = flag.as_str(), bytes = data.len(), "prmtop section");
        sections.insert(
            flag.clone(),
            Section {
                flag,
                fmt,
                data,
            },
        );
        if pending_flag.is_none() {
            // Body loop hit end of file.
            break;
        }
    }
    Ok(sections)
}

fn section<'a>(map: &'a SectionMap, name: &str) -> Result<&'a Section, PrmtopError> {
    map.get(name)
        .ok_or_else(|| PrmtopError::MissingSection(name.to_string()))
}

fn field(sec: &Section, index: usize) -> Result<&str, PrmtopError> {
    let start = index * sec.fmt.width;
    if start >= sec.data.len() {
        return Err(PrmtopError::Parse {
            flag: sec.flag.clone(),
            field: "<end of section>".to_string(),
        });
    }
    let end = (start + sec.fmt.width).min(sec.data.len());
    Ok(sec.data[start..end].trim())
}

fn ensure_kind(sec: &Section, allowed: &[char]) -> Result<(), PrmtopError> {
    if allowed.contains(&sec.fmt.kind) {
        Ok(())
    } else {
        Err(PrmtopError::Parse {
            flag: sec.flag.clone(),
            field: format!("format code '{}'", sec.fmt.kind),
        })
    }
}

fn parse_ints(map: &SectionMap, name: &str, count: usize) -> Result<Vec<i64>, PrmtopError> {
    let sec = section(map, name)?;
    ensure_kind(sec, &['I'])?;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        let raw = field(sec, i)?;
        let value = raw.parse::<i64>().map_err(|_| PrmtopError::Parse {
            flag: sec.flag.clone(),
            field: raw.to_string(),
        })?;
        values.push(value);
    }
    Ok(values)
}

fn parse_floats(map: &SectionMap, name: &str, count: usize) -> Result<Vec<f64>, PrmtopError> {
    let sec = section(map, name)?;
    ensure_kind(sec, &['E', 'F', 'D'])?;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        let raw = field(sec, i)?;
        let value = raw.parse::<f64>().map_err(|_| PrmtopError::Parse {
            flag: sec.flag.clone(),
            field: raw.to_string(),
        })?;
        values.push(value);
    }
    Ok(values)
}

fn parse_strs(map: &SectionMap, name: &str, count: usize) -> Result<Vec<String>, PrmtopError> {
    let sec = section(map, name)?;
    ensure_kind(sec, &['A'])?;
    let mut values = Vec::with_capacity(count);
    for i in 0..count {
        values.push(field(sec, i)?.to_string());
    }
    Ok(values)
}

/// Resolves a 0-based atom index from a term section. Bonded sections store
/// atom indices premultiplied by 3; callers divide before resolving.
fn atom_at(atoms: &[AtomId], flag: &str, index: i64) -> Result<AtomId, PrmtopError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| atoms.get(i).copied())
        .ok_or_else(|| {
            PrmtopError::Inconsistency(format!("atom index {} out of range in {}", index, flag))
        })
}

/// A 1-4 nonbonded pair generated by a dihedral term, with its electrostatic
/// and Lennard-Jones scale divisors.
struct Pair {
    ai: AtomId,
    aj: AtomId,
    es: f64,
    lj: f64,
}

fn parse_stretch(
    system: &mut MolecularSystem,
    map: &SectionMap,
    structure_only: bool,
    atoms: &[AtomId],
    ntypes: usize,
    nbonh: usize,
    nbona: usize,
) -> Result<(), PrmtopError> {
    let r0 = parse_floats(map, "BOND_EQUIL_VALUE", ntypes)?;
    let fc = parse_floats(map, "BOND_FORCE_CONSTANT", ntypes)?;
    let bonh = parse_ints(map, "BONDS_INC_HYDROGEN", nbonh * 3)?;
    let bona = parse_ints(map, "BONDS_WITHOUT_HYDROGEN", nbona * 3)?;

    if !structure_only {
        let params = system.add_table(
            "stretch_harm",
            2,
            &[("fc", ColumnKind::Float), ("r0", ColumnKind::Float)],
        )?;
        let table = system.param_table_mut(params).unwrap();
        for i in 0..ntypes {
            let p = table.add_param();
            table.set_value_by_name(p, "fc", Value::Float(fc[i]))?;
            table.set_value_by_name(p, "r0", Value::Float(r0[i]))?;
        }
    }

    for (name, triples) in [("BONDS_INC_HYDROGEN", &bonh), ("BONDS_WITHOUT_HYDROGEN", &bona)] {
        for chunk in triples.chunks_exact(3) {
            let ai = atom_at(atoms, name, chunk[0] / 3)?;
            let aj = atom_at(atoms, name, chunk[1] / 3)?;
            // Amber encodes SHAKE constraints as H-H entries in the bond
            // list; they are not chemical bonds. The second section is not
            // expected to contain any, but gets the same guard.
            if system.atom(ai).unwrap().atomic_number == 1
                && system.atom(aj).unwrap().atomic_number == 1
            {
                continue;
            }
            if system.bond(ai, aj).is_none() {
                system.add_bond(ai, aj, 1)?;
            }
            if structure_only {
                continue;
            }
            let param = (chunk[2] - 1) as ParamId;
            system.add_term("stretch_harm", &[ai, aj], Some(param))?;
        }
    }
    Ok(())
}

fn parse_angle(
    system: &mut MolecularSystem,
    map: &SectionMap,
    atoms: &[AtomId],
    ntypes: usize,
    ntheth: usize,
    ntheta: usize,
) -> Result<(), PrmtopError> {
    let theta0 = parse_floats(map, "ANGLE_EQUIL_VALUE", ntypes)?;
    let fc = parse_floats(map, "ANGLE_FORCE_CONSTANT", ntypes)?;
    let angh = parse_ints(map, "ANGLES_INC_HYDROGEN", ntheth * 4)?;
    let anga = parse_ints(map, "ANGLES_WITHOUT_HYDROGEN", ntheta * 4)?;

    let params = system.add_table(
        "angle_harm",
        3,
        &[("fc", ColumnKind::Float), ("theta0", ColumnKind::Float)],
    )?;
    let table = system.param_table_mut(params).unwrap();
    for i in 0..ntypes {
        let p = table.add_param();
        table.set_value_by_name(p, "fc", Value::Float(fc[i]))?;
        // Equilibrium angles are stored in radians.
        table.set_value_by_name(p, "theta0", Value::Float(theta0[i] * 180.0 / PI))?;
    }

    for (name, quads) in [("ANGLES_INC_HYDROGEN", &angh), ("ANGLES_WITHOUT_HYDROGEN", &anga)] {
        for chunk in quads.chunks_exact(4) {
            let ai = atom_at(atoms, name, chunk[0] / 3)?;
            let aj = atom_at(atoms, name, chunk[1] / 3)?;
            let ak = atom_at(atoms, name, chunk[2] / 3)?;
            let param = (chunk[3] - 1) as ParamId;
            system.add_term("angle_harm", &[ai, aj, ak], Some(param))?;
        }
    }
    Ok(())
}

fn parse_torsion(
    system: &mut MolecularSystem,
    map: &SectionMap,
    atoms: &[AtomId],
    ntypes: usize,
    nphih: usize,
    nphia: usize,
) -> Result<Vec<Pair>, PrmtopError> {
    let phase = parse_floats(map, "DIHEDRAL_PHASE", ntypes)?;
    let fc = parse_floats(map, "DIHEDRAL_FORCE_CONSTANT", ntypes)?;
    let period = parse_floats(map, "DIHEDRAL_PERIODICITY", ntypes)?;
    let mut dih = parse_ints(map, "DIHEDRALS_INC_HYDROGEN", nphih * 5)?;
    dih.extend(parse_ints(map, "DIHEDRALS_WITHOUT_HYDROGEN", nphia * 5)?);
    let scee = if map.contains_key("SCEE_SCALE_FACTOR") {
        parse_floats(map, "SCEE_SCALE_FACTOR", ntypes)?
    } else {
        vec![1.2; ntypes]
    };
    let scnb = if map.contains_key("SCNB_SCALE_FACTOR") {
        parse_floats(map, "SCNB_SCALE_FACTOR", ntypes)?
    } else {
        vec![2.0; ntypes]
    };

    let params_id = system.add_table(
        "dihedral_trig",
        4,
        &[
            ("phi0", ColumnKind::Float),
            ("fc0", ColumnKind::Float),
            ("fc1", ColumnKind::Float),
            ("fc2", ColumnKind::Float),
            ("fc3", ColumnKind::Float),
            ("fc4", ColumnKind::Float),
            ("fc5", ColumnKind::Float),
            ("fc6", ColumnKind::Float),
        ],
    )?;

    let mut pairs = Vec::new();
    // Phase-0 terms sharing an atom tuple merge into one parameter row.
    let mut merged: HashMap<Vec<AtomId>, ParamId> = HashMap::new();

    for chunk in dih.chunks_exact(5) {
        let ai = chunk[0] / 3;
        let aj = chunk[1] / 3;
        let mut ak = chunk[2] / 3;
        let mut al = chunk[3] / 3;
        let ind = (chunk[4] - 1) as usize;
        if ind >= ntypes {
            return Err(PrmtopError::Inconsistency(format!(
                "dihedral parameter index {} out of range",
                ind + 1
            )));
        }

        let mut needs_pair = false;
        if ak < 0 {
            ak = -ak;
        } else {
            needs_pair = true;
        }
        if al < 0 {
            // An improper, though it uses the same functional form.
            al = -al;
        }

        let flag = "DIHEDRALS";
        let ids = vec![
            atom_at(atoms, flag, ai)?,
            atom_at(atoms, flag, aj)?,
            atom_at(atoms, flag, ak)?,
            atom_at(atoms, flag, al)?,
        ];

        if needs_pair {
            let (pi, pj) = if ids[0] <= ids[3] {
                (ids[0], ids[3])
            } else {
                (ids[3], ids[0])
            };
            pairs.push(Pair {
                ai: pi,
                aj: pj,
                es: scee[ind],
                lj: scnb[ind],
            });
        }

        // Canonicalize force constant and phase. Amber files approximate pi
        // by 3.141594, so accept a window around 180 degrees.
        let fc_orig = fc[ind];
        let mut fc_phased = fc_orig;
        let mut phase_in_degrees = phase[ind] * 180.0 / PI;
        if phase_in_degrees.abs() > 179.9 && phase_in_degrees.abs() < 180.1 {
            phase_in_degrees = 0.0;
            fc_phased = -fc_phased;
        }

        let param = if phase_in_degrees == 0.0 {
            match merged.get(&ids) {
                Some(&param) => param,
                None => {
                    let param = system.param_table_mut(params_id).unwrap().add_param();
                    system.add_term("dihedral_trig", &ids, Some(param))?;
                    merged.insert(ids.clone(), param);
                    param
                }
            }
        } else {
            let table = system.param_table_mut(params_id).unwrap();
            let param = table.add_param();
            table.set_value_by_name(param, "phi0", Value::Float(phase_in_degrees))?;
            system.add_term("dihedral_trig", &ids, Some(param))?;
            param
        };

        let n = period[ind] as i64;
        if !(1..=6).contains(&n) {
            return Err(PrmtopError::Inconsistency(format!(
                "dihedral periodicity {} outside 1..=6",
                period[ind]
            )));
        }
        let column = 1 + n as usize;
        let table = system.param_table_mut(params_id).unwrap();
        let old = table.value(param, column).and_then(Value::as_float).unwrap();
        if old == 0.0 {
            table.set_value(param, column, Value::Float(fc_phased))?;
        } else if old != fc_phased {
            return Err(PrmtopError::DihedralConflict { period: n as usize });
        }
        let sum = table.value(param, 1).and_then(Value::as_float).unwrap();
        table.set_value(param, 1, Value::Float(sum + fc_orig))?;
    }
    Ok(pairs)
}

fn parse_nonbonded(
    system: &mut MolecularSystem,
    map: &SectionMap,
    atoms: &[AtomId],
    ntypes: usize,
    pairs: &[Pair],
) -> Result<(), PrmtopError> {
    let natom = atoms.len();
    let ntypes2 = ntypes * (ntypes + 1) / 2;
    let types = parse_ints(map, "ATOM_TYPE_INDEX", natom)?;
    let inds = parse_ints(map, "NONBONDED_PARM_INDEX", ntypes * ntypes)?;
    let acoef = parse_floats(map, "LENNARD_JONES_ACOEF", ntypes2)?;
    let bcoef = parse_floats(map, "LENNARD_JONES_BCOEF", ntypes2)?;
    let vdwtypes = parse_strs(map, "AMBER_ATOM_TYPE", natom)?;

    let coefficients = |itype: i64, jtype: i64| -> Result<(f64, f64), PrmtopError> {
        let lookup = (ntypes as i64 * (itype - 1) + jtype - 1) as usize;
        let ico = *inds
            .get(lookup)
            .ok_or_else(|| PrmtopError::Inconsistency("bad NONBONDED_PARM_INDEX".into()))?;
        let c12 = *acoef
            .get((ico - 1) as usize)
            .ok_or_else(|| PrmtopError::Inconsistency("bad LENNARD_JONES_ACOEF index".into()))?;
        let c6 = *bcoef
            .get((ico - 1) as usize)
            .ok_or_else(|| PrmtopError::Inconsistency("bad LENNARD_JONES_BCOEF index".into()))?;
        Ok((c12, c6))
    };

    let nb_params = system.add_table(
        "vdw_12_6",
        1,
        &[
            ("sigma", ColumnKind::Float),
            ("epsilon", ColumnKind::Float),
            ("type", ColumnKind::Str),
        ],
    )?;
    for (i, &atom_id) in atoms.iter().enumerate() {
        let (c12, c6) = coefficients(types[i], types[i])?;
        let (sigma, epsilon) = if c12 != 0.0 && c6 != 0.0 {
            ((c12 / c6).powf(1.0 / 6.0), c6 * c6 / (4.0 * c12))
        } else {
            (0.0, 0.0)
        };
        let table = system.param_table_mut(nb_params).unwrap();
        let param = table.add_param();
        table.set_value_by_name(param, "sigma", Value::Float(sigma))?;
        table.set_value_by_name(param, "epsilon", Value::Float(epsilon))?;
        table.set_value_by_name(param, "type", Value::Str(vdwtypes[i].clone()))?;
        system.add_term("vdw_12_6", &[atom_id], Some(param))?;
    }

    let pair_params = system.add_table(
        "pair_12_6_es",
        2,
        &[
            ("aij", ColumnKind::Float),
            ("bij", ColumnKind::Float),
            ("qij", ColumnKind::Float),
        ],
    )?;
    let index_of: HashMap<AtomId, usize> =
        atoms.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    for pair in pairs {
        let lj = 1.0 / pair.lj;
        let es = 1.0 / pair.es;
        let (c12, c6) = coefficients(types[index_of[&pair.ai]], types[index_of[&pair.aj]])?;
        let qij = es
            * system.atom(pair.ai).unwrap().partial_charge
            * system.atom(pair.aj).unwrap().partial_charge;
        let table = system.param_table_mut(pair_params).unwrap();
        let param = table.add_param();
        table.set_value_by_name(param, "aij", Value::Float(lj * c12))?;
        table.set_value_by_name(param, "bij", Value::Float(lj * c6))?;
        table.set_value_by_name(param, "qij", Value::Float(qij))?;
        system.add_term("pair_12_6_es", &[pair.ai, pair.aj], Some(param))?;
    }
    Ok(())
}

fn parse_exclusions(
    system: &mut MolecularSystem,
    map: &SectionMap,
    atoms: &[AtomId],
    nnb: usize,
) -> Result<(), PrmtopError> {
    if nnb == 0 {
        return Ok(());
    }
    system.add_table("exclusion", 2, &[])?;
    let nexcl = parse_ints(map, "NUMBER_EXCLUDED_ATOMS", atoms.len())?;
    let excl = parse_ints(map, "EXCLUDED_ATOMS_LIST", nnb)?;
    let mut j = 0usize;
    for (i, &atom_id) in atoms.iter().enumerate() {
        for _ in 0..nexcl[i] {
            let other = excl
                .get(j)
                .copied()
                .ok_or_else(|| PrmtopError::Inconsistency("EXCLUDED_ATOMS_LIST too short".into()))?;
            j += 1;
            // A zero entry means "no exclusions for this atom".
            if other == 0 {
                continue;
            }
            let partner = atoms
                .get((other - 1) as usize)
                .copied()
                .ok_or_else(|| PrmtopError::Inconsistency("bad EXCLUDED_ATOMS_LIST entry".into()))?;
            system.add_term("exclusion", &[atom_id, partner], None)?;
        }
    }
    Ok(())
}

/// CMAP grids live in 0-indexed aux tables but are referenced 1-indexed from
/// the torsiontorsion term table; atom ids are 0-indexed.
fn parse_cmap(
    system: &mut MolecularSystem,
    map: &SectionMap,
    atoms: &[AtomId],
) -> Result<(), PrmtopError> {
    let prefix = if map.contains_key("CMAP_COUNT") {
        ""
    } else if map.contains_key("CHARMM_CMAP_COUNT") {
        "CHARMM_"
    } else {
        return Ok(());
    };
    let counts = parse_ints(map, &format!("{prefix}CMAP_COUNT"), 2)?;
    let nterms = counts[0] as usize;
    let nmaps = counts[1] as usize;
    let resolution = parse_ints(map, &format!("{prefix}CMAP_RESOLUTION"), nmaps)?;

    for i in 0..nmaps {
        let res = resolution[i] as usize;
        let grid = parse_floats(map, &format!("{prefix}CMAP_PARAMETER_{:02}", i + 1), res * res)?;
        let mut table = ParamTable::with_columns(&[
            ("phi", ColumnKind::Float),
            ("psi", ColumnKind::Float),
            ("energy", ColumnKind::Float),
        ]);
        let spacing = 360.0 / res as f64;
        for iphi in 0..res {
            for ipsi in 0..res {
                let row = table.add_param();
                table.set_value(row, 0, Value::Float(-180.0 + iphi as f64 * spacing))?;
                table.set_value(row, 1, Value::Float(-180.0 + ipsi as f64 * spacing))?;
                table.set_value(row, 2, Value::Float(grid[res * iphi + ipsi]))?;
            }
        }
        system.add_aux_table(&format!("cmap{}", i + 1), table);
    }

    let cmap_params = system.add_table(
        "torsiontorsion_cmap",
        8,
        &[("cmapid", ColumnKind::Str)],
    )?;
    let terms = parse_ints(map, &format!("{prefix}CMAP_INDEX"), nterms * 6)?;
    for chunk in terms.chunks_exact(6) {
        let flag = "CMAP_INDEX";
        let a = atom_at(atoms, flag, chunk[0] - 1)?;
        let b = atom_at(atoms, flag, chunk[1] - 1)?;
        let c = atom_at(atoms, flag, chunk[2] - 1)?;
        let d = atom_at(atoms, flag, chunk[3] - 1)?;
        let e = atom_at(atoms, flag, chunk[4] - 1)?;
        let ids = [a, b, c, d, b, c, d, e];
        let table = system.param_table_mut(cmap_params).unwrap();
        let param = table.add_param();
        table.set_value_by_name(param, "cmapid", Value::Str(format!("cmap{}", chunk[5])))?;
        system.add_term("torsiontorsion_cmap", &ids, Some(param))?;
    }
    Ok(())
}

/// Imports an Amber7 prmtop file. Coordinates are not present in the format;
/// atom positions are left at the origin.
pub fn import_prmtop(path: impl AsRef<Path>) -> Result<MolecularSystem, PrmtopError> {
    let file = File::open(path)?;
    read_prmtop(BufReader::new(file), &ImportOptions::default())
}

/// Imports a prmtop document from any buffered reader.
///
/// The whole document is validated and imported, or the whole import fails;
/// a partially populated system is never returned.
pub fn read_prmtop<R: BufRead>(
    reader: R,
    options: &ImportOptions,
) -> Result<MolecularSystem, PrmtopError> {
    let map = read_sections(reader)?;
    let ptrs = parse_ints(&map, "POINTERS", pointers::COUNT)?;
    let natom = ptrs[pointers::NATOM] as usize;
    let nres = ptrs[pointers::NRES] as usize;

    // Sanity gates. 10-12 hydrogen bonds are tolerated only when every
    // coefficient is zero; perturbation information is never read.
    let nphb = ptrs[pointers::NPHB] as usize;
    if nphb > 0 {
        let acoef = parse_floats(&map, "HBOND_ACOEF", nphb)?;
        let bcoef = parse_floats(&map, "HBOND_BCOEF", nphb)?;
        let hbcut = parse_floats(&map, "HBCUT", nphb)?;
        let all_zero = acoef
            .iter()
            .chain(&bcoef)
            .chain(&hbcut)
            .all(|&v| v == 0.0);
        if !all_zero {
            return Err(PrmtopError::Unsupported(
                "NPHB > 0: got 10-12 hydrogen bonds with nonzero coefficients".into(),
            ));
        }
    }
    if ptrs[pointers::IFPERT] > 0 {
        return Err(PrmtopError::Unsupported(
            "IFPERT > 0: cannot read perturbation information".into(),
        ));
    }

    let mut resptrs = parse_ints(&map, "RESIDUE_POINTER", nres)?;
    let resnames = parse_strs(&map, "RESIDUE_LABEL", nres)?;
    let names = parse_strs(&map, "ATOM_NAME", natom)?;
    let charges = parse_floats(&map, "CHARGE", natom)?;
    let masses = parse_floats(&map, "MASS", natom)?;

    let mut system = MolecularSystem::new();
    // A single chain holds every residue.
    let chain = system.add_chain("");

    resptrs.push(natom as i64 + 1);
    let mut atoms = Vec::with_capacity(natom);
    let mut residue = None;
    for i in 0..natom {
        if i as i64 + 1 == resptrs[system.residue_count()] {
            let index = system.residue_count();
            residue = Some(system.add_residue(chain, index as i32 + 1, &resnames[index])?);
        }
        let residue = residue.ok_or_else(|| {
            PrmtopError::Inconsistency("RESIDUE_POINTER does not start at atom 1".into())
        })?;
        let mut atom = Atom::new(&names[i], residue);
        atom.partial_charge = charges[i] / AMBER_CHARGE_FACTOR;
        atom.mass = masses[i];
        atom.atomic_number = Element::guess_from_mass(masses[i])
            .map(|e| e.atomic_number())
            .unwrap_or(0);
        atoms.push(system.add_atom(residue, atom)?);
    }

    parse_stretch(
        &mut system,
        &map,
        options.structure_only,
        &atoms,
        ptrs[pointers::NUMBND] as usize,
        ptrs[pointers::NBONH] as usize,
        ptrs[pointers::NBONA] as usize,
    )?;

    if !options.structure_only {
        parse_angle(
            &mut system,
            &map,
            &atoms,
            ptrs[pointers::NUMANG] as usize,
            ptrs[pointers::NTHETH] as usize,
            ptrs[pointers::NTHETA] as usize,
        )?;
        let pairs = parse_torsion(
            &mut system,
            &map,
            &atoms,
            ptrs[pointers::NPTRA] as usize,
            ptrs[pointers::NPHIH] as usize,
            ptrs[pointers::NPHIA] as usize,
        )?;
        parse_nonbonded(&mut system, &map, &atoms, ptrs[pointers::NTYPES] as usize, &pairs)?;
        parse_exclusions(&mut system, &map, &atoms, ptrs[pointers::NNB] as usize)?;
        parse_cmap(&mut system, &map, &atoms)?;
    }

    crate::workflows::analyze(&mut system);
    system.coalesce_tables();
    Ok(system)
}
