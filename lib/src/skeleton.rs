//! Root-first ordering of bone hierarchies.

use serde_derive::Serialize;

use crate::{
    error::{Error, Result},
    format::ogf::BoneRecord,
};

#[derive(Copy, Clone, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Placed,
}

/// Orders bones so that every parent precedes its children.
///
/// Returns indices into `bones`. Bones are placed depth-first in input
/// order, each after its chain of not yet placed ancestors; an input that
/// is already parent-first comes back unchanged. The hierarchy must have
/// exactly one root and no cycles.
pub fn normalize(bones: &[BoneRecord]) -> Result<Vec<usize>> {
    let parents = parent_indices(bones)?;
    let roots = parents.iter().filter(|p| p.is_none()).count();
    match roots {
        1 => {}
        0 => return Err(Error::malformed("bone hierarchy has no root")),
        n => return Err(Error::malformed(format!("bone hierarchy has {n} roots"))),
    }

    let mut marks = vec![Mark::Unvisited; bones.len()];
    let mut order = Vec::with_capacity(bones.len());
    let mut stack = Vec::new();
    for start in 0..bones.len() {
        let mut cur = Some(start);
        while let Some(idx) = cur {
            match marks[idx] {
                Mark::Placed => break,
                Mark::InProgress => {
                    return Err(Error::malformed(format!(
                        "bone hierarchy cycle through '{}'",
                        bones[idx].name
                    )))
                }
                Mark::Unvisited => {
                    marks[idx] = Mark::InProgress;
                    stack.push(idx);
                    cur = parents[idx];
                }
            }
        }
        while let Some(idx) = stack.pop() {
            marks[idx] = Mark::Placed;
            order.push(idx);
        }
    }
    Ok(order)
}

fn parent_indices(bones: &[BoneRecord]) -> Result<Vec<Option<usize>>> {
    bones
        .iter()
        .map(|bone| match bone.parent_id {
            Some(p) if p < bones.len() => Ok(Some(p)),
            Some(p) => Err(Error::malformed(format!(
                "bone '{}' parent index {p} out of range",
                bone.name
            ))),
            None if bone.parent.is_empty() => Ok(None),
            None => Err(Error::malformed(format!(
                "bone '{}' has unresolved parent '{}'",
                bone.name, bone.parent
            ))),
        })
        .collect()
}

/// A normalized bone hierarchy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Skeleton {
    /// Input index of each normalized bone.
    pub order: Vec<usize>,
    /// Parent of each normalized bone, as a normalized index.
    pub parents: Vec<Option<usize>>,
}

impl Skeleton {
    pub fn from_bones(bones: &[BoneRecord]) -> Result<Self> {
        let order = normalize(bones)?;
        let remap = inverse(&order);
        let parents = order.iter().map(|&i| bones[i].parent_id.map(|p| remap[p])).collect();
        Ok(Self { order, parents })
    }

    pub fn len(&self) -> usize { self.order.len() }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }

    /// Normalized index of each input bone.
    pub fn remap(&self) -> Vec<usize> { inverse(&self.order) }
}

fn inverse(order: &[usize]) -> Vec<usize> {
    let mut out = vec![0; order.len()];
    for (new, &old) in order.iter().enumerate() {
        out[old] = new;
    }
    out
}
