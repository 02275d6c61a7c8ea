//! Ancestry bitmap index
//!
//! Every indexed commit gets a dense id and a bitset over the ids of all its
//! transitive ancestors, so "is A an ancestor of B" is a single bit test.
//! Parents are always indexed before their children; ids are append-only.

use anyhow::{bail, Result};
use bitvec::order::Lsb0;
use bitvec::vec::BitVec;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::model::Sha;

type Bits = BitVec<u64, Lsb0>;

#[derive(Debug, Default, Clone)]
pub struct Shabam {
    ids: FxHashMap<Sha, u32>,
    shas: Vec<Sha>,
    ancestors: Vec<Bits>,
}

/// Persisted form: commits in id order and the raw words of each bitset
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShabamFlat {
    pub shas: Vec<Sha>,
    pub words: Vec<Vec<u64>>,
}

impl Shabam {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shas.is_empty()
    }

    pub fn contains(&self, commit: &Sha) -> bool {
        self.ids.contains_key(commit)
    }

    /// Index a commit whose parents are already indexed.
    ///
    /// Returns false when the commit was already present. Parents that are
    /// not indexed are skipped.
    pub fn add(&mut self, commit: Sha, parents: &[Sha]) -> bool {
        if self.ids.contains_key(&commit) {
            return false;
        }
        let id = self.shas.len();
        let mut bits = Bits::repeat(false, id);

        for parent in parents {
            let Some(&pid) = self.ids.get(parent) else {
                tracing::warn!("parent {} of {} is not indexed", parent.short(10), commit.short(10));
                continue;
            };
            let pid = pid as usize;
            // parent ids are below ours, so its words fit inside ours
            let theirs = self.ancestors[pid].as_raw_slice();
            for (ours, word) in bits.as_raw_mut_slice().iter_mut().zip(theirs) {
                *ours |= *word;
            }
            bits.set(pid, true);
        }

        self.ids.insert(commit, id as u32);
        self.shas.push(commit);
        self.ancestors.push(bits);
        true
    }

    /// Index everything reachable from `tips` in parents-first order.
    ///
    /// `parents_of` supplies the parent list of commits not yet indexed;
    /// `None` marks a commit whose history is unknown (treated as a root).
    pub fn index_from_tips<F>(&mut self, tips: &[Sha], mut parents_of: F) -> usize
    where
        F: FnMut(&Sha) -> Option<Vec<Sha>>,
    {
        let before = self.len();
        let mut stack: Vec<(Sha, bool)> = Vec::new();

        for tip in tips {
            if self.contains(tip) {
                continue;
            }
            stack.push((*tip, false));

            while let Some((commit, expanded)) = stack.pop() {
                if self.contains(&commit) {
                    continue;
                }
                let parents = parents_of(&commit).unwrap_or_default();
                if expanded {
                    self.add(commit, &parents);
                    continue;
                }
                stack.push((commit, true));
                for parent in parents.iter().rev() {
                    if !self.contains(parent) {
                        stack.push((*parent, false));
                    }
                }
            }
        }

        self.len() - before
    }

    fn has_bit(&self, of: u32, bit: u32) -> bool {
        self.ancestors[of as usize]
            .get(bit as usize)
            .map_or(false, |b| *b)
    }

    /// True if `ancestor` is a strict ancestor of `descendant`
    pub fn is_ancestor(&self, ancestor: &Sha, descendant: &Sha) -> bool {
        match (self.ids.get(ancestor), self.ids.get(descendant)) {
            (Some(&a), Some(&d)) => self.has_bit(d, a),
            _ => false,
        }
    }

    /// True if `commit` is `tip` itself or one of its ancestors
    pub fn reachable_from(&self, tip: &Sha, commit: &Sha) -> bool {
        (tip == commit && self.contains(tip)) || self.is_ancestor(commit, tip)
    }

    /// The members of `candidates` that are strict ancestors of `commit`
    pub fn ancestors_of<'a, I>(&self, commit: &Sha, candidates: I) -> Vec<Sha>
    where
        I: IntoIterator<Item = &'a Sha>,
    {
        let Some(&id) = self.ids.get(commit) else {
            return Vec::new();
        };
        candidates
            .into_iter()
            .filter(|c| self.ids.get(*c).is_some_and(|&cid| self.has_bit(id, cid)))
            .copied()
            .collect()
    }

    /// The members of `candidates` that have `commit` as a strict ancestor
    pub fn descendants_of<'a, I>(&self, commit: &Sha, candidates: I) -> Vec<Sha>
    where
        I: IntoIterator<Item = &'a Sha>,
    {
        let Some(&id) = self.ids.get(commit) else {
            return Vec::new();
        };
        candidates
            .into_iter()
            .filter(|c| self.ids.get(*c).is_some_and(|&cid| self.has_bit(cid, id)))
            .copied()
            .collect()
    }

    pub fn flatten(&self) -> ShabamFlat {
        ShabamFlat {
            shas: self.shas.clone(),
            words: self
                .ancestors
                .iter()
                .map(|bits| bits.as_raw_slice().to_vec())
                .collect(),
        }
    }

    pub fn from_flat(flat: ShabamFlat) -> Result<Self> {
        if flat.shas.len() != flat.words.len() {
            bail!(
                "ancestry table has {} commits but {} bitsets",
                flat.shas.len(),
                flat.words.len()
            );
        }
        let mut shabam = Shabam::new();
        for (id, (sha, words)) in flat.shas.into_iter().zip(flat.words).enumerate() {
            let mut bits = Bits::from_vec(words);
            if bits.len() < id {
                bail!("bitset for {} is shorter than its id", sha.short(10));
            }
            bits.truncate(id);
            if shabam.ids.insert(sha, id as u32).is_some() {
                bail!("commit {} appears twice in the ancestry table", sha.short(10));
            }
            shabam.shas.push(sha);
            shabam.ancestors.push(bits);
        }
        Ok(shabam)
    }
}
