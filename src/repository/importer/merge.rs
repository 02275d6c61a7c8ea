//! File changes of merge commits
//!
//! fast-export reports a merge's changes against its first parent only. A
//! path counts as changed at a merge when it differs from at least two of
//! the merge's parents, which is what `git diff-tree -m` lets us compute.

use anyhow::{anyhow, Result};
use rustc_hash::FxHashMap;

use crate::model::Sha;
use crate::repository::git::Git;

use super::fast_export::{unquote_path, FileChange};

/// Synthesized file changes of `merge`
pub fn merge_changes(git: &Git, merge: &Sha) -> Result<Vec<FileChange>> {
    let out = git.run([
        "diff-tree",
        "-r",
        "-m",
        "--no-abbrev",
        "--no-renames",
        merge.to_hex().as_str(),
    ])?;
    parse_merge_diff(merge, &out.stdout)
}

/// Parse `diff-tree -r -m` raw output: one section per parent, each opened
/// by a line holding the merge's own sha.
pub fn parse_merge_diff(merge: &Sha, raw: &[u8]) -> Result<Vec<FileChange>> {
    let header = merge.to_hex();
    let mut sections = 0usize;
    // path -> (number of parents it differs from, blob after the merge)
    let mut seen: FxHashMap<String, (usize, Option<Sha>)> = FxHashMap::default();
    let mut order: Vec<String> = Vec::new();

    for line in raw.split(|b| *b == b'\n') {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(header.as_bytes()) {
            sections += 1;
            continue;
        }
        let Some(meta) = line.strip_prefix(b":") else {
            continue;
        };
        let tab = meta
            .iter()
            .position(|b| *b == b'\t')
            .ok_or_else(|| anyhow!("malformed diff-tree line for {}", merge.short(10)))?;
        let fields: Vec<&[u8]> = meta[..tab].split(|b| *b == b' ').collect();
        let [_, _, _, new_sha, _] = fields.as_slice() else {
            return Err(anyhow!("malformed diff-tree line for {}", merge.short(10)));
        };
        let new_sha = Sha::from_hex(std::str::from_utf8(new_sha)?)
            .ok_or_else(|| anyhow!("bad object id in diff-tree output"))?;
        let path = unquote_path(&meta[tab + 1..])?;
        let blob = (!new_sha.is_zero()).then_some(new_sha);

        let entry = seen.entry(path.clone()).or_insert_with(|| {
            order.push(path);
            (0, blob)
        });
        entry.0 += 1;
    }

    tracing::debug!(
        "merge {}: {} parent sections, {} differing paths",
        merge.short(10),
        sections,
        order.len()
    );

    Ok(order
        .into_iter()
        .filter_map(|path| {
            let (count, blob) = seen.remove(&path)?;
            if count < 2 {
                return None;
            }
            Some(match blob {
                Some(blob) => FileChange::Modify { path, blob },
                None => FileChange::Delete { path },
            })
        })
        .collect())
}
