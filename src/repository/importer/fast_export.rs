//! Parser for `git fast-export --no-data --show-original-ids` streams
//!
//! The stream is consumed eagerly with an explicit state machine:
//! top-level commands (`Header`), the metadata block of a commit
//! (`CommitMeta`), its file operations (`FileOps`) and the final `done`.
//! Commit messages are length-prefixed `data` blocks and may contain anything,
//! so the parser works on bytes rather than lines of text.

use anyhow::{anyhow, bail, Context, Result};
use rustc_hash::FxHashMap;

use crate::model::Sha;

/// A file operation of an exported commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Modify { path: String, blob: Sha },
    Delete { path: String },
}

impl FileChange {
    pub fn path(&self) -> &str {
        match self {
            FileChange::Modify { path, .. } | FileChange::Delete { path } => path,
        }
    }
}

/// One commit of the exported range, parents resolved to shas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedCommit {
    pub sha: Sha,
    pub ctime: i64,
    pub parents: Vec<Sha>,
    pub changes: Vec<FileChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    CommitMeta,
    FileOps,
    Done,
}

#[derive(Default)]
struct PartialCommit {
    mark: Option<u64>,
    sha: Option<Sha>,
    ctime: Option<i64>,
    parents: Vec<Sha>,
    changes: Vec<FileChange>,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    line_no: usize,
}

impl<'a> Cursor<'a> {
    fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.pos..];
        let end = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
        self.pos += (end + 1).min(rest.len());
        self.line_no += 1;
        Some(&rest[..end])
    }

    /// Skip the payload of a `data <n>` command
    fn skip_data(&mut self, header: &[u8]) -> Result<()> {
        let len = header
            .strip_prefix(b"data ")
            .and_then(|n| std::str::from_utf8(n).ok())
            .and_then(|n| n.trim().parse::<usize>().ok())
            .ok_or_else(|| anyhow!("line {}: malformed data header", self.line_no))?;
        if self.pos + len > self.buf.len() {
            bail!("line {}: data block runs past end of stream", self.line_no);
        }
        let skipped = &self.buf[self.pos..self.pos + len];
        self.line_no += skipped.iter().filter(|b| **b == b'\n').count();
        self.pos += len;
        if self.buf.get(self.pos) == Some(&b'\n') {
            self.pos += 1;
            self.line_no += 1;
        }
        Ok(())
    }
}

fn is_file_op(line: &[u8]) -> bool {
    line.starts_with(b"M ")
        || line.starts_with(b"D ")
        || line.starts_with(b"R ")
        || line.starts_with(b"C ")
        || line.starts_with(b"N ")
        || line == b"deleteall"
}

/// Decode a path, undoing git's C-style quoting when present
pub fn unquote_path(raw: &[u8]) -> Result<String> {
    let Some(inner) = raw.strip_prefix(b"\"").and_then(|r| r.strip_suffix(b"\"")) else {
        return Ok(String::from_utf8_lossy(raw).into_owned());
    };
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let c = inner[i];
        i += 1;
        if c != b'\\' {
            out.push(c);
            continue;
        }
        let esc = *inner.get(i).ok_or_else(|| anyhow!("dangling escape in path"))?;
        i += 1;
        match esc {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'r' => out.push(b'\r'),
            b'v' => out.push(0x0b),
            b'0'..=b'3' => {
                let digits = inner
                    .get(i - 1..i + 2)
                    .ok_or_else(|| anyhow!("short octal escape in path"))?;
                let text = std::str::from_utf8(digits)?;
                out.push(u8::from_str_radix(text, 8).context("bad octal escape in path")?);
                i += 2;
            }
            other => out.push(other),
        }
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn parse_committer_time(line: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(line).ok()?;
    let after_email = &text[text.rfind('>')? + 1..];
    after_email.split_whitespace().next()?.parse().ok()
}

fn resolve_ref(reference: &[u8], marks: &FxHashMap<u64, Sha>) -> Result<Sha> {
    let text = std::str::from_utf8(reference)?.trim();
    if let Some(mark) = text.strip_prefix(':') {
        let mark: u64 = mark.parse().with_context(|| format!("bad mark {text}"))?;
        return marks
            .get(&mark)
            .copied()
            .ok_or_else(|| anyhow!("reference to unknown mark :{mark}"));
    }
    Sha::from_hex(text).ok_or_else(|| anyhow!("unresolvable commit reference {text:?}"))
}

fn parse_file_op(line: &[u8]) -> Result<Option<FileChange>> {
    if let Some(rest) = line.strip_prefix(b"M ") {
        let mut parts = rest.splitn(3, |b| *b == b' ');
        let (Some(_mode), Some(dataref), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            bail!("malformed modify operation");
        };
        let dataref = std::str::from_utf8(dataref)?;
        let blob = Sha::from_hex(dataref)
            .ok_or_else(|| anyhow!("modify operation without an object id ({dataref})"))?;
        return Ok(Some(FileChange::Modify {
            path: unquote_path(path)?,
            blob,
        }));
    }
    if let Some(path) = line.strip_prefix(b"D ") {
        return Ok(Some(FileChange::Delete {
            path: unquote_path(path)?,
        }));
    }
    if line.starts_with(b"R ") || line.starts_with(b"C ") {
        bail!("rename/copy operations are not expected without -M/-C");
    }
    // notes and deleteall carry no path information
    Ok(None)
}

fn finish(partial: PartialCommit, marks: &mut FxHashMap<u64, Sha>) -> Result<ExportedCommit> {
    let sha = partial
        .sha
        .ok_or_else(|| anyhow!("commit without original-oid (git too old for --show-original-ids?)"))?;
    let ctime = partial
        .ctime
        .ok_or_else(|| anyhow!("commit {} has no committer line", sha.short(10)))?;
    if let Some(mark) = partial.mark {
        marks.insert(mark, sha);
    }
    Ok(ExportedCommit {
        sha,
        ctime,
        parents: partial.parents,
        changes: partial.changes,
    })
}

/// Parse a full fast-export stream into commits, in stream order
/// (parents before children).
pub fn parse_fast_export(stream: &[u8]) -> Result<Vec<ExportedCommit>> {
    let mut cursor = Cursor {
        buf: stream,
        pos: 0,
        line_no: 0,
    };
    let mut state = State::Header;
    let mut marks: FxHashMap<u64, Sha> = FxHashMap::default();
    let mut current: Option<PartialCommit> = None;
    let mut commits = Vec::new();
    let mut replay: Option<&[u8]> = None;

    while state != State::Done {
        let Some(line) = replay.take().or_else(|| cursor.next_line()) else {
            break;
        };
        let line_no = cursor.line_no;

        match state {
            State::Header => {
                if line.is_empty()
                    || line.starts_with(b"feature ")
                    || line.starts_with(b"progress ")
                    || line.starts_with(b"reset ")
                    || line.starts_with(b"from ")
                    || line == b"checkpoint"
                {
                    continue;
                }
                if line.starts_with(b"commit ") {
                    current = Some(PartialCommit::default());
                    state = State::CommitMeta;
                } else if line == b"done" {
                    state = State::Done;
                } else {
                    bail!(
                        "line {line_no}: unexpected command {:?}",
                        String::from_utf8_lossy(line)
                    );
                }
            }
            State::CommitMeta | State::FileOps => {
                let Some(commit) = current.as_mut() else {
                    bail!("line {line_no}: commit body outside of a commit");
                };

                if line.is_empty() {
                    if let Some(done) = current.take() {
                        commits.push(finish(done, &mut marks)?);
                    }
                    state = State::Header;
                } else if is_file_op(line) {
                    state = State::FileOps;
                    if let Some(change) =
                        parse_file_op(line).with_context(|| format!("line {line_no}"))?
                    {
                        commit.changes.push(change);
                    }
                } else if state == State::FileOps {
                    // the next command started without a separating blank line
                    if let Some(done) = current.take() {
                        commits.push(finish(done, &mut marks)?);
                    }
                    state = State::Header;
                    replay = Some(line);
                } else if let Some(mark) = line.strip_prefix(b"mark :") {
                    let mark = std::str::from_utf8(mark)?.trim();
                    commit.mark =
                        Some(mark.parse().with_context(|| format!("line {line_no}: bad mark"))?);
                } else if let Some(oid) = line.strip_prefix(b"original-oid ") {
                    let oid = std::str::from_utf8(oid)?.trim();
                    commit.sha = Some(
                        Sha::from_hex(oid).ok_or_else(|| anyhow!("line {line_no}: bad original-oid {oid}"))?,
                    );
                } else if line.starts_with(b"committer ") {
                    commit.ctime = Some(
                        parse_committer_time(line)
                            .ok_or_else(|| anyhow!("line {line_no}: malformed committer line"))?,
                    );
                } else if line.starts_with(b"author ") || line.starts_with(b"encoding ") {
                    continue;
                } else if line.starts_with(b"gpgsig ") {
                    let header = cursor
                        .next_line()
                        .ok_or_else(|| anyhow!("line {line_no}: signature without data"))?;
                    cursor.skip_data(header)?;
                } else if line.starts_with(b"data ") {
                    cursor.skip_data(line)?;
                } else if let Some(parent) = line.strip_prefix(b"from ").or(line.strip_prefix(b"merge ")) {
                    commit.parents.push(resolve_ref(parent, &marks).with_context(|| format!("line {line_no}"))?);
                } else {
                    if let Some(done) = current.take() {
                        commits.push(finish(done, &mut marks)?);
                    }
                    state = State::Header;
                    replay = Some(line);
                }
            }
            State::Done => {}
        }
    }

    if let Some(done) = current.take() {
        commits.push(finish(done, &mut marks)?);
    }
    Ok(commits)
}
