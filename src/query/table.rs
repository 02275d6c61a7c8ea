use std::io::{self, Write};

use crate::util::format_timestamp;
use crate::util::path::display_dir;

use super::Candidate;

const HEADERS: [&str; 7] = ["REPO", "PATH", "BRANCHES", "VERSION", "DATE", "SHA", "PENDING"];

/// Print candidates as an aligned table, in the order given
pub fn write_candidates(out: &mut dyn Write, candidates: &[Candidate]) -> io::Result<()> {
    let rows: Vec<[String; 7]> = candidates
        .iter()
        .map(|c| {
            [
                c.repo.clone(),
                display_dir(&c.path).to_string(),
                c.branches.join(","),
                c.derived.clone(),
                format_timestamp(c.ctime),
                c.sha.short(10),
                c.pending.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header = HEADERS.map(String::from);
    for row in std::iter::once(&header).chain(&rows) {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sha;

    #[test]
    fn test_table_alignment() {
        let candidate = Candidate {
            repo: "widgets".into(),
            path: "".into(),
            project: "org.example/widget".into(),
            version: "1.0.0".into(),
            branches: vec!["main".into(), "release".into()],
            ctime: 1_706_723_102,
            sha: Sha([0xab; 20]),
            derived: "1.0.0-20240131_174502-gababab".into(),
            pending: 2,
        };
        let mut out = Vec::new();
        write_candidates(&mut out, &[candidate]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("REPO     PATH  BRANCHES      VERSION"));
        assert!(lines[1].starts_with("widgets  .     main,release  1.0.0-20240131_174502-gababab"));
        assert!(lines[1].ends_with("ababababab  2"));
    }
}
