//! Descriptor rewriting
//!
//! Versions are replaced by plain text substitution so the rest of the file
//! keeps its formatting. Every substitution must match exactly once; any
//! miss or ambiguity aborts the whole rewrite.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::RewriteError;

static PROJECT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\(defproject\s+[^\s()\[\]"]+\s+)"[^"\\]*""#).expect("static regex")
});

/// Version substitutions to apply to a descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewrite {
    pub project_version: Option<String>,
    /// (dependency name, new version)
    pub dependencies: Vec<(String, String)>,
}

impl Rewrite {
    pub fn is_empty(&self) -> bool {
        self.project_version.is_none() && self.dependencies.is_empty()
    }

    /// Apply every substitution, or none
    pub fn apply(&self, text: &str) -> Result<String, RewriteError> {
        let mut out = text.to_string();
        if let Some(version) = &self.project_version {
            out = set_project_version(&out, version)?;
        }
        for (name, version) in &self.dependencies {
            out = set_dependency_version(&out, name, version)?;
        }
        Ok(out)
    }
}

fn replace_once(text: &str, re: &Regex, label: &str, version: &str) -> Result<String, RewriteError> {
    match re.find_iter(text).count() {
        0 => Err(RewriteError::NoMatch(label.to_string())),
        1 => Ok(re
            .replacen(text, 1, |caps: &Captures<'_>| format!("{}\"{version}\"", &caps[1]))
            .into_owned()),
        n => Err(RewriteError::MultipleMatches(label.to_string(), n)),
    }
}

/// Replace the version string of the `defproject` form
pub fn set_project_version(text: &str, version: &str) -> Result<String, RewriteError> {
    replace_once(text, &PROJECT_VERSION, "defproject version", version)
}

/// Replace the version of one `[name "version"]` dependency vector.
/// `group/artifact` names where group equals artifact also match the bare form.
pub fn set_dependency_version(text: &str, name: &str, version: &str) -> Result<String, RewriteError> {
    let mut names = vec![regex::escape(name)];
    if let Some((group, artifact)) = name.split_once('/') {
        if group == artifact {
            names.push(regex::escape(artifact));
        }
    }
    let pattern = format!(r#"(\[\s*(?:{})\s+)"[^"\\]*""#, names.join("|"));
    let re = Regex::new(&pattern).map_err(|_| RewriteError::NoMatch(name.to_string()))?;
    replace_once(text, &re, name, version)
}
