pub mod descriptor;
pub mod maven;
mod sha;
pub mod version;

pub use descriptor::{Dependency, ProjectInfo, DESCRIPTOR_FILE};
pub use maven::{MavenVersion, VersionConstraint, VersionRange};
pub use sha::Sha;
pub use version::{format_version, parse_version, ParsedVersion, VersionCoordinate};
