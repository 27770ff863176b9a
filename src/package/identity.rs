//! Package identity grammars.

use crate::error::DeclarationError;
use regex::Regex;
use std::sync::OnceLock;

pub const RESERVED_NAMES: [&str; 2] = ["mosaic", "mosaic_core"];

const NAME_PATTERN: &str = r"^[a-zA-Z0-9_]+$";
const VERSION_PATTERN: &str = r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-[a-zA-Z\d][-a-zA-Z.\d]*)?(\+[a-zA-Z\d][-a-zA-Z.\d]*)?$";
const PATH_PATTERN: &str = r"^/[a-zA-Z0-9\-_]*$";

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern"))
}

pub fn validate_name(name: &str) -> Result<(), DeclarationError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if !compiled(&RE, NAME_PATTERN).is_match(name) {
        return Err(DeclarationError::InvalidName(name.to_string()));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(DeclarationError::ReservedName(name.to_string()));
    }
    Ok(())
}

pub fn validate_version(name: &str, version: &str) -> Result<(), DeclarationError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if compiled(&RE, VERSION_PATTERN).is_match(version) {
        Ok(())
    } else {
        Err(DeclarationError::InvalidVersion {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

pub fn validate_path(name: &str, path: &str) -> Result<(), DeclarationError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if compiled(&RE, PATH_PATTERN).is_match(path) {
        Ok(())
    } else {
        Err(DeclarationError::InvalidPath {
            name: name.to_string(),
            path: path.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        for ok in ["catalog", "Catalog_2", "_", "a1"] {
            validate_name(ok).unwrap();
        }
        for bad in ["", "my-pkg", "my pkg", "pkg.v2", "päckage"] {
            assert!(matches!(validate_name(bad), Err(DeclarationError::InvalidName(_))), "{bad}");
        }
        assert!(matches!(validate_name("mosaic"), Err(DeclarationError::ReservedName(_))));
        assert!(matches!(validate_name("mosaic_core"), Err(DeclarationError::ReservedName(_))));
    }

    #[test]
    fn versions() {
        for ok in ["0.0.0", "1.2.3", "10.20.30", "1.0.0-alpha.1", "1.0.0+build.5", "1.0.0-rc-1+sha.a1b2"] {
            validate_version("pkg", ok).unwrap();
        }
        for bad in ["1.0", "v1.0.0", "1.0.0-", "01.0.0", "1.0.0+", "1.0.0.0", ""] {
            assert!(validate_version("pkg", bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn paths() {
        for ok in ["/", "/catalog", "/my-package", "/pkg_2"] {
            validate_path("pkg", ok).unwrap();
        }
        for bad in ["", "catalog", "/a/b", "/with space", "/dot.ted"] {
            assert!(validate_path("pkg", bad).is_err(), "{bad}");
        }
    }
}
