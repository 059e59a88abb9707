//! Annex catalog
//!
//! Master mapping from annex codes ("1A".."7G") to their source file, target
//! database, and versioned target table. Resolved once per run, read-only.

use satetl_common::{EtlError, Result};

/// Period identifier appended to every target table name
pub const TABLE_SUFFIX: &str = "_2025_1S";

/// Resolved target for one annex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnexTarget {
    pub annex: String,
    /// Target database name
    pub database: String,
    /// Versioned target table name (base name + period suffix)
    pub table: String,
    /// Source extract file name, relative to the configured source directory
    pub source_file: String,
}

struct AnnexEntry {
    code: &'static str,
    database: &'static str,
    table: &'static str,
    file: &'static str,
}

const ANNEXES: &[AnnexEntry] = &[
    AnnexEntry {
        code: "1A",
        database: "sat_v2",
        table: "ANEXO_1A",
        file: "GERG_AECF_1891_Anexo1A-QA.txt",
    },
    AnnexEntry {
        code: "2B",
        database: "sat_v2",
        table: "ANEXO_2B",
        file: "GERG_AECF_1891_Anexo2B.csv",
    },
    AnnexEntry {
        code: "3C",
        database: "sat_nomina_v2",
        table: "ANEXO_3C",
        file: "GERG_AECF_1891_Anexo3C.csv",
    },
    AnnexEntry {
        code: "4D",
        database: "sat_nomina_v2",
        table: "ANEXO_4D",
        file: "GERG_AECF_1891_Anexo4D.csv",
    },
    AnnexEntry {
        code: "5E",
        database: "sat_nomina_v2",
        table: "ANEXO_5E",
        file: "GERG_AECF_1891_Anexo5E.csv",
    },
    AnnexEntry {
        code: "6F",
        database: "sat_nomina_v2",
        table: "ANEXO_6F",
        file: "GERG_AECF_1891_Anexo6F.csv",
    },
    AnnexEntry {
        code: "7G",
        database: "sat_nomina_v2",
        table: "ANEXO_7G",
        file: "GERG_AECF_1891_Anexo7G.csv",
    },
];

/// All known annex codes, in load order
pub fn annex_codes() -> Vec<&'static str> {
    ANNEXES.iter().map(|a| a.code).collect()
}

/// Resolve an annex code to its load target.
///
/// # Errors
///
/// `EtlError::Config` when the code is not in the catalog. This fires before
/// any I/O is attempted.
pub fn resolve(annex: &str) -> Result<AnnexTarget> {
    let code = annex.trim().to_uppercase();
    let entry = ANNEXES
        .iter()
        .find(|a| a.code == code)
        .ok_or_else(|| {
            EtlError::config(format!(
                "annex '{}' is not defined in the master catalog",
                annex
            ))
        })?;

    Ok(AnnexTarget {
        annex: entry.code.to_string(),
        database: entry.database.to_string(),
        table: format!("{}{}", entry.table, TABLE_SUFFIX),
        source_file: entry.file.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_annex_with_suffix() {
        let target = resolve("1A").unwrap();
        assert_eq!(target.database, "sat_v2");
        assert_eq!(target.table, "ANEXO_1A_2025_1S");
        assert_eq!(target.source_file, "GERG_AECF_1891_Anexo1A-QA.txt");
    }

    #[test]
    fn resolve_is_case_insensitive() {
        assert_eq!(resolve("3c").unwrap().database, "sat_nomina_v2");
    }

    #[test]
    fn unknown_annex_is_a_config_error() {
        let err = resolve("9Z").unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }

    #[test]
    fn catalog_lists_all_annexes() {
        assert_eq!(annex_codes().len(), 7);
        assert_eq!(annex_codes()[0], "1A");
    }
}
