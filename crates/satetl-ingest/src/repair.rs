//! Text repair engine (mojibake recovery)
//!
//! The source files mix single-, double-, and triple-encoded text; the rule
//! catalog below is the empirically derived knowledge base for undoing that
//! corruption, ported verbatim from the production cleaning catalog. Rule
//! order is semantically significant: the list is folded over each string in
//! sequence, so a later rule may operate on text already altered by earlier
//! rules (layered correction of multi-stage corruption).
//!
//! The engine is applied only to descriptive identity columns (names), never
//! to identifier, numeric, or date columns.

use satetl_common::{Batch, Value};

/// Column-name keywords that select a column for text repair
const REPAIR_COLUMN_KEYWORDS: &[&str] = &["NOMBRE"];

/// Ordered corrupt -> correct substring rules.
///
/// A `const` slice: the catalog is loaded once at compile time and frozen;
/// mutation after load is impossible by construction. The catalog contains
/// overlapping entries by intent; do not reorder or reconcile without
/// regression fixtures for the full corpus.
const MOJIBAKE_RULES: &[(&str, &str)] = &[
    ("A¯ ¿ ¿AGA", "ÑAGA"),
    ("A¯ ¿ ¿IGA", "ÑIGA"),
    ("A¯ ¿ ¿UELOS", "ÑUELOS"),
    ("A¯ ¿ ¿A", "ÑA"),
    ("A¯ ¿ ¿O", "ÑO"),
    ("A¯ ¿ ¿EZ", "ÑEZ"),
    ("A¯ ¿ ¿OS", "ÑOS"),
    ("A¯ ¿ ¿", "Ñ"),
    ("ÃƒÂƒÃ¢Â€Â˜", "Ñ"),
    ("ÃƒÂƒÃ¢Â€Â", "Ñ"),
    ("Ã¯Â¿Â½", "Ñ"),
    ("A¯ ¿ ½", "Ñ"),
    ("DÂ¥", "D"),
    ("D ¥", "D"),
    ("â€¦", ""),
    (" ¦", ""),
    ("Â·", ""),
    ("ARÑR", "O"),
    ("CIA “N", "CION"),
    ("CIA“N", "CION"),
    ("“N", "ON"),
    ("“", "O"),
    ("A “", "O"),
    ("ÃƒÂ±", "Ñ"),
    ("ÃƒÂ‘", "Ñ"),
    ("Ãƒ ", "Ñ"),
    ("Ãƒ?", "Ñ"),
    ("Ãƒ", "Ñ"),
    ("Ã‰", "E"),
    ("Ã“", "O"),
    ("Ã”", "O"),
    ("Ã…", "A"),
    ("Ã‘", "Ñ"),
    ("Ã±", "Ñ"),
    ("Ã¡", "A"),
    ("Ã©", "E"),
    ("Ã\u{ad}", "I"),
    ("Ã³", "O"),
    ("Ãº", "U"),
    ("Ãš", "U"),
    ("Ã‡", " "),
    ("ÃŒ", "U"),
    ("Ã.", "Ñ"),
    ("A‰", "E"),
    ("A“", "O"),
    ("A Œ", "O"),
    ("A¨", "E"),
    ("A©", "E"),
    ("A ©", "E"),
    ("©", "E"),
    ("Ã\u{8d}", "I"),
    ("Ã\u{81}", "A"),
    ("AGUIAƑ˜", "Ñ"),
    ("MARÃA", "MARIA"),
    ("ALCALDÃA", "ALCALDIA"),
    ("GARCÃA", "GARCIA"),
    ("¥", "Ñ"),
    ("Ã¥", "Ñ"),
    ("Â¥", "Ñ"),
    ("ÃA", "IA"),
    ("Ƒ˜", "Ñ"),
    ("˜", ""),
    ("Ƒ", ""),
    ("¨", ""),
    ("’", ""),
    ("‘", ""),
    ("´", ""),
    ("²", "O"),
    ("¹", "U"),
    ("™", ""),
    ("¬", "I"),
    ("Œ", "O"),
    ("±", "Ñ"),
    ("A ±", "Ñ"),
    ("A O", "Ñ"),
    ("A ‰", "E"),
    ("Ï¿½", ""),
    ("°", ""),
    ("º", ""),
    ("§", ""),
    ("¼", "U"),
    ("Ã ", "A"),
    ("Ã", "A"),
    ("GARC?A", "GARCIA"),
    ("GARC A", "GARCIA"),
    ("G?MEZ", "GOMEZ"),
    ("G MEZ", "GOMEZ"),
    ("P?REZ", "PEREZ"),
    (" P REZ", " PEREZ"),
    ("ORDO?EZ", "ORDOÑEZ"),
    ("ORDO EZ", "ORDOÑEZ"),
    ("LUC?A", "LUCIA"),
    ("MAR?A", "MARIA"),
    ("D?AZ", "DIAZ"),
    ("MU?OZ", "MUÑOZ"),
    ("MU EZ", "MUÑOZ"),
    ("BA?OS", "BAÑOS"),
    ("Í", "I"),
    ("&AMP;", "&"),
    ("&QUOT;", ""),
    ("Â®", ""),
    ("Â", " "),
    ("€", ""),
    ("Âº", ""),
    ("¡", "I"),
    ("\u{81}", " "),
    ("‹", ""),
    ("›", ""),
    ("BAOS", "BAÑOS"),
    ("SALDAA", "SALDAÑA"),
    ("COMPAIA", "COMPAÑIA"),
    ("NIO", "NIÑO"),
    ("DISEO", "DISEÑO"),
    ("AO", "AÑO"),
    ("Ð", "Ñ"),
    ("ð", "ñ"),
    ("\u{fffd}", "Ñ"),
];

/// Number of rules in the frozen catalog
pub fn rule_count() -> usize {
    MOJIBAKE_RULES.len()
}

/// Apply the ordered rule catalog to one string.
///
/// `repair(None) == None`. For non-null input the catalog is folded in fixed
/// order, every occurrence of each corrupt pattern replaced and the result
/// fed to the next rule. An explicit per-string fold keeps the cost linear
/// in string length times rule count and independent of recursion depth,
/// which matters with a catalog of this size.
pub fn repair(text: Option<&str>) -> Option<String> {
    let text = text?;
    let mut repaired = text.to_string();
    for (corrupt, replacement) in MOJIBAKE_RULES {
        if repaired.contains(corrupt) {
            repaired = repaired.replace(corrupt, replacement);
        }
    }
    Some(repaired)
}

/// True when a column's values should go through the repair fold
pub fn is_repair_target(column: &str) -> bool {
    let upper = column.to_uppercase();
    REPAIR_COLUMN_KEYWORDS.iter().any(|kw| upper.contains(kw))
}

/// Normalize and repair a raw-text batch in place.
///
/// Phase 1 trims and uppercases every text value (standard normalization for
/// the whole extract). Phase 2 runs the repair fold, restricted to the
/// sensitive descriptive columns.
pub fn repair_batch(batch: &mut Batch) {
    let repair_columns: Vec<usize> = batch
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| is_repair_target(name))
        .map(|(idx, _)| idx)
        .collect();

    for row in &mut batch.rows {
        for value in row.iter_mut() {
            if let Value::Text(s) = value {
                *value = Value::Text(s.trim().to_uppercase());
            }
        }
        for &idx in &repair_columns {
            if let Some(value) = row.get_mut(idx) {
                let repaired = match value {
                    Value::Text(s) => repair(Some(s)),
                    _ => continue,
                };
                *value = match repaired {
                    Some(s) => Value::Text(s),
                    None => Value::Null,
                };
            }
        }
    }
}
