//! Variety / application-method catalog shared by the forms and the sheet sync.
//!
//! The variety -> sector table is the single source of truth for field topology.
//! Everything here is built once per process and only ever read.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::DEFAULT_METHOD;

/// Canonical variety -> ordered sector codes.
const VARIETY_SECTORS: &[(&str, &[&str])] = &[
    (
        "BILOXI",
        &["1A", "1B", "1C", "1D", "1E", "2A", "2B", "2C", "2D", "2E"],
    ),
    ("AZRA 3S Y 5S", &["3A", "3B", "3C", "5A", "5B", "5C"]),
    ("AZRA 4S", &["4A", "4B", "4C"]),
    ("VENTURA", &["6A", "6B", "6C", "6D"]),
    ("EMERALD", &["7A", "7B"]),
    ("SEKOYA POP", &["8A", "8B", "8C"]),
];

/// Spellings seen in the program sheet -> canonical variety.
const VARIETY_ALIASES: &[(&str, &str)] = &[
    ("AZRA 3 Y 5", "AZRA 3S Y 5S"),
    ("AZRA 3Y5", "AZRA 3S Y 5S"),
    ("AZRA 3S-5S", "AZRA 3S Y 5S"),
    ("AZRA 3/5", "AZRA 3S Y 5S"),
    ("AZRA 4", "AZRA 4S"),
    ("SEKOYA", "SEKOYA POP"),
];

const METHODS: &[&str] = &[DEFAULT_METHOD, "APORTE ESPECIAL (RIEGO)", "INMERSIÓN", "DRENCH"];

const METHOD_ALIASES: &[(&str, &str)] = &[
    ("RIEGO", "APORTE ESPECIAL (RIEGO)"),
    ("APORTE ESPECIAL", "APORTE ESPECIAL (RIEGO)"),
    ("APORTE ESPECIAL RIEGO", "APORTE ESPECIAL (RIEGO)"),
    ("INMERSION", "INMERSIÓN"),
    ("DRENCHADO", "DRENCH"),
    ("ASPERSION FOLIAR", DEFAULT_METHOD),
    ("ASPERSIÓN FOLIAR", DEFAULT_METHOD),
];

static STANDARD: LazyLock<Catalog> =
    LazyLock::new(|| Catalog::from_tables(VARIETY_SECTORS, VARIETY_ALIASES, METHODS, METHOD_ALIASES));

#[derive(Debug, Clone)]
pub struct Catalog {
    sectors: HashMap<String, Vec<String>>,
    variety_aliases: HashMap<String, String>,
    methods: Vec<String>,
    method_aliases: HashMap<String, String>,
}

impl Catalog {
    /// The process-wide catalog.
    pub fn standard() -> &'static Catalog {
        &STANDARD
    }

    pub fn from_tables(
        sectors: &[(&str, &[&str])],
        variety_aliases: &[(&str, &str)],
        methods: &[&str],
        method_aliases: &[(&str, &str)],
    ) -> Self {
        Self {
            sectors: sectors
                .iter()
                .map(|(variety, codes)| {
                    (
                        clean_label(variety),
                        codes.iter().map(|c| c.to_string()).collect(),
                    )
                })
                .collect(),
            variety_aliases: variety_aliases
                .iter()
                .map(|(alias, canonical)| (clean_label(alias), canonical.to_string()))
                .collect(),
            methods: methods.iter().map(|m| clean_label(m)).collect(),
            method_aliases: method_aliases
                .iter()
                .map(|(alias, canonical)| (clean_label(alias), canonical.to_string()))
                .collect(),
        }
    }

    /// Uppercased, whitespace-collapsed variety resolved through the alias table.
    /// Unknown varieties come back in cleaned form rather than being rejected.
    pub fn normalize_variety(&self, raw: &str) -> String {
        let cleaned = clean_label(raw);
        match self.variety_aliases.get(&cleaned) {
            Some(canonical) => canonical.clone(),
            None => cleaned,
        }
    }

    /// Canonical application method; blank or unrecognized text means foliar.
    pub fn normalize_method(&self, raw: &str) -> String {
        let cleaned = clean_label(raw);
        if self.methods.contains(&cleaned) {
            return cleaned;
        }
        self.method_aliases
            .get(&cleaned)
            .cloned()
            .unwrap_or_else(|| DEFAULT_METHOD.to_string())
    }

    pub fn derive_sectors(&self, canonical_variety: &str) -> Vec<String> {
        self.sectors
            .get(canonical_variety)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_known_variety(&self, canonical_variety: &str) -> bool {
        self.sectors.contains_key(canonical_variety)
    }

    /// Known canonical varieties, sorted.
    pub fn varieties(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.sectors.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }
}

fn clean_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variety_aliases_resolve_to_canonical_names() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.normalize_variety("azra 3 y 5"), "AZRA 3S Y 5S");
        assert_eq!(catalog.normalize_variety("  Azra   3 Y 5 "), "AZRA 3S Y 5S");
        assert_eq!(catalog.normalize_variety("biloxi"), "BILOXI");
        assert_eq!(
            catalog.derive_sectors("AZRA 3S Y 5S"),
            vec!["3A", "3B", "3C", "5A", "5B", "5C"]
        );
    }

    #[test]
    fn unknown_variety_passes_through_with_no_sectors() {
        let catalog = Catalog::standard();
        let variety = catalog.normalize_variety(" duke ");
        assert_eq!(variety, "DUKE");
        assert!(catalog.derive_sectors(&variety).is_empty());
        assert!(!catalog.is_known_variety(&variety));
    }

    #[test]
    fn methods_resolve_synonyms_and_default_to_foliar() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.normalize_method("riego"), "APORTE ESPECIAL (RIEGO)");
        assert_eq!(catalog.normalize_method("Inmersion"), "INMERSIÓN");
        assert_eq!(catalog.normalize_method("inmersión"), "INMERSIÓN");
        assert_eq!(catalog.normalize_method("drench"), "DRENCH");
        assert_eq!(catalog.normalize_method(""), "FOLIAR");
        assert_eq!(catalog.normalize_method("a mano"), "FOLIAR");
    }

    #[test]
    fn every_alias_targets_a_catalogued_name() {
        let catalog = Catalog::standard();
        for (_, canonical) in VARIETY_ALIASES {
            assert!(catalog.is_known_variety(canonical), "{canonical}");
        }
        for (_, canonical) in METHOD_ALIASES {
            assert!(catalog.methods().iter().any(|m| m.as_str() == *canonical), "{canonical}");
        }
    }

    #[test]
    fn custom_tables_are_independent_of_the_standard_catalog() {
        let sectors: &[(&str, &[&str])] = &[("ROSA", &["9A"])];
        let catalog = Catalog::from_tables(sectors, &[("ROSITA", "ROSA")], &["FOLIAR"], &[]);
        assert_eq!(catalog.normalize_variety("rosita"), "ROSA");
        assert_eq!(catalog.derive_sectors("ROSA"), vec!["9A"]);
        assert!(Catalog::standard().derive_sectors("ROSA").is_empty());
        assert_eq!(catalog.varieties(), vec!["ROSA"]);
    }
}
