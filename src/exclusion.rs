//! Columns that are expected to differ between a record and its duplicate.
//!
//! Exclusion depends only on the table identifier, never on row content.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

const STANDARD_GLOBAL: &[&str] = &[
    // technical identifiers
    "NO_CNT",
    "NO_CNT_EXTENDED",
    "NO_AVT",
    "C_STE",
    // creation and modification dates
    "D_CRT",
    "D_CRT_CNT",
    "TSTAMP_DMOD",
    "D_MOD",
    "D_JOB_DMOD",
    "D_GEST_DMOD",
    // authors and jobs
    "NM_AUTEUR_CRT",
    "NM_AUTEUR_DMOD",
    "NM_AUTEUR",
    "NM_JOB_DMOD",
    "C_ID_GEST_DMOD",
    "C_ID_GEST",
    "TY_DMOD",
    // fillers
    "T_FILLER_11",
    "T_FILLER_20",
    "T_FILLER_30",
    "T_FILLER_31",
    "T_FILLER_36",
    "T_FILLER_84",
    "T_FILLER_85",
];

const STANDARD_TABLES: &[(&str, &[&str])] = &[
    (
        "LV.SCNTT0",
        &["NO_POLICE_PAPIER", "NO_BUR_INTRO", "NO_BUR_INT_GES"],
    ),
    ("LV.SCLST0", &["NO_ORD_CLS"]),
    ("LV.SCLRT0", &["NO_ORD_RNG", "NO_ORD_CLS"]),
    (
        "LV.BSPDT0",
        &[
            "NO_ORD_TRF_EPA",
            "NO_ORD_MVT_EPA",
            "NO_ORD_QUITT",
            "NO_ORD_MVT_ANNUL",
            "D_REF_MVT_EPA",
            "D_STA_IMPR",
            "C_STA_IMPR",
        ],
    ),
    ("LV.BSPGT0", &["NO_ORD_TRF_EPA"]),
    (
        "LV.SAVTT0",
        &[
            "NO_AVT_REF",
            "NO_AVT_CLS",
            "NO_AVT_T_LBR",
            "NO_AVT_ELT",
            "NO_AVT_PB",
            "NO_AVT_DCL",
        ],
    ),
];

/// Globally ignored columns plus per-table additions. Names are matched
/// exactly, case included.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExclusionPolicy {
    #[serde(default)]
    global: BTreeSet<String>,
    #[serde(default)]
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl ExclusionPolicy {
    /// A policy that excludes nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The rule set for duplicated insurance contracts: technical keys,
    /// audit columns, fillers, and per-table sequence numbers.
    pub fn standard() -> Self {
        let mut policy = Self::empty().with_global(STANDARD_GLOBAL.iter().copied());
        for (table, columns) in STANDARD_TABLES {
            policy = policy.with_table(table, columns.iter().copied());
        }
        policy
    }

    pub fn with_global<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn with_table<I, S>(mut self, table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables
            .entry(table.to_string())
            .or_default()
            .extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn is_excluded(&self, table: &str, column: &str) -> bool {
        self.global.contains(column)
            || self
                .tables
                .get(table)
                .is_some_and(|specific| specific.contains(column))
    }

    /// Every column ignored for `table`.
    pub fn excluded_columns(&self, table: &str) -> BTreeSet<&str> {
        let mut columns = self.global.iter().map(String::as_str).collect::<BTreeSet<_>>();
        if let Some(specific) = self.tables.get(table) {
            columns.extend(specific.iter().map(String::as_str));
        }
        columns
    }

    pub fn global(&self) -> &BTreeSet<String> {
        &self.global
    }
}
