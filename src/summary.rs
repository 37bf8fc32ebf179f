//! Per-product OK/KO counts, recomputed from finished records.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;

use crate::{
    normalize::round_half_even,
    reconcile::{RecordMapping, RecordStatus},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRow {
    pub product: String,
    pub counts: BTreeMap<RecordStatus, usize>,
}

impl ProductRow {
    pub fn count(&self, status: RecordStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn ok(&self) -> usize {
        self.count(RecordStatus::Ok)
    }

    pub fn ko(&self) -> usize {
        self.count(RecordStatus::Ko)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Share of `OK` records in percent, one decimal.
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        round_half_even(self.ok() as f64 / total as f64 * 100.0, 1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductSummary {
    rows: Vec<ProductRow>,
}

impl ProductSummary {
    pub fn from_records(records: &[RecordMapping]) -> Self {
        let mut by_product: BTreeMap<String, BTreeMap<RecordStatus, usize>> = BTreeMap::new();
        for ((product, status), count) in records
            .iter()
            .map(|record| (record.product.as_str(), record.status()))
            .counts()
        {
            *by_product
                .entry(product.to_string())
                .or_default()
                .entry(status)
                .or_default() += count;
        }
        let rows = by_product
            .into_iter()
            .map(|(product, counts)| ProductRow { product, counts })
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[ProductRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Status columns to show: `OK` and `KO` always, then any other status
    /// that occurs.
    pub fn statuses(&self) -> Vec<RecordStatus> {
        [RecordStatus::Ok, RecordStatus::Ko]
            .into_iter()
            .chain(self.rows.iter().flat_map(|row| row.counts.keys().copied()))
            .sorted()
            .dedup()
            .collect()
    }

    pub fn headers(&self) -> Vec<String> {
        std::iter::once("Product".to_string())
            .chain(self.statuses().iter().map(|status| status.to_string()))
            .chain(["Total".to_string(), "Success_Rate (%)".to_string()])
            .collect()
    }

    pub fn table_rows(&self) -> Vec<Vec<String>> {
        let statuses = self.statuses();
        self.rows
            .iter()
            .map(|row| {
                std::iter::once(row.product.clone())
                    .chain(statuses.iter().map(|status| row.count(*status).to_string()))
                    .chain([
                        row.total().to_string(),
                        format!("{:.1}", row.success_rate()),
                    ])
                    .collect()
            })
            .collect()
    }
}
