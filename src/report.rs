use std::collections::BTreeMap;
use std::fmt;

use crate::records::ListingRecord;

/// Aggregate view of the historical table, for the `report` command.
#[derive(Debug, Default, PartialEq)]
pub struct ReportSummary {
    pub total: usize,
    pub active: usize,
    pub disappeared: usize,
    pub geocoded: usize,
    pub by_estado: BTreeMap<String, usize>,
    pub price: Option<PriceSummary>,
}

#[derive(Debug, PartialEq)]
pub struct PriceSummary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

pub fn summarize(records: &[ListingRecord]) -> ReportSummary {
    let mut summary = ReportSummary {
        total: records.len(),
        ..Default::default()
    };
    let mut prices: Vec<f64> = Vec::new();
    for record in records {
        if record.not_seen_since.is_none() {
            summary.active += 1;
        } else {
            summary.disappeared += 1;
        }
        if record.latitude.is_some() {
            summary.geocoded += 1;
        }
        *summary.by_estado.entry(record.estado.clone()).or_insert(0) += 1;
        if let Some(preco) = record.preco {
            if preco.is_finite() {
                prices.push(preco);
            }
        }
    }
    if !prices.is_empty() {
        let sum: f64 = prices.iter().sum();
        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        summary.price = Some(PriceSummary {
            min,
            mean: sum / prices.len() as f64,
            max,
        });
    }
    summary
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "listings: {} total, {} active, {} no longer listed", self.total, self.active, self.disappeared)?;
        if self.total > 0 {
            let pct = self.geocoded as f64 * 100.0 / self.total as f64;
            writeln!(f, "geocoded: {} ({pct:.1}%)", self.geocoded)?;
        }
        if let Some(price) = &self.price {
            writeln!(
                f,
                "price: min R$ {:.2}, mean R$ {:.2}, max R$ {:.2}",
                price.min, price.mean, price.max
            )?;
        }
        for (estado, count) in &self.by_estado {
            writeln!(f, "  {estado}: {count}")?;
        }
        Ok(())
    }
}
