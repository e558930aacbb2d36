use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::records::{IdentityKey, ListingRecord};

/// Result of folding one day's snapshot into the historical table.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub records: Vec<ListingRecord>,
    pub stats: ReconcileStats,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub new: usize,
    pub updated: usize,
    pub disappeared: usize,
    pub reappeared: usize,
    pub skipped_malformed: usize,
    pub total: usize,
}

/// Merges a snapshot into the history as of `today`.
///
/// Lifecycle rules:
/// - a listing seen for the first time gets `first_time_seen = today`, and
///   that date never changes on later runs;
/// - a known listing present in the snapshot takes the snapshot's descriptive
///   fields, keeps its original `first_time_seen`, keeps any coordinates
///   already on file, and has `not_seen_since` cleared;
/// - a known listing absent from the snapshot gets `not_seen_since = today`
///   only if it was not already marked absent, so the date records the first
///   run that missed it.
///
/// Within one snapshot, duplicate identities keep the first occurrence.
/// Rows whose identity fields are blank are skipped with a warning; they can
/// neither join nor corrupt the history. The same history and snapshot merged
/// twice on the same date produce the same table.
pub fn reconcile(
    history: Vec<ListingRecord>,
    snapshot: Vec<ListingRecord>,
    today: NaiveDate,
) -> ReconcileOutcome {
    let mut stats = ReconcileStats::default();

    let mut merged: Vec<ListingRecord> = Vec::with_capacity(history.len());
    let mut index: HashMap<IdentityKey, usize> = HashMap::with_capacity(history.len());
    for record in history {
        let key = match record.identity() {
            Ok(key) => key,
            Err(err) => {
                stats.skipped_malformed += 1;
                warn!(%err, "skipping malformed history row");
                continue;
            }
        };
        if index.contains_key(&key) {
            debug!(link = %key.link, "duplicate identity in history; keeping first");
            continue;
        }
        index.insert(key, merged.len());
        merged.push(record);
    }

    let mut seen_today: Vec<bool> = vec![false; merged.len()];

    for incoming in snapshot {
        let key = match incoming.identity() {
            Ok(key) => key,
            Err(err) => {
                stats.skipped_malformed += 1;
                warn!(%err, "skipping malformed snapshot row");
                continue;
            }
        };
        match index.get(&key) {
            Some(&pos) => {
                if seen_today[pos] {
                    debug!(link = %key.link, "duplicate identity in snapshot; keeping first");
                    continue;
                }
                let existing = &mut merged[pos];
                if existing.not_seen_since.is_some() {
                    stats.reappeared += 1;
                }
                let mut updated = incoming;
                updated.first_time_seen = existing.first_time_seen;
                updated.not_seen_since = None;
                if updated.latitude.is_none() {
                    updated.latitude = existing.latitude;
                    updated.longitude = existing.longitude;
                }
                *existing = updated;
                seen_today[pos] = true;
                stats.updated += 1;
            }
            None => {
                let mut fresh = incoming;
                fresh.first_time_seen = Some(today);
                fresh.not_seen_since = None;
                index.insert(key, merged.len());
                merged.push(fresh);
                seen_today.push(true);
                stats.new += 1;
            }
        }
    }

    for (pos, record) in merged.iter_mut().enumerate() {
        if !seen_today[pos] && record.not_seen_since.is_none() {
            record.not_seen_since = Some(today);
            stats.disappeared += 1;
        }
    }

    merged.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    stats.total = merged.len();

    ReconcileOutcome {
        records: merged,
        stats,
    }
}

fn sort_key(record: &ListingRecord) -> impl Ord + '_ {
    (
        record.estado.as_str(),
        record.cidade.as_str(),
        record.bairro.as_deref().unwrap_or(""),
        record.endereco.as_deref().unwrap_or(""),
        record.preco.map(ordered_float),
        record.avaliacao.map(ordered_float),
        record.desconto.map(ordered_float),
        record.modalidade.as_deref().unwrap_or(""),
        record.descricao.as_deref().unwrap_or(""),
        record.link.as_str(),
        record.foto.as_deref().unwrap_or(""),
    )
}

// Prices and discounts are finite in practice; bit-ordering the IEEE
// representation gives a total order without pulling in a float-ord crate.
fn ordered_float(value: f64) -> u64 {
    let bits = value.to_bits();
    if bits >> 63 == 0 {
        bits | (1 << 63)
    } else {
        !bits
    }
}
