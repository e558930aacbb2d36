use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// Composite identity of a listing across time. Two rows with the same
/// (estado, cidade, link) are the same listing no matter what the rest of
/// their fields say; two rows that differ in `link` are distinct listings
/// even when their address text is identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub estado: String,
    pub cidade: String,
    pub link: String,
}

/// One listing as carried in the historical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub link: String,
    pub endereco: Option<String>,
    pub bairro: Option<String>,
    pub descricao: Option<String>,
    pub preco: Option<f64>,
    pub avaliacao: Option<f64>,
    pub desconto: Option<f64>,
    pub modalidade: Option<String>,
    pub foto: Option<String>,
    pub cidade: String,
    pub estado: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub first_time_seen: Option<NaiveDate>,
    pub not_seen_since: Option<NaiveDate>,
}

impl ListingRecord {
    pub fn identity(&self) -> AppResult<IdentityKey> {
        let estado = require_field(&self.estado, "estado")?;
        let cidade = require_field(&self.cidade, "cidade")?;
        let link = require_field(&self.link, "link")?;
        Ok(IdentityKey {
            estado,
            cidade,
            link,
        })
    }

    /// Address string handed to the geocoder: non-blank components joined
    /// with ", ", in street / neighborhood / city / state order. Empty when
    /// every component is blank.
    pub fn geocode_address(&self) -> String {
        [
            self.endereco.as_deref(),
            self.bairro.as_deref(),
            Some(self.cidade.as_str()),
            Some(self.estado.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

fn require_field(value: &str, name: &'static str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AppError::MalformedRecord(name))
    } else {
        Ok(trimmed.to_string())
    }
}

/// One row as scraped into a per-state snapshot CSV. Monetary columns arrive
/// either as plain floats or as Brazilian-formatted strings, so they are kept
/// raw here and normalized on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub link: String,
    pub endereco: Option<String>,
    pub bairro: Option<String>,
    pub descricao: Option<String>,
    pub preco: Option<String>,
    pub avaliacao: Option<String>,
    pub desconto: Option<String>,
    pub modalidade: Option<String>,
    pub foto: Option<String>,
    pub cidade: String,
    pub estado: String,
}

impl SnapshotRow {
    /// Normalizes a scraped row into a history-shaped record with geo and
    /// lifecycle fields unset; those are owned by enrichment and
    /// reconciliation respectively.
    pub fn into_record(self) -> ListingRecord {
        ListingRecord {
            link: self.link.trim().to_string(),
            endereco: normalize_text(self.endereco),
            bairro: normalize_text(self.bairro).map(|b| b.to_uppercase()),
            descricao: normalize_text(self.descricao),
            preco: self.preco.as_deref().and_then(parse_monetary),
            avaliacao: self.avaliacao.as_deref().and_then(parse_monetary),
            desconto: self.desconto.as_deref().and_then(parse_percentage),
            modalidade: normalize_text(self.modalidade),
            foto: normalize_text(self.foto),
            cidade: self.cidade.trim().to_string(),
            estado: self.estado.trim().to_string(),
            latitude: None,
            longitude: None,
            first_time_seen: None,
            not_seen_since: None,
        }
    }
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses a Brazilian monetary string ("R$ 100.000,00", "250.550,75") or a
/// plain numeric literal into a float. Returns None for blank or unparseable
/// input.
pub fn parse_monetary(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if is_plain_decimal(trimmed) {
        if let Ok(parsed) = trimmed.parse::<f64>() {
            return Some(parsed);
        }
    }
    trimmed
        .replace("R$", "")
        .replace('.', "")
        .replace(',', ".")
        .trim()
        .parse()
        .ok()
}

// A dot followed by exactly three digits is a Brazilian thousands separator
// ("100.000" is one hundred thousand), so only values with no comma and at
// most two digits after a single dot may take the plain-float path.
fn is_plain_decimal(value: &str) -> bool {
    if value.contains(',') {
        return false;
    }
    match value.split_once('.') {
        None => true,
        Some((_, frac)) => !frac.contains('.') && frac.len() <= 2,
    }
}

/// Parses a discount fraction: "0,10" and "0.10" mean 10%, "10%" is divided
/// by 100. Returns None for blank or unparseable input.
pub fn parse_percentage(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = trimmed.replace(',', ".");
    if let Some(stripped) = normalized.strip_suffix('%') {
        return stripped.trim().parse::<f64>().ok().map(|v| v / 100.0);
    }
    normalized.parse().ok()
}
