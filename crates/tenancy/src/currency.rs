//! Closed currency domain.
//!
//! A company's currency is one of a fixed enumerated set. Anything else is
//! rejected at the write boundary; there is no silent fallback to a default
//! on the hot path.

use serde::{Deserialize, Serialize};

use casabill_core::{DomainError, DomainResult};

/// Supported currency codes (ISO 4217 style).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
    Chf,
    Jpy,
    // Regional set.
    Egp,
    Sar,
    Aed,
    Kwd,
    Qar,
    Bhd,
    Omr,
}

impl Currency {
    pub const ALL: [Currency; 14] = [
        Currency::Usd,
        Currency::Eur,
        Currency::Gbp,
        Currency::Cad,
        Currency::Aud,
        Currency::Chf,
        Currency::Jpy,
        Currency::Egp,
        Currency::Sar,
        Currency::Aed,
        Currency::Kwd,
        Currency::Qar,
        Currency::Bhd,
        Currency::Omr,
    ];

    pub fn as_code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Chf => "CHF",
            Currency::Jpy => "JPY",
            Currency::Egp => "EGP",
            Currency::Sar => "SAR",
            Currency::Aed => "AED",
            Currency::Kwd => "KWD",
            Currency::Qar => "QAR",
            Currency::Bhd => "BHD",
            Currency::Omr => "OMR",
        }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Validates and normalizes currency codes at every write boundary.
pub struct CurrencyPolicy;

impl CurrencyPolicy {
    /// Parse a code into the closed set. Case-insensitive on input,
    /// normalized to upper-case codes.
    pub fn parse(code: &str) -> DomainResult<Currency> {
        let normalized = code.trim().to_ascii_uppercase();
        Currency::ALL
            .iter()
            .copied()
            .find(|c| c.as_code() == normalized)
            .ok_or_else(|| DomainError::unsupported_currency(code.trim()))
    }
}
