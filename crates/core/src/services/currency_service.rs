use crate::models::rates::{RateTable, REFERENCE_CURRENCY};

/// Crypto assets displayed with 6 fractional digits (BTC gets 8).
pub const RECOGNIZED_CRYPTO: &[&str] = &[
    "BTC", "ETH", "SOL", "XRP", "ADA", "DOGE", "DOT", "LTC", "LINK", "AVAX", "MATIC", "BNB",
    "TRX", "XLM", "XMR", "ATOM", "USDT", "USDC",
];

/// Outcome of a currency conversion.
///
/// A missing rate is an expected, recoverable situation: callers skip the
/// amount (totals) or skip the balance adjustment (postings) instead of
/// failing the operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    Converted(f64),
    Unavailable,
}

impl Conversion {
    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Conversion::Converted(v) => Some(v),
            Conversion::Unavailable => None,
        }
    }

    #[must_use]
    pub fn is_available(self) -> bool {
        matches!(self, Conversion::Converted(_))
    }

    /// The converted value, or zero when unavailable ("contribute nothing").
    #[must_use]
    pub fn or_zero(self) -> f64 {
        self.value().unwrap_or(0.0)
    }
}

/// Converts amounts between currencies using a EUR-pivoted rate table.
///
/// Pure: no I/O, no rounding. Rounding happens only when formatting for display.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrencyService;

impl CurrencyService {
    pub fn new() -> Self {
        Self
    }

    /// Convert `amount` from one currency to another.
    /// E.g., with `USD = 2.0`: convert(100.0, "EUR", "USD") → 200.0
    ///
    /// Same-currency conversions return the amount untouched without
    /// looking at `rates`, so they work even with an empty table.
    #[must_use]
    pub fn convert(&self, amount: f64, from: &str, to: &str, rates: &RateTable) -> Conversion {
        let from = from.trim().to_uppercase();
        let to = to.trim().to_uppercase();

        if from == to {
            return Conversion::Converted(amount);
        }

        let amount_in_eur = if from == REFERENCE_CURRENCY {
            amount
        } else {
            match usable_rate(rates, &from) {
                Some(rate) => amount / rate,
                None => return Conversion::Unavailable,
            }
        };

        if to == REFERENCE_CURRENCY {
            return Conversion::Converted(amount_in_eur);
        }

        match usable_rate(rates, &to) {
            Some(rate) => Conversion::Converted(amount_in_eur * rate),
            None => Conversion::Unavailable,
        }
    }

    /// Convert `amount` into the reference currency (EUR).
    #[must_use]
    pub fn convert_to_reference(&self, amount: f64, from: &str, rates: &RateTable) -> Conversion {
        self.convert(amount, from, REFERENCE_CURRENCY, rates)
    }

    /// Fractional digits used when displaying amounts in `code`.
    #[must_use]
    pub fn display_precision(&self, code: &str) -> usize {
        let upper = code.trim().to_uppercase();
        if upper == "BTC" {
            8
        } else if RECOGNIZED_CRYPTO.contains(&upper.as_str()) {
            6
        } else {
            2
        }
    }

    /// Render an amount for display, e.g. `"12.50 EUR"` or `"0.00150000 BTC"`.
    #[must_use]
    pub fn format_amount(&self, amount: f64, code: &str) -> String {
        let precision = self.display_precision(code);
        let upper = code.trim().to_uppercase();
        // Avoid rendering "-0.00"
        let rounded = if amount.abs() < 0.5 * 10f64.powi(-(precision as i32)) {
            0.0
        } else {
            amount
        };
        format!("{rounded:.precision$} {upper}")
    }
}

/// A rate that can be divided by: present and non-zero.
fn usable_rate(rates: &RateTable, code: &str) -> Option<f64> {
    rates.get(code).filter(|r| *r != 0.0)
}
