//! Credit Pricing
//!
//! The per-credit price is configuration, never a constant baked into code.

use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// Largest purchase accepted in a single intent
pub const MAX_CREDITS_PER_INTENT: i64 = 1000;

const DEFAULT_CURRENCY: &str = "eur";
const DEFAULT_PACKAGES: &[i64] = &[1, 5, 10, 20];

/// A purchasable bundle of credits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPackage {
    pub credits: i64,
    /// Price in minor currency units
    pub amount: i64,
}

/// Price list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreditPricing {
    unit_price_minor: i64,
    currency: String,
    packages: Vec<i64>,
}

impl CreditPricing {
    pub fn new(unit_price_minor: i64, currency: &str) -> Result<Self> {
        if unit_price_minor <= 0 {
            return Err(PaymentError::Config(format!(
                "credit unit price must be positive, got {unit_price_minor}"
            )));
        }

        let currency = currency.trim().to_lowercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PaymentError::Config(format!(
                "'{currency}' is not an ISO 4217 currency code"
            )));
        }

        Ok(Self {
            unit_price_minor,
            currency,
            packages: DEFAULT_PACKAGES.to_vec(),
        })
    }

    /// Create from environment variables.
    ///
    /// `CREDIT_UNIT_PRICE_MINOR` is required; `CREDIT_CURRENCY` defaults to
    /// `eur` and `CREDIT_PACKAGES` to `1,5,10,20`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let unit_price = lookup("CREDIT_UNIT_PRICE_MINOR")
            .ok_or_else(|| PaymentError::Config("CREDIT_UNIT_PRICE_MINOR not set".into()))?;
        let unit_price: i64 = unit_price.trim().parse().map_err(|_| {
            PaymentError::Config(format!("CREDIT_UNIT_PRICE_MINOR '{unit_price}' is not an integer"))
        })?;

        let currency = lookup("CREDIT_CURRENCY").unwrap_or_else(|| DEFAULT_CURRENCY.into());
        let pricing = Self::new(unit_price, &currency)?;

        match lookup("CREDIT_PACKAGES") {
            Some(raw) => {
                let packages = raw
                    .split(',')
                    .map(|p| {
                        p.trim().parse::<i64>().map_err(|_| {
                            PaymentError::Config(format!("CREDIT_PACKAGES entry '{p}' is not an integer"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                pricing.with_packages(packages)
            }
            None => Ok(pricing),
        }
    }

    /// Replace the package list; every size must be a valid purchase
    pub fn with_packages(mut self, packages: Vec<i64>) -> Result<Self> {
        for &credits in &packages {
            self.validate_credits(credits)
                .map_err(|e| PaymentError::Config(format!("invalid credit package: {e}")))?;
        }
        self.packages = packages;
        Ok(self)
    }

    pub const fn unit_price_minor(&self) -> i64 {
        self.unit_price_minor
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Check a requested credit amount
    pub fn validate_credits(&self, credits: i64) -> Result<()> {
        if credits <= 0 {
            return Err(PaymentError::Validation(format!(
                "credit amount must be a positive integer, got {credits}"
            )));
        }
        if credits > MAX_CREDITS_PER_INTENT {
            return Err(PaymentError::Validation(format!(
                "at most {MAX_CREDITS_PER_INTENT} credits per purchase, got {credits}"
            )));
        }
        Ok(())
    }

    /// Charge in minor units for `credits`
    pub fn charge_for(&self, credits: i64) -> Result<i64> {
        self.validate_credits(credits)?;
        credits
            .checked_mul(self.unit_price_minor)
            .ok_or_else(|| PaymentError::Validation(format!("charge for {credits} credits overflows")))
    }

    pub fn packages(&self) -> Vec<CreditPackage> {
        self.packages
            .iter()
            .map(|&credits| CreditPackage {
                credits,
                amount: credits.saturating_mul(self.unit_price_minor),
            })
            .collect()
    }
}
