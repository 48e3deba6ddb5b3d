//! Currency conversion.

use serde::Deserialize;
use serde_json::Value;
use sheetql_engine::engine::value::number;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{SheetFunction, number_arg, text_arg};
use crate::cache::{Cache, CacheProvider};
use crate::config::RatesConfig;
use crate::error::{Result, SheetqlError};

/// Source of exchange rates.
pub trait RateSource: Send + Sync {
    /// Units of `to` per one unit of `from`. Codes are upper case.
    fn rate(&self, from: &str, to: &str) -> Result<f64>;
}

/// A fixed table of rates against one base currency.
#[derive(Clone, Debug, PartialEq)]
pub struct StaticRates {
    base: String,
    /// Units of each currency per one unit of `base`.
    table: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
struct RatesDocument {
    base: String,
    rates: BTreeMap<String, f64>,
}

impl StaticRates {
    pub fn new(base: &str) -> Self {
        StaticRates {
            base: base.to_ascii_uppercase(),
            table: BTreeMap::new(),
        }
    }

    pub fn with_rate(mut self, currency: &str, rate: f64) -> Self {
        self.table.insert(currency.to_ascii_uppercase(), rate);
        self
    }

    pub fn from_config(config: &RatesConfig) -> Self {
        config
            .table
            .iter()
            .fold(StaticRates::new(&config.base), |rates, (currency, rate)| {
                rates.with_rate(currency, *rate)
            })
    }

    /// Parse a rate-service response of the form
    /// `{"base": "USD", "rates": {"EUR": 0.92, ...}}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let fetch_error = |message: String| SheetqlError::RateFetch {
            message,
            raw: raw.to_string(),
        };
        let doc: RatesDocument =
            serde_json::from_str(raw).map_err(|e| fetch_error(format!("malformed rates: {}", e)))?;
        let mut rates = StaticRates::new(&doc.base);
        for (currency, rate) in doc.rates {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(fetch_error(format!("invalid rate for {}: {}", currency, rate)));
            }
            rates = rates.with_rate(&currency, rate);
        }
        Ok(rates)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn per_base(&self, currency: &str) -> Result<f64> {
        if currency == self.base {
            return Ok(1.0);
        }
        self.table
            .get(currency)
            .copied()
            .ok_or_else(|| SheetqlError::UnknownCurrency(currency.to_string()))
    }
}

impl RateSource for StaticRates {
    fn rate(&self, from: &str, to: &str) -> Result<f64> {
        if from == to {
            return Ok(1.0);
        }
        Ok(self.per_base(to)? / self.per_base(from)?)
    }
}

/// Caches each currency pair's rate for a fixed time.
pub struct CachedRates<S> {
    inner: S,
    cache: Cache,
    ttl: Duration,
}

impl<S: RateSource> CachedRates<S> {
    pub const NAMESPACE: &'static str = "CachedRates";

    pub fn new(inner: S, provider: Arc<dyn CacheProvider>, ttl: Duration) -> Result<Self> {
        Ok(CachedRates {
            inner,
            cache: Cache::for_owner(provider, Self::NAMESPACE)?,
            ttl,
        })
    }
}

impl<S: RateSource> RateSource for CachedRates<S> {
    fn rate(&self, from: &str, to: &str) -> Result<f64> {
        let key = format!("{}/{}", from, to);
        if let Some(rate) = self.cache.get::<f64>(&key)? {
            debug!(pair = %key, "rate cache hit");
            return Ok(rate);
        }
        let rate = self.inner.rate(from, to)?;
        self.cache.set(&key, &rate, Some(self.ttl))?;
        Ok(rate)
    }
}

/// `EXCHANGE(amount, from, to)`.
pub struct Exchange {
    rates: Arc<dyn RateSource>,
}

impl Exchange {
    pub const NAME: &'static str = "EXCHANGE";

    pub fn new(rates: Arc<dyn RateSource>) -> Self {
        Exchange { rates }
    }
}

impl SheetFunction for Exchange {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn call(&self, args: &[Value]) -> Result<Value> {
        if args.len() != 3 {
            return Err(SheetqlError::invalid_arg(
                Self::NAME,
                format!("expected 3 arguments, got {}", args.len()),
            ));
        }
        let Some(amount) = number_arg(Self::NAME, args, 0)? else {
            return Ok(Value::Null);
        };
        let from = text_arg(Self::NAME, args, 1)?.trim().to_ascii_uppercase();
        let to = text_arg(Self::NAME, args, 2)?.trim().to_ascii_uppercase();
        let rate = self.rates.rate(&from, &to)?;
        Ok(number(amount * rate))
    }
}
