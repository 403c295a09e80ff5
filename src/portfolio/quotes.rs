// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Shared quote cache. One refresh per symbol per business day; concurrent
//! lookups of a stale symbol wait on a single upstream fetch.

use crate::errors::{Error, Result};
use crate::utils::{days_between, http_client, price, today};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use tracing::{debug, warn};

const YAHOO_QUOTE_URL: &str = "https://query1.finance.yahoo.com/v7/finance/quote";

pub trait QuoteFetcher: Send + Sync {
    fn fetch(&self, symbol: &str) -> Result<Decimal>;
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct YahooResponse {
    quoteResponse: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    result: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    symbol: Option<String>,
}

pub struct YahooQuoteFetcher {
    client: reqwest::blocking::Client,
}

impl YahooQuoteFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
        })
    }
}

impl QuoteFetcher for YahooQuoteFetcher {
    fn fetch(&self, symbol: &str) -> Result<Decimal> {
        let resp = self
            .client
            .get(YAHOO_QUOTE_URL)
            .query(&[("symbols", symbol)])
            .send()?
            .error_for_status()?;
        let yr: YahooResponse = resp.json()?;
        yr.quoteResponse
            .result
            .into_iter()
            .filter(|q| q.symbol.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(symbol)))
            .find_map(|q| q.regular_market_price)
            .and_then(Decimal::from_f64_retain)
            .map(price)
            .ok_or_else(|| Error::Quote(format!("No quote for {}", symbol)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: Decimal,
    pub last_quoted: NaiveDate,
}

pub struct QuoteCache {
    fetcher: Box<dyn QuoteFetcher>,
    entries: RwLock<HashMap<String, Quote>>,
    in_flight: Mutex<HashSet<String>>,
    fetched: Condvar,
}

impl QuoteCache {
    pub fn new(fetcher: impl QuoteFetcher + 'static) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            fetched: Condvar::new(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<Quote> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&symbol.to_uppercase())
            .copied()
    }

    pub fn insert(&self, symbol: &str, quote: Quote) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.to_uppercase(), quote);
    }

    fn fresh(&self, symbol: &str, today: NaiveDate) -> Option<Quote> {
        self.get(symbol)
            .filter(|q| days_between(q.last_quoted, today, true) < 1)
    }

    /// Cached price, refreshed at most once per business day. A failed
    /// refresh keeps the stale entry.
    pub fn price_of(&self, symbol: &str, today: NaiveDate) -> Option<Decimal> {
        let key = symbol.trim().to_uppercase();
        if key.is_empty() {
            return None;
        }
        if let Some(q) = self.fresh(&key, today) {
            return Some(q.price);
        }
        {
            let mut pending = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            while pending.contains(&key) {
                pending = self
                    .fetched
                    .wait(pending)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if let Some(q) = self.fresh(&key, today) {
                return Some(q.price);
            }
            pending.insert(key.clone());
        }

        let result = self.fetcher.fetch(&key);
        match &result {
            Ok(p) => {
                debug!("Quote {} = {}", key, p);
                self.insert(&key, Quote { price: *p, last_quoted: today });
            }
            Err(e) => warn!("Quote refresh for {} failed: {}", key, e),
        }
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
        self.fetched.notify_all();
        result.ok().or_else(|| self.get(&key).map(|q| q.price))
    }

    /// Warms the cache for `symbols` on a detached thread. Callers never
    /// wait on it; failures only leave entries stale.
    pub fn spawn_refresh(self: &Arc<Self>, symbols: Vec<String>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        std::thread::spawn(move || {
            let day = today();
            let mut warmed = 0;
            for symbol in &symbols {
                if cache.price_of(symbol, day).is_some() {
                    warmed += 1;
                }
            }
            debug!("Quote refresh warmed {}/{} symbols", warmed, symbols.len());
        })
    }

    /// Fetches regardless of age.
    pub fn force_refresh(&self, symbol: &str) -> Result<Decimal> {
        let key = symbol.trim().to_uppercase();
        let p = self.fetcher.fetch(&key)?;
        self.insert(&key, Quote { price: p, last_quoted: today() });
        Ok(p)
    }
}
