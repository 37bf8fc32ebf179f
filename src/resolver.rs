//! Maps an external reference to its internal key, retrying while an
//! upstream batch has not yet made the key visible.

use std::{thread, time::Duration};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::{InternalKey, Query, QueryGateway};

pub const DEFAULT_ROUTINE_ATTEMPTS: u32 = 3;
pub const DEFAULT_FRESH_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Fixed-delay, bounded retry. There is no backoff growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: delay.as_millis() as u64,
        }
    }

    /// Policy for keys that should already exist.
    pub fn routine() -> Self {
        Self::new(DEFAULT_ROUTINE_ATTEMPTS, Duration::from_millis(DEFAULT_RETRY_DELAY_MS))
    }

    /// Policy for keys just created by an asynchronous pipeline.
    pub fn fresh() -> Self {
        Self::new(DEFAULT_FRESH_ATTEMPTS, Duration::from_millis(DEFAULT_RETRY_DELAY_MS))
    }

    pub fn single() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Attempts actually made; zero is read as one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::routine()
    }
}

/// Waits between attempts. Tests substitute a recording fake.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no internal key for '{reference}' after {attempts} attempt(s){}", last_fault_suffix(.last_fault))]
    NotFound {
        reference: String,
        attempts: u32,
        /// Last gateway fault seen, if any attempt failed rather than
        /// returning nothing.
        last_fault: Option<String>,
    },
}

fn last_fault_suffix(fault: &Option<String>) -> String {
    fault
        .as_ref()
        .map(|message| format!(" (last fault: {message})"))
        .unwrap_or_default()
}

pub struct IdentifierResolver<'a, G: ?Sized> {
    gateway: &'a G,
    sleeper: &'a dyn Sleeper,
}

impl<'a, G: QueryGateway + ?Sized> IdentifierResolver<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            sleeper: &ThreadSleeper,
        }
    }

    pub fn with_sleeper(gateway: &'a G, sleeper: &'a dyn Sleeper) -> Self {
        Self { gateway, sleeper }
    }

    /// Looks `reference` up until a key appears or the policy is exhausted.
    /// Gateway faults count as failed attempts, not as a reason to stop.
    pub fn resolve(
        &self,
        reference: &str,
        policy: &RetryPolicy,
    ) -> Result<InternalKey, ResolveError> {
        let attempts = policy.attempts();
        let query = Query::InternalKey {
            reference: reference.to_string(),
        };
        let mut last_fault = None;
        for attempt in 1..=attempts {
            match self.gateway.execute(&query) {
                Ok(dataset) => {
                    if let Some(key) = dataset.scalar().and_then(InternalKey::from_value) {
                        debug!("Resolved {reference} to {key} on attempt {attempt}");
                        return Ok(key);
                    }
                    info!("Internal key for {reference} not visible yet (attempt {attempt}/{attempts})");
                }
                Err(err) => {
                    info!("Lookup of {reference} failed (attempt {attempt}/{attempts}): {err}");
                    last_fault = Some(err.to_string());
                }
            }
            if attempt < attempts {
                self.sleeper.sleep(policy.delay());
            }
        }
        Err(ResolveError::NotFound {
            reference: reference.to_string(),
            attempts,
            last_fault,
        })
    }

    /// Like [`resolve`](Self::resolve), then once more per alternate spelling
    /// of the reference (dashes removed) when the first form is unknown.
    pub fn resolve_any_form(
        &self,
        reference: &str,
        policy: &RetryPolicy,
    ) -> Result<(String, InternalKey), ResolveError> {
        let mut first_error = None;
        for form in reference_forms(reference) {
            match self.resolve(&form, policy) {
                Ok(key) => return Ok((form, key)),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        Err(first_error.unwrap_or_else(|| ResolveError::NotFound {
            reference: reference.to_string(),
            attempts: 0,
            last_fault: None,
        }))
    }
}

fn reference_forms(reference: &str) -> Vec<String> {
    let mut forms = vec![reference.to_string()];
    if reference.contains('-') {
        forms.push(reference.replace('-', ""));
    }
    forms
}
