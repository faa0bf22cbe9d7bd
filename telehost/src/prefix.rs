//! Accepted command prefixes

use std::sync::RwLock;
use thiserror::Error;

/// Prefixes used when nothing else is configured
pub const DEFAULT_PREFIXES: &[&str] = &[".", "。"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrefixError {
    #[error("Prefix set must contain at least one non-empty prefix")]
    Empty,
}

/// Ordered list of strings that mark the start of a command.
///
/// Order matters: the parser takes the first prefix that matches, so with
/// overlapping prefixes the earlier one wins. Writers replace the whole list;
/// the last writer wins.
#[derive(Debug)]
pub struct PrefixTable {
    prefixes: RwLock<Vec<String>>,
}

impl PrefixTable {
    /// Build a table, dropping empty entries
    pub fn new<I, S>(prefixes: I) -> Result<Self, PrefixError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            prefixes: RwLock::new(Self::validate(prefixes)?),
        })
    }

    /// Current prefixes, in match order
    pub fn get(&self) -> Vec<String> {
        self.prefixes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the prefixes
    pub fn set<I, S>(&self, prefixes: I) -> Result<(), PrefixError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes = Self::validate(prefixes)?;
        tracing::info!(prefixes = ?prefixes, "Command prefixes updated");
        *self
            .prefixes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = prefixes;
        Ok(())
    }

    fn validate<I, S>(prefixes: I) -> Result<Vec<String>, PrefixError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes
            .into_iter()
            .map(Into::into)
            .filter(|p| !p.is_empty())
            .collect();
        if prefixes.is_empty() {
            return Err(PrefixError::Empty);
        }
        Ok(prefixes)
    }
}

impl Default for PrefixTable {
    fn default() -> Self {
        Self {
            prefixes: RwLock::new(DEFAULT_PREFIXES.iter().map(|p| p.to_string()).collect()),
        }
    }
}
