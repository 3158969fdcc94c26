//! Result-code admission for inference results.
//!
//! Only results whose code is in the allow-set are cached, so error
//! responses are never served from cache.

use std::collections::HashSet;

use fedserve_core::retcode;

use crate::error::{CacheError, Result};

/// Allow-set of cacheable result codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionPolicy {
    codes: HashSet<i32>,
}

impl AdmissionPolicy {
    pub fn from_codes(codes: impl IntoIterator<Item = i32>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
        }
    }

    /// Parse a comma-separated code list such as `"0,102"`. Blank items are
    /// skipped; anything else that is not an integer is an error.
    pub fn parse(list: &str) -> Result<Self> {
        let mut codes = HashSet::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let code = item.parse::<i32>().map_err(|_| {
                CacheError::config(format!("invalid cacheable retcode '{item}' in '{list}'"))
            })?;
            codes.insert(code);
        }
        Ok(Self { codes })
    }

    #[inline]
    pub fn admits(&self, retcode: i32) -> bool {
        self.codes.contains(&retcode)
    }

    /// Admitted codes in ascending order.
    pub fn codes(&self) -> Vec<i32> {
        let mut codes: Vec<i32> = self.codes.iter().copied().collect();
        codes.sort_unstable();
        codes
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::from_codes([retcode::OK, retcode::PARTIAL_SUCCESS])
    }
}
