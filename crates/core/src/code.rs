//! Customer code allocation.
//!
//! Codes are a fixed alphabetic prefix followed by a five digit suffix drawn
//! uniformly from `10000..=99999`. Allocation makes no attempt to avoid
//! collisions; uniqueness is enforced by the store and callers retry.

use rand::Rng;

use crate::domain::customer::CustomerCode;

pub const DEFAULT_CODE_PREFIX: &str = "CUST";
pub const CODE_SUFFIX_MIN: u32 = 10_000;
pub const CODE_SUFFIX_MAX: u32 = 99_999;

pub trait CodeAllocator: Send + Sync {
    fn allocate(&self) -> CustomerCode;
}

#[derive(Clone, Debug)]
pub struct RandomCodeAllocator {
    prefix: String,
}

impl Default for RandomCodeAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_PREFIX)
    }
}

impl RandomCodeAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl CodeAllocator for RandomCodeAllocator {
    fn allocate(&self) -> CustomerCode {
        let suffix = rand::thread_rng().gen_range(CODE_SUFFIX_MIN..=CODE_SUFFIX_MAX);
        CustomerCode(format!("{}{suffix}", self.prefix))
    }
}

/// True when `code` is `prefix` followed by exactly five digits in range.
pub fn is_well_formed(code: &str, prefix: &str) -> bool {
    let Some(suffix) = code.strip_prefix(prefix) else {
        return false;
    };
    if suffix.len() != 5 || !suffix.bytes().all(|byte| byte.is_ascii_digit()) {
        return false;
    }
    suffix
        .parse::<u32>()
        .map(|value| (CODE_SUFFIX_MIN..=CODE_SUFFIX_MAX).contains(&value))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{is_well_formed, CodeAllocator, RandomCodeAllocator};

    #[test]
    fn allocated_codes_follow_prefix_and_width() {
        let allocator = RandomCodeAllocator::default();
        for _ in 0..500 {
            let code = allocator.allocate();
            assert!(is_well_formed(code.as_str(), "CUST"), "unexpected code `{code}`");
        }
    }

    #[test]
    fn custom_prefix_is_used() {
        let allocator = RandomCodeAllocator::new("KE");
        let code = allocator.allocate();

        assert!(code.as_str().starts_with("KE"));
        assert!(is_well_formed(code.as_str(), allocator.prefix()));
    }

    #[test]
    fn malformed_codes_are_rejected() {
        assert!(!is_well_formed("CUST0999", "CUST"));
        assert!(!is_well_formed("CUST09999", "CUST"));
        assert!(!is_well_formed("CUST123456", "CUST"));
        assert!(!is_well_formed("CUSTabcde", "CUST"));
        assert!(!is_well_formed("ORD12345", "CUST"));
        assert!(is_well_formed("CUST10000", "CUST"));
        assert!(is_well_formed("CUST99999", "CUST"));
    }
}
