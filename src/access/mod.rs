//! One-time access codes.
//!
//! A maintainer issues a short random code bound to a contributor name; the
//! contributor redeems it exactly once (via `xwgit init --code`) to learn the
//! identity they should commit under. Codes expire lazily: an expired code
//! is only discovered, and removed, when someone tries to redeem it.
//!
//! # Example
//!
//! ```ignore
//! use xwgit::access::{AccessCodes, FileCodeStore};
//!
//! let mut codes = AccessCodes::new(FileCodeStore::new("/tmp/codes.json"));
//! let issued = codes.issue("claude")?;
//! assert_eq!(codes.redeem(&issued.code)?, "claude");
//! ```

pub mod code;
pub mod store;

pub use code::{AccessCode, CodeTable, CODE_ALPHABET, CODE_LENGTH, DEFAULT_VALIDITY_SECS};
pub use store::{CodeStore, FileCodeStore, MemoryCodeStore};

use rand::RngExt;
use tracing::{debug, info, warn};

use crate::error::AccessError;

/// Upper bound on draws while looking for an unused code.
const MAX_ISSUE_ATTEMPTS: usize = 64;

/// Source of the current time in seconds since the epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Produces candidate codes.
pub trait CodeGenerator: Send {
    fn generate(&mut self) -> String;
}

/// Draws codes uniformly from [`CODE_ALPHABET`] using the thread-local
/// CSPRNG.
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&mut self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// A freshly issued code together with its persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: String,
    pub record: AccessCode,
}

/// Issues and redeems access codes against a [`CodeStore`].
pub struct AccessCodes<S> {
    store: S,
    clock: Box<dyn Clock>,
    generator: Box<dyn CodeGenerator>,
    validity_secs: i64,
}

impl<S: CodeStore> AccessCodes<S> {
    /// Creates a service with the system clock, random codes and the default
    /// validity window.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Box::new(SystemClock),
            generator: Box::new(RandomCodeGenerator::default()),
            validity_secs: DEFAULT_VALIDITY_SECS,
        }
    }

    pub fn with_validity(mut self, validity_secs: i64) -> Self {
        self.validity_secs = validity_secs;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_generator(mut self, generator: impl CodeGenerator + 'static) -> Self {
        self.generator = Box::new(generator);
        self
    }

    pub fn validity_secs(&self) -> i64 {
        self.validity_secs
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Issues a new code for `owner`.
    ///
    /// A draw that collides with an existing code is discarded and redrawn;
    /// an existing record is never overwritten. The code is only returned
    /// once it has been persisted.
    pub fn issue(&mut self, owner: &str) -> Result<IssuedCode, AccessError> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(AccessError::EmptyOwner);
        }

        let record = AccessCode::new(owner, self.clock.now(), self.validity_secs);
        let generator = &mut self.generator;

        let code = self.store.update(|table| {
            for attempt in 1..=MAX_ISSUE_ATTEMPTS {
                let candidate = generator.generate();
                if table.insert_new(&candidate, record.clone()) {
                    return Some(candidate);
                }
                debug!(attempt, "access code collision, drawing again");
            }
            None
        })?;

        let code = code.ok_or(AccessError::CodeSpaceExhausted {
            attempts: MAX_ISSUE_ATTEMPTS,
        })?;
        info!(owner = %record.name, expires_at = record.expires_at, "access code issued");
        Ok(IssuedCode { code, record })
    }

    /// Redeems `code`, returning the owner it was issued to.
    ///
    /// The record is deleted whether it was valid or expired, so a second
    /// redemption always fails.
    pub fn redeem(&self, code: &str) -> Result<String, AccessError> {
        let code = code.trim().to_ascii_uppercase();
        let now = self.clock.now();

        let outcome = self.store.update(|table| match table.remove(&code) {
            None => Err(AccessError::CodeNotFound(code.clone())),
            Some(record) if record.is_expired_at(now) => Err(AccessError::CodeExpired {
                code: code.clone(),
                expired_at: record.expires_at,
            }),
            Some(record) => Ok(record.name),
        })?;

        match &outcome {
            Ok(owner) => info!(owner = %owner, "access code redeemed"),
            Err(AccessError::CodeExpired { expired_at, .. }) => {
                warn!(expired_at, "expired access code presented")
            }
            Err(_) => warn!("unknown access code presented"),
        }
        outcome
    }

    /// Lists codes that are still redeemable, without consuming them.
    ///
    /// Takes only a shared lock, so it works against a read-only store.
    pub fn pending(&self) -> Result<Vec<(String, AccessCode)>, AccessError> {
        let now = self.clock.now();
        self.store.read(|table| {
            table
                .entries()
                .iter()
                .filter(|(_, record)| !record.is_expired_at(now))
                .map(|(code, record)| (code.clone(), record.clone()))
                .collect()
        })
    }

    /// Deletes every expired record, returning how many were removed.
    pub fn prune(&self) -> Result<usize, AccessError> {
        let now = self.clock.now();
        self.store.update(|table| table.remove_expired(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct ManualClock(Arc<AtomicI64>);

    impl ManualClock {
        fn at(now: i64) -> Self {
            Self(Arc::new(AtomicI64::new(now)))
        }

        fn set(&self, now: i64) {
            self.0.store(now, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    /// Replays fixed codes, then falls back to random ones.
    struct ScriptedGenerator {
        queue: VecDeque<String>,
        fallback: RandomCodeGenerator,
    }

    impl ScriptedGenerator {
        fn new(codes: &[&str]) -> Self {
            Self {
                queue: codes.iter().map(|c| c.to_string()).collect(),
                fallback: RandomCodeGenerator::default(),
            }
        }
    }

    impl CodeGenerator for ScriptedGenerator {
        fn generate(&mut self) -> String {
            self.queue
                .pop_front()
                .unwrap_or_else(|| self.fallback.generate())
        }
    }

    fn is_valid_code(code: &str) -> bool {
        code.len() == CODE_LENGTH && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
    }

    #[test]
    fn test_issued_codes_use_alphabet_and_length() {
        let mut codes = AccessCodes::new(MemoryCodeStore::new());
        for name in ["alice", "bob", "ecom-agent", "Claude Dev"] {
            let issued = codes.issue(name).expect("issue");
            assert!(is_valid_code(&issued.code), "bad code {}", issued.code);
        }
    }

    #[test]
    fn test_redeem_returns_owner_once() {
        let mut codes = AccessCodes::new(MemoryCodeStore::new());
        let issued = codes.issue("alice").expect("issue");

        assert_eq!(codes.redeem(&issued.code).expect("redeem"), "alice");
        let second = codes.redeem(&issued.code).expect_err("single use");
        assert!(matches!(second, AccessError::CodeNotFound(_)));
    }

    #[test]
    fn test_redeem_accepts_lowercase_input() {
        let mut codes = AccessCodes::new(MemoryCodeStore::new())
            .with_generator(ScriptedGenerator::new(&["AB12CD34"]));
        codes.issue("bob").expect("issue");
        assert_eq!(codes.redeem(" ab12cd34 ").expect("redeem"), "bob");
    }

    #[test]
    fn test_expired_code_is_rejected_and_removed() {
        let clock = ManualClock::at(1_000);
        let mut codes = AccessCodes::new(MemoryCodeStore::new())
            .with_clock(clock.clone())
            .with_validity(60);
        let issued = codes.issue("carol").expect("issue");

        clock.set(1_061);
        let err = codes.redeem(&issued.code).expect_err("expired");
        assert!(matches!(err, AccessError::CodeExpired { expired_at: 1_060, .. }));
        assert!(!codes.store().snapshot().contains(&issued.code));

        let again = codes.redeem(&issued.code).expect_err("gone");
        assert!(matches!(again, AccessError::CodeNotFound(_)));
    }

    #[test]
    fn test_negative_validity_expires_immediately() {
        let clock = ManualClock::at(500);
        let mut codes = AccessCodes::new(MemoryCodeStore::new())
            .with_clock(clock)
            .with_validity(-1);
        let issued = codes.issue("dave").expect("issue");
        assert!(codes.redeem(&issued.code).is_err());
    }

    #[test]
    fn test_day_long_window_boundaries() {
        let t0 = 1_700_000_000;
        let clock = ManualClock::at(t0);
        let mut codes = AccessCodes::new(MemoryCodeStore::new())
            .with_clock(clock.clone())
            .with_validity(86_400)
            .with_generator(ScriptedGenerator::new(&["AB12CD34", "AB12CD34"]));

        let issued = codes.issue("bob").expect("issue");
        assert_eq!(issued.code, "AB12CD34");
        assert_eq!(issued.record.expires_at, t0 + 86_400);

        clock.set(t0 + 86_400 - 1);
        assert_eq!(codes.redeem("AB12CD34").expect("still valid"), "bob");

        // Fresh, unredeemed code with identical parameters.
        clock.set(t0);
        codes.issue("bob").expect("reissue");
        clock.set(t0 + 86_400 + 1);
        assert!(codes.redeem("AB12CD34").expect_err("expired").is_rejected_code());
    }

    #[test]
    fn test_unknown_code_on_empty_store() {
        let codes = AccessCodes::new(MemoryCodeStore::new());
        let err = codes.redeem("ZZZZZZZZ").expect_err("not found");
        assert!(matches!(err, AccessError::CodeNotFound(ref c) if c == "ZZZZZZZZ"));
    }

    #[test]
    fn test_collision_draws_a_fresh_code() {
        let mut codes = AccessCodes::new(MemoryCodeStore::new())
            .with_generator(ScriptedGenerator::new(&["SAME0000", "SAME0000", "OTHER000"]));

        let first = codes.issue("alice").expect("first");
        let second = codes.issue("bob").expect("second");
        assert_eq!(first.code, "SAME0000");
        assert_eq!(second.code, "OTHER000");

        assert_eq!(codes.redeem("SAME0000").expect("alice"), "alice");
        assert_eq!(codes.redeem("OTHER000").expect("bob"), "bob");
    }

    #[test]
    fn test_codes_are_distinct_over_many_trials() {
        let mut codes = AccessCodes::new(MemoryCodeStore::new());
        let mut seen = std::collections::HashSet::new();
        for i in 0..500 {
            let issued = codes.issue(&format!("agent-{}", i)).expect("issue");
            assert!(seen.insert(issued.code));
        }
        assert_eq!(codes.store().snapshot().len(), 500);
    }

    #[test]
    fn test_exhausted_generator_is_an_error_not_an_overwrite() {
        let stuck: Vec<&str> = std::iter::repeat("STUCK000").take(MAX_ISSUE_ATTEMPTS + 1).collect();
        let mut codes =
            AccessCodes::new(MemoryCodeStore::new()).with_generator(ScriptedGenerator::new(&stuck));

        codes.issue("first").expect("first");
        let err = codes.issue("second").expect_err("exhausted");
        assert!(matches!(err, AccessError::CodeSpaceExhausted { .. }));
        assert_eq!(codes.redeem("STUCK000").expect("owner kept"), "first");
    }

    #[test]
    fn test_empty_owner_rejected() {
        let mut codes = AccessCodes::new(MemoryCodeStore::new());
        assert!(matches!(codes.issue("   "), Err(AccessError::EmptyOwner)));
    }

    #[test]
    fn test_pending_and_prune() {
        let clock = ManualClock::at(0);
        let mut codes = AccessCodes::new(MemoryCodeStore::new())
            .with_clock(clock.clone())
            .with_validity(10);
        codes.issue("early").expect("issue");
        clock.set(5);
        codes.issue("late").expect("issue");

        clock.set(12);
        let pending = codes.pending().expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.name, "late");
        assert_eq!(codes.store().snapshot().len(), 2);

        assert_eq!(codes.prune().expect("prune"), 1);
        assert_eq!(codes.store().snapshot().len(), 1);
    }

    #[test]
    fn test_file_store_issue_and_redeem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("codes.json");

        let mut issuer = AccessCodes::new(FileCodeStore::new(&path));
        let issued = issuer.issue("remote-agent").expect("issue");

        let redeemer = AccessCodes::new(FileCodeStore::new(&path));
        assert_eq!(redeemer.redeem(&issued.code).expect("redeem"), "remote-agent");
        assert!(redeemer.redeem(&issued.code).is_err());
    }
}
