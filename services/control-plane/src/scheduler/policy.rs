//! Candidate selection policies.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use rand::seq::IndexedRandom;

/// An agent that passed every capacity filter for one gameserver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub hostname: String,
    /// Memory left after this placement, in KiB. Always positive.
    pub free_memory_kib: i64,
    /// Addresses left for this game kind after this placement. Always positive.
    pub free_addresses: i64,
}

/// Picks one agent among eligible candidates.
pub trait SelectionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `None` only for an empty slice.
    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate>;
}

/// Uniformly random choice.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelection;

impl SelectionPolicy for RandomSelection {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates.choose(&mut rand::rng())
    }
}

/// Most free memory wins; ties go to the lexically smallest hostname.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoaded;

impl SelectionPolicy for LeastLoaded {
    fn name(&self) -> &'static str {
        "least-loaded"
    }

    fn select<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates
            .iter()
            .min_by_key(|c| (Reverse(c.free_memory_kib), c.hostname.as_str()))
    }
}

/// Policy selector parsed from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    #[default]
    Random,
    LeastLoaded,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn SelectionPolicy> {
        match self {
            PolicyKind::Random => Box::new(RandomSelection),
            PolicyKind::LeastLoaded => Box::new(LeastLoaded),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(PolicyKind::Random),
            "least-loaded" | "least_loaded" => Ok(PolicyKind::LeastLoaded),
            other => Err(format!("unknown scheduler policy: {other}")),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.build().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(hostname: &str, free_memory_kib: i64) -> Candidate {
        Candidate {
            hostname: hostname.to_string(),
            free_memory_kib,
            free_addresses: 1,
        }
    }

    #[test]
    fn test_random_picks_a_member() {
        let candidates = vec![candidate("a", 1), candidate("b", 2)];
        for _ in 0..32 {
            let chosen = RandomSelection.select(&candidates).unwrap();
            assert!(candidates.contains(chosen));
        }
        assert!(RandomSelection.select(&[]).is_none());
    }

    #[test]
    fn test_least_loaded_prefers_free_memory_then_hostname() {
        let candidates = vec![candidate("c", 10), candidate("b", 50), candidate("a", 50)];
        assert_eq!(LeastLoaded.select(&candidates).unwrap().hostname, "a");
    }

    #[test]
    fn test_policy_kind_parse() {
        assert_eq!("random".parse::<PolicyKind>(), Ok(PolicyKind::Random));
        assert_eq!(
            "Least-Loaded".parse::<PolicyKind>(),
            Ok(PolicyKind::LeastLoaded)
        );
        assert!("best-fit".parse::<PolicyKind>().is_err());
        assert_eq!(PolicyKind::LeastLoaded.to_string(), "least-loaded");
    }
}
