//! Memorable session identifiers
//!
//! Three parts: adjective, noun, three-digit number, e.g.
//! `golden-eagle-427`. Uniqueness among live sessions is the caller's
//! check; generation retries until the predicate accepts.

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brave", "bright", "calm", "clever", "coral", "crimson", "eager", "fleet",
    "gentle", "golden", "grand", "green", "happy", "indigo", "ivory", "jade", "keen", "kind",
    "lively", "lunar", "mellow", "misty", "noble", "olive", "pearl", "proud", "quick", "quiet",
    "rapid", "royal", "ruby", "sage", "scarlet", "silent", "silver", "solar", "steady", "swift",
    "teal", "tidal", "velvet", "vivid", "warm", "wild", "wise", "zesty",
];

const NOUNS: &[&str] = &[
    "badger", "bison", "canyon", "cedar", "comet", "condor", "coyote", "crane", "dolphin",
    "eagle", "ember", "falcon", "fjord", "gazelle", "glacier", "harbor", "hawk", "heron",
    "ibis", "jaguar", "lagoon", "lark", "lynx", "maple", "meadow", "mesa", "orca", "osprey",
    "otter", "owl", "panther", "pelican", "pine", "prairie", "puffin", "raven", "reef",
    "river", "salmon", "sparrow", "summit", "swan", "tiger", "trail", "tundra", "walrus",
    "willow", "wolf",
];

/// Generate a session id unique under the given predicate.
pub fn generate_session_id(is_taken: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let adjective = ADJECTIVES.choose(&mut rng).expect("non-empty list");
        let noun = NOUNS.choose(&mut rng).expect("non-empty list");
        let number: u16 = rng.gen_range(100..1000);
        let candidate = format!("{adjective}-{noun}-{number}");
        if !is_taken(&candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_is_three_parts() {
        let id = generate_session_id(|_| false);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(NOUNS.contains(&parts[1]));
        let number: u16 = parts[2].parse().unwrap();
        assert!((100..1000).contains(&number));
    }

    #[test]
    fn respects_uniqueness_predicate() {
        use std::cell::Cell;
        let rejections = Cell::new(3u32);
        let id = generate_session_id(|_| {
            if rejections.get() > 0 {
                rejections.set(rejections.get() - 1);
                true
            } else {
                false
            }
        });
        assert!(!id.is_empty());
        assert_eq!(rejections.get(), 0);
    }
}
