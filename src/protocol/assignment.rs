// Game Assignment - who plays which game IDs
//
// The elected leader partitions the shared game-ID space into one
// contiguous range per host, local host first so its own boards always
// number from zero, with any remainder handed to the AI pseudo-host.
//
// Election and dispatch are pure functions over a directory snapshot.
// There is no voting: agreement rests entirely on every host computing
// over the same snapshot, which the discovery cadence makes eventually
// true for a slowly-changing lobby of cooperating hosts.

use crate::directory::HostDirectory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Reserved host key for computer-controlled games
pub const AI_KEY: &str = "AI";

/// Owner of a game-ID range: a network host or the AI pseudo-host
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostKey {
    Host(Ipv4Addr),
    Ai,
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKey::Host(addr) => write!(f, "{addr}"),
            HostKey::Ai => write!(f, "{AI_KEY}"),
        }
    }
}

impl FromStr for HostKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == AI_KEY {
            return Ok(HostKey::Ai);
        }
        s.parse::<Ipv4Addr>().map(HostKey::Host).map_err(|_| ())
    }
}

/// Inclusive range of game IDs; empty when `end < start`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRange {
    pub start: i64,
    pub end: i64,
}

impl GameRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Zero-length range anchored at `start`
    pub fn empty_at(start: i64) -> Self {
        Self {
            start,
            end: start - 1,
        }
    }

    pub fn len(&self) -> u32 {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as u32
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, id: i64) -> bool {
        id >= self.start && id <= self.end
    }
}

/// Ordered mapping of host keys to game-ID ranges.
///
/// Order is dispatch order and is preserved through the wire codec.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameAssignment {
    entries: Vec<(HostKey, GameRange)>,
}

impl GameAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: HostKey, range: GameRange) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = range;
        } else {
            self.entries.push((key, range));
        }
    }

    pub fn get(&self, key: &HostKey) -> Option<GameRange> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, range)| *range)
    }

    pub fn contains(&self, key: &HostKey) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(HostKey, GameRange)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of game IDs actually assigned
    pub fn total_games(&self) -> u32 {
        self.entries.iter().map(|(_, range)| range.len()).sum()
    }

    /// Encode as `host%start%end` tuples joined by `&`, dispatch order,
    /// no trailing separator
    pub fn encode(&self) -> String {
        let tuples: Vec<String> = self
            .entries
            .iter()
            .map(|(key, range)| format!("{key}%{}%{}", range.start, range.end))
            .collect();
        tuples.join("&")
    }

    /// Decode the wire string form.
    ///
    /// A single malformed token invalidates the whole decode and yields an
    /// empty assignment; a partial assignment is never applied.
    pub fn decode(encoded: &str) -> Self {
        let mut assignment = Self::new();
        if encoded.is_empty() {
            return assignment;
        }
        for token in encoded.split('&') {
            let items: Vec<&str> = token.split('%').collect();
            if items.len() != 3 {
                return Self::new();
            }
            let key = match items[0].parse::<HostKey>() {
                Ok(key) => key,
                Err(()) => return Self::new(),
            };
            let (start, end) = match (items[1].parse::<i64>(), items[2].parse::<i64>()) {
                (Ok(start), Ok(end)) => (start, end),
                _ => return Self::new(),
            };
            assignment.insert(key, GameRange::new(start, end));
        }
        assignment
    }
}

/// Elect the session coordinator from a directory snapshot.
///
/// Among AI-capable hosts the greatest advertised capacity wins, ties
/// going to the lexicographically greater hostname. With no AI-capable
/// host the first record in dispatch order wins, which is the local host
/// by construction.
pub fn elect(directory: &HostDirectory) -> Ipv4Addr {
    let order = directory.dispatch_order();
    let mut best = order[0];
    for candidate in order.iter().skip(1) {
        if !candidate.ai_capable() {
            continue;
        }
        let better = if !best.ai_capable() {
            true
        } else {
            (candidate.max_capacity(), candidate.hostname())
                > (best.max_capacity(), best.hostname())
        };
        if better {
            best = candidate;
        }
    }
    best.address()
}

/// Partition the game-ID space across the directory snapshot.
///
/// The local host always comes first so its boards display from zero.
/// Peers follow in table order, each taking its advertised player count;
/// a peer that would push past `max_games` ends dispatch for itself and
/// everyone after it. Whatever remains goes to the AI pseudo-host when AI
/// play is enabled locally, otherwise the AI range is empty, anchored at
/// the first unused ID.
pub fn dispatch(
    directory: &HostDirectory,
    max_games: u32,
    run_ai: bool,
    connected: bool,
) -> GameAssignment {
    let max_games = i64::from(max_games);
    let mut assignment = GameAssignment::new();
    let mut next_id: i64 = 0;

    let local = directory.self_record();
    let local_games = i64::from(local.player_count()).min(max_games);
    assignment.insert(
        HostKey::Host(local.address()),
        GameRange::new(next_id, next_id + local_games - 1),
    );
    next_id += local_games;

    if connected {
        for peer in directory.peers() {
            let wanted = i64::from(peer.player_count());
            if next_id + wanted > max_games {
                break;
            }
            assignment.insert(
                HostKey::Host(peer.address()),
                GameRange::new(next_id, next_id + wanted - 1),
            );
            next_id += wanted;
        }
    }

    if run_ai {
        assignment.insert(HostKey::Ai, GameRange::new(next_id, max_games - 1));
    } else {
        assignment.insert(HostKey::Ai, GameRange::empty_at(next_id));
    }

    assignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{HostFields, HostStatus};
    use std::time::Instant;

    fn fields(hostname: &str, players: u32, max: u32, ai: bool) -> HostFields {
        HostFields {
            status: HostStatus::Lobby,
            hostname: hostname.to_string(),
            player_count: players,
            max_capacity: max,
            ai_capable: ai,
        }
    }

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn test_elect_prefers_capacity() {
        let now = Instant::now();
        let mut dir = HostDirectory::new(addr(1), "a", now);
        dir.set_self_fields(fields("a", 1, 4, true), now);
        dir.upsert(addr(2), fields("b", 1, 2, false), now);

        assert_eq!(elect(&dir), addr(1));
    }

    #[test]
    fn test_elect_tie_breaks_on_hostname() {
        let now = Instant::now();
        let mut dir = HostDirectory::new(addr(1), "alpha", now);
        dir.set_self_fields(fields("alpha", 1, 4, true), now);
        dir.upsert(addr(2), fields("zulu", 1, 4, true), now);

        assert_eq!(elect(&dir), addr(2));
    }

    #[test]
    fn test_elect_falls_back_to_first_host() {
        let now = Instant::now();
        let mut dir = HostDirectory::new(addr(7), "local", now);
        dir.set_self_fields(fields("local", 1, 4, false), now);
        dir.upsert(addr(2), fields("peer", 1, 8, false), now);

        assert_eq!(elect(&dir), addr(7));
    }

    #[test]
    fn test_elect_is_idempotent() {
        let now = Instant::now();
        let mut dir = HostDirectory::new(addr(1), "a", now);
        dir.set_self_fields(fields("a", 1, 4, true), now);
        dir.upsert(addr(2), fields("b", 1, 4, true), now);

        let first = elect(&dir);
        for _ in 0..5 {
            assert_eq!(elect(&dir), first);
        }
    }

    #[test]
    fn test_dispatch_two_hosts_with_ai_remainder() {
        // local players=2, peer players=3, max_games=6, AI enabled
        // => self (0,1), peer (2,4), AI (5,5)
        let now = Instant::now();
        let mut dir = HostDirectory::new(addr(1), "local", now);
        dir.set_self_fields(fields("local", 2, 4, true), now);
        dir.upsert(addr(2), fields("peer", 3, 4, false), now);

        let assignment = dispatch(&dir, 6, true, true);
        assert_eq!(
            assignment.get(&HostKey::Host(addr(1))),
            Some(GameRange::new(0, 1))
        );
        assert_eq!(
            assignment.get(&HostKey::Host(addr(2))),
            Some(GameRange::new(2, 4))
        );
        assert_eq!(assignment.get(&HostKey::Ai), Some(GameRange::new(5, 5)));
        assert_eq!(assignment.encode(), "10.0.0.1%0%1&10.0.0.2%2%4&AI%5%5");
    }

    #[test]
    fn test_dispatch_ranges_disjoint_and_prefix() {
        let now = Instant::now();
        let mut dir = HostDirectory::new(addr(1), "local", now);
        dir.set_self_fields(fields("local", 2, 4, false), now);
        dir.upsert(addr(2), fields("b", 3, 4, false), now);
        dir.upsert(addr(3), fields("c", 1, 4, false), now);

        let assignment = dispatch(&dir, 10, false, true);
        let mut seen = Vec::new();
        for (_, range) in assignment.iter() {
            for id in range.start..=range.end {
                assert!(!seen.contains(&id));
                seen.push(id);
            }
        }
        seen.sort_unstable();
        let expected: Vec<i64> = (0..seen.len() as i64).collect();
        assert_eq!(seen, expected);

        // Local range anchors the partition.
        let local = assignment.get(&HostKey::Host(addr(1))).unwrap();
        assert_eq!(local.start, 0);
    }

    #[test]
    fn test_dispatch_stops_at_capacity() {
        let now = Instant::now();
        let mut dir = HostDirectory::new(addr(1), "local", now);
        dir.set_self_fields(fields("local", 2, 4, false), now);
        dir.upsert(addr(2), fields("b", 3, 4, false), now);
        dir.upsert(addr(3), fields("c", 1, 4, false), now);

        // Only 4 IDs: local takes 0-1, b would overflow, so b and c are out.
        let assignment = dispatch(&dir, 4, false, true);
        assert!(!assignment.contains(&HostKey::Host(addr(2))));
        assert!(!assignment.contains(&HostKey::Host(addr(3))));
        let ai = assignment.get(&HostKey::Ai).unwrap();
        assert!(ai.is_empty());
        assert_eq!(ai.start, 2);
    }

    #[test]
    fn test_dispatch_ai_disabled_gives_anchored_empty_range() {
        let now = Instant::now();
        let mut dir = HostDirectory::new(addr(1), "local", now);
        dir.set_self_fields(fields("local", 2, 4, false), now);

        let assignment = dispatch(&dir, 8, false, false);
        let ai = assignment.get(&HostKey::Ai).unwrap();
        assert_eq!(ai.len(), 0);
        assert_eq!(ai.start, 2);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut assignment = GameAssignment::new();
        assignment.insert(HostKey::Host(addr(1)), GameRange::new(0, 1));
        assignment.insert(HostKey::Host(addr(2)), GameRange::new(2, 4));
        assignment.insert(HostKey::Ai, GameRange::new(5, 5));

        let decoded = GameAssignment::decode(&assignment.encode());
        assert_eq!(decoded, assignment);
    }

    #[test]
    fn test_decode_rejects_malformed_wholesale() {
        // One bad token invalidates everything, not just itself.
        assert!(GameAssignment::decode("10.0.0.1%0%1&junk").is_empty());
        assert!(GameAssignment::decode("10.0.0.1%0").is_empty());
        assert!(GameAssignment::decode("10.0.0.1%zero%1").is_empty());
        assert!(GameAssignment::decode("not-an-addr%0%1").is_empty());
        assert!(GameAssignment::decode("").is_empty());
    }
}
