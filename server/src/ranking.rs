//! Competition ranking of participant scores
//!
//! Equal scores share a rank and the next distinct score skips ahead by the
//! size of the tie group, so scores {3, 3, 1} rank as 1, 1, 3. The same
//! ranking backs the interim leaderboard and the final standings.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub rank: usize,
    pub username: String,
    pub score: u32,
}

impl Standing {
    /// `"{rank}. {username}: {score} {noun}"`
    pub fn line(&self, noun: &str) -> String {
        format!("{}. {}: {} {}", self.rank, self.username, self.score, noun)
    }
}

/// Ranks `(username, score)` pairs.
///
/// Output is ordered by score descending, then username ascending, which is
/// a total order: the result does not depend on input order.
pub fn rank<I>(scores: I) -> Vec<Standing>
where
    I: IntoIterator<Item = (String, u32)>,
{
    let mut sorted: Vec<(String, u32)> = scores.into_iter().collect();
    sorted.sort_by(|(name_a, score_a), (name_b, score_b)| match score_b.cmp(score_a) {
        Ordering::Equal => name_a.cmp(name_b),
        other => other,
    });

    let mut standings = Vec::with_capacity(sorted.len());
    let mut rank = 1;
    let mut tie_group = 0;
    let mut previous: Option<u32> = None;

    for (username, score) in sorted {
        if previous.is_some_and(|p| p != score) {
            rank += tie_group;
            tie_group = 0;
        }
        tie_group += 1;
        previous = Some(score);

        standings.push(Standing {
            rank,
            username,
            score,
        });
    }

    standings
}

/// Usernames sharing the top rank; empty when there are no standings
pub fn winners(standings: &[Standing]) -> Vec<&str> {
    standings
        .iter()
        .take_while(|standing| standing.rank == 1)
        .map(|standing| standing.username.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;

    fn scores(pairs: &[(&str, u32)]) -> Vec<(String, u32)> {
        pairs
            .iter()
            .map(|(name, score)| (name.to_string(), *score))
            .collect()
    }

    fn ranks(standings: &[Standing]) -> Vec<(usize, &str)> {
        standings
            .iter()
            .map(|s| (s.rank, s.username.as_str()))
            .collect()
    }

    #[test]
    fn test_tie_at_top_skips_next_rank() {
        let standings = rank(scores(&[("C", 1), ("B", 3), ("A", 3)]));
        assert_eq!(ranks(&standings), vec![(1, "A"), (1, "B"), (3, "C")]);
    }

    #[test]
    fn test_distinct_scores_rank_sequentially() {
        let standings = rank(scores(&[("x", 0), ("y", 5), ("z", 2)]));
        assert_eq!(ranks(&standings), vec![(1, "y"), (2, "z"), (3, "x")]);
    }

    #[test]
    fn test_tie_in_the_middle() {
        let standings = rank(scores(&[
            ("a", 4),
            ("b", 2),
            ("c", 2),
            ("d", 2),
            ("e", 1),
        ]));
        assert_eq!(
            ranks(&standings),
            vec![(1, "a"), (2, "b"), (2, "c"), (2, "d"), (5, "e")]
        );
    }

    #[test]
    fn test_everyone_tied() {
        let standings = rank(scores(&[("b", 0), ("a", 0)]));
        assert_eq!(ranks(&standings), vec![(1, "a"), (1, "b")]);
        assert_eq!(winners(&standings), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_input() {
        let standings = rank(Vec::<(String, u32)>::new());
        assert!(standings.is_empty());
        assert!(winners(&standings).is_empty());
    }

    #[test]
    fn test_ranking_ignores_input_order() {
        let base = scores(&[
            ("dave", 2),
            ("alice", 3),
            ("carol", 2),
            ("bob", 3),
            ("erin", 0),
            ("frank", 1),
        ]);
        let expected = rank(base.clone());

        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let mut shuffled = base.clone();
            shuffled.shuffle(&mut rng);
            assert_eq!(rank(shuffled), expected);
        }
    }

    #[test]
    fn test_next_rank_is_previous_plus_group_size() {
        let standings = rank(scores(&[
            ("a", 9),
            ("b", 9),
            ("c", 9),
            ("d", 7),
            ("e", 7),
            ("f", 3),
        ]));
        for pair in standings.windows(2) {
            if pair[0].score == pair[1].score {
                assert_eq!(pair[0].rank, pair[1].rank);
            } else {
                let group = standings
                    .iter()
                    .filter(|s| s.score == pair[0].score)
                    .count();
                assert_eq!(pair[1].rank, pair[0].rank + group);
            }
        }
    }

    #[test]
    fn test_standing_line() {
        let standing = Standing {
            rank: 2,
            username: "bob".to_string(),
            score: 1,
        };
        assert_eq!(standing.line("point"), "2. bob: 1 point");
    }

    #[test]
    fn test_sole_winner() {
        let standings = rank(scores(&[("A", 1), ("B", 0)]));
        assert_eq!(winners(&standings), vec!["A"]);
    }
}
