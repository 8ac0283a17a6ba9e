//! Question categories, question generation and answer grading
//!
//! The session orchestrator only sees the [`QuestionGenerator`] and [`Grader`]
//! traits. The implementations here are the stock collaborators used by the
//! server binary and by the client's automatic answering mode.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

const SUBNETS: [&str; 3] = ["192.168.1.0/24", "10.0.0.0/16", "172.16.0.0/20"];

const ROMAN_NUMERALS: [(u32, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Mathematics")]
    Mathematics,
    #[serde(rename = "Roman Numerals")]
    RomanNumerals,
    #[serde(rename = "Usable IP Addresses of a Subnet")]
    UsableAddresses,
    #[serde(rename = "Network and Broadcast Address of a Subnet")]
    NetworkBroadcast,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Mathematics,
        Category::RomanNumerals,
        Category::UsableAddresses,
        Category::NetworkBroadcast,
    ];

    /// Name used on the wire and in configuration files
    pub fn name(self) -> &'static str {
        match self {
            Category::Mathematics => "Mathematics",
            Category::RomanNumerals => "Roman Numerals",
            Category::UsableAddresses => "Usable IP Addresses of a Subnet",
            Category::NetworkBroadcast => "Network and Broadcast Address of a Subnet",
        }
    }

    /// Computes the expected answer for a short question of this category.
    ///
    /// Returns `None` when the question cannot be parsed.
    pub fn solve(self, short_question: &str) -> Option<String> {
        match self {
            Category::Mathematics => evaluate_arithmetic(short_question).map(|v| v.to_string()),
            Category::RomanNumerals => from_roman(short_question).map(|v| v.to_string()),
            Category::UsableAddresses => {
                let (_, prefix) = parse_subnet(short_question)?;
                let total = 1u64 << (32 - prefix);
                let usable = if prefix < 31 { total - 2 } else { total };
                Some(usable.to_string())
            }
            Category::NetworkBroadcast => {
                let (address, prefix) = parse_subnet(short_question)?;
                let mask = if prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - prefix)
                };
                let network = Ipv4Addr::from(u32::from(address) & mask);
                let broadcast = Ipv4Addr::from(u32::from(address) | !mask);
                Some(format!("{} and {}", network, broadcast))
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.name() == s)
            .ok_or_else(|| format!("unknown question category: {}", s))
    }
}

/// Produces the short-form question for a round
pub trait QuestionGenerator {
    fn generate(&mut self, category: Category) -> String;
}

/// Outcome of grading one candidate answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    /// Empty when the question itself could not be solved
    pub correct_answer: String,
    pub is_correct: bool,
}

pub trait Grader {
    fn grade(&self, category: Category, short_question: &str, candidate: &str) -> Grade;
}

/// Randomized generator backed by a seedable RNG
pub struct RandomQuestions {
    rng: StdRng,
}

impl RandomQuestions {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomQuestions {
    fn default() -> Self {
        Self::new()
    }
}

impl QuestionGenerator for RandomQuestions {
    fn generate(&mut self, category: Category) -> String {
        match category {
            Category::Mathematics => {
                let a = self.rng.gen_range(1..=20);
                let b = self.rng.gen_range(1..=20);
                format!("{} + {}", a, b)
            }
            Category::RomanNumerals => to_roman(self.rng.gen_range(1..=3999)),
            Category::UsableAddresses | Category::NetworkBroadcast => SUBNETS
                .choose(&mut self.rng)
                .copied()
                .unwrap_or(SUBNETS[0])
                .to_string(),
        }
    }
}

/// Grades by exact comparison against [`Category::solve`]
///
/// Surrounding whitespace on the candidate is trimmed first, so a typed
/// `" 14\n"` still matches `14`; everything else must match byte for byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardGrader;

impl Grader for StandardGrader {
    fn grade(&self, category: Category, short_question: &str, candidate: &str) -> Grade {
        match category.solve(short_question) {
            Some(correct_answer) => Grade {
                is_correct: candidate.trim() == correct_answer,
                correct_answer,
            },
            None => Grade {
                correct_answer: String::new(),
                is_correct: false,
            },
        }
    }
}

/// Evaluates `a + b - c ...` strictly left to right
fn evaluate_arithmetic(expression: &str) -> Option<i64> {
    let mut tokens = expression.split_whitespace();
    let mut total: i64 = tokens.next()?.parse().ok()?;

    while let Some(operator) = tokens.next() {
        let operand: i64 = tokens.next()?.parse().ok()?;
        total = match operator {
            "+" => total.checked_add(operand)?,
            "-" => total.checked_sub(operand)?,
            _ => return None,
        };
    }

    Some(total)
}

pub fn to_roman(mut number: u32) -> String {
    let mut roman = String::new();
    for (value, numeral) in ROMAN_NUMERALS {
        while number >= value {
            roman.push_str(numeral);
            number -= value;
        }
    }
    roman
}

/// Reads a numeral right to left, subtracting any symbol smaller than the
/// largest one seen so far.
pub fn from_roman(numeral: &str) -> Option<u32> {
    let numeral = numeral.trim();
    if numeral.is_empty() {
        return None;
    }

    let mut total: u32 = 0;
    let mut largest = 0;
    for symbol in numeral.chars().rev() {
        let value = match symbol {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            'L' => 50,
            'C' => 100,
            'D' => 500,
            'M' => 1000,
            _ => return None,
        };
        if value < largest {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            largest = value;
        }
    }

    Some(total)
}

fn parse_subnet(subnet: &str) -> Option<(Ipv4Addr, u32)> {
    let (address, prefix) = subnet.trim().split_once('/')?;
    let address: Ipv4Addr = address.parse().ok()?;
    let prefix: u32 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((address, prefix))
}
