//! Three-reel slot evaluator
//!
//! One index draw per reel, then a single payline evaluated by priority:
//! exact three of a kind, wild-substituted three of a kind, two leading
//! base symbols, one leading base symbol. The first rule with a paytable
//! entry fires and the rest are skipped.

use super::{GameType, Outcome, OutcomeEvaluator};
use crate::rng::{DrawSource, RngError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "BAR")]
    Bar,
    #[serde(rename = "CHERRY")]
    Cherry,
    #[serde(rename = "BELL")]
    Bell,
    #[serde(rename = "LEMON")]
    Lemon,
    #[serde(rename = "ORANGE")]
    Orange,
    #[serde(rename = "PLUM")]
    Plum,
    #[serde(rename = "GRAPES")]
    Grapes,
    #[serde(rename = "WILD")]
    Wild,
}

impl Symbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::Seven => "7",
            Symbol::Bar => "BAR",
            Symbol::Cherry => "CHERRY",
            Symbol::Bell => "BELL",
            Symbol::Lemon => "LEMON",
            Symbol::Orange => "ORANGE",
            Symbol::Plum => "PLUM",
            Symbol::Grapes => "GRAPES",
            Symbol::Wild => "WILD",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paytable key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayLine {
    Three(Symbol),
    LeadingTwo(Symbol),
    LeadingOne(Symbol),
}

impl fmt::Display for PayLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayLine::Three(s) => write!(f, "{s}-{s}-{s}"),
            PayLine::LeadingTwo(s) => write!(f, "{s}-{s}-*"),
            PayLine::LeadingOne(s) => write!(f, "{s}-*-*"),
        }
    }
}

/// Which evaluation rule produced a win
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayRule {
    ThreeOfAKind,
    WildSubstitution,
    LeadingTwo,
    LeadingOne,
}

/// Values are per unit stake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Paytable {
    entries: HashMap<PayLine, i64>,
}

impl Paytable {
    pub fn classic() -> Self {
        Self::default()
            .with(PayLine::Three(Symbol::Seven), 5_000)
            .with(PayLine::Three(Symbol::Wild), 2_500)
            .with(PayLine::Three(Symbol::Bar), 1_000)
            .with(PayLine::Three(Symbol::Bell), 500)
            .with(PayLine::Three(Symbol::Grapes), 300)
            .with(PayLine::Three(Symbol::Plum), 200)
            .with(PayLine::Three(Symbol::Orange), 150)
            .with(PayLine::Three(Symbol::Lemon), 100)
            .with(PayLine::Three(Symbol::Cherry), 80)
            .with(PayLine::LeadingTwo(Symbol::Cherry), 20)
            .with(PayLine::LeadingOne(Symbol::Cherry), 10)
    }

    pub fn with(mut self, line: PayLine, value: i64) -> Self {
        self.entries.insert(line, value);
        self
    }

    pub fn get(&self, line: &PayLine) -> Option<i64> {
        self.entries.get(line).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Symbol strips, one per reel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReelSet {
    reels: Vec<Vec<Symbol>>,
}

impl ReelSet {
    pub fn new(reels: Vec<Vec<Symbol>>) -> Self {
        Self { reels }
    }

    /// 21, 22 and 23 stop strips.
    pub fn classic() -> Self {
        use Symbol::*;
        let base = vec![
            Cherry, Lemon, Orange, Plum, Grapes, Bell, Bar, Seven, Wild, Cherry, Lemon, Orange,
            Plum, Grapes, Bell, Bar, Cherry, Lemon, Orange, Plum, Grapes,
        ];
        let mut second = base.clone();
        second.push(Bell);
        let mut third = base.clone();
        third.extend([Bell, Bar]);
        Self::new(vec![base, second, third])
    }

    pub fn reels(&self) -> &[Vec<Symbol>] {
        &self.reels
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinLine {
    pub line: u32,
    pub symbols: Vec<Symbol>,
    pub rule: PayRule,
    pub count: u32,
    /// Paytable value per unit stake
    pub payout: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOutcome {
    pub reels: Vec<Symbol>,
    pub win_lines: Vec<WinLine>,
    pub total_multiplier: i64,
    pub is_win: bool,
}

impl Outcome for SlotOutcome {
    fn is_win(&self) -> bool {
        self.is_win
    }

    fn total_multiplier(&self) -> i64 {
        self.total_multiplier
    }

    fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone)]
pub struct ReelSlotEvaluator {
    reels: ReelSet,
    paytable: Paytable,
    wild: Symbol,
    base: Symbol,
}

impl ReelSlotEvaluator {
    pub fn new(reels: ReelSet, paytable: Paytable, wild: Symbol, base: Symbol) -> Self {
        Self {
            reels,
            paytable,
            wild,
            base,
        }
    }

    pub fn classic() -> Self {
        Self::new(ReelSet::classic(), Paytable::classic(), Symbol::Wild, Symbol::Cherry)
    }

    pub fn spin(&self, draws: &dyn DrawSource) -> Result<SlotOutcome, RngError> {
        let mut stops = Vec::with_capacity(self.reels.reels().len());
        for strip in self.reels.reels() {
            let index = draws.draw_index(strip.len())?;
            stops.push(strip[index]);
        }
        Ok(self.outcome_for(stops))
    }

    /// Deterministic evaluation of already drawn symbols.
    pub fn outcome_for(&self, reels: Vec<Symbol>) -> SlotOutcome {
        let win_lines: Vec<WinLine> = self.evaluate_line(&reels).into_iter().collect();
        let total_multiplier = win_lines.iter().map(|w| w.payout).sum();
        SlotOutcome {
            is_win: !win_lines.is_empty(),
            reels,
            win_lines,
            total_multiplier,
        }
    }

    fn evaluate_line(&self, symbols: &[Symbol]) -> Option<WinLine> {
        let [s1, s2, s3] = match symbols {
            [a, b, c] => [*a, *b, *c],
            _ => return None,
        };

        let win = |rule, line: PayLine, count| {
            self.paytable.get(&line).map(|payout| WinLine {
                line: 1,
                symbols: symbols.to_vec(),
                rule,
                count,
                payout,
            })
        };

        if s1 == s2 && s2 == s3 {
            if let Some(w) = win(PayRule::ThreeOfAKind, PayLine::Three(s1), 3) {
                return Some(w);
            }
        }

        let wilds = symbols.iter().filter(|s| **s == self.wild).count();
        if (1..=2).contains(&wilds) {
            let mut rest = symbols.iter().filter(|s| **s != self.wild);
            if let Some(&sub) = rest.next() {
                if rest.all(|s| *s == sub) {
                    if let Some(w) = win(PayRule::WildSubstitution, PayLine::Three(sub), 3) {
                        return Some(w);
                    }
                }
            }
        }

        if s1 == self.base && s2 == self.base {
            if let Some(w) = win(PayRule::LeadingTwo, PayLine::LeadingTwo(self.base), 2) {
                return Some(w);
            }
        }

        if s1 == self.base {
            return win(PayRule::LeadingOne, PayLine::LeadingOne(self.base), 1);
        }

        None
    }

    /// Exact return per unit stake over every stop combination.
    pub fn exact_rtp(&self, unit_stake: i64) -> f64 {
        let mut combos: u64 = 0;
        let mut returned: i128 = 0;
        let mut stack = vec![Vec::with_capacity(self.reels.reels().len())];
        while let Some(prefix) = stack.pop() {
            if prefix.len() == self.reels.reels().len() {
                combos += 1;
                returned += self.outcome_for(prefix).total_multiplier as i128;
                continue;
            }
            for symbol in &self.reels.reels()[prefix.len()] {
                let mut next = prefix.clone();
                next.push(*symbol);
                stack.push(next);
            }
        }
        if combos == 0 || unit_stake <= 0 {
            return 0.0;
        }
        returned as f64 / (combos as f64 * unit_stake as f64)
    }
}

impl OutcomeEvaluator for ReelSlotEvaluator {
    fn game_type(&self) -> GameType {
        GameType::Slots
    }

    fn evaluate(&self, draws: &dyn DrawSource) -> Result<Box<dyn Outcome>, RngError> {
        Ok(Box::new(self.spin(draws)?))
    }
}
