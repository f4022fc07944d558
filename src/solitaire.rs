use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UnibosError};

pub const TABLEAU_PILES: usize = 7;
pub const FOUNDATIONS: usize = 4;
const KING: u8 = 13;

const SCORE_WASTE_TO_TABLEAU: i32 = 5;
const SCORE_TO_FOUNDATION: i32 = 10;
const SCORE_FLIP: i32 = 5;
const SCORE_FOUNDATION_TO_TABLEAU: i32 = -15;
const SCORE_RECYCLE: i32 = -100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Suit {
    Hearts,
    Diamonds,
    Clubs,
    Spades,
}

impl Suit {
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    pub fn is_red(self) -> bool {
        matches!(self, Suit::Hearts | Suit::Diamonds)
    }

    pub fn symbol(self) -> char {
        match self {
            Suit::Hearts => '♥',
            Suit::Diamonds => '♦',
            Suit::Clubs => '♣',
            Suit::Spades => '♠',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub suit: Suit,
    pub rank: u8,
    pub face_up: bool,
}

impl Card {
    pub fn new(suit: Suit, rank: u8) -> Self {
        Self {
            suit,
            rank,
            face_up: false,
        }
    }

    pub fn is_red(&self) -> bool {
        self.suit.is_red()
    }

    pub fn label(&self) -> String {
        let rank = match self.rank {
            1 => "A".to_string(),
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            n => n.to_string(),
        };
        format!("{rank}{}", self.suit.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pile {
    Stock,
    Waste,
    Foundation(usize),
    Tableau(usize),
}

impl Pile {
    /// Left-to-right cursor order used by the UI.
    pub const CURSOR_SLOTS: usize = 2 + FOUNDATIONS + TABLEAU_PILES;

    pub fn from_cursor(slot: usize) -> Self {
        match slot {
            0 => Pile::Stock,
            1 => Pile::Waste,
            n if n < 2 + FOUNDATIONS => Pile::Foundation(n - 2),
            n => Pile::Tableau((n - 2 - FOUNDATIONS).min(TABLEAU_PILES - 1)),
        }
    }

    pub fn cursor(self) -> usize {
        match self {
            Pile::Stock => 0,
            Pile::Waste => 1,
            Pile::Foundation(i) => 2 + i,
            Pile::Tableau(i) => 2 + FOUNDATIONS + i,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub seed: u64,
    pub(crate) stock: Vec<Card>,
    pub(crate) waste: Vec<Card>,
    pub(crate) foundations: Vec<Vec<Card>>,
    pub(crate) tableau: Vec<Vec<Card>>,
    pub moves: u32,
    pub score: i32,
}

impl Game {
    pub fn new(seed: u64) -> Self {
        let mut deck: Vec<Card> = Suit::ALL
            .iter()
            .flat_map(|suit| (1..=KING).map(move |rank| Card::new(*suit, rank)))
            .collect();
        deck.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut tableau: Vec<Vec<Card>> = vec![Vec::new(); TABLEAU_PILES];
        for row in 0..TABLEAU_PILES {
            for pile in tableau.iter_mut().skip(row) {
                if let Some(card) = deck.pop() {
                    pile.push(card);
                }
            }
        }
        for pile in &mut tableau {
            if let Some(top) = pile.last_mut() {
                top.face_up = true;
            }
        }

        Self {
            seed,
            stock: deck,
            waste: Vec::new(),
            foundations: vec![Vec::new(); FOUNDATIONS],
            tableau,
            moves: 0,
            score: 0,
        }
    }

    pub fn cards(&self, pile: Pile) -> &[Card] {
        match pile {
            Pile::Stock => &self.stock,
            Pile::Waste => &self.waste,
            Pile::Foundation(i) => self.foundations.get(i).map(Vec::as_slice).unwrap_or(&[]),
            Pile::Tableau(i) => self.tableau.get(i).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    pub fn top(&self, pile: Pile) -> Option<&Card> {
        self.cards(pile).last()
    }

    pub fn is_won(&self) -> bool {
        self.foundations.iter().all(|pile| pile.len() == KING as usize)
    }

    pub fn draw(&mut self) -> Result<()> {
        if let Some(mut card) = self.stock.pop() {
            card.face_up = true;
            self.waste.push(card);
        } else if !self.waste.is_empty() {
            self.stock = self
                .waste
                .drain(..)
                .rev()
                .map(|mut card| {
                    card.face_up = false;
                    card
                })
                .collect();
            self.adjust_score(SCORE_RECYCLE);
        } else {
            return Err(UnibosError::IllegalMove(
                "stock and waste are both empty".to_string(),
            ));
        }
        self.moves += 1;
        Ok(())
    }

    pub fn move_cards(&mut self, from: Pile, to: Pile) -> Result<()> {
        match (from, to) {
            (Pile::Waste, Pile::Tableau(t)) => {
                let card = *self.waste.last().ok_or_else(|| illegal("waste is empty"))?;
                self.check_tableau(t, &card)?;
                self.waste.pop();
                self.tableau[t].push(card);
                self.adjust_score(SCORE_WASTE_TO_TABLEAU);
            }
            (Pile::Waste, Pile::Foundation(f)) => {
                let card = *self.waste.last().ok_or_else(|| illegal("waste is empty"))?;
                self.check_foundation(f, &card)?;
                self.waste.pop();
                self.foundations[f].push(card);
                self.adjust_score(SCORE_TO_FOUNDATION);
            }
            (Pile::Tableau(s), Pile::Foundation(f)) => {
                let card = *self
                    .tableau
                    .get(s)
                    .and_then(|pile| pile.last())
                    .filter(|card| card.face_up)
                    .ok_or_else(|| illegal("no face-up card to move"))?;
                self.check_foundation(f, &card)?;
                self.tableau[s].pop();
                self.foundations[f].push(card);
                self.adjust_score(SCORE_TO_FOUNDATION);
                self.flip_exposed(s);
            }
            (Pile::Tableau(s), Pile::Tableau(t)) if s != t => {
                if s >= TABLEAU_PILES {
                    return Err(illegal("no such tableau pile"));
                }
                let start = self
                    .movable_run_start(s, t)
                    .ok_or_else(|| illegal("no run fits that pile"))?;
                let run = self.tableau[s].split_off(start);
                self.tableau[t].extend(run);
                self.flip_exposed(s);
            }
            (Pile::Foundation(f), Pile::Tableau(t)) => {
                let card = *self
                    .foundations
                    .get(f)
                    .and_then(|pile| pile.last())
                    .ok_or_else(|| illegal("foundation is empty"))?;
                self.check_tableau(t, &card)?;
                self.foundations[f].pop();
                self.tableau[t].push(card);
                self.adjust_score(SCORE_FOUNDATION_TO_TABLEAU);
            }
            _ => return Err(illegal("that move is not allowed")),
        }
        self.moves += 1;
        Ok(())
    }

    /// Moves the top card of `from` onto whichever foundation accepts it.
    pub fn auto_to_foundation(&mut self, from: Pile) -> Result<()> {
        let card = *self
            .top(from)
            .filter(|card| card.face_up)
            .ok_or_else(|| illegal("nothing to move"))?;
        let target = (0..FOUNDATIONS)
            .find(|f| self.check_foundation(*f, &card).is_ok())
            .ok_or_else(|| illegal("no foundation accepts that card"))?;
        self.move_cards(from, Pile::Foundation(target))
    }

    fn movable_run_start(&self, source: usize, target: usize) -> Option<usize> {
        let pile = &self.tableau[source];
        let first_face_up = pile.iter().position(|card| card.face_up)?;
        (first_face_up..pile.len()).find(|start| {
            is_descending_alternating(&pile[*start..])
                && self.check_tableau(target, &pile[*start]).is_ok()
        })
    }

    fn check_tableau(&self, index: usize, card: &Card) -> Result<()> {
        let pile = self
            .tableau
            .get(index)
            .ok_or_else(|| illegal("no such tableau pile"))?;
        match pile.last() {
            None if card.rank == KING => Ok(()),
            None => Err(illegal("only a king can start an empty pile")),
            Some(top) if top.face_up && top.is_red() != card.is_red() && top.rank == card.rank + 1 => {
                Ok(())
            }
            Some(_) => Err(illegal("cards must alternate colour and descend")),
        }
    }

    fn check_foundation(&self, index: usize, card: &Card) -> Result<()> {
        let pile = self
            .foundations
            .get(index)
            .ok_or_else(|| illegal("no such foundation"))?;
        match pile.last() {
            None if card.rank == 1 => Ok(()),
            None => Err(illegal("foundations start with an ace")),
            Some(top) if top.suit == card.suit && top.rank + 1 == card.rank => Ok(()),
            Some(_) => Err(illegal("foundations build up by suit")),
        }
    }

    fn flip_exposed(&mut self, index: usize) {
        if let Some(top) = self.tableau[index].last_mut()
            && !top.face_up
        {
            top.face_up = true;
            self.adjust_score(SCORE_FLIP);
        }
    }

    fn adjust_score(&mut self, delta: i32) {
        self.score = (self.score + delta).max(0);
    }
}

fn is_descending_alternating(run: &[Card]) -> bool {
    run.iter().all(|card| card.face_up)
        && run
            .windows(2)
            .all(|pair| pair[0].is_red() != pair[1].is_red() && pair[0].rank == pair[1].rank + 1)
}

fn illegal(reason: &str) -> UnibosError {
    UnibosError::IllegalMove(reason.to_string())
}

#[cfg(test)]
#[path = "../tests/unit/solitaire_tests.rs"]
mod tests;
