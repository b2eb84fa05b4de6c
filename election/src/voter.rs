//! Per-voter ballot state

use d21_core::{D21Error, D21Result, SubjectId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    /// Score change applied to the targeted subject
    pub fn delta(&self) -> i64 {
        match self {
            Polarity::Positive => 1,
            Polarity::Negative => -1,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Positive => write!(f, "positive"),
            Polarity::Negative => write!(f, "negative"),
        }
    }
}

/// Which of the voter's votes a successful cast consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallotSlot {
    FirstPositive,
    SecondPositive,
    Negative,
}

/// Position of a voter in the ballot state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BallotStage {
    NoVotes,
    FirstPositiveCast,
    SecondPositiveCast,
    NegativeCast,
}

impl BallotStage {
    /// No further votes are possible
    pub fn is_exhausted(&self) -> bool {
        matches!(self, BallotStage::NegativeCast)
    }
}

/// Vote record of a registered voter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterRecord {
    pub used_first_positive: bool,
    pub used_second_positive: bool,
    pub used_negative: bool,
    /// Subjects targeted so far, in voting order
    pub voted_subjects: Vec<SubjectId>,
}

impl VoterRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this voter already voted for `subject`, in either direction
    pub fn has_targeted(&self, subject: SubjectId) -> bool {
        self.voted_subjects.contains(&subject)
    }

    /// Slot the next vote of the given polarity would consume.
    ///
    /// Up to two positive votes; one negative vote once the first positive
    /// vote is in. A negative vote closes the ballot.
    pub fn next_slot(&self, polarity: Polarity) -> D21Result<BallotSlot> {
        match polarity {
            Polarity::Positive => {
                if !self.used_first_positive {
                    Ok(BallotSlot::FirstPositive)
                } else if !self.used_second_positive && !self.used_negative {
                    Ok(BallotSlot::SecondPositive)
                } else {
                    Err(D21Error::VoteBudgetExhausted)
                }
            }
            Polarity::Negative => {
                if !self.used_first_positive {
                    Err(D21Error::NegativeBeforePositive)
                } else if self.used_negative {
                    Err(D21Error::VoteBudgetExhausted)
                } else {
                    Ok(BallotSlot::Negative)
                }
            }
        }
    }

    /// Mark `slot` as spent on `subject`. Callers validate with [`next_slot`](Self::next_slot) first.
    pub fn record(&mut self, slot: BallotSlot, subject: SubjectId) {
        match slot {
            BallotSlot::FirstPositive => self.used_first_positive = true,
            BallotSlot::SecondPositive => self.used_second_positive = true,
            BallotSlot::Negative => self.used_negative = true,
        }
        self.voted_subjects.push(subject);
    }

    pub fn stage(&self) -> BallotStage {
        if self.used_negative {
            BallotStage::NegativeCast
        } else if self.used_second_positive {
            BallotStage::SecondPositiveCast
        } else if self.used_first_positive {
            BallotStage::FirstPositiveCast
        } else {
            BallotStage::NoVotes
        }
    }

    pub fn votes_cast(&self) -> usize {
        self.voted_subjects.len()
    }

    /// Flags and targeted subjects agree with each other
    pub(crate) fn is_consistent(&self) -> bool {
        let flags = [
            self.used_first_positive,
            self.used_second_positive,
            self.used_negative,
        ]
        .iter()
        .filter(|f| **f)
        .count();
        let mut seen = self.voted_subjects.clone();
        seen.sort();
        seen.dedup();

        flags == self.voted_subjects.len()
            && seen.len() == self.voted_subjects.len()
            && (self.used_first_positive || flags == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_voter_gets_first_positive() {
        let record = VoterRecord::new();
        assert_eq!(record.stage(), BallotStage::NoVotes);
        assert_eq!(
            record.next_slot(Polarity::Positive).unwrap(),
            BallotSlot::FirstPositive
        );
        assert!(matches!(
            record.next_slot(Polarity::Negative),
            Err(D21Error::NegativeBeforePositive)
        ));
    }

    #[test]
    fn test_second_vote_either_polarity() {
        let mut record = VoterRecord::new();
        record.record(BallotSlot::FirstPositive, SubjectId::new(0));

        assert_eq!(record.stage(), BallotStage::FirstPositiveCast);
        assert_eq!(
            record.next_slot(Polarity::Positive).unwrap(),
            BallotSlot::SecondPositive
        );
        assert_eq!(
            record.next_slot(Polarity::Negative).unwrap(),
            BallotSlot::Negative
        );
    }

    #[test]
    fn test_negative_after_two_positives() {
        let mut record = VoterRecord::new();
        record.record(BallotSlot::FirstPositive, SubjectId::new(0));
        record.record(BallotSlot::SecondPositive, SubjectId::new(1));

        assert_eq!(record.stage(), BallotStage::SecondPositiveCast);
        assert!(!record.stage().is_exhausted());
        assert!(matches!(
            record.next_slot(Polarity::Positive),
            Err(D21Error::VoteBudgetExhausted)
        ));
        assert_eq!(
            record.next_slot(Polarity::Negative).unwrap(),
            BallotSlot::Negative
        );

        record.record(BallotSlot::Negative, SubjectId::new(2));
        assert!(record.stage().is_exhausted());
        assert!(record.is_consistent());
        assert!(matches!(
            record.next_slot(Polarity::Negative),
            Err(D21Error::VoteBudgetExhausted)
        ));
    }

    #[test]
    fn test_exhausted_after_negative() {
        let mut record = VoterRecord::new();
        record.record(BallotSlot::FirstPositive, SubjectId::new(0));
        record.record(BallotSlot::Negative, SubjectId::new(2));

        assert_eq!(record.stage(), BallotStage::NegativeCast);
        assert!(matches!(
            record.next_slot(Polarity::Positive),
            Err(D21Error::VoteBudgetExhausted)
        ));
        assert!(matches!(
            record.next_slot(Polarity::Negative),
            Err(D21Error::VoteBudgetExhausted)
        ));
        assert_eq!(record.voted_subjects, vec![SubjectId::new(0), SubjectId::new(2)]);
        assert!(record.is_consistent());
    }

    #[test]
    fn test_inconsistent_records_detected() {
        let record = VoterRecord {
            used_first_positive: false,
            used_second_positive: false,
            used_negative: true,
            voted_subjects: vec![SubjectId::new(1)],
        };
        assert!(!record.is_consistent());

        let record = VoterRecord {
            used_first_positive: true,
            used_second_positive: true,
            used_negative: false,
            voted_subjects: vec![SubjectId::new(1), SubjectId::new(1)],
        };
        assert!(!record.is_consistent());
    }
}
