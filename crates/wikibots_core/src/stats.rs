use std::fmt;

use crate::confirm::Outcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub edited: usize,
    pub ignored: usize,
    pub errors: usize,
}

impl RunStats {
    pub fn visited(&self) -> usize {
        self.edited + self.ignored + self.errors
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Saved => self.edited += 1,
            Outcome::Skipped | Outcome::Aborted => self.ignored += 1,
            Outcome::Failed => self.errors += 1,
        }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} edited, {} ignored, {} errors",
            self.visited(),
            self.edited,
            self.ignored,
            self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::RunStats;
    use crate::confirm::Outcome;

    #[test]
    fn outcomes_land_in_one_counter_each() {
        let mut stats = RunStats::default();
        for outcome in [
            Outcome::Saved,
            Outcome::Saved,
            Outcome::Skipped,
            Outcome::Aborted,
            Outcome::Failed,
        ] {
            stats.record(outcome);
        }
        assert_eq!(stats.edited, 2);
        assert_eq!(stats.ignored, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.visited(), 5);
        assert_eq!(
            stats.to_string(),
            "5 total, 2 edited, 2 ignored, 1 errors"
        );
    }
}
