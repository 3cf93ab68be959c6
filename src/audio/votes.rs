use serenity::model::id::UserId;
use std::collections::HashSet;

/// Resultado de registrar un voto de salto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// El solicitante de la pista la salta sin votación.
    RequesterBypass,
    /// Un admin la salta sin votación.
    AdminBypass,
    /// La votación alcanzó el umbral.
    Passed(usize),
    /// Voto registrado, aún por debajo del umbral (contados, requeridos).
    Recorded(usize, usize),
    /// El votante ya había votado esta pista; sin cambio de estado.
    AlreadyVoted,
}

impl VoteOutcome {
    /// ¿Este resultado dispara el salto?
    pub fn skips(self) -> bool {
        matches!(
            self,
            VoteOutcome::RequesterBypass | VoteOutcome::AdminBypass | VoteOutcome::Passed(_)
        )
    }
}

/// Votación cooperativa de salto: sin votos → acumulando → aprobada. El
/// bypass privilegiado (solicitante o admin) gana siempre el desempate, con
/// independencia del recuento actual.
#[derive(Debug)]
pub struct SkipVotes {
    voters: HashSet<UserId>,
    required: usize,
}

impl SkipVotes {
    pub fn new(required: usize) -> Self {
        Self {
            voters: HashSet::new(),
            required,
        }
    }

    pub fn register(&mut self, voter: UserId, is_requester: bool, is_admin: bool) -> VoteOutcome {
        if is_requester {
            return VoteOutcome::RequesterBypass;
        }
        if is_admin {
            return VoteOutcome::AdminBypass;
        }
        if !self.voters.insert(voter) {
            return VoteOutcome::AlreadyVoted;
        }

        let total = self.voters.len();
        if total >= self.required {
            VoteOutcome::Passed(total)
        } else {
            VoteOutcome::Recorded(total, self.required)
        }
    }

    pub fn count(&self) -> usize {
        self.voters.len()
    }

    pub fn required(&self) -> usize {
        self.required
    }

    /// Reinicio para la siguiente pista.
    pub fn clear(&mut self) {
        self.voters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn third_distinct_vote_passes() {
        let mut votes = SkipVotes::new(3);

        assert_eq!(
            votes.register(UserId::new(1), false, false),
            VoteOutcome::Recorded(1, 3)
        );
        assert_eq!(
            votes.register(UserId::new(2), false, false),
            VoteOutcome::Recorded(2, 3)
        );
        assert_eq!(
            votes.register(UserId::new(3), false, false),
            VoteOutcome::Passed(3)
        );
    }

    #[test]
    fn duplicate_vote_is_rejected_without_state_change() {
        let mut votes = SkipVotes::new(3);

        votes.register(UserId::new(1), false, false);
        votes.register(UserId::new(2), false, false);
        assert_eq!(
            votes.register(UserId::new(2), false, false),
            VoteOutcome::AlreadyVoted
        );
        assert_eq!(votes.count(), 2);
    }

    #[test]
    fn requester_bypasses_with_empty_vote_set() {
        let mut votes = SkipVotes::new(3);

        let outcome = votes.register(UserId::new(10), true, false);
        assert_eq!(outcome, VoteOutcome::RequesterBypass);
        assert!(outcome.skips());
        // el bypass no consume ni altera el recuento
        assert_eq!(votes.count(), 0);
    }

    #[test]
    fn admin_bypasses_regardless_of_count() {
        let mut votes = SkipVotes::new(3);

        votes.register(UserId::new(1), false, false);
        let outcome = votes.register(UserId::new(2), false, true);
        assert_eq!(outcome, VoteOutcome::AdminBypass);
        assert!(outcome.skips());
        assert_eq!(votes.count(), 1);
    }

    #[test]
    fn clear_resets_for_the_next_track() {
        let mut votes = SkipVotes::new(2);

        votes.register(UserId::new(1), false, false);
        votes.clear();
        assert_eq!(votes.count(), 0);
        assert_eq!(
            votes.register(UserId::new(1), false, false),
            VoteOutcome::Recorded(1, 2)
        );
    }
}
