//! Evaluation loop operations.

use tracing::{debug, info, instrument, warn};

use super::KnowledgeEngine;
use crate::error::{Error, Result};
use crate::evaluation::{
    apply_update, check, register, select, ConvergenceVerdict, CriteriaOverride, Evaluation,
    EvaluationId, EvaluationUpdate, GapSelection,
};
use crate::store::ClaimStore;

impl<S: ClaimStore> KnowledgeEngine<S> {
    /// Start an evaluation of `parent_id`.
    ///
    /// `criteria` overrides individual keys of the configured defaults.
    #[instrument(skip(self, criteria))]
    pub fn add_evaluation(
        &self,
        parent_id: &str,
        max_iterations: u32,
        criteria: CriteriaOverride,
    ) -> Result<EvaluationId> {
        let criteria = criteria.apply(&self.config.convergence);
        if criteria.marginal_gain_patience == 0 {
            return Err(Error::MalformedInput(
                "marginal_gain_patience must be at least 1".to_string(),
            ));
        }

        let evaluation = Evaluation::new(parent_id, max_iterations, criteria);
        let id = self.store.insert_evaluation(&evaluation)?;
        info!(evaluation = %id, parent = parent_id, max_iterations, "Started evaluation");
        Ok(id)
    }

    pub fn get_evaluation(&self, id: EvaluationId) -> Result<Option<Evaluation>> {
        self.store.get_evaluation(id)
    }

    /// Evaluations of one entity, newest first.
    pub fn evaluations_for(&self, parent_id: &str) -> Result<Vec<Evaluation>> {
        self.store.evaluations_for(parent_id)
    }

    /// Apply a partial update to an evaluation.
    ///
    /// Returns `false` when nothing was written: an empty update, or an
    /// evaluation that already converged or failed.
    #[instrument(skip(self, update))]
    pub fn update_evaluation(&self, id: EvaluationId, update: EvaluationUpdate) -> Result<bool> {
        if update.iteration == Some(0) {
            return Err(Error::MalformedInput(
                "iteration must be at least 1".to_string(),
            ));
        }

        self.store.transaction(|store| {
            let mut evaluation = self.require_evaluation(id)?;
            let was_terminal = evaluation.is_terminal();

            if !apply_update(&mut evaluation, update) {
                return Ok(false);
            }
            store.save_evaluation(&evaluation)?;

            if !was_terminal && evaluation.is_terminal() {
                info!(evaluation = %id, status = %evaluation.status, "Evaluation closed");
            } else {
                debug!(
                    evaluation = %id,
                    iteration = evaluation.iteration,
                    confidence = evaluation.confidence,
                    "Updated evaluation"
                );
            }
            Ok(true)
        })
    }

    /// Evaluate the stopping rules without changing the evaluation.
    #[instrument(skip(self))]
    pub fn check_convergence(&self, id: EvaluationId) -> Result<ConvergenceVerdict> {
        let evaluation = self.require_evaluation(id)?;
        let verdict = check(&evaluation);

        if verdict.marginal_gain_stop {
            info!(evaluation = %id, reason = %verdict.reason, "Confidence plateaued");
        } else if verdict.converged {
            info!(evaluation = %id, reason = %verdict.reason, "Evaluation converged");
        } else {
            debug!(evaluation = %id, reason = %verdict.reason, "Not converged");
        }
        Ok(verdict)
    }

    /// Pick up to `n` current gaps to investigate by Thompson sampling.
    ///
    /// `exploration_bonus` is added to every beta before sampling.
    #[instrument(skip(self))]
    pub fn select_next_gaps(
        &self,
        id: EvaluationId,
        n: usize,
        exploration_bonus: f64,
    ) -> Result<Vec<GapSelection>> {
        let evaluation = self.require_evaluation(id)?;
        self.with_rng(|rng| select(&evaluation, n, exploration_bonus, rng))
    }

    /// Seed uniform priors for topics the evaluation does not track yet.
    ///
    /// Returns the number of new topics. Closed evaluations are left alone.
    #[instrument(skip(self, topics))]
    pub fn register_gap_topics<I, T>(&self, id: EvaluationId, topics: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.store.transaction(|store| {
            let mut evaluation = self.require_evaluation(id)?;
            if evaluation.is_terminal() {
                warn!(
                    evaluation = %id,
                    status = %evaluation.status,
                    "Ignoring gap registration on closed evaluation"
                );
                return Ok(0);
            }

            let added = register(&mut evaluation, topics);
            if added > 0 {
                evaluation.updated_at = chrono::Utc::now();
                store.save_evaluation(&evaluation)?;
            }
            debug!(evaluation = %id, added, "Registered gap topics");
            Ok(added)
        })
    }

    fn require_evaluation(&self, id: EvaluationId) -> Result<Evaluation> {
        self.store
            .get_evaluation(id)?
            .ok_or_else(|| Error::evaluation_not_found(id))
    }
}
