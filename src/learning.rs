//! Outcomes of learning procedures

use crate::graph::NodeId;
use crate::model::DiscreteBayesNet;
use crate::score::ScoreType;

use std::fmt;


/// The outcome of a learner: the learned network (if any), its score and the score after every
/// accepted step.
///
/// A result without a model is *degenerate*: its score is negative infinity. Operators return
/// it when they cannot be applied, so every comparison against it fails.
#[derive(Clone, Debug)]
pub struct LearningResult {
    model: Option<DiscreteBayesNet>,
    score: f64,
    score_type: ScoreType,

    /// Name of the procedure that produced the result
    name: String,

    history: Vec<f64>
}


impl LearningResult {

    pub fn new(model: DiscreteBayesNet, score: f64, score_type: ScoreType, name: &str) -> Self {
        LearningResult { model: Some(model), score, score_type, name: String::from(name), history: vec![score] }
    }

    /// A result carrying no model
    pub fn degenerate(score_type: ScoreType, name: &str) -> Self {
        LearningResult {
            model: None,
            score: f64::NEG_INFINITY,
            score_type,
            name: String::from(name),
            history: Vec::new()
        }
    }

    /// Replace the score history
    pub fn with_history(mut self, history: Vec<f64>) -> Self {
        self.history = history;
        self
    }

    /// Rename the procedure the result is attributed to
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = String::from(name);
        self
    }

    pub fn model(&self) -> Option<&DiscreteBayesNet> {
        self.model.as_ref()
    }

    pub fn into_model(self) -> Option<DiscreteBayesNet> {
        self.model
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn score_type(&self) -> ScoreType {
        self.score_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scores after every step, the last one being `score()`
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn is_degenerate(&self) -> bool {
        self.model.is_none()
    }

}


impl fmt::Display for LearningResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{:?} = {:.4}]", self.name, self.score_type, self.score)
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Add,
    Delete,
    Reverse
}


/// A candidate edge change scored against cached local scores. The edge is `tail -> head`;
/// for a reversal it is the edge as it currently stands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalOperation {
    pub head: NodeId,
    pub tail: NodeId,

    /// Network score after the change
    pub score: f64,

    pub kind: OperationKind
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_results() {
        let r = LearningResult::degenerate(ScoreType::Bic, "RemoveLatentNode");
        assert!(r.is_degenerate());
        assert_eq!(f64::NEG_INFINITY, r.score());
        assert!(!(r.score() > f64::MIN));
        assert!(r.history().is_empty());

        let net = DiscreteBayesNet::new();
        let r = LearningResult::new(net, -12.5, ScoreType::Aic, "EM").with_history(vec![-20.0, -12.5]);
        assert!(!r.is_degenerate());
        assert_eq!(&[-20.0, -12.5], r.history());
        assert_eq!("EM [Aic = -12.5000]", format!("{}", r));
    }
}
