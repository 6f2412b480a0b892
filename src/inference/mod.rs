//! Defines the interface to inference engines
//!
//! Exact inference is what the learners use to score models with latent variables and to
//! compute expected sufficient statistics.

use crate::factor::Factor;
use crate::graph::NodeId;
use crate::util::Result;

mod clique_tree;
mod variable_elimination;

pub use self::clique_tree::CliqueTreePropagation;
pub use self::variable_elimination::VariableEliminationEngine;


/// A `ConditionalInferenceEngine` is capable of answering Conditional Probability Queries of the form:
///     ```P(Y | E = e)```
///
/// `ConditionalInferenceEngine`s are stateful and must take the evidence `e` as an argument to whatever
/// construction mechanism they employ.
pub trait ConditionalInferenceEngine {

    /// Infer the joint distribution ```P(variables | evidence)```, with the scope ordered like
    /// `variables`
    fn infer(&mut self, variables: &[NodeId]) -> Result<Factor>;

}


#[cfg(test)]
/// Tests for the inference engines in this module. Tests are hoisted here to avoid duplication.
/// Any tests specific to the inference engine are held within that submodule's tests module.
///
/// Example derived from Koller & Friedman's student example, with a binary grade. Example 6d of
/// [1] provides the result of exact inference of P(I | D=0, L=1, S=0) on this version of the
/// network.
///
/// [1] https://www.uni-oldenburg.de/en/lcs/probabilistic-programming/webchurch-and-openbugs/
mod tests {
    use super::*;
    use crate::factor::Assignment;
    use crate::init::Initialization;
    use crate::model::{DiscreteBayesNet, DiscreteBayesNetBuilder};
    use crate::variable::Variable;
    use ndarray::array;

    /// Utility function to build the student inference example
    pub fn build_student_example() -> (NodeId, DiscreteBayesNet, Assignment) {
        let binary = |n: &str| Variable::manifest(n, 2).unwrap();

        let mut model = DiscreteBayesNetBuilder::new()
            .with_variable(binary("D"), &[], Initialization::Multinomial(&[0.6, 0.4]))
            .with_variable(binary("I"), &[], Initialization::Multinomial(&[0.7, 0.3]))
            .with_variable(binary("G"), &["I", "D"], Initialization::Uniform)
            .with_variable(binary("S"), &["I"], Initialization::Uniform)
            .with_variable(binary("L"), &["G"], Initialization::Uniform)
            .build()
            .unwrap();

        let id = |n: &str| model.lookup(n).unwrap();
        let (d, i, g, s, l) = (id("D"), id("I"), id("G"), id("S"), id("L"));

        let cpd_g = Factor::cpd(
            g,
            &[i, d],
            array![[[0.3, 0.7], [0.05, 0.95]],
                   [[0.9, 0.1], [0.5, 0.5]]].into_dyn()
        ).unwrap();
        let cpd_s = Factor::cpd(s, &[i], array![[0.95, 0.05], [0.2, 0.8]].into_dyn()).unwrap();
        let cpd_l = Factor::cpd(l, &[g], array![[0.9, 0.1], [0.4, 0.6]].into_dyn()).unwrap();

        model.set_cpt(g, cpd_g).unwrap();
        model.set_cpt(s, cpd_s).unwrap();
        model.set_cpt(l, cpd_l).unwrap();

        let mut evidence = Assignment::new();
        evidence.set(d, 0);
        evidence.set(l, 1);
        evidence.set(s, 0);

        (i, model, evidence)
    }

    /// Utility method to test the actual inference task
    fn test_inference(i: NodeId, engine: &mut dyn ConditionalInferenceEngine, precision: f64) {
        let f = engine.infer(&[i]).expect("Unexpected error");

        assert_eq!(&[i], f.scope());
        let mut assn = Assignment::new();
        assn.set(i, 1);

        let expected = 0.02919708;
        assert!((f.value(&assn).unwrap() - expected).abs() < precision);
    }

    #[test]
    /// Test variable elimination
    fn variable_elimination() {
        let (i, model, evidence) = build_student_example();
        let mut engine = VariableEliminationEngine::new(&model, &evidence).expect("Unexpected error");

        // the result should be the same on subsequent iterations
        for _ in 0..10 {
            test_inference(i, &mut engine, 0.00000001);
        }
    }

    #[test]
    /// Test clique tree propagation
    fn clique_tree() {
        let (i, model, evidence) = build_student_example();
        let mut engine = CliqueTreePropagation::new(&model).expect("Unexpected error");
        engine.set_evidence(&evidence).expect("Unexpected error");

        for _ in 0..10 {
            test_inference(i, &mut engine, 0.00000001);
        }
    }
}
