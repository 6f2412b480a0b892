//! Defines the discrete random `Variable`s a network is built over.

use crate::util::{Result, StrataError};

use std::fmt;
use std::hash::{Hash, Hasher};

/// Whether a `Variable` is observed in the data or hidden
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// Observed directly, has a column in the data
    Manifest,

    /// Never observed, its values are inferred from the model
    Latent
}


/// A discrete random variable.
///
/// # Identity
/// Two `Variable`s are the same entity iff their name *and* cardinality match. The kind and
/// the state labels are metadata. A `Variable` is immutable: changing the number of states
/// produces a new `Variable` through `with_cardinality`.
#[derive(Clone, Debug)]
pub struct Variable {

    /// The user facing name. Names are unique within a network or a dataset.
    name: String,

    /// Manifest or latent
    kind: VariableKind,

    /// One label per state, the cardinality is the number of labels
    states: Vec<String>

}


impl Variable {

    /// Create a new `Variable` with explicit state labels
    ///
    /// # Errors
    /// * `StrataError::InvalidCardinality` if fewer than 2 states are provided
    pub fn new(name: &str, kind: VariableKind, states: Vec<String>) -> Result<Self> {
        if states.len() < 2 {
            return Err(StrataError::InvalidCardinality(states.len()));
        }

        Ok(Variable { name: String::from(name), kind, states })
    }

    /// Create a manifest `Variable` with default state labels
    pub fn manifest(name: &str, cardinality: usize) -> Result<Self> {
        Variable::new(name, VariableKind::Manifest, default_states(cardinality))
    }

    /// Create a latent `Variable` with default state labels
    pub fn latent(name: &str, cardinality: usize) -> Result<Self> {
        Variable::new(name, VariableKind::Latent, default_states(cardinality))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn is_latent(&self) -> bool {
        self.kind == VariableKind::Latent
    }

    pub fn is_manifest(&self) -> bool {
        self.kind == VariableKind::Manifest
    }

    /// The number of states of the `Variable`
    pub fn cardinality(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// Produce the `Variable` with the same name and kind but a different number of states.
    ///
    /// Existing labels are kept (truncated when shrinking), new states get default labels.
    ///
    /// # Errors
    /// * `StrataError::InvalidCardinality` if `cardinality < 2`
    pub fn with_cardinality(&self, cardinality: usize) -> Result<Self> {
        if cardinality < 2 {
            return Err(StrataError::InvalidCardinality(cardinality));
        }

        let mut states: Vec<String> = self.states.iter().take(cardinality).cloned().collect();
        for i in states.len()..cardinality {
            let mut label = format!("s{}", i);
            while states.contains(&label) {
                label.push('\'');
            }
            states.push(label);
        }

        Variable::new(&self.name, self.kind, states)
    }

}


impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.cardinality() == other.cardinality()
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.cardinality().hash(state);
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.name, self.cardinality())
    }
}


fn default_states(cardinality: usize) -> Vec<String> {
    (0..cardinality).map(|i| format!("s{}", i)).collect()
}


#[cfg(test)]
mod tests {

    use super::*;
    use std::collections::HashSet;

    #[test]
    fn constructors() {
        let x = Variable::manifest("x", 3).unwrap();
        assert_eq!(3, x.cardinality());
        assert!(x.is_manifest());
        assert_eq!(vec!["s0", "s1", "s2"], x.states());

        let h = Variable::latent("h", 2).unwrap();
        assert!(h.is_latent());
        assert_eq!("h", h.name());
    }

    #[test]
    fn rejects_small_cardinality() {
        match Variable::manifest("x", 1) {
            Err(StrataError::InvalidCardinality(1)) => assert!(true),
            _ => panic!("expected InvalidCardinality")
        }

        let states = vec![String::from("only")];
        assert!(Variable::new("x", VariableKind::Latent, states).is_err());
    }

    #[test]
    fn identity_is_name_and_cardinality() {
        let a = Variable::latent("h", 2).unwrap();
        let b = Variable::manifest("h", 2).unwrap();
        let c = Variable::latent("h", 3).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Variable> = vec![a, b, c].into_iter().collect();
        assert_eq!(2, set.len());
    }

    #[test]
    fn with_cardinality() {
        let states = vec![String::from("low"), String::from("high")];
        let h = Variable::new("h", VariableKind::Latent, states).unwrap();

        let grown = h.with_cardinality(4).unwrap();
        assert_eq!(4, grown.cardinality());
        assert_eq!("low", grown.states()[0]);
        assert_eq!("s2", grown.states()[2]);
        assert!(grown.is_latent());
        assert_ne!(h, grown);

        let shrunk = grown.with_cardinality(2).unwrap();
        assert_eq!(h, shrunk);
        assert!(h.with_cardinality(1).is_err());
    }
}
