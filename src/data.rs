//! Weighted tabular datasets over discrete `Variable`s.
//!
//! Repeated rows are never stored twice: adding a row that is already present accumulates its
//! weight instead.

use crate::util::{Result, StrataError};
use crate::variable::Variable;

use indexmap::IndexMap;

/// One instance: a state index per column, `None` where the value is missing
pub type Row = Vec<Option<usize>>;


#[derive(Clone, Debug)]
pub struct DiscreteData {

    /// The columns, in order
    variables: Vec<Variable>,

    /// Distinct rows in insertion order, with their accumulated weights
    instances: IndexMap<Row, f64>,

    /// Sum of all weights
    total_weight: f64

}


impl DiscreteData {

    /// Create an empty dataset over the given columns
    ///
    /// # Errors
    /// * `StrataError::InvalidData` if two columns share a name
    pub fn new(variables: Vec<Variable>) -> Result<Self> {
        for (i, v) in variables.iter().enumerate() {
            if variables[..i].iter().any(|w| w.name() == v.name()) {
                return Err(StrataError::InvalidData(format!("duplicate column {}", v.name())));
            }
        }

        Ok(DiscreteData { variables, instances: IndexMap::new(), total_weight: 0.0 })
    }

    /// Add a (possibly incomplete) row with the given weight
    ///
    /// # Errors
    /// * `StrataError::InvalidData` if the row has the wrong length, holds an out of range state,
    ///   or the weight is not positive
    pub fn add(&mut self, row: Row, weight: f64) -> Result<()> {
        if row.len() != self.variables.len() {
            return Err(StrataError::InvalidData(
                format!("row of length {} for {} columns", row.len(), self.variables.len())
            ));
        }

        for (v, s) in self.variables.iter().zip(row.iter()) {
            if let Some(s) = *s {
                if s >= v.cardinality() {
                    return Err(StrataError::InvalidData(
                        format!("state {} out of range for {}", s, v)
                    ));
                }
            }
        }

        if !(weight > 0.0) || !weight.is_finite() {
            return Err(StrataError::InvalidData(format!("invalid weight {}", weight)));
        }

        *self.instances.entry(row).or_insert(0.0) += weight;
        self.total_weight += weight;
        Ok(())
    }

    /// Add a row without missing values
    pub fn add_complete(&mut self, row: &[usize], weight: f64) -> Result<()> {
        self.add(row.iter().map(|&s| Some(s)).collect(), weight)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name() == name)
    }

    /// Column position of the variable called `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name() == name)
    }

    /// Distinct rows in insertion order, with their weights
    pub fn instances(&self) -> impl Iterator<Item = (&Row, f64)> + '_ {
        self.instances.iter().map(|(r, &w)| (r, w))
    }

    /// Number of distinct rows
    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// `true` if no row has a missing value
    pub fn is_complete(&self) -> bool {
        self.instances.keys().all(|r| r.iter().all(|s| s.is_some()))
    }

    /// Restrict the dataset to the named columns. Columns keep the order they have in this
    /// dataset, and rows that become identical are merged.
    ///
    /// # Errors
    /// * `StrataError::UnknownVariable` if a name is not a column
    pub fn project<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        for n in names.iter() {
            if self.index_of(n.as_ref()).is_none() {
                return Err(StrataError::UnknownVariable(String::from(n.as_ref())));
            }
        }

        let keep: Vec<usize> = (0..self.variables.len())
            .filter(|&i| names.iter().any(|n| n.as_ref() == self.variables[i].name()))
            .collect();

        let mut projected = DiscreteData::new(keep.iter().map(|&i| self.variables[i].clone()).collect())?;
        for (row, w) in self.instances() {
            projected.add(keep.iter().map(|&i| row[i]).collect(), w)?;
        }

        Ok(projected)
    }

    /// Append columns, giving one value per distinct row (in `instances` order). Used to attach
    /// completed values of latent variables.
    ///
    /// # Errors
    /// * `StrataError::InvalidData` if the number of value rows does not match, a value row has
    ///   the wrong length, a value is out of range or a name clashes
    pub fn with_columns(&self, extra: Vec<Variable>, values: &[Vec<usize>]) -> Result<Self> {
        if values.len() != self.instances.len() {
            return Err(StrataError::InvalidData(
                format!("{} completions for {} rows", values.len(), self.instances.len())
            ));
        }

        let width = extra.len();
        let mut variables = self.variables.clone();
        variables.extend(extra);

        let mut extended = DiscreteData::new(variables)?;
        for ((row, w), vals) in self.instances().zip(values.iter()) {
            if vals.len() != width {
                return Err(StrataError::InvalidData(String::from("completion of the wrong width")));
            }

            let mut r = row.clone();
            r.extend(vals.iter().map(|&s| Some(s)));
            extended.add(r, w)?;
        }

        Ok(extended)
    }

}


#[cfg(test)]
mod tests {

    use super::*;
    use std::iter::repeat;

    fn columns() -> Vec<Variable> {
        vec![
            Variable::manifest("a", 2).unwrap(),
            Variable::manifest("b", 3).unwrap(),
            Variable::manifest("c", 2).unwrap()
        ]
    }

    #[test]
    fn rows_merge() {
        let mut data = DiscreteData::new(columns()).expect("Unexpected error");
        for row in repeat([0, 2, 1]).take(3) {
            data.add_complete(&row, 1.0).expect("Unexpected error");
        }
        data.add(vec![Some(1), None, Some(0)], 2.5).expect("Unexpected error");

        assert_eq!(2, data.num_instances());
        assert_eq!(5.5, data.total_weight());
        assert!(!data.is_complete());

        let (first, w) = data.instances().next().unwrap();
        assert_eq!(&vec![Some(0), Some(2), Some(1)], first);
        assert_eq!(3.0, w);
    }

    #[test]
    fn validation() {
        let mut dup = columns();
        dup.push(Variable::manifest("a", 4).unwrap());
        match DiscreteData::new(dup) {
            Err(StrataError::InvalidData(_)) => assert!(true),
            _ => panic!("expected InvalidData")
        }

        let mut data = DiscreteData::new(columns()).unwrap();
        assert!(data.add_complete(&[0, 1], 1.0).is_err());
        assert!(data.add_complete(&[0, 3, 1], 1.0).is_err());
        assert!(data.add_complete(&[0, 1, 1], 0.0).is_err());
        assert!(data.add_complete(&[0, 1, 1], -1.0).is_err());
        assert!(data.is_empty());
    }

    #[test]
    fn projection_keeps_column_order() {
        let mut data = DiscreteData::new(columns()).unwrap();
        data.add_complete(&[0, 0, 1], 1.0).unwrap();
        data.add_complete(&[0, 1, 1], 2.0).unwrap();
        data.add_complete(&[1, 1, 0], 4.0).unwrap();

        let p = data.project(&["c", "a"]).expect("Unexpected error");
        assert_eq!(vec!["a", "c"], p.variables().iter().map(|v| v.name()).collect::<Vec<_>>());
        assert_eq!(2, p.num_instances());
        assert_eq!(7.0, p.total_weight());
        let rows: Vec<(Row, f64)> = p.instances().map(|(r, w)| (r.clone(), w)).collect();
        assert_eq!((vec![Some(0), Some(1)], 3.0), rows[0]);

        match data.project(&["z"]) {
            Err(StrataError::UnknownVariable(n)) => assert_eq!("z", n),
            _ => panic!("expected UnknownVariable")
        }
    }

    #[test]
    fn attach_columns() {
        let mut data = DiscreteData::new(columns()).unwrap();
        data.add_complete(&[0, 0, 1], 1.0).unwrap();
        data.add_complete(&[1, 2, 0], 2.0).unwrap();

        let h = Variable::latent("h", 2).unwrap();
        let extended = data.with_columns(vec![h], &[vec![1], vec![0]]).expect("Unexpected error");

        assert_eq!(Some(3), extended.index_of("h"));
        assert!(extended.variable("h").unwrap().is_latent());
        let (row, w) = extended.instances().nth(1).unwrap();
        assert_eq!(&vec![Some(1), Some(2), Some(0), Some(0)], row);
        assert_eq!(2.0, w);

        assert!(data.with_columns(vec![Variable::latent("h", 2).unwrap()], &[vec![1]]).is_err());
    }
}
