//! Definition of the factor module
//!
//! A `Factor` represents a relationship between some set of variables. Variables are referred to
//! by the `NodeId` of the network node that owns them; the number of states of each variable is
//! read off the shape of the table.

use crate::graph::NodeId;
use crate::util::{Result, StrataError};

use ndarray::prelude as nd;
use ndarray::{Dimension, Zip};

use std::collections::HashMap;

/// Alias f64 ndarray::Array as Table
pub type Table = nd::ArrayD<f64>;

/// Tolerance used when checking that a table is normalized
const CPD_TOLERANCE: f64 = 1e-6;


/// A (partial) assignment of states to variables
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignment {
    values: HashMap<NodeId, usize>
}

impl Assignment {

    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `state` to `var`, replacing any previous value
    pub fn set(&mut self, var: NodeId, state: usize) {
        self.values.insert(var, state);
    }

    pub fn get(&self, var: NodeId) -> Option<usize> {
        self.values.get(&var).cloned()
    }

    /// Remove the value of `var`, if any
    pub fn unset(&mut self, var: NodeId) {
        self.values.remove(&var);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, usize)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }
}


#[derive(Clone, Debug, PartialEq)]
pub enum Factor {
    /// The empty, identity `Factor` with no scope. This type exists for dealing with arithmetic
    /// operations of `Factor`s
    Identity,

    /// A `Factor` over some scope of variables. Represented as a table-CPD as described in Koller
    /// & Friedman. The scope may be empty, in which case the table is a 0-dimensional scalar.
    TableFactor {
        /// The scope of the `Factor`, one variable per table axis
        scope: Vec<NodeId>,

        /// The values of the `Factor` table.
        table: Table
    }
}


impl Factor {

    /// Get the identity factor
    pub fn identity() -> Self {
        Factor::Identity
    }

    /// Create a new `Factor`
    ///
    /// # Errors
    /// * `StrataError::InvalidScope` if the scope repeats a variable or does not match the number
    ///   of table dimensions
    /// * `StrataError::NonPositiveProbability` if the table holds a negative value
    pub fn new(scope: Vec<NodeId>, table: Table) -> Result<Self> {
        if scope.len() != table.ndim() {
            return Err(StrataError::InvalidScope);
        }

        for (i, v) in scope.iter().enumerate() {
            if scope[i + 1..].contains(v) {
                return Err(StrataError::InvalidScope);
            }
        }

        if table.iter().any(|&v| v < 0.0) {
            return Err(StrataError::NonPositiveProbability);
        }

        Ok(Factor::TableFactor { scope, table })
    }

    /// A `Factor` with an empty scope and the given value
    pub fn scalar(value: f64) -> Self {
        Factor::TableFactor { scope: Vec::new(), table: nd::arr0(value).into_dyn() }
    }

    /// Create a conditional probability table P(var | parents).
    ///
    /// The scope of the result is `parents` followed by `var`, so the last axis of `table` indexes
    /// the states of `var`.
    ///
    /// # Errors
    /// * `StrataError::NotACPD` if some row of `table` does not sum to one
    /// * any error of `Factor::new`
    pub fn cpd(var: NodeId, parents: &[NodeId], table: Table) -> Result<Self> {
        let mut scope = parents.to_vec();
        scope.push(var);

        let f = Factor::new(scope, table)?;
        if f.is_cpd() {
            Ok(f)
        } else {
            Err(StrataError::NotACPD)
        }
    }

    /// Check if the `Factor` is the identity `Factor`
    pub fn is_identity(&self) -> bool {
        matches!(self, Factor::Identity)
    }

    /// Check if the table is normalized along its last axis. The identity is considered a CPD.
    pub fn is_cpd(&self) -> bool {
        match self {
            Factor::Identity => true,
            Factor::TableFactor { table, .. } if table.ndim() == 0 => false,
            Factor::TableFactor { table, .. } => {
                let sums = table.sum_axis(nd::Axis(table.ndim() - 1));
                sums.iter().all(|s| (s - 1.0).abs() < CPD_TOLERANCE)
            }
        }
    }

    /// Retrieve the scope of the `Factor`
    pub fn scope(&self) -> &[NodeId] {
        match self {
            Factor::Identity => &[],
            Factor::TableFactor { scope, .. } => scope
        }
    }

    pub fn table(&self) -> Option<&Table> {
        match self {
            Factor::Identity => None,
            Factor::TableFactor { table, .. } => Some(table)
        }
    }

    /// The number of states of `var`, if it is in the scope
    pub fn cardinality(&self, var: NodeId) -> Option<usize> {
        match self {
            Factor::Identity => None,
            Factor::TableFactor { scope, table } => {
                scope.iter().position(|&v| v == var).map(|i| table.len_of(nd::Axis(i)))
            }
        }
    }

    /// Retrieve the value for a complete assignment over the scope of this `Factor`
    ///
    /// # Args
    /// assignment: a full assignment to the scope of a `Factor`. The assignment's scope may be a
    ///             superset of the `Factor`s scope.
    ///
    /// # Errors
    /// * `StrataError::General` if the `Factor` is the identity
    /// * `StrataError::InvalidScope`, if assignment is not a complete assignment to the scope of
    ///   the `Factor` or assigns an out of range state
    pub fn value(&self, assignment: &Assignment) -> Result<f64> {
        match self {
            Factor::Identity => {
                Err(StrataError::General(String::from("The identity factor has no value")))
            },
            Factor::TableFactor { scope, table } => {
                let idxs = scope.iter()
                                .map(|&v| assignment.get(v).ok_or(StrataError::InvalidScope))
                                .collect::<Result<Vec<usize>>>()?;

                table.get(idxs.as_slice()).cloned().ok_or(StrataError::InvalidScope)
            }
        }
    }

    /// Product of this `Factor` and another `Factor`.
    ///
    /// Defined in Koller & Friedman Section 4.2.1. Both tables are aligned to the union of the
    /// scopes (this factor's variables first) and multiplied elementwise. Disjoint scopes give the
    /// outer product.
    ///
    /// # Errors
    /// * `StrataError::InvalidScope`, if a shared variable has a different number of states in
    ///   each factor
    pub fn product(&self, other: &Self) -> Result<Self> {
        // Factor::Identity is the multiplicative identity
        let (my_scope, other_scope) = match (self, other) {
            (Factor::Identity, _) => return Ok(other.clone()),
            (_, Factor::Identity) => return Ok(self.clone()),
            (Factor::TableFactor { scope: a, .. }, Factor::TableFactor { scope: b, .. }) => (a, b)
        };

        let mut scope = my_scope.clone();
        let mut shape: Vec<usize> = self.table().map(|t| t.shape().to_vec()).unwrap_or_default();
        for &v in other_scope.iter() {
            let card = other.cardinality(v).ok_or(StrataError::InvalidScope)?;
            match self.cardinality(v) {
                Some(c) if c != card => return Err(StrataError::InvalidScope),
                Some(_) => (),
                None => {
                    scope.push(v);
                    shape.push(card);
                }
            }
        }

        let lhs = self.aligned(&scope, &shape)?;
        let rhs = other.aligned(&scope, &shape)?;
        Factor::new(scope, lhs * rhs)
    }

    /// `Factor` division. Calculates Psi(X, Y) = Phi1(X, Y) / Phi2(Y) where Phi1 = self and Phi2 =
    /// other.
    ///
    /// Defined in Koller & Friedman Section 10.3.1
    ///
    /// # Notes
    /// In the context of this operation, 0/0 is defined as 0. However, X/0, where X != 0, is still
    /// undefined.
    ///
    /// # Errors
    /// * `StrataError::InvalidScope` if other.scope() is not a subset of self.scope()
    /// * `StrataError::DivideByZero` if a divide by zero error is found
    pub fn divide(&self, other: &Self) -> Result<Self> {
        let (scope, table) = match (self, other) {
            (Factor::Identity, Factor::Identity) => return Ok(Factor::Identity),
            (Factor::Identity, _) => return Err(StrataError::InvalidScope),
            (_, Factor::Identity) => return Ok(self.clone()),
            (Factor::TableFactor { scope, table }, _) => (scope, table)
        };

        if !other.scope().iter().all(|v| scope.contains(v)) {
            return Err(StrataError::InvalidScope);
        }

        let denominator = other.aligned(scope, table.shape())?;
        let mut out = table.clone();
        let mut undefined = false;

        Zip::from(&mut out).and(&denominator).for_each(|x, &d| {
            if d == 0.0 {
                undefined |= *x != 0.0;
                *x = 0.0;
            } else {
                *x /= d;
            }
        });

        if undefined {
            Err(StrataError::DivideByZero)
        } else {
            Factor::new(scope.clone(), out)
        }
    }

    /// Reduce the `Factor` to the slice consistent with the given partial assignment
    ///
    /// Defined in Koller & Friedman 4.2.3. Assigned variables are dropped from the scope. Reducing
    /// on every variable yields a scalar factor holding the assigned value.
    ///
    /// # Errors
    /// * `StrataError::InvalidScope` if an assigned state is out of range
    pub fn reduce(&self, assignment: &Assignment) -> Result<Self> {
        match self {
            Factor::Identity => Ok(Factor::Identity),
            Factor::TableFactor { scope, table } => {
                let mut view = table.view();
                let mut new_scope = Vec::new();

                // index from the last axis so earlier axis numbers stay valid
                for (i, &v) in scope.iter().enumerate().rev() {
                    match assignment.get(v) {
                        Some(s) if s >= view.len_of(nd::Axis(i)) => {
                            return Err(StrataError::InvalidScope);
                        },
                        Some(s) => view = view.index_axis_move(nd::Axis(i), s),
                        None => new_scope.push(v)
                    }
                }

                new_scope.reverse();
                Factor::new(new_scope, view.to_owned())
            }
        }
    }

    /// Zero every entry inconsistent with `var = state`, keeping the scope intact. Does nothing
    /// if `var` is not in the scope.
    pub fn observe(&mut self, var: NodeId, state: usize) {
        if let Factor::TableFactor { scope, table } = self {
            if let Some(ax) = scope.iter().position(|&v| v == var) {
                for s in 0..table.len_of(nd::Axis(ax)) {
                    if s != state {
                        table.index_axis_mut(nd::Axis(ax), s).fill(0.0);
                    }
                }
            }
        }
    }

    /// Marginalize the `Factor` over the given variable
    ///
    /// Defined in Koller & Friedman 9.3.1. A variable outside the scope leaves the `Factor`
    /// unchanged.
    pub fn marginalize(&self, var: NodeId) -> Self {
        match self {
            Factor::Identity => Factor::Identity,
            Factor::TableFactor { scope, table } => {
                match scope.iter().position(|&v| v == var) {
                    Some(idx) => Factor::TableFactor {
                        scope: scope.iter().cloned().filter(|&v| v != var).collect(),
                        table: table.sum_axis(nd::Axis(idx))
                    },
                    None => self.clone()
                }
            }
        }
    }

    /// Sum out everything but `keep`. The result is ordered like `keep`; variables of `keep`
    /// outside the scope are ignored.
    pub fn marginalize_to(&self, keep: &[NodeId]) -> Self {
        let mut f = self.clone();
        for &v in self.scope().iter() {
            if !keep.contains(&v) {
                f = f.marginalize(v);
            }
        }

        let order: Vec<NodeId> = keep.iter().cloned().filter(|v| f.scope().contains(v)).collect();
        match f.permute(&order) {
            Ok(p) => p,
            Err(_) => f
        }
    }

    /// Reorder the axes of the table to follow `order`
    ///
    /// # Errors
    /// * `StrataError::InvalidScope` if `order` is not a permutation of the scope
    pub fn permute(&self, order: &[NodeId]) -> Result<Self> {
        match self {
            Factor::Identity if order.is_empty() => Ok(Factor::Identity),
            Factor::Identity => Err(StrataError::InvalidScope),
            Factor::TableFactor { scope, table } => {
                if order.len() != scope.len() {
                    return Err(StrataError::InvalidScope);
                }

                let axes = order.iter()
                                .map(|v| scope.iter().position(|s| s == v).ok_or(StrataError::InvalidScope))
                                .collect::<Result<Vec<usize>>>()?;

                let table = table.view().permuted_axes(axes).as_standard_layout().into_owned();
                Factor::new(order.to_vec(), table)
            }
        }
    }

    /// Total mass of the table. The identity has mass one.
    pub fn sum(&self) -> f64 {
        match self {
            Factor::Identity => 1.0,
            Factor::TableFactor { table, .. } => table.sum()
        }
    }

    /// Scale the table so it sums to one
    ///
    /// # Errors
    /// * `StrataError::DivideByZero` if the table has no mass
    pub fn normalize(&self) -> Result<Self> {
        match self {
            Factor::Identity => Ok(Factor::Identity),
            Factor::TableFactor { scope, table } => {
                let z = table.sum();
                if z <= 0.0 {
                    return Err(StrataError::DivideByZero);
                }

                Ok(Factor::TableFactor { scope: scope.clone(), table: table / z })
            }
        }
    }

    /// Normalize over `var` for every configuration of the remaining variables, giving a
    /// conditional distribution of `var`. Configurations without mass become uniform.
    ///
    /// # Errors
    /// * `StrataError::InvalidScope` if `var` is not in the scope
    pub fn normalize_conditional(&self, var: NodeId) -> Result<Self> {
        let (scope, table) = match self {
            Factor::Identity => return Err(StrataError::InvalidScope),
            Factor::TableFactor { scope, table } => (scope, table)
        };

        let ax = nd::Axis(scope.iter().position(|&v| v == var).ok_or(StrataError::InvalidScope)?);
        let uniform = 1.0 / table.len_of(ax) as f64;
        let sums = table.sum_axis(ax).insert_axis(ax);

        let mut out = table.clone();
        Zip::from(&mut out).and_broadcast(&sums).for_each(|x, &z| {
            *x = if z > 0.0 { *x / z } else { uniform };
        });

        Ok(Factor::TableFactor { scope: scope.clone(), table: out })
    }

    /// The most probable joint state of the scope. Ties go to the first state in row-major order.
    pub fn argmax(&self) -> Assignment {
        let mut assignment = Assignment::new();

        if let Factor::TableFactor { scope, table } = self {
            let mut best: Option<(Vec<usize>, f64)> = None;
            for (idx, &val) in table.indexed_iter() {
                if best.as_ref().map_or(true, |(_, b)| val > *b) {
                    best = Some((idx.slice().to_vec(), val));
                }
            }

            if let Some((idx, _)) = best {
                for (&v, &s) in scope.iter().zip(idx.iter()) {
                    assignment.set(v, s);
                }
            }
        }

        assignment
    }

    /// Copy of the table laid out along `scope` (a superset of this factor's scope) and broadcast
    /// to `shape`
    fn aligned(&self, scope: &[NodeId], shape: &[usize]) -> Result<Table> {
        let (my_scope, table) = match self {
            Factor::Identity => return Ok(Table::ones(shape)),
            Factor::TableFactor { scope, table } => (scope, table)
        };

        // the axes of this table, in the order their variables appear in `scope`
        let axes: Vec<usize> = scope.iter()
                                    .filter_map(|v| my_scope.iter().position(|m| m == v))
                                    .collect();
        if axes.len() != my_scope.len() {
            return Err(StrataError::InvalidScope);
        }

        let mut view = table.view().permuted_axes(axes);
        for (i, v) in scope.iter().enumerate() {
            if !my_scope.contains(v) {
                view = view.insert_axis(nd::Axis(i));
            } else if view.len_of(nd::Axis(i)) != shape[i] {
                return Err(StrataError::InvalidScope);
            }
        }

        view.broadcast(nd::IxDyn(shape))
            .map(|b| b.to_owned())
            .ok_or(StrataError::InvalidScope)
    }

}
