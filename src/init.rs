//! Module containing initialization routines for the parameters of a model.

use crate::factor::{Factor, Table};
use crate::graph::NodeId;
use crate::util::{Result, StrataError};

use ndarray::prelude as nd;
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::rngs::StdRng;

/// Defines possible ways to initialize a variable's CPD.
pub enum Initialization<'a> {
    /// A uniform distribution over all possibilities
    Uniform,

    /// Randomly initialize the weights of the CPD, drawing from the given generator
    Random(&'a mut StdRng),

    /// Initialize the CPD as a Multinomial distribution with parameters ```p_0, p_1...```.
    /// Note that this `Initialization` is valid only to a variable with no parents.
    Multinomial(&'a [f64]),

    /// User defined CPD
    Table(Factor)
}


impl<'a> Initialization<'a> {

    /// Construct a CPD, initialized based on ```self```
    ///
    /// # Args
    /// * `var`: the variable the CPD is over, with its number of states
    /// * `parents`: the conditioning variables, with their number of states
    ///
    /// # Returns
    /// a `Factor` with scope `parents` followed by `var`
    ///
    /// # Errors
    /// * `StrataError::InvalidInitialization` for a multinomial that does not fit `var`, or a
    ///   user table that is not a CPD
    /// * `StrataError::InvalidScope` for a user table over a different scope
    pub fn build_cpd(self, var: (NodeId, usize), parents: &[(NodeId, usize)]) -> Result<Factor> {
        let parent_ids: Vec<NodeId> = parents.iter().map(|&(p, _)| p).collect();
        let mut shape: Vec<usize> = parents.iter().map(|&(_, c)| c).collect();
        shape.push(var.1);

        ///////////////////////////////////////////////////////////////////////////////
        // Trivial cases

        // if this is a user defined factor, it just needs to be verified and brought into the
        // canonical axis order
        if let Initialization::Table(f) = self {
            if !f.is_cpd() || f.is_identity() {
                return Err(StrataError::InvalidInitialization);
            }

            let s = f.scope();
            if s.last() != Some(&var.0) || s.len() != parents.len() + 1
                || !parent_ids.iter().all(|p| s.contains(p)) {
                return Err(StrataError::InvalidScope);
            }

            let mut order = parent_ids;
            order.push(var.0);
            let f = f.permute(&order)?;
            if f.table().map(|t| t.shape()) != Some(shape.as_slice()) {
                return Err(StrataError::InvalidScope);
            }
            return Ok(f);
        }

        ///////////////////////////////////////////////////////////////////////////////
        // Check for errors
        if let Initialization::Multinomial(ps) = self {
            if !parents.is_empty() || ps.len() != var.1 {
                return Err(StrataError::InvalidInitialization);
            }
        }

        ///////////////////////////////////////////////////////////////////////////////
        // now, build CPD
        let tbl: Table = match self {
            Initialization::Uniform => {
                let val = 1. / (var.1 as f64);
                nd::Array::from_elem(shape, val).into_dyn()
            },
            Initialization::Random(rng) => {
                let ax = nd::Axis(shape.len() - 1);
                let tbl: Table = nd::Array::random_using(shape, Uniform::new(1.0, 100.0), rng);
                let z = tbl.sum_axis(ax).insert_axis(ax);
                tbl / z
            },
            Initialization::Multinomial(p) => {
                nd::Array::from_iter(p.iter().cloned()).into_dyn()
            },
            Initialization::Table(_) => return Err(StrataError::InvalidInitialization)
        };

        Factor::cpd(var.0, &parent_ids, tbl)
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::SeedableRng;

    fn ids() -> (NodeId, NodeId, NodeId) {
        (NodeId::new(0), NodeId::new(1), NodeId::new(2))
    }

    #[test]
    fn uniform_init() {
        let (a, b, c) = ids();
        let f = Initialization::Uniform.build_cpd((c, 3), &[(a, 2), (b, 10)])
                                       .expect("Unexpected error");

        assert_eq!(&[a, b, c], f.scope());
        assert!(f.is_cpd());
        for v in f.table().unwrap().iter() {
            assert_relative_eq!(1. / 3., *v);
        }
    }

    #[test]
    fn random_init() {
        let (a, b, c) = ids();
        let mut rng = StdRng::seed_from_u64(7);
        let f = Initialization::Random(&mut rng).build_cpd((c, 3), &[(a, 2), (b, 10)])
                                                .expect("Unexpected error");

        assert_eq!(vec![2, 10, 3], f.table().unwrap().shape().to_vec());
        assert!(f.is_cpd());
        assert!(f.table().unwrap().iter().all(|&v| v > 0.0));

        // same seed, same table
        let mut rng = StdRng::seed_from_u64(7);
        let g = Initialization::Random(&mut rng).build_cpd((c, 3), &[(a, 2), (b, 10)]).unwrap();
        assert_eq!(f, g);
    }

    #[test]
    fn multinomial_init() {
        let (a, b, _) = ids();
        let f = Initialization::Multinomial(&[0.1, 0.7, 0.2]).build_cpd((a, 3), &[])
                                                             .expect("Unexpected error");
        assert_eq!(&array![0.1, 0.7, 0.2].into_dyn(), f.table().unwrap());

        // wrong number of parameters, or a parent
        assert!(Initialization::Multinomial(&[0.5, 0.5]).build_cpd((a, 3), &[]).is_err());
        match Initialization::Multinomial(&[0.5, 0.5]).build_cpd((a, 2), &[(b, 2)]) {
            Err(StrataError::InvalidInitialization) => assert!(true),
            _ => panic!("expected InvalidInitialization")
        }
    }

    #[test]
    fn table_init() {
        let (a, b, _) = ids();
        let f = Factor::cpd(b, &[a], array![[0.1, 0.9], [0.3, 0.7], [0.5, 0.5]].into_dyn())
                       .unwrap();

        let g = Initialization::Table(f.clone()).build_cpd((b, 2), &[(a, 3)])
                                                .expect("Unexpected error");
        assert_eq!(f, g);

        // parent missing from the declared scope
        match Initialization::Table(f.clone()).build_cpd((b, 2), &[]) {
            Err(StrataError::InvalidScope) => assert!(true),
            _ => panic!("expected InvalidScope")
        }

        // wrong cardinality
        assert!(Initialization::Table(f).build_cpd((b, 2), &[(a, 2)]).is_err());

        let not_cpd = Factor::new(vec![a], array![0.2, 0.2].into_dyn()).unwrap();
        match Initialization::Table(not_cpd).build_cpd((a, 2), &[]) {
            Err(StrataError::InvalidInitialization) => assert!(true),
            _ => panic!("expected InvalidInitialization")
        }
    }
}
