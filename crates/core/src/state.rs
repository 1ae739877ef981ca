//! Minimal persisted state ("to state / from state")
//!
//! Entities expose their reconstruction data as a [`StateValue`] tuple of
//! primitive fields and dense matrices. The value is serde-serializable, so
//! any wire format (JSON, bincode, ...) can carry it. Reconstruction checks
//! arity and field kinds and fails with `MalformedState` otherwise.

use crate::error::{Result, SparseRecError};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// One field of persisted state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateValue {
    UInt(u64),
    Int(i64),
    Real(f64),
    Tuple(Vec<StateValue>),
    /// Dense row-major matrix
    Matrix {
        rows: usize,
        cols: usize,
        data: Vec<f64>,
    },
}

impl StateValue {
    pub fn matrix(view: ArrayView2<f64>) -> Self {
        let (rows, cols) = view.dim();
        StateValue::Matrix {
            rows,
            cols,
            data: view.iter().copied().collect(),
        }
    }

    /// Tuple fields, checking the arity
    pub fn expect_tuple(&self, arity: usize, what: &str) -> Result<&[StateValue]> {
        match self {
            StateValue::Tuple(fields) if fields.len() == arity => Ok(fields),
            StateValue::Tuple(fields) => Err(SparseRecError::malformed_state(format!(
                "{} state must have {} fields, got {}",
                what,
                arity,
                fields.len()
            ))),
            other => Err(SparseRecError::malformed_state(format!(
                "{} state must be a tuple, got {}",
                what,
                other.kind()
            ))),
        }
    }

    pub fn as_u64(&self, field: &str) -> Result<u64> {
        match *self {
            StateValue::UInt(v) => Ok(v),
            StateValue::Int(v) if v >= 0 => Ok(v as u64),
            ref other => Err(wrong_kind(field, "a non-negative integer", other)),
        }
    }

    pub fn as_usize(&self, field: &str) -> Result<usize> {
        let value = self.as_u64(field)?;
        usize::try_from(value).map_err(|_| {
            SparseRecError::malformed_state(format!("field `{}` does not fit in usize", field))
        })
    }

    /// Reals accept integer fields as well
    pub fn as_f64(&self, field: &str) -> Result<f64> {
        match *self {
            StateValue::Real(v) => Ok(v),
            StateValue::UInt(v) => Ok(v as f64),
            StateValue::Int(v) => Ok(v as f64),
            ref other => Err(wrong_kind(field, "a number", other)),
        }
    }

    pub fn to_array(&self, field: &str) -> Result<Array2<f64>> {
        match self {
            StateValue::Matrix { rows, cols, data } => {
                Array2::from_shape_vec((*rows, *cols), data.clone()).map_err(|e| {
                    SparseRecError::malformed_state(format!("field `{}`: {}", field, e))
                })
            }
            other => Err(wrong_kind(field, "a matrix", other)),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            StateValue::UInt(_) => "unsigned integer",
            StateValue::Int(_) => "integer",
            StateValue::Real(_) => "real",
            StateValue::Tuple(_) => "tuple",
            StateValue::Matrix { .. } => "matrix",
        }
    }
}

fn wrong_kind(field: &str, expected: &str, got: &StateValue) -> SparseRecError {
    SparseRecError::malformed_state(format!(
        "field `{}` must be {}, got {}",
        field,
        expected,
        got.kind()
    ))
}

/// Explicit state export and validated reconstruction
pub trait PersistentState: Sized {
    fn to_state(&self) -> StateValue;

    fn from_state(state: &StateValue) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_expect_tuple_arity() {
        let state = StateValue::Tuple(vec![StateValue::UInt(1), StateValue::Real(0.5)]);
        assert_eq!(state.expect_tuple(2, "pair").unwrap().len(), 2);
        assert!(matches!(
            state.expect_tuple(3, "pair"),
            Err(SparseRecError::MalformedState(_))
        ));
        assert!(StateValue::Real(1.0).expect_tuple(1, "single").is_err());
    }

    #[test]
    fn test_field_kinds() {
        assert_eq!(StateValue::Int(4).as_usize("k").unwrap(), 4);
        assert!(StateValue::Int(-4).as_u64("k").is_err());
        assert_eq!(StateValue::UInt(3).as_f64("reg").unwrap(), 3.0);
        assert!(StateValue::Real(0.5).as_u64("k").is_err());
    }

    #[test]
    fn test_matrix_is_row_major() {
        let m = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let state = StateValue::matrix(m.view());
        match &state {
            StateValue::Matrix { rows, cols, data } => {
                assert_eq!((*rows, *cols), (2, 3));
                assert_eq!(data, &vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(state.to_array("m").unwrap(), m);

        let broken = StateValue::Matrix {
            rows: 2,
            cols: 2,
            data: vec![1.0],
        };
        assert!(broken.to_array("m").is_err());
    }

    #[test]
    fn test_state_survives_wire_formats() {
        let state = StateValue::Tuple(vec![
            StateValue::UInt(8),
            StateValue::Real(0.25),
            StateValue::matrix(array![[1.5, -2.0]].view()),
        ]);
        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: StateValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, state);

        let bytes = bincode::serialize(&state).unwrap();
        let decoded: StateValue = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, state);
    }
}
