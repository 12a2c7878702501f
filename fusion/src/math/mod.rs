mod normal_equations;
pub mod pose;

pub use self::normal_equations::{
    is_positive_definite, solve_symmetric, NormalEquations, DOF, PACKED_LEN,
};
