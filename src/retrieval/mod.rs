//! Aerosol extinction retrieval
//!
//! Reference level selection and the backward/forward inversion solvers.

pub mod extinction;
pub mod ref_altitude;

pub use extinction::{
    Apriori, ForwardSolution, InversionMethod, InversionResult, aod, backward_inversion,
    forward_inversion, invert,
};
pub use ref_altitude::reference_index;
