// Domain-layer modules and shared errors/models
pub mod reconciliation {
    pub use crate::reconciliation::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod validation {
    pub use crate::validation::*;
}

pub mod errors {
    pub use crate::errors::*;
}
