mod admission;
mod buffer;

pub use admission::{
    Admission,
    AdmissionConfig,
    ConstantPrioritizer,
    Prioritizer,
};
pub use buffer::Buffer;
