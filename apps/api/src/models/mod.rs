pub mod context;

pub use context::{CompanyContext, GenerationRequest};
