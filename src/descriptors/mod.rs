//! Descriptor acquisition, dependency linkage and the linked registry

pub mod linkage;
pub mod reflection;
pub mod repository;

pub use linkage::{linkage_order, DescriptorSet};
pub use reflection::ReflectionClient;
pub use repository::{DescriptorRepository, Registry};
