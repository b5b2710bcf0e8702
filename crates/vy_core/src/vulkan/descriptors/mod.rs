//! Descriptor allocation layer
//!
//! Layouts declare the shape of a set, pools hand out sets of that shape and
//! the writer fills them with buffer and image references.

pub mod layout;
pub mod pool;
pub mod writer;

pub use layout::{DescriptorSetLayout, DescriptorSetLayoutBuilder, LayoutBinding};
pub use pool::{DescriptorAllocator, DescriptorPool, DescriptorPoolBuilder};
pub use writer::DescriptorWriter;
