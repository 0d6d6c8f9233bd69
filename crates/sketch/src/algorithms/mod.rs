pub mod extraction;
pub mod morphology;
pub mod faces;
pub mod normalize;
pub mod boundary;
pub mod simplification;
pub mod decompose;
pub mod relational;
pub mod texture;
pub mod intersection;
pub mod crossing;

pub use extraction::*;
pub use normalize::*;
pub use boundary::*;
pub use simplification::*;
pub use decompose::*;
pub use relational::*;
pub use texture::*;
pub use intersection::*;
pub use crossing::*;
pub use faces::FaceSplitter;
