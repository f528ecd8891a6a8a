pub mod html;
pub mod renderer;

pub use renderer::{BoundaryHost, DEFAULT_MAX_DEPTH, FragmentRenderer};
