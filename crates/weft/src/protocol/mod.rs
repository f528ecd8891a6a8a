pub mod encoder;
pub mod escape;
pub mod runtime;

pub use encoder::ProtocolEncoder;
pub use escape::{make_script_safe, script_json, script_string};
pub use runtime::RUNTIME_SOURCE;
