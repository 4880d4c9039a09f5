mod conf;
mod decoder;
mod errors;
mod global;
mod group;
mod opt;
mod source;

pub use conf::*;
pub use decoder::*;
pub use errors::*;
pub use global::*;
pub use group::*;
pub use opt::*;
pub use source::*;
