mod group;
mod slot;

pub use group::OptGroup;
pub(crate) use group::split_key;
pub(crate) use group::Registry;
pub(crate) use group::SetMode;
