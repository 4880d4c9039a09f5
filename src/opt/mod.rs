mod opt;
pub mod validator;
mod value;

pub(crate) use opt::check_segment;
pub use opt::Opt;
pub use opt::Parser;
pub use opt::UpdateHook;
pub use opt::Validator;
pub use value::RawValue;
pub use value::Value;
pub use value::ValueKind;

#[cfg(test)]
mod opt_test;
