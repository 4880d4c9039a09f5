//! Option declarations.
//!
//! An [`Opt`] describes one configurable knob: its name, kind, default,
//! optional custom parser, validators and update hook. Declarations are
//! built with a consuming builder and handed to a group for registration;
//! after that the group owns the declaration and serves lookups against it.

use std::fmt;
use std::sync::Arc;

use crate::errors::BoxError;
use crate::errors::OptError;
use crate::errors::ValueError;
use crate::opt::value::RawValue;
use crate::opt::value::Value;
use crate::opt::value::ValueKind;

/// Custom parser turning a raw value into a typed one.
///
/// Installed with [`Opt::with_parser`]; replaces the built-in coercion for
/// that option. The produced value must match the declared kind.
pub type Parser = Arc<dyn Fn(&RawValue) -> Result<Value, BoxError> + Send + Sync>;

/// Per-value validator, run after parsing and before commit.
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), BoxError> + Send + Sync>;

/// Per-option update hook, invoked after a new value is committed.
///
/// Receives the previous value (`None` when the option had neither a
/// default nor an earlier write) and the committed value. Errors are
/// routed to the registry's error handler, never back to the writer.
pub type UpdateHook =
    Arc<dyn Fn(Option<&Value>, &Value) -> Result<(), BoxError> + Send + Sync>;

/// A single option declaration.
#[derive(Clone)]
pub struct Opt {
    pub(crate) name: String,
    pub(crate) kind: ValueKind,
    pub(crate) default: Option<Value>,
    pub(crate) help: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) cli: bool,
    pub(crate) parser: Option<Parser>,
    pub(crate) validators: Vec<Validator>,
    pub(crate) on_update: Option<UpdateHook>,
}

impl Opt {
    /// New declaration with an explicit kind.
    ///
    /// The name is lowercased; validity is checked at registration time.
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Opt {
            name: name.into().trim().to_ascii_lowercase(),
            kind,
            default: None,
            help: String::new(),
            aliases: Vec::new(),
            cli: false,
            parser: None,
            validators: Vec::new(),
            on_update: None,
        }
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::Bool)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::Int)
    }

    pub fn uint(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::Uint)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::Float)
    }

    pub fn str(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::Str)
    }

    pub fn duration(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::Duration)
    }

    pub fn time(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::Time)
    }

    pub fn bool_list(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::BoolList)
    }

    pub fn int_list(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::IntList)
    }

    pub fn uint_list(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::UintList)
    }

    pub fn float_list(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::FloatList)
    }

    pub fn str_list(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::StrList)
    }

    pub fn duration_list(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::DurationList)
    }

    pub fn time_list(name: impl Into<String>) -> Self {
        Opt::new(name, ValueKind::TimeList)
    }

    /// Default committed at registration.
    ///
    /// The default passes through the same coercion and validation as any
    /// other write, so `Opt::duration("timeout").with_default(30)` yields
    /// thirty seconds rather than a kind mismatch.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Additional name this option answers to within its group.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases
            .push(alias.into().trim().to_ascii_lowercase());
        self
    }

    /// Mark the option as settable from the command line. The flag is
    /// advisory metadata for argument-aware sources; the registry itself
    /// treats such options like any other.
    pub fn with_cli(mut self, cli: bool) -> Self {
        self.cli = cli;
        self
    }

    pub fn with_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&RawValue) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Appends a validator; validators run in registration order.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn on_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&Value>, &Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn is_cli(&self) -> bool {
        self.cli
    }

    /// Parse a raw value through the custom parser or built-in coercion.
    pub(crate) fn parse(&self, raw: &RawValue) -> Result<Value, ValueError> {
        match &self.parser {
            Some(parser) => {
                let value = parser(raw).map_err(|source| ValueError::Parse {
                    name: self.name.clone(),
                    source,
                })?;
                if value.kind() != self.kind {
                    return Err(ValueError::Parse {
                        name: self.name.clone(),
                        source: format!(
                            "parser produced {} for a {} option",
                            value.kind(),
                            self.kind
                        )
                        .into(),
                    });
                }
                Ok(value)
            }
            None => Value::coerce(self.kind, raw),
        }
    }

    /// Run all validators against a parsed value.
    pub(crate) fn validate(&self, value: &Value) -> Result<(), ValueError> {
        for validator in &self.validators {
            validator(value).map_err(|source| ValueError::Invalid {
                name: self.name.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub(crate) fn parse_and_validate(&self, raw: &RawValue) -> Result<Value, ValueError> {
        let value = self.parse(raw)?;
        self.validate(&value)?;
        Ok(value)
    }

    /// Default pushed through coercion and validation, ready to commit.
    pub(crate) fn normalized_default(&self) -> Result<Option<Value>, ValueError> {
        match &self.default {
            Some(default) => {
                let value = if default.kind() == self.kind {
                    let value = default.clone();
                    self.validate(&value)?;
                    value
                } else {
                    self.parse_and_validate(&default.to_raw())?
                };
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Reject names that cannot live in the registry.
    ///
    /// Names and aliases must be non-empty, free of the `.` path separator
    /// and limited to lowercase alphanumerics, `-` and `_`.
    pub(crate) fn check_name(&self) -> Result<(), OptError> {
        check_segment(&self.name)?;
        for alias in &self.aliases {
            check_segment(alias)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opt")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

pub(crate) fn check_segment(name: &str) -> Result<(), OptError> {
    if name.is_empty() {
        return Err(OptError::InvalidName {
            name: name.to_string(),
            reason: "empty name",
        });
    }
    if name.contains('.') {
        return Err(OptError::InvalidName {
            name: name.to_string(),
            reason: "contains the path separator '.'",
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(OptError::InvalidName {
            name: name.to_string(),
            reason: "allowed characters are a-z, 0-9, '-' and '_'",
        });
    }
    Ok(())
}
