use async_trait::async_trait;

use crate::errors::Result;
use crate::errors::SourceError;
use crate::opt::RawValue;
use crate::source::DataSet;
use crate::source::Source;

/// Reads options from environment variables.
///
/// Variables are matched by prefix and mapped onto dotted keys: with the
/// prefix `APP`, `APP__SERVER__MAX_CONN=100` becomes `server.max_conn`.
/// The double underscore separates path segments so option names keep
/// their single underscores. An empty prefix matches every variable.
///
/// The environment has no change feed, so this source never watches.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        EnvSource {
            prefix: prefix
                .into()
                .trim()
                .trim_matches('_')
                .to_ascii_uppercase(),
        }
    }
}

#[async_trait]
impl Source for EnvSource {
    fn id(&self) -> String {
        format!("env:{}", self.prefix)
    }

    async fn read(&self) -> Result<DataSet> {
        let marker = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}__", self.prefix)
        };
        let mut map = serde_json::Map::new();
        for (key, value) in std::env::vars_os() {
            let (Some(key), Some(value)) = (key.to_str(), value.to_str()) else {
                continue;
            };
            let Some(rest) = key.strip_prefix(&marker) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let dotted = rest
                .split("__")
                .map(str::to_ascii_lowercase)
                .collect::<Vec<_>>()
                .join(".");
            map.insert(dotted, RawValue::String(value.to_string()));
        }
        let data = serde_json::to_vec(&RawValue::Object(map)).map_err(|e| SourceError::Read {
            id: self.id(),
            source: e.into(),
        })?;
        Ok(DataSet::new(self.id(), "json", data))
    }
}
