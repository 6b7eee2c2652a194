// Discovery sentinel: the per-run keyword that tags introspection responses.
//
// Generation, matching and parsing of sentinel lines happen only here.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;

use crate::error::DefinitionError;

const KEYWORD_PREFIX: &str = "__ld_";
const KEYWORD_RANDOM_LEN: usize = 5;

/// One decoded introspection response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel {
    keyword: String,
}

impl Sentinel {
    /// Fresh keyword of the form `__ld_XXXXX:`.
    pub fn generate() -> Self {
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(KEYWORD_RANDOM_LEN)
            .map(char::from)
            .collect();
        Self { keyword: format!("{KEYWORD_PREFIX}{random}:") }
    }

    pub fn as_str(&self) -> &str {
        &self.keyword
    }

    pub fn matches(&self, line: &str) -> bool {
        line.trim_start().starts_with(&self.keyword)
    }

    /// Decode `<keyword>name=<json>`. `None` if the line carries another keyword.
    pub fn parse(&self, line: &str) -> Option<Result<Definition, DefinitionError>> {
        let body = line.trim().strip_prefix(&self.keyword)?;
        Some(parse_body(body))
    }

    /// Script that prints one sentinel line per name with the own property
    /// names of the value at that path under `global`, or `[]`.
    pub fn introspection_command(&self, names: &[String]) -> String {
        let quoted: Vec<String> =
            names.iter().map(|name| Value::String(name.clone()).to_string()).collect();
        format!(
            "[{}].map(w=>\"{}\"+w+\"=\"+JSON.stringify(_.get(global,w)?\
             Object.getOwnPropertyNames(_.get(global,w)):[])).join(\"\\n\")",
            quoted.join(","),
            self.keyword
        )
    }
}

fn parse_body(body: &str) -> Result<Definition, DefinitionError> {
    let (name, data) = body.split_once('=').ok_or(DefinitionError::MissingSeparator)?;
    let value: Value = serde_json::from_str(data)
        .map_err(|source| DefinitionError::Decode { data: data.to_string(), source })?;

    let properties = match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => Ok(text),
                other => Err(DefinitionError::Shape(other.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Value::Object(map) => map.into_iter().map(|(key, _)| key).collect(),
        other => return Err(DefinitionError::Shape(other.to_string())),
    };
    Ok(Definition { name: name.to_string(), properties })
}
