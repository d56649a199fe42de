//! Decoding of salt state step identifiers.
//!
//! Salt keys every entry of a highstate return with a compound id such as
//! `pkg_|-nginx_|-nginx_|-installed`. The four parts are the state module, the
//! declaration id, the `name` argument and the state function.

use std::fmt;

use crate::error::FormatError;

/// A decoded step identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepId {
    pub module: String,
    pub id: String,
    pub name: String,
    pub function: String,
}

impl StepId {
    /// Decode a raw step id.
    ///
    /// `_|` and then `|-` are collapsed to `|` before splitting, so both the
    /// salt form (`mod_|-id_|-name_|-fun`) and the short form
    /// (`mod_|id|-name|fun`) decode to the same four parts.
    pub fn parse(raw: &str) -> Result<Self, FormatError> {
        let normalized = raw.replace("_|", "|").replace("|-", "|");
        let parts: Vec<&str> = normalized.split('|').collect();
        let [module, id, name, function] = parts.as_slice() else {
            return Err(FormatError::StepId {
                raw: raw.to_string(),
                parts: parts.len(),
            });
        };
        Ok(Self {
            module: (*module).to_string(),
            id: (*id).to_string(),
            name: (*name).to_string(),
            function: (*function).to_string(),
        })
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}: '{}' [id '{}']:",
            self.module, self.function, self.name, self.id
        )
    }
}
