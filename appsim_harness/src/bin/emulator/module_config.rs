//! Module definition files.
//!
//! A definition is a line-oriented `key: value` file; `#` starts a comment.
//! Only two keys are interpreted:
//!
//! ```text
//! application: shop      # must match --app-id when present
//! module: worker         # must match --module, defaults to "default"
//! ```

use anyhow::{bail, Context, Result};
use appsim_env::DEFAULT_MODULE;
use std::collections::BTreeMap;
use std::path::Path;

/// A parsed module definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDefinition {
    pub application: Option<String>,
    pub module: String,
    pub entries: BTreeMap<String, String>,
}

impl ModuleDefinition {
    /// Reads and parses a definition file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("module definition not readable: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid module definition: {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (n, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                bail!("line {}: expected `key: value`", n + 1);
            };
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }
        if entries.is_empty() {
            bail!("no definitions");
        }

        Ok(Self {
            application: entries.get("application").cloned(),
            module: entries
                .get("module")
                .cloned()
                .unwrap_or_else(|| DEFAULT_MODULE.to_string()),
            entries,
        })
    }

    /// Checks the definition against the instance being started.
    pub fn check(&self, app_id: &str, module: &str) -> Result<()> {
        if let Some(application) = &self.application {
            if application != app_id {
                bail!("definition is for application {:?}, started as {:?}", application, app_id);
            }
        }
        if self.module != module {
            bail!("definition is for module {:?}, started as {:?}", self.module, module);
        }
        Ok(())
    }
}
