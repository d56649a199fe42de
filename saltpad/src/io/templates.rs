//! Vagrantfile templates and minion configurations.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use minijinja::Environment;
use tracing::debug;

pub const VAGRANTFILE_TEMPLATE: &str = "Vagrantfile.template";
pub const MINION_CONF_DIR: &str = "minions_configuration";

/// Functions minijinja provides as globals; never prompted for.
const BUILTIN_GLOBALS: &[&str] = &["range", "dict", "namespace", "debug", "loop"];

/// What a templates directory contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDir {
    pub vagrantfile: Option<PathBuf>,
    /// `None` when `minions_configuration/` is absent.
    pub minion_confs: Option<BTreeMap<String, PathBuf>>,
}

/// Look for `Vagrantfile.template` and `minions_configuration/*` in `dir`.
pub fn discover_templates(dir: &Path) -> Result<TemplateDir> {
    let vagrantfile = dir.join(VAGRANTFILE_TEMPLATE);
    let vagrantfile = vagrantfile.is_file().then_some(vagrantfile);

    let conf_dir = dir.join(MINION_CONF_DIR);
    let minion_confs = if conf_dir.is_dir() {
        let mut confs = BTreeMap::new();
        for entry in
            fs::read_dir(&conf_dir).with_context(|| format!("read {}", conf_dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            confs.insert(name, path);
        }
        Some(confs)
    } else {
        None
    };

    debug!(dir = %dir.display(), vagrantfile = ?vagrantfile, "templates discovered");
    Ok(TemplateDir {
        vagrantfile,
        minion_confs,
    })
}

/// Top-level variables the template reads without defining them.
pub fn undeclared_variables(source: &str) -> Result<BTreeSet<String>> {
    let env = Environment::new();
    let template = env
        .template_from_str(source)
        .context("parse Vagrantfile template")?;
    Ok(template
        .undeclared_variables(false)
        .into_iter()
        .filter(|name| !BUILTIN_GLOBALS.contains(&name.as_str()))
        .collect())
}

pub fn render_vagrantfile(source: &str, variables: &BTreeMap<String, String>) -> Result<String> {
    let env = Environment::new();
    let template = env
        .template_from_str(source)
        .context("parse Vagrantfile template")?;
    let mut rendered = template
        .render(variables)
        .context("render Vagrantfile template")?;
    if source.ends_with('\n') && !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}

/// Ask for every variable in `missing` not already in `variables` (`name: `).
pub fn prompt_missing<R: BufRead, W: Write>(
    missing: &BTreeSet<String>,
    variables: &mut BTreeMap<String, String>,
    input: &mut R,
    output: &mut W,
) -> Result<()> {
    for name in missing {
        if variables.contains_key(name) {
            continue;
        }
        write!(output, "{name}: ")?;
        output.flush()?;
        let mut line = String::new();
        let read = input.read_line(&mut line).context("read template variable")?;
        if read == 0 {
            return Err(anyhow!("no value given for template variable {name:?}"));
        }
        variables.insert(name.clone(), line.trim_end_matches(['\r', '\n']).to_string());
    }
    Ok(())
}
