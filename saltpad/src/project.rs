//! `register_dir` and `create_vm`: template registration and VM project bootstrap.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::error::BootstrapError;
use crate::io::salt::SaltClient;
use crate::io::state::LocalState;
use crate::io::templates::{
    TemplateDir, discover_templates, prompt_missing, render_vagrantfile, undeclared_variables,
};
use crate::io::vagrant::VmDriver;

/// Key `register_dir` stores the Vagrantfile template under.
pub const DEFAULT_VAGRANTFILE: &str = "default";
/// File name of the minion configuration inside a project directory.
pub const MINION_CONF_FILE: &str = "minion";
pub const VAGRANTFILE: &str = "Vagrantfile";

/// Register the templates found in `dir` into `state`.
///
/// Returns what was found so the caller can report missing pieces.
#[instrument(skip(state))]
pub fn register_dir(state: &mut LocalState, dir: &Path) -> Result<TemplateDir> {
    let dir = fs::canonicalize(dir).with_context(|| format!("resolve {}", dir.display()))?;
    let found = discover_templates(&dir)?;
    if let Some(template) = &found.vagrantfile {
        state
            .vagrantfiles
            .insert(DEFAULT_VAGRANTFILE.to_string(), template.clone());
    }
    if let Some(confs) = &found.minion_confs {
        for (name, path) in confs {
            state.minion_conf.insert(name.clone(), path.clone());
        }
    }
    info!(
        vagrantfile = found.vagrantfile.is_some(),
        minion_confs = found.minion_confs.as_ref().map_or(0, BTreeMap::len),
        "templates registered"
    );
    Ok(found)
}

/// Pick one registered entry: the requested one, or the only one.
pub fn choose_registered<'a>(
    registered: &'a BTreeMap<String, PathBuf>,
    requested: Option<&str>,
    kind: &'static str,
    flag: &'static str,
) -> Result<(&'a str, &'a Path), BootstrapError> {
    if registered.is_empty() {
        return Err(BootstrapError::NothingRegistered { kind });
    }
    if let Some(name) = requested {
        return registered
            .get_key_value(name)
            .map(|(key, path)| (key.as_str(), path.as_path()))
            .ok_or_else(|| BootstrapError::UnknownChoice {
                kind,
                name: name.to_string(),
            });
    }
    let mut entries = registered.iter();
    match (entries.next(), entries.next()) {
        (Some((key, path)), None) => Ok((key.as_str(), path.as_path())),
        _ => Err(BootstrapError::Ambiguous {
            kind,
            flag,
            choices: registered.keys().cloned().collect::<Vec<_>>().join(", "),
        }),
    }
}

/// Inputs of `create_vm`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateVmRequest {
    pub project_name: String,
    pub vagrantfile: Option<String>,
    pub minion_conf: Option<String>,
    /// Template variables given on the command line.
    pub variables: BTreeMap<String, String>,
    /// Directory the project directory is created in.
    pub base_dir: PathBuf,
}

/// Create a VM project directory and register it as a minion.
///
/// `provision_keys` is called with the project name and directory once the
/// directory is populated; the minion is registered only if it succeeds.
/// On failure the partial directory is removed. The caller persists `state`.
pub fn create_vm<R, W, K>(
    state: &mut LocalState,
    request: &CreateVmRequest,
    input: &mut R,
    output: &mut W,
    provision_keys: K,
) -> Result<PathBuf>
where
    R: BufRead,
    W: Write,
    K: FnOnce(&str, &Path) -> Result<()>,
{
    let name = request.project_name.as_str();
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(anyhow!("invalid project name {name:?}"));
    }

    let (conf_name, minion_conf) = choose_registered(
        &state.minion_conf,
        request.minion_conf.as_deref(),
        "minion configuration",
        "minion-conf",
    )?;
    let project_dir = request.base_dir.join(name);
    if project_dir.exists() {
        return Err(BootstrapError::ProjectExists { path: project_dir }.into());
    }
    let (template_name, template_path) = choose_registered(
        &state.vagrantfiles,
        request.vagrantfile.as_deref(),
        "Vagrantfile",
        "vagrantfile",
    )?;
    debug!(conf_name, template_name, "project sources chosen");

    let source = fs::read_to_string(template_path)
        .with_context(|| format!("read {}", template_path.display()))?;
    let missing = undeclared_variables(&source)?;
    let mut variables = request.variables.clone();
    variables.insert("project_name".to_string(), name.to_string());
    prompt_missing(&missing, &mut variables, input, output)?;
    let rendered = render_vagrantfile(&source, &variables)?;

    fs::create_dir(&project_dir)
        .with_context(|| format!("create {}", project_dir.display()))?;
    let populated = populate_project(&project_dir, minion_conf, &rendered)
        .and_then(|()| provision_keys(name, &project_dir));
    if let Err(err) = populated {
        if let Err(cleanup) = fs::remove_dir_all(&project_dir) {
            warn!(
                dir = %project_dir.display(),
                error = %cleanup,
                "could not remove partial project"
            );
        }
        return Err(err);
    }

    state.minions.insert(name.to_string(), project_dir.clone());
    info!(project = name, dir = %project_dir.display(), "minion registered");
    Ok(project_dir)
}

fn populate_project(project_dir: &Path, minion_conf: &Path, vagrantfile: &str) -> Result<()> {
    fs::copy(minion_conf, project_dir.join(MINION_CONF_FILE))
        .with_context(|| format!("copy {}", minion_conf.display()))?;
    let target = project_dir.join(VAGRANTFILE);
    fs::write(&target, vagrantfile).with_context(|| format!("write {}", target.display()))?;
    Ok(())
}

/// What `status` prints for one registered minion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinionStatus {
    pub name: String,
    pub vagrant: String,
    /// Answered `test.ping` with `true`.
    pub salt_up: bool,
}

impl MinionStatus {
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("{}:", self.name),
            format!("    vagrant status: {}", self.vagrant),
            format!(
                "    saltstack status: {}",
                if self.salt_up { "up" } else { "down" }
            ),
        ]
    }
}

pub fn minion_statuses<C: SaltClient, V: VmDriver>(
    state: &LocalState,
    salt: &C,
    vms: &V,
) -> Result<Vec<MinionStatus>> {
    state
        .minions
        .keys()
        .map(|name| {
            let vagrant = vms.status(name)?;
            let salt_up = salt.ping(name)?.get(name).copied().unwrap_or(false);
            Ok(MinionStatus {
                name: name.clone(),
                vagrant,
                salt_up,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        ScriptedSaltClient, ScriptedVmDriver, template_dir, write_minion_conf,
    };
    use std::io::Cursor;

    const TEMPLATE: &str = "name={{ project_name }}\nbox={{ box }}\n";

    fn request(base: &Path, name: &str) -> CreateVmRequest {
        CreateVmRequest {
            project_name: name.to_string(),
            base_dir: base.to_path_buf(),
            ..CreateVmRequest::default()
        }
    }

    #[test]
    fn register_dir_records_templates() {
        let templates = template_dir(TEMPLATE).expect("templates");
        let mut state = LocalState::default();
        let found = register_dir(&mut state, templates.path()).expect("register");

        assert!(found.vagrantfile.is_some());
        let root = fs::canonicalize(templates.path()).expect("canonical");
        assert_eq!(
            state.vagrantfiles[DEFAULT_VAGRANTFILE],
            root.join("Vagrantfile.template")
        );
        assert_eq!(
            state.minion_conf["dev"],
            root.join("minions_configuration").join("dev")
        );
    }

    #[test]
    fn register_dir_tolerates_missing_pieces() {
        let empty = tempfile::tempdir().expect("tempdir");
        let mut state = LocalState::default();
        let found = register_dir(&mut state, empty.path()).expect("register");
        assert_eq!(found, TemplateDir::default());
        assert_eq!(state, LocalState::default());
    }

    #[test]
    fn choose_requires_flag_when_ambiguous() {
        let registered = BTreeMap::from([
            ("dev".to_string(), PathBuf::from("/t/dev")),
            ("prod".to_string(), PathBuf::from("/t/prod")),
        ]);
        let err = choose_registered(&registered, None, "minion configuration", "minion-conf")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "More than one minion configuration registered (dev, prod), pick one with --minion-conf"
        );
        let (name, path) =
            choose_registered(&registered, Some("prod"), "minion configuration", "minion-conf")
                .expect("choice");
        assert_eq!((name, path), ("prod", Path::new("/t/prod")));
        assert!(matches!(
            choose_registered(&registered, Some("qa"), "minion configuration", "minion-conf"),
            Err(BootstrapError::UnknownChoice { .. })
        ));
    }

    #[test]
    fn create_vm_without_registration_fails() {
        let work = tempfile::tempdir().expect("tempdir");
        let mut state = LocalState::default();
        let err = create_vm(
            &mut state,
            &request(work.path(), "web1"),
            &mut Cursor::new(""),
            &mut Vec::new(),
            |_, _| Ok(()),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "You must register at least one minion configuration, use register_dir command to do so."
        );
        assert!(!work.path().join("web1").exists());
    }

    #[test]
    fn create_vm_renders_copies_and_registers() {
        let templates = template_dir(TEMPLATE).expect("templates");
        let work = tempfile::tempdir().expect("tempdir");
        let mut state = LocalState::default();
        register_dir(&mut state, templates.path()).expect("register");

        let mut provisioned = Vec::new();
        let mut prompts = Vec::new();
        let dir = create_vm(
            &mut state,
            &request(work.path(), "web1"),
            &mut Cursor::new("debian/bookworm64\n"),
            &mut prompts,
            |name, dir| {
                provisioned.push((name.to_string(), dir.to_path_buf()));
                Ok(())
            },
        )
        .expect("create");

        assert_eq!(dir, work.path().join("web1"));
        assert_eq!(String::from_utf8(prompts).expect("utf8"), "box: ");
        assert_eq!(
            fs::read_to_string(dir.join(VAGRANTFILE)).expect("vagrantfile"),
            "name=web1\nbox=debian/bookworm64\n"
        );
        assert_eq!(
            fs::read_to_string(dir.join(MINION_CONF_FILE)).expect("minion"),
            "master: salt.local\n"
        );
        assert_eq!(provisioned, vec![("web1".to_string(), dir.clone())]);
        assert_eq!(state.minions["web1"], dir);
    }

    #[test]
    fn create_vm_refuses_existing_directory() {
        let templates = template_dir(TEMPLATE).expect("templates");
        let work = tempfile::tempdir().expect("tempdir");
        fs::create_dir(work.path().join("web1")).expect("existing");
        let mut state = LocalState::default();
        register_dir(&mut state, templates.path()).expect("register");

        let err = create_vm(
            &mut state,
            &request(work.path(), "web1"),
            &mut Cursor::new(""),
            &mut Vec::new(),
            |_, _| Ok(()),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BootstrapError>(),
            Some(BootstrapError::ProjectExists { .. })
        ));
        assert!(state.minions.is_empty());
    }

    #[test]
    fn create_vm_uses_set_values_and_chosen_conf() {
        let templates = template_dir(TEMPLATE).expect("templates");
        write_minion_conf(templates.path(), "prod", "master: salt.prod\n").expect("conf");
        let work = tempfile::tempdir().expect("tempdir");
        let mut state = LocalState::default();
        register_dir(&mut state, templates.path()).expect("register");

        let mut req = request(work.path(), "db1");
        req.minion_conf = Some("prod".to_string());
        req.variables
            .insert("box".to_string(), "ubuntu/noble64".to_string());
        let mut prompts = Vec::new();
        let dir = create_vm(
            &mut state,
            &req,
            &mut Cursor::new(""),
            &mut prompts,
            |_, _| Ok(()),
        )
        .expect("create");

        assert!(prompts.is_empty());
        assert_eq!(
            fs::read_to_string(dir.join(MINION_CONF_FILE)).expect("minion"),
            "master: salt.prod\n"
        );
        assert!(
            fs::read_to_string(dir.join(VAGRANTFILE))
                .expect("vagrantfile")
                .contains("box=ubuntu/noble64")
        );
    }

    #[test]
    fn failed_key_provisioning_leaves_minion_unregistered() {
        let templates = template_dir(TEMPLATE).expect("templates");
        let work = tempfile::tempdir().expect("tempdir");
        let mut state = LocalState::default();
        register_dir(&mut state, templates.path()).expect("register");

        let mut req = request(work.path(), "web1");
        req.variables.insert("box".to_string(), "b".to_string());
        let err = create_vm(
            &mut state,
            &req,
            &mut Cursor::new(""),
            &mut Vec::new(),
            |_, _| Err(anyhow!("salt-key failed")),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "salt-key failed");
        assert!(state.minions.is_empty());
        assert!(!work.path().join("web1").exists());

        let dir = create_vm(
            &mut state,
            &req,
            &mut Cursor::new(""),
            &mut Vec::new(),
            |_, _| Ok(()),
        )
        .expect("retry after cleanup");
        assert!(dir.join(VAGRANTFILE).is_file());
        assert_eq!(state.minions.get("web1"), Some(&dir));
    }

    #[test]
    fn statuses_combine_vagrant_and_salt() {
        let mut state = LocalState::default();
        state
            .minions
            .insert("db1".to_string(), PathBuf::from("/work/db1"));
        state
            .minions
            .insert("web1".to_string(), PathBuf::from("/work/web1"));
        let salt = ScriptedSaltClient::new()
            .with_node("web1", true)
            .with_node("db1", false);
        let vms = ScriptedVmDriver::new().with_status("db1", "poweroff");

        let statuses = minion_statuses(&state, &salt, &vms).expect("statuses");
        assert_eq!(
            statuses[0].lines(),
            vec![
                "db1:",
                "    vagrant status: poweroff",
                "    saltstack status: down"
            ]
        );
        assert_eq!(statuses[1].name, "web1");
        assert!(statuses[1].salt_up);
        assert_eq!(statuses[1].vagrant, "running");
    }
}
