//! saltpad: bootstrap vagrant minions and deploy salt states on them.
//!
//! Registered templates and minions live in `~/.saltpad.json`; settings in
//! `<config dir>/saltpad/config.toml`. Deployment reports go to stdout,
//! errors to stderr, and every failure exits with status 1.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use saltpad::console::{
    Line, Tone, print_error, print_event, print_info, print_lines, print_success, print_warning,
    state_returns_lines,
};
use saltpad::deploy::{DeployOptions, run_deploy};
use saltpad::exit_codes;
use saltpad::io::config::{SaltpadConfig, default_config_path, load_config};
use saltpad::io::keys::provision_minion_keys;
use saltpad::io::salt::{SaltCli, SaltClient, StateTarget};
use saltpad::io::state::{LocalState, default_state_path, load_state, write_state};
use saltpad::io::templates::{MINION_CONF_DIR, VAGRANTFILE_TEMPLATE};
use saltpad::io::vagrant::{VagrantCli, VmAction, VmDriver};
use saltpad::logging;
use saltpad::project::{CreateVmRequest, create_vm, minion_statuses, register_dir};

#[derive(Parser)]
#[command(
    name = "saltpad",
    version,
    about = "Bootstrap vagrant minions and deploy salt states on them"
)]
struct Cli {
    /// Local state file with registered templates and minions.
    #[arg(long, global = true, env = "SALTPAD_STATE")]
    state_file: Option<PathBuf>,

    /// Settings file (TOML).
    #[arg(long, global = true, env = "SALTPAD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register the Vagrantfile template and minion configurations found in DIRECTORY.
    #[command(name = "register_dir")]
    RegisterDir { directory: PathBuf },
    /// Create a vagrant project for a new minion and pre-accept its key.
    #[command(name = "create_vm")]
    CreateVm {
        project_name: String,
        /// Registered Vagrantfile template to use.
        #[arg(long)]
        vagrantfile: Option<String>,
        /// Registered minion configuration to use.
        #[arg(long)]
        minion_conf: Option<String>,
        /// Template variable, skips the prompt for KEY.
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        set: Vec<(String, String)>,
    },
    /// Show vagrant and salt status of every registered minion.
    Status,
    /// `vagrant up` a minion.
    Up { project_name: String },
    /// `vagrant halt` a minion.
    Halt { project_name: String },
    /// `vagrant destroy` a minion.
    Destroy { project_name: String },
    /// `vagrant provision` a minion.
    Provision { project_name: String },
    /// `vagrant ssh` into a minion.
    Ssh { project_name: String },
    /// Run the highstate on every minion matching TARGET, one at a time.
    Deploy {
        /// Roll back (or recreate) each VM before applying.
        #[arg(long)]
        clean: bool,
        target: String,
    },
    /// Run the health-check state on TARGET.
    Healthchecks { target: String },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            print_error(&format!("{err:#}"));
            exit_codes::FAILURE
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let state_path = match cli.state_file {
        Some(path) => path,
        None => default_state_path()?,
    };
    let cfg = load_config(&config_path)?;
    let mut state = load_state(&state_path)?;

    match cli.command {
        Command::RegisterDir { directory } => {
            cmd_register_dir(&mut state, &directory)?;
            write_state(&state_path, &state)
        }
        Command::CreateVm {
            project_name,
            vagrantfile,
            minion_conf,
            set,
        } => {
            let request = CreateVmRequest {
                project_name,
                vagrantfile,
                minion_conf,
                variables: set.into_iter().collect(),
                base_dir: std::env::current_dir().context("resolve current directory")?,
            };
            let dir = create_vm(
                &mut state,
                &request,
                &mut io::stdin().lock(),
                &mut io::stdout(),
                |name, dir| provision_minion_keys(&cfg.salt, name, dir),
            )?;
            write_state(&state_path, &state)?;
            print_success(&format!(
                "Minion {} created in {}",
                request.project_name,
                dir.display()
            ));
            Ok(())
        }
        Command::Status => cmd_status(&cfg, &state),
        Command::Up { project_name } => cmd_vagrant(&cfg, &state, &project_name, VmAction::Up),
        Command::Halt { project_name } => {
            cmd_vagrant(&cfg, &state, &project_name, VmAction::Halt)
        }
        Command::Destroy { project_name } => {
            cmd_vagrant(&cfg, &state, &project_name, VmAction::Destroy)
        }
        Command::Provision { project_name } => {
            cmd_vagrant(&cfg, &state, &project_name, VmAction::Provision)
        }
        Command::Ssh { project_name } => cmd_vagrant(&cfg, &state, &project_name, VmAction::Ssh),
        Command::Deploy { clean, target } => {
            let salt = SaltCli::from_config(&cfg);
            let vms = VagrantCli::new(&cfg, state.minions.clone());
            let options = DeployOptions::from_config(&cfg, clean);
            run_deploy(&salt, &vms, &target, &options, print_event)?;
            Ok(())
        }
        Command::Healthchecks { target } => {
            let salt = SaltCli::from_config(&cfg);
            let state_target = StateTarget::Sls(cfg.healthcheck_state.clone());
            let returns = salt.run_state(&target, &state_target, cfg.apply_timeout_secs)?;
            print_lines(&state_returns_lines("Health check result:", &returns));
            Ok(())
        }
    }
}

fn cmd_register_dir(state: &mut LocalState, directory: &std::path::Path) -> Result<()> {
    print_info(&format!("Looking in {} for templates", directory.display()));
    let found = register_dir(state, directory)?;

    match &found.vagrantfile {
        Some(path) => print_info(&format!("Found a Vagrantfile template: {}", path.display())),
        None => print_warning(&format!(
            "No Vagrantfile template found: {}",
            directory.join(VAGRANTFILE_TEMPLATE).display()
        )),
    }
    match &found.minion_confs {
        Some(confs) => {
            for path in confs.values() {
                print_info(&format!("Found minion conf: {}", path.display()));
            }
        }
        None => print_warning(&format!(
            "No minion configuration directory found: {}",
            directory.join(MINION_CONF_DIR).display()
        )),
    }
    Ok(())
}

fn cmd_status(cfg: &SaltpadConfig, state: &LocalState) -> Result<()> {
    let salt = SaltCli::from_config(cfg);
    let vms = VagrantCli::new(cfg, state.minions.clone());
    for status in minion_statuses(state, &salt, &vms)? {
        let lines: Vec<Line> = status
            .lines()
            .into_iter()
            .map(|text| Line::new(Tone::Plain, text))
            .collect();
        print_lines(&lines);
    }
    Ok(())
}

fn cmd_vagrant(
    cfg: &SaltpadConfig,
    state: &LocalState,
    project_name: &str,
    action: VmAction,
) -> Result<()> {
    state.minion_path(project_name)?;
    let vms = VagrantCli::new(cfg, state.minions.clone());
    print_info(&format!("Execute vagrant {action} on minion {project_name}"));
    vms.run_action(project_name, action)?;
    print_info("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_deploy_with_clean() {
        let cli = Cli::parse_from(["saltpad", "deploy", "--clean", "web*"]);
        assert!(matches!(
            cli.command,
            Command::Deploy { clean: true, ref target } if target == "web*"
        ));
    }

    #[test]
    fn parse_underscored_subcommands() {
        let cli = Cli::parse_from(["saltpad", "register_dir", "./templates"]);
        assert!(matches!(cli.command, Command::RegisterDir { .. }));

        let cli = Cli::parse_from([
            "saltpad",
            "create_vm",
            "web1",
            "--minion-conf",
            "dev",
            "--set",
            "box=debian/bookworm64",
        ]);
        match cli.command {
            Command::CreateVm {
                project_name,
                minion_conf,
                set,
                vagrantfile,
            } => {
                assert_eq!(project_name, "web1");
                assert_eq!(minion_conf.as_deref(), Some("dev"));
                assert_eq!(vagrantfile, None);
                assert_eq!(
                    set,
                    vec![("box".to_string(), "debian/bookworm64".to_string())]
                );
            }
            _ => panic!("expected create_vm"),
        }
    }

    #[test]
    fn global_paths_follow_subcommand() {
        let cli = Cli::parse_from(["saltpad", "status", "--state-file", "/tmp/state.json"]);
        assert_eq!(cli.state_file, Some(PathBuf::from("/tmp/state.json")));
    }

    #[test]
    fn key_val_requires_equals() {
        assert_eq!(
            parse_key_val("a=b=c"),
            Ok(("a".to_string(), "b=c".to_string()))
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn missing_project_name_is_rejected() {
        assert!(Cli::try_parse_from(["saltpad", "up"]).is_err());
    }
}
