//! Minion key provisioning on the salt master.
//!
//! A new minion gets a key pair generated into its project directory and the
//! public key is pre-accepted by copying it into the master's PKI directory.

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::info;

use crate::io::config::SaltConfig;
use crate::io::process::{command_from_argv, run_command_attached};

/// Commands generating and pre-accepting the key pair of `name` inside `dir`.
pub fn key_commands(cfg: &SaltConfig, name: &str, dir: &Path) -> Vec<Vec<String>> {
    let dir_text = dir.display().to_string();
    let pem = dir.join(format!("{name}.pem")).display().to_string();
    let public = dir.join(format!("{name}.pub")).display().to_string();
    let accepted = cfg.master_pki_dir.join(name).display().to_string();

    let privileged = |rest: Vec<String>| -> Vec<String> {
        cfg.privileged.iter().cloned().chain(rest).collect()
    };

    vec![
        privileged(
            cfg.key_command
                .iter()
                .cloned()
                .chain([
                    format!("--gen-keys={name}"),
                    format!("--gen-keys-dir={dir_text}"),
                ])
                .collect(),
        ),
        privileged(vec!["chmod".to_string(), "644".to_string(), pem, public.clone()]),
        privileged(vec!["cp".to_string(), public, accepted]),
    ]
}

/// Run the key commands attached to the terminal (sudo may prompt).
pub fn provision_minion_keys(cfg: &SaltConfig, name: &str, dir: &Path) -> Result<()> {
    for argv in key_commands(cfg, name, dir) {
        info!(?argv, "provisioning minion key");
        let cmd = command_from_argv(&argv, std::iter::empty::<&str>())?;
        let status = run_command_attached(cmd, None)?;
        if !status.success() {
            return Err(anyhow!(
                "`{}` failed with status {:?}",
                argv.join(" "),
                status.code()
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn commands_generate_fix_modes_and_accept() {
        let cfg = SaltConfig::default();
        let commands = key_commands(&cfg, "web1", Path::new("/work/web1"));
        assert_eq!(
            commands,
            vec![
                vec![
                    "sudo",
                    "salt-key",
                    "--gen-keys=web1",
                    "--gen-keys-dir=/work/web1"
                ],
                vec![
                    "sudo",
                    "chmod",
                    "644",
                    "/work/web1/web1.pem",
                    "/work/web1/web1.pub"
                ],
                vec![
                    "sudo",
                    "cp",
                    "/work/web1/web1.pub",
                    "/etc/salt/pki/master/minions/web1"
                ],
            ]
        );
    }

    #[test]
    fn empty_privileged_prefix_runs_directly() {
        let cfg = SaltConfig {
            privileged: Vec::new(),
            master_pki_dir: PathBuf::from("/srv/pki"),
            ..SaltConfig::default()
        };
        let commands = key_commands(&cfg, "db1", Path::new("/w/db1"));
        assert_eq!(commands[0][0], "salt-key");
        assert_eq!(commands[2], vec!["cp", "/w/db1/db1.pub", "/srv/pki/db1"]);
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_stops_provisioning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = SaltConfig {
            privileged: Vec::new(),
            key_command: vec!["false".to_string()],
            master_pki_dir: temp.path().join("pki"),
            ..SaltConfig::default()
        };
        let err = provision_minion_keys(&cfg, "web1", temp.path()).unwrap_err();
        assert!(err.to_string().contains("false --gen-keys=web1"));
        assert!(!temp.path().join("pki").exists());
    }
}
