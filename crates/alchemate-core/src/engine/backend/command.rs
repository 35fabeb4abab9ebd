use super::{BackendError, SimulationBackend};
use crate::core::config::SimulationConfig;
use crate::core::system::SystemHandle;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// File the configuration is written to before the backend program is launched.
pub const BACKEND_CONFIG_FILE: &str = "alchemate_backend.toml";

const SYSTEM_PLACEHOLDER: &str = "{system}";
const CONFIG_PLACEHOLDER: &str = "{config}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Runs the simulation engine as an external program.
///
/// Arguments may contain `{system}`, `{config}` and `{output}` placeholders, which are replaced
/// by the system file path, the path of the TOML configuration written for this launch, and
/// the output directory.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    argv: Vec<String>,
}

impl CommandBackend {
    pub fn new(argv: Vec<String>) -> Result<Self, BackendError> {
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(BackendError::Input("backend command is empty".to_string()));
        }
        Ok(Self { argv })
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    fn render_argv(&self, system: &Path, config_path: &Path, output: &Path) -> Vec<String> {
        self.argv
            .iter()
            .map(|arg| {
                arg.replace(SYSTEM_PLACEHOLDER, &system.to_string_lossy())
                    .replace(CONFIG_PLACEHOLDER, &config_path.to_string_lossy())
                    .replace(OUTPUT_PLACEHOLDER, &output.to_string_lossy())
            })
            .collect()
    }

    fn write_config(&self, config: &SimulationConfig) -> Result<std::path::PathBuf, BackendError> {
        let output = &config.output_directory;
        std::fs::create_dir_all(output).map_err(|e| {
            BackendError::Input(format!(
                "cannot create output directory '{}': {}",
                output.display(),
                e
            ))
        })?;
        let content = toml::to_string_pretty(config)
            .map_err(|e| BackendError::Input(format!("cannot serialize configuration: {}", e)))?;
        let path = output.join(BACKEND_CONFIG_FILE);
        std::fs::write(&path, content).map_err(|e| {
            BackendError::Input(format!("cannot write '{}': {}", path.display(), e))
        })?;
        Ok(path)
    }
}

impl SimulationBackend for CommandBackend {
    fn name(&self) -> &str {
        self.program()
    }

    fn run(&self, system: &SystemHandle, config: &SimulationConfig) -> Result<(), BackendError> {
        let config_path = self.write_config(config)?;
        let mut argv = self.render_argv(system.path(), &config_path, &config.output_directory);
        let program = argv.remove(0);
        debug!(program = %program, args = ?argv, "Spawning backend process.");

        let output = Command::new(&program)
            .args(&argv)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| BackendError::Launch {
                program: program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(program = %program, "Backend output:\n{}", stdout.trim_end());
        }

        if !output.status.success() {
            return Err(BackendError::Process {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfigBuilder;
    use tempfile::tempdir;

    fn config_in(output: &Path) -> SimulationConfig {
        SimulationConfigBuilder::new()
            .output_directory(output)
            .build()
            .unwrap()
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            CommandBackend::new(vec![]),
            Err(BackendError::Input(_))
        ));
        assert!(matches!(
            CommandBackend::new(vec!["  ".to_string()]),
            Err(BackendError::Input(_))
        ));
    }

    #[test]
    fn placeholders_are_substituted() {
        let backend = CommandBackend::new(vec![
            "somd2".to_string(),
            "{system}".to_string(),
            "--config={config}".to_string(),
            "--output-directory".to_string(),
            "{output}".to_string(),
        ])
        .unwrap();

        let argv = backend.render_argv(
            Path::new("merged.s3"),
            Path::new("out/alchemate_backend.toml"),
            Path::new("out"),
        );

        assert_eq!(
            argv,
            vec![
                "somd2",
                "merged.s3",
                "--config=out/alchemate_backend.toml",
                "--output-directory",
                "out",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn successful_process_writes_config_and_returns_ok() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let backend = CommandBackend::new(vec!["true".to_string()]).unwrap();

        backend.run(&SystemHandle::new("merged.s3"), &config).unwrap();

        let written = std::fs::read_to_string(dir.path().join(BACKEND_CONFIG_FILE)).unwrap();
        let parsed: SimulationConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed, config);
    }

    #[cfg(unix)]
    #[test]
    fn failing_process_reports_stderr() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let backend = CommandBackend::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo 'engine exploded' >&2; exit 3".to_string(),
        ])
        .unwrap();

        let result = backend.run(&SystemHandle::new("merged.s3"), &config);

        match result {
            Err(BackendError::Process { stderr, .. }) => assert_eq!(stderr, "engine exploded"),
            other => panic!("expected a process error, got {:?}", other),
        }
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let backend =
            CommandBackend::new(vec!["alchemate-no-such-backend-binary".to_string()]).unwrap();

        let result = backend.run(&SystemHandle::new("merged.s3"), &config);
        assert!(matches!(result, Err(BackendError::Launch { .. })));
    }
}
