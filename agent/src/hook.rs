//! The user-supplied lifecycle contract (§4.7, §9): a capability set over
//! `{initialize, can_configure, configure, sanity_check, tear_down,
//! signaled, finalize}`. The source models this as a dynamically typed
//! object with a Reactive/Piped capability split; a statically typed
//! rendition is one trait with defaulted methods, exactly as §9 suggests
//! ("an interface with optional methods").

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use shared::model::Cluster;

/// The command line and environment a Piped hook's `configure` resolves to.
#[derive(Debug, Clone)]
pub struct Launch {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Defaults from §4.7: `damper=10s`, `grace=60s`, `sequential=false`,
/// `full_shutdown=false`, `check_every=60s`, `checks=3`.
pub trait Hook: Send + Sync {
    fn damper(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    fn full_shutdown(&self) -> bool {
        false
    }

    fn grace(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn sequential(&self) -> bool {
        false
    }

    /// `true` for a Piped hook; a bare Reactive hook never reaches C8.
    fn owns_subprocess(&self) -> bool {
        false
    }

    fn checks(&self) -> u32 {
        3
    }

    fn check_every(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn cwd(&self) -> Option<PathBuf> {
        None
    }

    fn shell(&self) -> bool {
        false
    }

    fn strict(&self) -> bool {
        false
    }

    fn initialize(&self) {}

    fn can_configure(&self, _cluster: &Cluster) -> Result<(), String> {
        Ok(())
    }

    /// Resolves the command to launch. Only called when `owns_subprocess`.
    fn configure(&self, cluster: &Cluster) -> Result<Launch, String>;

    fn sanity_check(&self, _pid: u32) -> Result<(), String> {
        Ok(())
    }

    fn tear_down(&self, _pid: u32) {}

    fn signaled(&self, _sig: i32) {}

    fn finalize(&self) {}
}

/// A generic Piped hook that launches a fixed command line, parameterized
/// per cluster. Stands in for the application-specific configure scripts
/// the spec treats as an external collaborator.
pub struct ShellHook {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub grace: Duration,
    pub damper: Duration,
    pub checks: u32,
    pub sequential: bool,
    pub full_shutdown: bool,
    pub depends_on: Vec<String>,
}

impl ShellHook {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: BTreeMap::new(),
            grace: Duration::from_secs(60),
            damper: Duration::from_secs(10),
            checks: 3,
            sequential: false,
            full_shutdown: false,
            depends_on: Vec::new(),
        }
    }
}

impl Hook for ShellHook {
    fn damper(&self) -> Duration {
        self.damper
    }

    fn depends_on(&self) -> Vec<String> {
        self.depends_on.clone()
    }

    fn full_shutdown(&self) -> bool {
        self.full_shutdown
    }

    fn grace(&self) -> Duration {
        self.grace
    }

    fn sequential(&self) -> bool {
        self.sequential
    }

    fn owns_subprocess(&self) -> bool {
        true
    }

    fn checks(&self) -> u32 {
        self.checks
    }

    fn configure(&self, _cluster: &Cluster) -> Result<Launch, String> {
        Ok(Launch {
            program: self.program.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_hook_reports_defaults_from_spec() {
        let hook = ShellHook::new("/bin/sleep", vec!["3600".to_string()]);
        assert_eq!(hook.grace(), Duration::from_secs(60));
        assert_eq!(hook.damper(), Duration::from_secs(10));
        assert_eq!(hook.checks(), 3);
        assert!(hook.owns_subprocess());
        assert!(!hook.sequential());
        assert!(!hook.full_shutdown());
    }

    #[test]
    fn configure_returns_the_fixed_command() {
        let hook = ShellHook::new("/bin/sleep", vec!["3600".to_string()]);
        let cluster = Cluster::new(Vec::new(), BTreeMap::new());
        let launch = hook.configure(&cluster).unwrap();
        assert_eq!(launch.program, "/bin/sleep");
        assert_eq!(launch.args, vec!["3600".to_string()]);
    }
}
