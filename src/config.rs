use crate::naming::NamingRules;
use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use regex::Regex;
use std::{env, fmt, fs, path::Path, path::PathBuf};
use tracing::info;

/// Mirrors the images listed in a remote manifest into a destination registry namespace,
/// copying only the tags the destination does not have yet.
#[derive(Debug, Parser)]
#[command(name = "image-sync", version, about)]
pub struct Cli {
    /// Remote file URL address
    #[arg(long, env = "REMOTE_URL", default_value = "http://127.0.0.1/k8s.txt")]
    pub url: String,

    /// Destination registry host
    #[arg(long, env = "HUB_LOGIN_URL", default_value = "docker.io")]
    pub login: String,

    /// Destination namespace
    #[arg(long, env = "NAMESPACE", default_value = "namespace")]
    pub namespace: String,

    /// Path of the skopeo binary
    #[arg(long, env = "SKOPEO_PATH", default_value = "skopeo")]
    pub skopeo: PathBuf,

    /// Destination credentials as user:password
    #[arg(long, env = "DEST_CREDS", hide_env_values = true)]
    pub dest_creds: Option<Credentials>,

    /// YAML file replacing the built-in naming rules
    #[arg(long, env = "NAMING_RULES")]
    pub naming_rules: Option<PathBuf>,

    /// Verify TLS certificates when fetching the manifest
    #[arg(long, env = "MANIFEST_TLS_VERIFY", default_value_t = false, action = ArgAction::Set,
          value_parser = BoolishValueParser::new())]
    pub manifest_tls_verify: bool,

    /// Verify TLS certificates of the source registries
    #[arg(long, env = "SRC_TLS_VERIFY", default_value_t = false, action = ArgAction::Set,
          value_parser = BoolishValueParser::new())]
    pub src_tls_verify: bool,

    /// Verify TLS certificates of the destination registry
    #[arg(long, env = "DEST_TLS_VERIFY", default_value_t = false, action = ArgAction::Set,
          value_parser = BoolishValueParser::new())]
    pub dest_tls_verify: bool,

    /// Copy without checking image signature policy
    #[arg(long, env = "INSECURE_POLICY", default_value_t = true, action = ArgAction::Set,
          value_parser = BoolishValueParser::new())]
    pub insecure_policy: bool,

    /// Log the missing tags without copying them
    #[arg(long, env = "DRY_RUN", action = ArgAction::SetTrue,
          value_parser = BoolishValueParser::new())]
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub manifest_url: String,
    pub destination: Destination,
    pub trust: TrustPolicy,
    pub skopeo: PathBuf,
    pub dest_creds: Option<Credentials>,
    pub naming: NamingRules,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub registry: String,
    pub namespace: String,
}

impl Destination {
    /// Full repository path of `name` inside the destination namespace.
    pub fn repository(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.registry.trim_end_matches('/'),
            self.namespace.trim_matches('/'),
            name
        )
    }
}

/// Destination registry login as `user:password`, handed to skopeo verbatim.
/// Formatting prints `<REDACTED, length N>` so a logged `Config` never shows it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Credentials {
    fn from(s: String) -> Self {
        Credentials(s)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<REDACTED, length {}>", self.0.len())
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Certificate and signature checks. The defaults trust everything, which suits
/// internal or mirrored registries; each check can be switched on separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
    pub manifest_tls_verify: bool,
    pub src_tls_verify: bool,
    pub dest_tls_verify: bool,
    pub insecure_policy: bool,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            manifest_tls_verify: false,
            src_tls_verify: false,
            dest_tls_verify: false,
            insecure_policy: true,
        }
    }
}

impl Cli {
    pub fn into_config(self) -> Result<Config> {
        let naming = match &self.naming_rules {
            Some(path) => load_naming_rules(path)?,
            None => NamingRules::default(),
        };

        Ok(Config {
            manifest_url: self.url,
            destination: Destination {
                registry: self.login,
                namespace: self.namespace,
            },
            trust: TrustPolicy {
                manifest_tls_verify: self.manifest_tls_verify,
                src_tls_verify: self.src_tls_verify,
                dest_tls_verify: self.dest_tls_verify,
                insecure_policy: self.insecure_policy,
            },
            skopeo: self.skopeo,
            dest_creds: self.dest_creds,
            naming,
            dry_run: self.dry_run,
        })
    }
}

/// Exit status for a failed argument parse. `--help` and `--version` also end up here
/// and are not failures.
pub fn parse_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() { 1 } else { 0 }
}

pub fn load_naming_rules<P: AsRef<Path>>(path: P) -> Result<NamingRules> {
    info!("Loading naming rules from file {}", path.as_ref().display());
    let yaml_str = fs::read_to_string(&path).with_context(|| {
        format!(
            "Failed to read naming rules file: {}",
            path.as_ref().display()
        )
    })?;

    let expanded = expand_env_vars(&yaml_str)?;

    let rules = serde_yaml_ng::from_str(&expanded)
        .context("Failed to parse YAML naming rules after environment variable expansion")?;

    Ok(rules)
}

/// Replaces `${VAR}` placeholders with environment variables values.
/// Returns an error naming every missing variable.
fn expand_env_vars(input: &str) -> Result<String> {
    let re =
        Regex::new(r"\$\{([^}]+)}").context("Invalid regex pattern for env var substitution")?;

    let mut missing = Vec::new();
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        env::var(var_name).unwrap_or_else(|_| {
            missing.push(var_name.to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable: {}", missing.join(", "));
    }

    Ok(result.into_owned())
}
