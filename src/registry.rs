use crate::config::{Config, Credentials};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

static DOCKER_TRANSPORT: &str = "docker://";

/// Tag listing as printed by `skopeo list-tags`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TagList {
    #[serde(rename = "Repository", default)]
    pub repository: String,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
}

/// Which end of the mirror a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

/// The only way the sync talks to registries.
pub trait RegistryClient {
    async fn list_tags(&self, reference: &str, side: Side) -> Result<TagList>;

    /// Copies `source:tag` to `destination:tag`.
    async fn copy_tag(&self, source: &str, destination: &str, tag: &str) -> Result<()>;
}

/// Runs the skopeo CLI for every registry operation.
pub struct SkopeoClient {
    binary: PathBuf,
    src_tls_verify: bool,
    dest_tls_verify: bool,
    insecure_policy: bool,
    dest_creds: Option<Credentials>,
}

impl SkopeoClient {
    pub fn new(config: &Config) -> Self {
        Self {
            binary: config.skopeo.clone(),
            src_tls_verify: config.trust.src_tls_verify,
            dest_tls_verify: config.trust.dest_tls_verify,
            insecure_policy: config.trust.insecure_policy,
            dest_creds: config.dest_creds.clone(),
        }
    }

    fn list_tags_args(&self, reference: &str, side: Side) -> Vec<String> {
        let tls_verify = match side {
            Side::Source => self.src_tls_verify,
            Side::Destination => self.dest_tls_verify,
        };
        let mut args = vec![
            "list-tags".to_string(),
            format!("{}{}", DOCKER_TRANSPORT, reference),
            format!("--tls-verify={}", tls_verify),
        ];
        if let (Side::Destination, Some(creds)) = (side, &self.dest_creds) {
            args.push("--creds".to_string());
            args.push(creds.expose().to_string());
        }
        args
    }

    fn copy_args(&self, source: &str, destination: &str, tag: &str) -> Vec<String> {
        let mut args = vec!["copy".to_string()];
        if self.insecure_policy {
            args.push("--insecure-policy".to_string());
        }
        args.push(format!("--src-tls-verify={}", self.src_tls_verify));
        args.push(format!("--dest-tls-verify={}", self.dest_tls_verify));
        if let Some(creds) = &self.dest_creds {
            args.push("--dest-creds".to_string());
            args.push(creds.expose().to_string());
        }
        args.push("-q".to_string());
        args.push(format!("{}{}:{}", DOCKER_TRANSPORT, source, tag));
        args.push(format!("{}{}:{}", DOCKER_TRANSPORT, destination, tag));
        args
    }

    async fn run(&self, args: &[String]) -> Result<Output> {
        // args may carry credentials, only the subcommand is logged
        debug!(
            "Running {} {}",
            self.binary.display(),
            args.first().map(String::as_str).unwrap_or_default()
        );
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.binary.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output)
    }
}

impl RegistryClient for SkopeoClient {
    async fn list_tags(&self, reference: &str, side: Side) -> Result<TagList> {
        let output = self.run(&self.list_tags_args(reference, side)).await?;

        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            // an empty destination listing means nothing is mirrored yet
            if side == Side::Destination {
                return Ok(TagList {
                    repository: reference.to_string(),
                    tags: Vec::new(),
                });
            }
            anyhow::bail!(
                "Tag listing for {} returned no output: {}",
                reference,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("Failed to parse tag listing for {}", reference))
    }

    async fn copy_tag(&self, source: &str, destination: &str, tag: &str) -> Result<()> {
        self.run(&self.copy_args(source, destination, tag))
            .await
            .with_context(|| format!("Failed to copy {}:{} to {}:{}", source, tag, destination, tag))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Destination, TrustPolicy};
    use crate::naming::NamingRules;

    fn config(skopeo: PathBuf) -> Config {
        Config {
            manifest_url: "http://127.0.0.1/k8s.txt".to_string(),
            destination: Destination {
                registry: "docker.io".to_string(),
                namespace: "namespace".to_string(),
            },
            trust: TrustPolicy::default(),
            skopeo,
            dest_creds: None,
            naming: NamingRules::default(),
            dry_run: false,
        }
    }

    #[test]
    fn test_tag_list_deserialize() {
        let json = r#"{"Repository":"quay.io/foo/bar","Tags":["1.0","1.1"]}"#;
        let list: TagList = serde_json::from_str(json).unwrap();
        assert_eq!(list.repository, "quay.io/foo/bar");
        assert_eq!(list.tags, vec!["1.0", "1.1"]);

        let list: TagList = serde_json::from_str(r#"{"Repository":"x"}"#).unwrap();
        assert!(list.tags.is_empty());
    }

    #[test]
    fn test_list_tags_args_follow_trust_policy() {
        let mut config = config(PathBuf::from("skopeo"));
        config.trust.dest_tls_verify = true;
        config.dest_creds = Some(Credentials::from("robot:token".to_string()));
        let client = SkopeoClient::new(&config);

        assert_eq!(
            client.list_tags_args("quay.io/foo/bar", Side::Source),
            vec!["list-tags", "docker://quay.io/foo/bar", "--tls-verify=false"]
        );
        assert_eq!(
            client.list_tags_args("docker.io/namespace/foo_bar", Side::Destination),
            vec![
                "list-tags",
                "docker://docker.io/namespace/foo_bar",
                "--tls-verify=true",
                "--creds",
                "robot:token"
            ]
        );
    }

    #[test]
    fn test_copy_args_default_policy() {
        let client = SkopeoClient::new(&config(PathBuf::from("skopeo")));
        assert_eq!(
            client.copy_args("quay.io/foo/bar", "docker.io/namespace/foo_bar", "1.1"),
            vec![
                "copy",
                "--insecure-policy",
                "--src-tls-verify=false",
                "--dest-tls-verify=false",
                "-q",
                "docker://quay.io/foo/bar:1.1",
                "docker://docker.io/namespace/foo_bar:1.1"
            ]
        );
    }

    #[test]
    fn test_copy_args_strict_policy() {
        let mut config = config(PathBuf::from("skopeo"));
        config.trust = TrustPolicy {
            manifest_tls_verify: true,
            src_tls_verify: true,
            dest_tls_verify: true,
            insecure_policy: false,
        };
        let client = SkopeoClient::new(&config);
        let args = client.copy_args("quay.io/foo/bar", "docker.io/namespace/foo_bar", "1.1");
        assert!(!args.contains(&"--insecure-policy".to_string()));
        assert!(args.contains(&"--src-tls-verify=true".to_string()));
        assert!(args.contains(&"--dest-tls-verify=true".to_string()));
    }

    #[cfg(unix)]
    fn fake_skopeo(dir: &tempfile::TempDir, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("skopeo");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_tags_parses_tool_output() {
        let dir = tempfile::tempdir().unwrap();
        let skopeo = fake_skopeo(
            &dir,
            r#"echo '{"Repository":"quay.io/foo/bar","Tags":["1.0","1.1"]}'"#,
        );
        let client = SkopeoClient::new(&config(skopeo));

        let list = client.list_tags("quay.io/foo/bar", Side::Source).await.unwrap();
        assert_eq!(list.repository, "quay.io/foo/bar");
        assert_eq!(list.tags, vec!["1.0", "1.1"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_tags_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let client = SkopeoClient::new(&config(fake_skopeo(&dir, "exit 0")));

        let destination = client
            .list_tags("docker.io/namespace/foo_bar", Side::Destination)
            .await
            .unwrap();
        assert!(destination.tags.is_empty());

        assert!(client.list_tags("quay.io/foo/bar", Side::Source).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failures_carry_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let client = SkopeoClient::new(&config(fake_skopeo(
            &dir,
            "echo 'manifest unknown' >&2\nexit 1",
        )));

        let err = client
            .list_tags("quay.io/foo/bar", Side::Source)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("manifest unknown"));

        let err = client
            .copy_tag("quay.io/foo/bar", "docker.io/namespace/foo_bar", "1.1")
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to copy quay.io/foo/bar:1.1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = SkopeoClient::new(&config(fake_skopeo(&dir, "echo 'not json'")));

        let err = client
            .list_tags("quay.io/foo/bar", Side::Source)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to parse tag listing"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_tag_passes_references() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.log");
        let skopeo = fake_skopeo(&dir, &format!("echo \"$@\" > {}", log.display()));
        let client = SkopeoClient::new(&config(skopeo));

        client
            .copy_tag("quay.io/foo/bar", "docker.io/namespace/foo_bar", "1.1")
            .await
            .unwrap();

        let args = std::fs::read_to_string(&log).unwrap();
        assert_eq!(
            args.trim(),
            "copy --insecure-policy --src-tls-verify=false --dest-tls-verify=false -q \
             docker://quay.io/foo/bar:1.1 docker://docker.io/namespace/foo_bar:1.1"
        );
    }
}
