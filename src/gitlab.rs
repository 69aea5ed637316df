use crate::config::Config;
use crate::util::ensure_dir;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);
const PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub name: String,
    pub ssh_url_to_repo: String,
}

/// Thin GitLab REST client; the token and URL are injected at construction,
/// never read from the environment deep in a call path.
pub struct GitLabClient {
    base_url: String,
    token: String,
    agent: ureq::Agent,
}

impl GitLabClient {
    pub fn new(base_url: String, token: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            agent,
        }
    }

    fn get_pages<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/api/v4/{path}?per_page={PER_PAGE}&page={page}",
                self.base_url
            );
            let batch: Vec<T> = self
                .agent
                .get(&url)
                .set("PRIVATE-TOKEN", &self.token)
                .call()
                .with_context(|| format!("GET {url}"))?
                .into_json()
                .with_context(|| format!("parsing response of {url}"))?;
            let len = batch.len();
            out.extend(batch);
            if len < PER_PAGE as usize {
                return Ok(out);
            }
            page += 1;
        }
    }

    /// All visible groups whose name appears in `names`.
    pub fn list_groups(&self, names: &[String]) -> Result<Vec<Group>> {
        let all: Vec<Group> = self.get_pages("groups")?;
        let found: Vec<Group> = all
            .into_iter()
            .filter(|g| names.contains(&g.name))
            .collect();
        for name in names {
            if !found.iter().any(|g| &g.name == name) {
                warn!("group {name} not found on the server");
            }
        }
        Ok(found)
    }

    pub fn list_projects(&self, group: &Group) -> Result<Vec<Project>> {
        self.get_pages(&format!("groups/{}/projects", group.id))
    }
}

/// Clone one repository, preferring `branch` and falling back to the
/// repository's default branch when that ref does not exist. Already-cloned
/// repositories are left untouched.
pub fn clone_repo(ssh_url: &str, dest_dir: &Path, name: &str, branch: Option<&str>) -> Result<()> {
    let repo_path = dest_dir.join(name);
    if repo_path.exists() {
        debug!("{name} already cloned");
        return Ok(());
    }

    let attempt = |branch: Option<&str>| -> Result<()> {
        let mut cmd = Command::new("git");
        cmd.arg("clone");
        if let Some(b) = branch {
            cmd.args(["--branch", b]);
        }
        cmd.arg(ssh_url)
            .arg(&repo_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let output = cmd.output().with_context(|| "spawning git")?;
        if !output.status.success() {
            bail!(
                "git clone failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    };

    match attempt(branch) {
        Ok(()) => Ok(()),
        Err(err) if branch.is_some() => {
            warn!("clone of {name} on requested branch failed ({err:#}); trying default branch");
            attempt(None)
        }
        Err(err) => Err(err),
    }
}

/// Clone every configured group into the files dir and the base repositories
/// into `output/base`. A repository that fails both clone attempts is logged
/// and skipped; the pass itself keeps going.
pub fn clone_pass(
    cfg: &Config,
    client: &GitLabClient,
    files_dir: &Path,
    output_dir: &Path,
) -> Result<()> {
    let mut names: Vec<String> = cfg.groups.current.clone();
    names.extend(cfg.groups.previous.iter().cloned());

    for group in client.list_groups(&names)? {
        let group_dir = files_dir.join(&group.name);
        ensure_dir(&group_dir)?;
        let projects = client.list_projects(&group)?;
        info!("cloning {} projects from {}", projects.len(), group.name);
        for project in projects {
            if let Err(err) = clone_repo(
                &project.ssh_url_to_repo,
                &group_dir,
                &project.name,
                Some(&cfg.groups.branch),
            ) {
                warn!("skipping {}: {:#}", project.name, err);
            }
        }
    }

    let base_dir = output_dir.join("base");
    ensure_dir(&base_dir)?;
    for (i, repo) in cfg.base.repos.iter().enumerate() {
        let name = format!("base_{i}");
        if let Err(err) = clone_repo(repo, &base_dir, &name, None) {
            warn!("skipping base repo {repo}: {err:#}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_group_and_project_shapes() {
        let groups: Vec<Group> =
            serde_json::from_str(r#"[{"id": 7, "name": "cse101-w24", "path": "cse101-w24"}]"#)
                .unwrap();
        assert_eq!(groups[0].id, 7);

        let projects: Vec<Project> = serde_json::from_str(
            r#"[{"name": "team1", "ssh_url_to_repo": "git@gitlab.example:cse101-w24/team1.git"}]"#,
        )
        .unwrap();
        assert_eq!(projects[0].name, "team1");
    }

    #[test]
    fn existing_checkout_is_not_recloned() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("team1")).unwrap();
        // Would fail if it tried to spawn git against this URL.
        clone_repo("ssh://invalid.invalid/repo.git", dir.path(), "team1", None).unwrap();
    }
}
