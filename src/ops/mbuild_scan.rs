//! Implementation of `mbuild scan`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::builder::cancel::CancelToken;
use crate::core::Workspace;
use crate::scanner::{
    BuildOutputReader, ConsoleParserSpec, ProfileRegistry, ScannerInfo, ScannerProfile,
};
use crate::util::fs;
use crate::util::Config;

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Profile id (None = the configured profile)
    pub profile: Option<String>,

    /// Build-output log to parse instead of the profile's
    pub log: Option<PathBuf>,

    /// Projects to scan (empty = all)
    pub projects: Vec<String>,

    /// Skip the profile's `run`/`open` providers
    pub skip_providers: bool,
}

/// Built-in profiles plus those from the configured profiles file.
pub fn load_profiles(config: &Config, workspace_root: &Path) -> Result<ProfileRegistry> {
    let mut registry = ProfileRegistry::builtin();
    if let Some(ref file) = config.scanner.profiles_file {
        registry.load_file(&fs::absolutize(workspace_root, file))?;
    }
    Ok(registry)
}

fn scan_project(
    profile: &ScannerProfile,
    project_root: &Path,
    log: Option<&Path>,
    skip_providers: bool,
    reader: &BuildOutputReader,
) -> Result<Option<ScannerInfo>> {
    let scope = profile.scope_or_default();
    let mut info = ScannerInfo::default();

    if let Some(ref output) = profile.build_output {
        let log = log
            .map(Path::to_path_buf)
            .or_else(|| output.open.as_ref().map(|p| project_root.join(p)));
        match log {
            Some(log) => {
                let spec = output
                    .parser
                    .clone()
                    .unwrap_or_else(ConsoleParserSpec::gcc_build_output);
                let mut parser = spec.create(scope, project_root)?;
                if !reader.read_file(&log, parser.as_mut())? {
                    return Ok(None);
                }
                info.merge(parser.take_info());
            }
            None => tracing::debug!("profile `{}`: no build output to read", profile.id),
        }
    }

    if skip_providers {
        return Ok(Some(info));
    }
    for provider in profile.providers() {
        let spec = provider
            .parser
            .clone()
            .unwrap_or_else(ConsoleParserSpec::gcc_specs);
        let mut parser = spec.create(scope, project_root)?;
        if !reader.run_provider(provider, project_root, parser.as_mut())? {
            return Ok(None);
        }
        info.merge(parser.take_info());
    }
    Ok(Some(info))
}

/// Discover scanner info for the selected projects.
///
/// Returns None if the scan was cancelled.
pub fn scan(
    ws: &Workspace,
    config: &Config,
    opts: &ScanOptions,
    cancel: CancelToken,
) -> Result<Option<BTreeMap<String, ScannerInfo>>> {
    let profiles = load_profiles(config, ws.root())?;
    let profile_id = opts
        .profile
        .as_deref()
        .unwrap_or_else(|| config.scanner_profile());
    let profile = profiles.get(profile_id)?;

    let roots: Vec<(String, PathBuf)> = ws
        .project_roots()
        .into_iter()
        .filter(|(name, _)| opts.projects.is_empty() || opts.projects.contains(name))
        .collect();
    for name in &opts.projects {
        if !roots.iter().any(|(n, _)| n == name) {
            bail!(
                "project `{}` not found in workspace\n\
                 available projects: {}",
                name,
                ws.project_names().join(", ")
            );
        }
    }

    let reader = BuildOutputReader::new(cancel);
    let mut results = BTreeMap::new();
    for (name, root) in roots {
        tracing::debug!("scanning `{}` with profile `{}`", name, profile.id);
        let scanned = scan_project(
            profile,
            &root,
            opts.log.as_deref(),
            opts.skip_providers,
            &reader,
        )
        .with_context(|| format!("failed to scan project `{}`", name))?;
        match scanned {
            Some(info) => {
                results.insert(name, info);
            }
            None => return Ok(None),
        }
    }
    Ok(Some(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MANIFEST_NAME;
    use crate::test_support::{build_logs, manifests};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Workspace) {
        let tmp = TempDir::new().unwrap();
        let manifest = tmp.path().join(MANIFEST_NAME);
        std::fs::write(&manifest, manifests::app_and_core()).unwrap();
        std::fs::write(tmp.path().join("build.log"), build_logs::gcc_make_log()).unwrap();
        let ws = Workspace::new(&manifest).unwrap();
        (tmp, ws)
    }

    fn opts(tmp: &TempDir) -> ScanOptions {
        ScanOptions {
            profile: Some("gcc-per-file".into()),
            log: Some(tmp.path().join("build.log")),
            projects: vec!["app".into()],
            skip_providers: true,
        }
    }

    #[test]
    fn test_scan_build_log() {
        let (tmp, ws) = setup();
        let results = scan(&ws, &Config::default(), &opts(&tmp), CancelToken::new())
            .unwrap()
            .unwrap();

        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["app"]);
        let info = &results["app"];
        assert_eq!(info.files.len(), 2);
        assert!(info.project.defines.contains_key("DEBUG"));
    }

    #[test]
    fn test_cancelled_scan() {
        let (tmp, ws) = setup();
        let cancel = CancelToken::new();
        cancel.cancel();
        let results = scan(&ws, &Config::default(), &opts(&tmp), cancel).unwrap();
        assert!(results.is_none());
    }

    #[test]
    fn test_unknown_profile() {
        let (tmp, ws) = setup();
        let mut opts = opts(&tmp);
        opts.profile = Some("msvc".into());
        let err = scan(&ws, &Config::default(), &opts, CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("unknown scanner profile `msvc`"));
    }

    #[test]
    fn test_unknown_project() {
        let (tmp, ws) = setup();
        let mut opts = opts(&tmp);
        opts.projects = vec!["ghost".into()];
        let err = scan(&ws, &Config::default(), &opts, CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("project `ghost` not found"));
    }

    #[test]
    fn test_profiles_file_from_config() {
        let (tmp, ws) = setup();
        std::fs::write(
            tmp.path().join("profiles.toml"),
            "[[profile]]\nid = \"logs-only\"\n[profile.build-output]\nopen = \"../build.log\"\n",
        )
        .unwrap();
        let mut config = Config::default();
        config.scanner.profiles_file = Some(PathBuf::from("profiles.toml"));
        config.scanner.profile = Some("logs-only".into());

        let opts = ScanOptions {
            projects: vec!["app".into()],
            ..Default::default()
        };
        let results = scan(&ws, &config, &opts, CancelToken::new())
            .unwrap()
            .unwrap();
        assert_eq!(results["app"].project.include_paths.len(), 2);
        assert!(results["app"].files.is_empty());
    }
}
