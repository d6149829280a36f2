//! Scanner discovery profiles.
//!
//! A profile says where scanner info comes from for a project: an optional
//! build-output log fed to a console parser, and any number of providers
//! that either run a tool or open a file. Two GCC profiles are built in;
//! more can be declared in a TOML file:
//!
//! ```toml
//! [[profile]]
//! id = "clang-per-file"
//! scope = "file"
//!
//! [profile.build-output]
//! open = "build/build.log"
//! parser = { kind = "gcc-build-output", compiler-commands = ["clang", "clang++"] }
//!
//! [[profile.provider]]
//! id = "specs"
//! action = { kind = "run", command = "clang", arguments = ["-E", "-v", "-dD", "-x", "c", "/dev/null"] }
//! parser = { kind = "gcc-specs" }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::scanner::parser::{ConsoleParser, GccOutputParser, GccSpecsParser};
use crate::util::diagnostic::UnknownProfileError;
use crate::util::fs;

/// Granularity scanner info is collected at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerScope {
    #[default]
    Project,
    File,
}

/// Where a provider's output comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderAction {
    /// Run a command and parse what it prints
    Run {
        command: String,
        #[serde(default)]
        arguments: Vec<String>,
    },
    /// Read a file, relative to the project root
    Open { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParserKind {
    GccBuildOutput,
    GccSpecs,
}

/// Which console parser to use and how to configure it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsoleParserSpec {
    pub kind: ParserKind,

    /// Program names whose invocations are parsed
    #[serde(default = "default_compiler_commands")]
    pub compiler_commands: Vec<String>,
}

fn default_compiler_commands() -> Vec<String> {
    ["gcc", "g++", "cc", "c++"].iter().map(|s| s.to_string()).collect()
}

impl ConsoleParserSpec {
    pub fn gcc_build_output() -> Self {
        ConsoleParserSpec {
            kind: ParserKind::GccBuildOutput,
            compiler_commands: default_compiler_commands(),
        }
    }

    pub fn gcc_specs() -> Self {
        ConsoleParserSpec {
            kind: ParserKind::GccSpecs,
            compiler_commands: default_compiler_commands(),
        }
    }

    /// Instantiate the parser for a project rooted at `base_dir`.
    pub fn create(&self, scope: ScannerScope, base_dir: &Path) -> Result<Box<dyn ConsoleParser>> {
        Ok(match self.kind {
            ParserKind::GccBuildOutput => Box::new(GccOutputParser::new(
                &self.compiler_commands,
                scope,
                base_dir,
            )?),
            ParserKind::GccSpecs => Box::new(GccSpecsParser::new()),
        })
    }
}

/// Build-output log and the parser that reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BuildOutputProvider {
    /// Log file to open (None = must be given on the command line)
    pub open: Option<PathBuf>,
    pub parser: Option<ConsoleParserSpec>,
}

/// A named source of scanner info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScannerInfoProvider {
    pub id: String,
    pub action: ProviderAction,
    pub parser: Option<ConsoleParserSpec>,
}

impl ScannerInfoProvider {
    pub fn kind(&self) -> &'static str {
        match self.action {
            ProviderAction::Run { .. } => "run",
            ProviderAction::Open { .. } => "open",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerProfile {
    pub id: String,
    pub scope: Option<ScannerScope>,
    pub build_output: Option<BuildOutputProvider>,
    providers: Vec<ScannerInfoProvider>,
}

impl ScannerProfile {
    pub fn new(id: impl Into<String>) -> Self {
        ScannerProfile {
            id: id.into(),
            scope: None,
            build_output: None,
            providers: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: ScannerScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_build_output(mut self, provider: BuildOutputProvider) -> Self {
        self.build_output = Some(provider);
        self
    }

    /// Add a provider. A provider whose id is already declared is ignored.
    pub fn with_provider(mut self, provider: ScannerInfoProvider) -> Self {
        if self.provider(&provider.id).is_some() {
            tracing::debug!(
                "profile `{}`: duplicate provider `{}` ignored",
                self.id,
                provider.id
            );
        } else {
            self.providers.push(provider);
        }
        self
    }

    /// Providers in declaration order.
    pub fn providers(&self) -> &[ScannerInfoProvider] {
        &self.providers
    }

    pub fn provider_ids(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn provider(&self, id: &str) -> Option<&ScannerInfoProvider> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn scope_or_default(&self) -> ScannerScope {
        self.scope.unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProfileDef {
    id: String,
    scope: Option<ScannerScope>,
    build_output: Option<BuildOutputProvider>,
    #[serde(default)]
    provider: Vec<ScannerInfoProvider>,
}

#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    profile: Vec<ProfileDef>,
}

impl From<ProfileDef> for ScannerProfile {
    fn from(def: ProfileDef) -> Self {
        let mut profile = ScannerProfile::new(def.id);
        profile.scope = def.scope;
        profile.build_output = def.build_output;
        def.provider
            .into_iter()
            .fold(profile, ScannerProfile::with_provider)
    }
}

fn gcc_specs_provider() -> ScannerInfoProvider {
    ScannerInfoProvider {
        id: "specs".to_string(),
        action: ProviderAction::Run {
            command: "gcc".to_string(),
            arguments: ["-E", "-P", "-v", "-dD", "-x", "c", "/dev/null"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        },
        parser: Some(ConsoleParserSpec::gcc_specs()),
    }
}

/// Profiles by id.
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, ScannerProfile>,
}

impl ProfileRegistry {
    /// The compiled-in profiles.
    pub fn builtin() -> Self {
        let mut registry = ProfileRegistry::default();
        for (id, scope) in [
            ("gcc-per-project", ScannerScope::Project),
            ("gcc-per-file", ScannerScope::File),
        ] {
            registry.insert(
                ScannerProfile::new(id)
                    .with_scope(scope)
                    .with_build_output(BuildOutputProvider {
                        open: None,
                        parser: Some(ConsoleParserSpec::gcc_build_output()),
                    })
                    .with_provider(gcc_specs_provider()),
            );
        }
        registry
    }

    /// Register a profile, replacing one with the same id.
    pub fn insert(&mut self, profile: ScannerProfile) {
        if self.profiles.contains_key(&profile.id) {
            tracing::debug!("scanner profile `{}` redefined", profile.id);
        }
        self.profiles.insert(profile.id.clone(), profile);
    }

    /// Add the profiles declared in a TOML file.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)?;
        self.load_str(&contents)
            .with_context(|| format!("failed to parse scanner profiles: {}", path.display()))
    }

    pub fn load_str(&mut self, contents: &str) -> Result<()> {
        let file: ProfileFile = toml::from_str(contents)?;
        for def in file.profile {
            self.insert(def.into());
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&ScannerProfile, UnknownProfileError> {
        self.profiles.get(id).ok_or_else(|| UnknownProfileError {
            id: id.to_string(),
            available: (!self.profiles.is_empty())
                .then(|| format!("available profiles: {}", self.ids().join(", "))),
        })
    }

    pub fn ids(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScannerProfile> {
        self.profiles.values()
    }
}
