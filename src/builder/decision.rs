//! Build decisions - build now, postpone, or skip.
//!
//! The engine is pure: it reads the configuration, the reference graph,
//! the request context and the change sets it is handed, and mutates
//! nothing. Calling it twice with the same inputs yields the same verdict.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::builder::classify::ChangeClassifier;
use crate::builder::collaborators::ConfigurationRegistry;
use crate::builder::error::BuildError;
use crate::core::{BuildConfiguration, BuildKind, ChangeSet, ConfigId, DependencyGraph};

/// What to do with a configuration in this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Build,
    Postpone,
    Skip,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Build => "build",
            Decision::Postpone => "postpone",
            Decision::Skip => "skip",
        })
    }
}

/// Why a decision was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    Unmanaged,
    ResourceChecksDisabled,
    CleanRequested,
    FullBuild,
    NeedsRebuild,
    ArtifactMissing(PathBuf),
    UnknownHistory,
    SourcesChanged,
    ReferenceChanged(ConfigId),
    ReferencedArtifactChanged(ConfigId),
    /// Static library nobody building in this pass consumes
    NoConsumer,
    UpToDate,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Unmanaged => write!(f, "unmanaged builder always builds"),
            Reason::ResourceChecksDisabled => write!(f, "resource change checks are disabled"),
            Reason::CleanRequested => write!(f, "clean requested"),
            Reason::FullBuild => write!(f, "full build requested"),
            Reason::NeedsRebuild => write!(f, "marked as needing a rebuild"),
            Reason::ArtifactMissing(path) => write!(f, "artifact `{}` is missing", path.display()),
            Reason::UnknownHistory => write!(f, "no build history"),
            Reason::SourcesChanged => write!(f, "sources changed"),
            Reason::ReferenceChanged(id) => write!(f, "referenced `{}` changed", id),
            Reason::ReferencedArtifactChanged(id) => {
                write!(f, "artifact of referenced `{}` changed", id)
            }
            Reason::NoConsumer => write!(f, "static library with no consumer in this pass"),
            Reason::UpToDate => write!(f, "up to date"),
        }
    }
}

/// A decision together with its reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: Reason,
}

impl Verdict {
    fn new(decision: Decision, reason: Reason) -> Self {
        Verdict { decision, reason }
    }

    fn build(reason: Reason) -> Self {
        Verdict::new(Decision::Build, reason)
    }
}

/// Which configurations take part in one build invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequestContext {
    /// Explicitly requested configurations
    pub requested: BTreeSet<ConfigId>,

    /// Every configuration participating in this pass
    pub building: BTreeSet<ConfigId>,

    /// Configurations already built earlier in this pass
    pub built: BTreeSet<ConfigId>,
}

impl BuildRequestContext {
    pub fn new(requested: BTreeSet<ConfigId>, building: BTreeSet<ConfigId>) -> Self {
        BuildRequestContext {
            requested,
            building,
            built: BTreeSet::new(),
        }
    }

    /// An explicit selection: the selection plus everything it references.
    pub fn for_selection(requested: BTreeSet<ConfigId>, graph: &DependencyGraph) -> Self {
        let mut building = requested.clone();
        for id in &requested {
            building.extend(graph.all_references(id));
        }
        BuildRequestContext::new(requested, building)
    }

    /// An automatic build: nothing is requested explicitly; the defaults and
    /// their references take part.
    pub fn for_auto(defaults: &BTreeSet<ConfigId>, graph: &DependencyGraph) -> Self {
        let mut building = defaults.clone();
        for id in defaults {
            building.extend(graph.all_references(id));
        }
        BuildRequestContext::new(BTreeSet::new(), building)
    }

    pub fn is_requested(&self, id: &ConfigId) -> bool {
        self.requested.contains(id)
    }

    /// Participating now or already built.
    pub fn is_active(&self, id: &ConfigId) -> bool {
        self.building.contains(id) || self.built.contains(id)
    }

    pub fn mark_built(&mut self, id: ConfigId) {
        self.built.insert(id);
    }
}

/// Read-only state the engine decides from.
pub struct DecisionInputs<'a> {
    pub graph: &'a DependencyGraph,
    pub registry: &'a dyn ConfigurationRegistry,

    /// Change set per project as observed by the configuration being
    /// decided. A missing project or `None` means unknown history.
    pub changes: &'a BTreeMap<String, Option<ChangeSet>>,
}

impl DecisionInputs<'_> {
    fn changes_of(&self, project: &str) -> Option<&ChangeSet> {
        self.changes.get(project).and_then(Option::as_ref)
    }

    fn project_configs(&self, project: &str) -> Vec<BuildConfiguration> {
        self.registry.configurations_of(project)
    }
}

/// Decides, per configuration, whether it must be built in this pass.
#[derive(Debug, Clone)]
pub struct BuildDecisionEngine {
    reserved_names: Vec<String>,
    check_resource_changes: bool,
}

impl BuildDecisionEngine {
    pub fn new(reserved_names: Vec<String>) -> Self {
        BuildDecisionEngine {
            reserved_names,
            check_resource_changes: true,
        }
    }

    /// When disabled, every managed configuration builds.
    pub fn with_resource_checks(mut self, enabled: bool) -> Self {
        self.check_resource_changes = enabled;
        self
    }

    pub fn reserved_names(&self) -> &[String] {
        &self.reserved_names
    }

    /// Refuse builders that cannot serve this configuration.
    ///
    /// A managed builder without customisation support must be neither a
    /// custom builder nor one belonging to another configuration.
    pub fn check_builders(cfg: &BuildConfiguration) -> Result<(), BuildError> {
        let builder = &cfg.builder;
        if !builder.managed || builder.supports_customization {
            return Ok(());
        }

        let reason = if builder.custom {
            Some("a custom builder replaces a managed builder that does not support customization".to_string())
        } else if builder.owned_by_other(cfg.id.name()) {
            Some(format!(
                "the managed builder belongs to configuration `{}` and does not support customization",
                builder.owner.as_deref().unwrap_or_default()
            ))
        } else {
            None
        };

        match reason {
            Some(reason) => Err(BuildError::BuilderCheck {
                id: cfg.id.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Decide and explain.
    pub fn evaluate(
        &self,
        cfg: &BuildConfiguration,
        kind: BuildKind,
        ctx: &BuildRequestContext,
        inputs: &DecisionInputs<'_>,
    ) -> Result<Verdict, BuildError> {
        Self::check_builders(cfg)?;

        if !cfg.is_managed() {
            return Ok(Verdict::build(Reason::Unmanaged));
        }
        if kind == BuildKind::Clean {
            return Ok(Verdict::build(Reason::CleanRequested));
        }

        let verdict = if !self.check_resource_changes {
            Verdict::build(Reason::ResourceChecksDisabled)
        } else {
            self.needs_build(cfg, kind, inputs)
                .map(Verdict::build)
                .unwrap_or_else(|| Verdict::new(Decision::Skip, Reason::UpToDate))
        };

        if verdict.decision == Decision::Build
            && self.can_postpone(cfg, ctx, inputs.graph, inputs.registry)
        {
            return Ok(Verdict::new(Decision::Postpone, Reason::NoConsumer));
        }
        Ok(verdict)
    }

    /// Decide only.
    pub fn decide(
        &self,
        cfg: &BuildConfiguration,
        kind: BuildKind,
        ctx: &BuildRequestContext,
        inputs: &DecisionInputs<'_>,
    ) -> Result<Decision, BuildError> {
        self.evaluate(cfg, kind, ctx, inputs).map(|v| v.decision)
    }

    /// A static library is postponed unless it was requested or a
    /// non-static configuration active in this pass transitively consumes it.
    pub fn can_postpone(
        &self,
        cfg: &BuildConfiguration,
        ctx: &BuildRequestContext,
        graph: &DependencyGraph,
        registry: &dyn ConfigurationRegistry,
    ) -> bool {
        if !cfg.is_static_library() || ctx.is_requested(&cfg.id) {
            return false;
        }

        let has_consumer = graph
            .all_referenced_by(&cfg.id)
            .iter()
            .filter(|id| ctx.is_active(id))
            .any(|id| match registry.get(id) {
                Some(consumer) => !consumer.is_static_library(),
                None => true,
            });
        !has_consumer
    }

    /// Steps 1-5 for a managed configuration; `None` means skip.
    fn needs_build(
        &self,
        cfg: &BuildConfiguration,
        kind: BuildKind,
        inputs: &DecisionInputs<'_>,
    ) -> Option<Reason> {
        if kind == BuildKind::Full {
            return Some(Reason::FullBuild);
        }

        if let Some(reason) = self.own_state(cfg, inputs) {
            return Some(reason);
        }

        for reference in inputs.graph.all_references(&cfg.id) {
            let Some(referenced) = inputs.registry.get(&reference) else {
                tracing::debug!("{} references unknown {}", cfg.id, reference);
                continue;
            };

            if !cfg.is_static_library() && referenced.is_static_library() {
                let artifact_changed = referenced.artifact_relative().is_some_and(|artifact| {
                    inputs
                        .changes_of(referenced.project())
                        .is_some_and(|changes| changes.contains_path(&artifact))
                });
                if artifact_changed {
                    return Some(Reason::ReferencedArtifactChanged(reference));
                }
            }

            if self.own_state(&referenced, inputs).is_some() {
                return Some(Reason::ReferenceChanged(reference));
            }
        }

        None
    }

    /// Steps 2-4: flags, artifact presence and the project's changes.
    fn own_state(&self, cfg: &BuildConfiguration, inputs: &DecisionInputs<'_>) -> Option<Reason> {
        if cfg.needs_rebuild || cfg.needs_full_rebuild {
            return Some(Reason::NeedsRebuild);
        }

        if let Some(ref artifact) = cfg.artifact {
            if !artifact.exists() {
                return Some(Reason::ArtifactMissing(artifact.clone()));
            }
        }

        let changes = inputs.changes_of(cfg.project());
        if changes.map_or(true, ChangeSet::is_unknown) {
            return Some(Reason::UnknownHistory);
        }

        let classifier = ChangeClassifier::for_configuration(
            cfg,
            &inputs.project_configs(cfg.project()),
            &self.reserved_names,
        );
        if classifier.classify(changes).any_change_interesting {
            return Some(Reason::SourcesChanged);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        ArtifactType, BaselineId, ChangeKind, ChangeRecord, ConfigurationSet,
    };
    use tempfile::TempDir;

    struct Scenario {
        _tmp: TempDir,
        registry: ConfigurationSet,
        graph: DependencyGraph,
        changes: BTreeMap<String, Option<ChangeSet>>,
    }

    /// exe1 (exe) -> lib1 (static), both with artifacts on disk and empty
    /// known change sets.
    fn scenario(adjust: impl FnOnce(&mut Vec<BuildConfiguration>)) -> Scenario {
        let tmp = TempDir::new().unwrap();
        let mut configs = Vec::new();
        for (project, artifact_type, artifact) in [
            ("lib1", ArtifactType::Static, "build/Debug/liblib1.a"),
            ("exe1", ArtifactType::Exe, "build/Debug/exe1"),
        ] {
            let root = tmp.path().join(project);
            std::fs::create_dir_all(root.join("build/Debug")).unwrap();
            std::fs::write(root.join(artifact), "bin").unwrap();
            configs.push(
                BuildConfiguration::new(ConfigId::new(project, "Debug"), root)
                    .with_artifact_type(artifact_type)
                    .with_artifact(artifact),
            );
        }
        configs[1].references.push(ConfigId::new("lib1", "Debug"));
        adjust(&mut configs);

        let graph = DependencyGraph::from_configurations(&configs);
        let changes = BTreeMap::from([
            ("lib1".to_string(), Some(ChangeSet::since(BaselineId(1)))),
            ("exe1".to_string(), Some(ChangeSet::since(BaselineId(1)))),
        ]);
        Scenario {
            _tmp: tmp,
            registry: ConfigurationSet::in_memory(configs),
            graph,
            changes,
        }
    }

    impl Scenario {
        fn cfg(&self, s: &str) -> BuildConfiguration {
            self.registry.get(&s.parse().unwrap()).unwrap()
        }

        fn change(&mut self, project: &str, record: ChangeRecord) {
            let set = self
                .changes
                .get_mut(project)
                .and_then(Option::as_mut)
                .unwrap();
            set.push(record);
        }

        fn inputs(&self) -> DecisionInputs<'_> {
            DecisionInputs {
                graph: &self.graph,
                registry: &self.registry,
                changes: &self.changes,
            }
        }

        fn evaluate(&self, id: &str, kind: BuildKind, ctx: &BuildRequestContext) -> Verdict {
            engine()
                .evaluate(&self.cfg(id), kind, ctx, &self.inputs())
                .unwrap()
        }
    }

    fn engine() -> BuildDecisionEngine {
        BuildDecisionEngine::new(vec!["Mbuild.toml".to_string()])
    }

    fn ids(list: &[&str]) -> BTreeSet<ConfigId> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_up_to_date_skips() {
        let s = scenario(|_| {});
        let ctx = BuildRequestContext::new(ids(&["exe1/Debug"]), ids(&["exe1/Debug", "lib1/Debug"]));
        let verdict = s.evaluate("exe1/Debug", BuildKind::Incremental, &ctx);
        assert_eq!(verdict, Verdict::new(Decision::Skip, Reason::UpToDate));
    }

    #[test]
    fn test_full_build_always_builds() {
        let s = scenario(|_| {});
        let ctx = BuildRequestContext::new(ids(&["exe1/Debug"]), ids(&["exe1/Debug"]));
        let verdict = s.evaluate("exe1/Debug", BuildKind::Full, &ctx);
        assert_eq!(verdict.reason, Reason::FullBuild);
    }

    #[test]
    fn test_rebuild_flag_builds() {
        let s = scenario(|configs| configs[1].needs_full_rebuild = true);
        let ctx = BuildRequestContext::new(ids(&["exe1/Debug"]), ids(&["exe1/Debug"]));
        assert_eq!(
            s.evaluate("exe1/Debug", BuildKind::Auto, &ctx).reason,
            Reason::NeedsRebuild
        );
    }

    #[test]
    fn test_missing_artifact_builds() {
        let s = scenario(|_| {});
        std::fs::remove_file(s.cfg("exe1/Debug").artifact.unwrap()).unwrap();
        let ctx = BuildRequestContext::new(ids(&["exe1/Debug"]), ids(&["exe1/Debug"]));
        assert!(matches!(
            s.evaluate("exe1/Debug", BuildKind::Incremental, &ctx).reason,
            Reason::ArtifactMissing(_)
        ));
    }

    #[test]
    fn test_unknown_history_builds() {
        let mut s = scenario(|_| {});
        s.changes.insert("exe1".into(), None);
        let ctx = BuildRequestContext::new(ids(&["exe1/Debug"]), ids(&["exe1/Debug"]));
        assert_eq!(
            s.evaluate("exe1/Debug", BuildKind::Incremental, &ctx).reason,
            Reason::UnknownHistory
        );
    }

    #[test]
    fn test_derived_only_changes_skip() {
        let mut s = scenario(|_| {});
        s.change("exe1", ChangeRecord::new("src/main.o", ChangeKind::Modified).derived());
        s.change("exe1", ChangeRecord::new("Mbuild.toml", ChangeKind::Modified));
        let ctx = BuildRequestContext::new(ids(&["exe1/Debug"]), ids(&["exe1/Debug"]));
        assert_eq!(
            s.evaluate("exe1/Debug", BuildKind::Incremental, &ctx).decision,
            Decision::Skip
        );
    }

    #[test]
    fn test_exe_requested_with_changed_static_lib() {
        let mut s = scenario(|_| {});
        s.change("lib1", ChangeRecord::new("src/lib.c", ChangeKind::Modified));
        let ctx = BuildRequestContext::for_selection(ids(&["exe1/Debug"]), &s.graph);
        assert!(ctx.building.contains(&"lib1/Debug".parse().unwrap()));

        let lib = s.evaluate("lib1/Debug", BuildKind::Incremental, &ctx);
        assert_eq!(lib, Verdict::build(Reason::SourcesChanged));

        let exe = s.evaluate("exe1/Debug", BuildKind::Incremental, &ctx);
        assert_eq!(exe, Verdict::build(Reason::ReferenceChanged("lib1/Debug".parse().unwrap())));
    }

    #[test]
    fn test_changed_static_artifact_builds_consumer() {
        let mut s = scenario(|_| {});
        s.change("lib1", ChangeRecord::new("build/Debug/liblib1.a", ChangeKind::Modified));
        let ctx = BuildRequestContext::for_selection(ids(&["exe1/Debug"]), &s.graph);
        assert_eq!(
            s.evaluate("exe1/Debug", BuildKind::Incremental, &ctx).reason,
            Reason::ReferencedArtifactChanged("lib1/Debug".parse().unwrap())
        );
    }

    #[test]
    fn test_static_lib_without_consumer_is_postponed() {
        let mut s = scenario(|_| {});
        s.change("lib1", ChangeRecord::new("src/lib.c", ChangeKind::Modified));
        let ctx = BuildRequestContext::new(BTreeSet::new(), ids(&["lib1/Debug"]));
        assert_eq!(
            s.evaluate("lib1/Debug", BuildKind::Auto, &ctx),
            Verdict::new(Decision::Postpone, Reason::NoConsumer)
        );
    }

    #[test]
    fn test_requested_static_lib_is_never_postponed() {
        let mut s = scenario(|_| {});
        s.change("lib1", ChangeRecord::new("src/lib.c", ChangeKind::Modified));
        let ctx = BuildRequestContext::new(ids(&["lib1/Debug"]), ids(&["lib1/Debug"]));
        for kind in [BuildKind::Auto, BuildKind::Incremental, BuildKind::Full] {
            assert_eq!(s.evaluate("lib1/Debug", kind, &ctx).decision, Decision::Build);
        }
    }

    #[test]
    fn test_static_consumer_does_not_prevent_postponement() {
        let mut s = scenario(|configs| configs[1].artifact_type = ArtifactType::Static);
        s.change("lib1", ChangeRecord::new("src/lib.c", ChangeKind::Modified));
        let ctx = BuildRequestContext::for_auto(&ids(&["exe1/Debug"]), &s.graph);
        assert_eq!(
            s.evaluate("lib1/Debug", BuildKind::Auto, &ctx).decision,
            Decision::Postpone
        );
    }

    #[test]
    fn test_unmanaged_always_builds() {
        let s = scenario(|configs| configs[0].builder.managed = false);
        let ctx = BuildRequestContext::default();
        assert_eq!(
            s.evaluate("lib1/Debug", BuildKind::Auto, &ctx),
            Verdict::build(Reason::Unmanaged)
        );
    }

    #[test]
    fn test_disabled_resource_checks_build() {
        let s = scenario(|_| {});
        let ctx = BuildRequestContext::for_selection(ids(&["exe1/Debug"]), &s.graph);
        let verdict = engine()
            .with_resource_checks(false)
            .evaluate(&s.cfg("exe1/Debug"), BuildKind::Incremental, &ctx, &s.inputs())
            .unwrap();
        assert_eq!(verdict.reason, Reason::ResourceChecksDisabled);
    }

    #[test]
    fn test_builder_check_refuses_full_build() {
        let s = scenario(|configs| {
            configs[1].builder.supports_customization = false;
            configs[1].builder.custom = true;
        });
        let ctx = BuildRequestContext::for_selection(ids(&["exe1/Debug"]), &s.graph);
        let err = engine()
            .evaluate(&s.cfg("exe1/Debug"), BuildKind::Full, &ctx, &s.inputs())
            .unwrap_err();
        assert!(matches!(err, BuildError::BuilderCheck { .. }));
    }

    #[test]
    fn test_builder_owned_by_other_configuration() {
        let mut cfg = BuildConfiguration::new(ConfigId::new("app", "Debug"), "/ws/app");
        cfg.builder.supports_customization = false;
        cfg.builder.owner = Some("Release".into());
        assert!(BuildDecisionEngine::check_builders(&cfg).is_err());

        cfg.builder.owner = Some("Debug".into());
        assert!(BuildDecisionEngine::check_builders(&cfg).is_ok());

        cfg.builder.managed = false;
        cfg.builder.custom = true;
        assert!(BuildDecisionEngine::check_builders(&cfg).is_ok());
    }

    #[test]
    fn test_decide_is_idempotent() {
        let mut s = scenario(|_| {});
        s.change("lib1", ChangeRecord::new("src/lib.c", ChangeKind::Removed));
        let ctx = BuildRequestContext::for_auto(&ids(&["exe1/Debug"]), &s.graph);
        for id in ["lib1/Debug", "exe1/Debug"] {
            let first = engine()
                .decide(&s.cfg(id), BuildKind::Auto, &ctx, &s.inputs())
                .unwrap();
            let second = engine()
                .decide(&s.cfg(id), BuildKind::Auto, &ctx, &s.inputs())
                .unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_clean_kind_builds() {
        let s = scenario(|_| {});
        let ctx = BuildRequestContext::default();
        assert_eq!(
            s.evaluate("lib1/Debug", BuildKind::Clean, &ctx),
            Verdict::build(Reason::CleanRequested)
        );
    }
}
