//! Collecting a [`TargetSnapshot`] from a build server.

use std::thread::ScopedJoinHandle;

use nova_bsp_model::{
    BuildTargetId, DependencySourcesResult, JavacOptionsResult, ProjectDetails,
    PythonOptionsResult, ResourcesResult, ServerCapabilities, SourcesResult, TargetSnapshot,
    WorkspaceBuildTargetsResult,
};
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;

const JVM_LANGUAGE_IDS: &[&str] = &["java", "kotlin", "scala"];

/// Blocking view of the BSP requests a sync issues.
///
/// Implementations own transport, retries and timeouts; a timed-out request should surface as
/// [`FetchError::Timeout`].
pub trait BuildServer: Send + Sync {
    fn capabilities(&self) -> Result<ServerCapabilities, FetchError>;

    fn workspace_build_targets(&self) -> Result<WorkspaceBuildTargetsResult, FetchError>;

    fn sources(&self, targets: &[BuildTargetId]) -> Result<SourcesResult, FetchError>;

    fn resources(&self, targets: &[BuildTargetId]) -> Result<ResourcesResult, FetchError>;

    fn dependency_sources(
        &self,
        targets: &[BuildTargetId],
    ) -> Result<DependencySourcesResult, FetchError>;

    fn javac_options(&self, targets: &[BuildTargetId]) -> Result<JavacOptionsResult, FetchError>;

    fn python_options(&self, targets: &[BuildTargetId])
        -> Result<PythonOptionsResult, FetchError>;
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), FetchError> {
    if cancel.is_cancelled() {
        Err(FetchError::Cancelled)
    } else {
        Ok(())
    }
}

fn join<T>(
    request: &'static str,
    handle: ScopedJoinHandle<'_, Result<T, FetchError>>,
) -> Result<T, FetchError> {
    handle.join().unwrap_or_else(|_| {
        Err(FetchError::Failed {
            request,
            message: "request worker panicked".to_string(),
        })
    })
}

/// Query the build server for everything a sync needs.
///
/// `workspace/buildTargets` runs first; the per-target requests then run concurrently.
/// `buildTarget/resources` and `buildTarget/dependencySources` are only issued when the server
/// advertises them, and compiler options only for targets of the matching language.
pub fn collect_project_details(
    server: &dyn BuildServer,
    cancel: &CancellationToken,
) -> Result<ProjectDetails, FetchError> {
    check_cancelled(cancel)?;
    let capabilities = server.capabilities()?;
    let targets = server.workspace_build_targets()?.targets;
    check_cancelled(cancel)?;

    let all_ids: Vec<BuildTargetId> = targets.iter().map(|target| target.id.clone()).collect();
    let jvm_ids: Vec<BuildTargetId> = targets
        .iter()
        .filter(|target| {
            target
                .language_ids
                .iter()
                .any(|language| JVM_LANGUAGE_IDS.contains(&language.as_str()))
        })
        .map(|target| target.id.clone())
        .collect();
    let python_ids: Vec<BuildTargetId> = targets
        .iter()
        .filter(|target| target.language_ids.iter().any(|language| language == "python"))
        .map(|target| target.id.clone())
        .collect();

    tracing::debug!(
        target: "nova.sync.fetch",
        targets = all_ids.len(),
        jvm_targets = jvm_ids.len(),
        python_targets = python_ids.len(),
        resources = capabilities.resources_provider,
        dependency_sources = capabilities.dependency_sources_provider,
        "fetching build target details"
    );

    let details = std::thread::scope(|scope| -> Result<ProjectDetails, FetchError> {
        let sources = scope.spawn(|| server.sources(&all_ids));
        let resources = capabilities
            .resources_provider
            .then(|| scope.spawn(|| server.resources(&all_ids)));
        let dependency_sources = capabilities
            .dependency_sources_provider
            .then(|| scope.spawn(|| server.dependency_sources(&all_ids)));
        let javac_options =
            (!jvm_ids.is_empty()).then(|| scope.spawn(|| server.javac_options(&jvm_ids)));
        let python_options =
            (!python_ids.is_empty()).then(|| scope.spawn(|| server.python_options(&python_ids)));

        // Join everything before propagating so no request outlives the scope in a failed state.
        let sources = join("buildTarget/sources", sources);
        let resources = resources.map(|handle| join("buildTarget/resources", handle));
        let dependency_sources =
            dependency_sources.map(|handle| join("buildTarget/dependencySources", handle));
        let javac_options = javac_options.map(|handle| join("buildTarget/javacOptions", handle));
        let python_options =
            python_options.map(|handle| join("buildTarget/pythonOptions", handle));

        Ok(ProjectDetails {
            targets,
            sources: sources?.items,
            resources: resources.transpose()?.map(|r| r.items).unwrap_or_default(),
            dependency_sources: dependency_sources
                .transpose()?
                .map(|r| r.items)
                .unwrap_or_default(),
            javac_options: javac_options
                .transpose()?
                .map(|r| r.items)
                .unwrap_or_default(),
            python_options: python_options
                .transpose()?
                .map(|r| r.items)
                .unwrap_or_default(),
        })
    });

    match details {
        Err(err) => {
            tracing::warn!(target: "nova.sync.fetch", error = %err, "fetching build target details failed");
            Err(err)
        }
        Ok(details) => {
            check_cancelled(cancel)?;
            Ok(details)
        }
    }
}

/// [`collect_project_details`] joined into a snapshot.
pub fn fetch_snapshot(
    server: &dyn BuildServer,
    cancel: &CancellationToken,
) -> Result<TargetSnapshot, FetchError> {
    collect_project_details(server, cancel).map(TargetSnapshot::from_project_details)
}
