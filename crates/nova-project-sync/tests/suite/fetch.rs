use std::time::Duration;

use nova_bsp_model::{
    BuildTargetId, DependencySourcesResult, JavacOptionsResult, ProjectDetails,
    PythonOptionsResult, ResourcesResult, ServerCapabilities, SourcesResult,
    WorkspaceBuildTargetsResult,
};
use nova_config::SyncConfig;
use nova_project_sync::{
    fetch_snapshot, BuildServer, FetchError, InMemoryModelStore, LanguageAddendum, LoadRequest,
    ModuleKind, ReconciliationEngine,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Answers every request from a recorded [`ProjectDetails`], filtered to the requested targets.
struct FixtureServer {
    capabilities: ServerCapabilities,
    details: ProjectDetails,
    javac_timeout: Option<Duration>,
}

impl FixtureServer {
    fn new(details: serde_json::Value) -> Self {
        Self {
            capabilities: ServerCapabilities {
                resources_provider: true,
                dependency_sources_provider: true,
                inverse_sources_provider: false,
            },
            details: serde_json::from_value(details).expect("valid project details"),
            javac_timeout: None,
        }
    }
}

fn requested<'a, T: Clone + 'a>(
    items: &'a [T],
    targets: &[BuildTargetId],
    id: impl Fn(&T) -> &BuildTargetId,
) -> Vec<T> {
    items
        .iter()
        .filter(|item| targets.contains(id(item)))
        .cloned()
        .collect()
}

impl BuildServer for FixtureServer {
    fn capabilities(&self) -> Result<ServerCapabilities, FetchError> {
        Ok(self.capabilities.clone())
    }

    fn workspace_build_targets(&self) -> Result<WorkspaceBuildTargetsResult, FetchError> {
        Ok(WorkspaceBuildTargetsResult {
            targets: self.details.targets.clone(),
        })
    }

    fn sources(&self, targets: &[BuildTargetId]) -> Result<SourcesResult, FetchError> {
        Ok(SourcesResult {
            items: requested(&self.details.sources, targets, |item| &item.target),
        })
    }

    fn resources(&self, targets: &[BuildTargetId]) -> Result<ResourcesResult, FetchError> {
        Ok(ResourcesResult {
            items: requested(&self.details.resources, targets, |item| &item.target),
        })
    }

    fn dependency_sources(
        &self,
        targets: &[BuildTargetId],
    ) -> Result<DependencySourcesResult, FetchError> {
        Ok(DependencySourcesResult {
            items: requested(&self.details.dependency_sources, targets, |item| &item.target),
        })
    }

    fn javac_options(&self, targets: &[BuildTargetId]) -> Result<JavacOptionsResult, FetchError> {
        if let Some(timeout) = self.javac_timeout {
            return Err(FetchError::Timeout {
                request: "buildTarget/javacOptions",
                timeout,
            });
        }
        Ok(JavacOptionsResult {
            items: requested(&self.details.javac_options, targets, |item| &item.target),
        })
    }

    fn python_options(
        &self,
        targets: &[BuildTargetId],
    ) -> Result<PythonOptionsResult, FetchError> {
        Ok(PythonOptionsResult {
            items: requested(&self.details.python_options, targets, |item| &item.target),
        })
    }
}

fn mixed_workspace() -> serde_json::Value {
    json!({
        "targets": [
            {
                "id": { "uri": "//svc" },
                "displayName": "svc",
                "baseDirectory": "file:///ws/svc/",
                "languageIds": ["java"],
                "dependencies": [{ "uri": "//tools" }],
                "capabilities": { "canCompile": true },
                "dataKind": "jvm",
                "data": { "javaVersion": "21" }
            },
            {
                "id": { "uri": "//tools" },
                "baseDirectory": "file:///ws/tools/",
                "languageIds": ["python"],
                "dataKind": "python",
                "data": { "version": "3.12", "interpreter": "file:///usr/bin/python3" }
            }
        ],
        "sources": [
            {
                "target": { "uri": "//svc" },
                "sources": [
                    { "uri": "file:///ws/svc/src/main/java/", "kind": 2, "generated": false }
                ],
                "roots": ["file:///ws/svc/src/main/java/"]
            },
            {
                "target": { "uri": "//tools" },
                "sources": [{ "uri": "file:///ws/tools/lib/", "kind": 2 }]
            }
        ],
        "resources": [
            {
                "target": { "uri": "//svc" },
                "resources": ["file:///ws/svc/src/main/resources/"]
            }
        ],
        "dependencySources": [
            {
                "target": { "uri": "//svc" },
                "sources": ["file:///m2/slf4j-api-2.0.9-sources.jar"]
            }
        ],
        "javacOptions": [
            {
                "target": { "uri": "//svc" },
                "options": ["-parameters"],
                "classpath": ["file:///m2/slf4j-api-2.0.9.jar", "file:///m2/annotations-24.jar"],
                "classDirectory": "file:///ws/out/svc"
            }
        ],
        "pythonOptions": [
            { "target": { "uri": "//tools" }, "interpreterOptions": ["-O"] }
        ]
    })
}

#[test]
fn fetched_snapshot_reconciles_into_typed_modules() {
    let server = FixtureServer::new(mixed_workspace());
    let snapshot = fetch_snapshot(&server, &CancellationToken::new()).unwrap();
    assert_eq!(snapshot.len(), 2);

    let mut engine = ReconciliationEngine::from_config(SyncConfig::default());
    let mut store = InMemoryModelStore::new();
    engine
        .reconcile(Some(&snapshot), &LoadRequest::none(), &mut store)
        .unwrap();

    let svc = store.module("//svc").unwrap();
    assert_eq!(svc.kind, ModuleKind::Java);
    assert!(svc.depends_on_module("//tools"));
    assert!(svc.depends_on_library("BSP: slf4j-api-2.0.9"));
    assert_eq!(svc.compiler_output.as_deref(), Some("file:///ws/out/svc"));
    assert_eq!(svc.jdk.as_ref().map(|jdk| jdk.name.as_str()), Some("project-21"));
    assert_eq!(
        svc.content_root.as_ref().map(|root| root.url.as_str()),
        Some("file:///ws/svc")
    );
    assert_eq!(svc.source_roots.len(), 1);
    assert_eq!(svc.resource_roots.len(), 1);

    // The slf4j jar is covered by the project library; only the other jar stays module-private.
    let private: Vec<&str> = svc
        .module_libraries
        .iter()
        .map(|library| library.name.as_str())
        .collect();
    assert_eq!(private, vec!["BSP: annotations-24"]);

    let tools = store.module("//tools").unwrap();
    assert_eq!(tools.kind, ModuleKind::Python);
    match tools.addendum.as_ref() {
        Some(LanguageAddendum::Python(python)) => {
            assert_eq!(python.version.as_deref(), Some("3.12"));
            assert_eq!(python.interpreter_options, vec!["-O"]);
        }
        other => panic!("expected python addendum, got {other:?}"),
    }
}

#[test]
fn request_timeouts_abort_the_fetch() {
    let mut server = FixtureServer::new(mixed_workspace());
    server.javac_timeout = Some(Duration::from_secs(30));

    let err = fetch_snapshot(&server, &CancellationToken::new()).unwrap_err();
    assert_eq!(
        err,
        FetchError::Timeout {
            request: "buildTarget/javacOptions",
            timeout: Duration::from_secs(30),
        }
    );
    assert_eq!(
        err.to_string(),
        "buildTarget/javacOptions timed out after 30s"
    );
}

#[test]
fn missing_capabilities_skip_optional_requests() {
    let mut server = FixtureServer::new(mixed_workspace());
    server.capabilities = ServerCapabilities::default();

    let snapshot = fetch_snapshot(&server, &CancellationToken::new()).unwrap();
    let svc = snapshot.get(&BuildTargetId::new("//svc")).unwrap();
    assert!(svc.resources.is_empty());
    assert!(svc.dependency_sources.is_empty());
    assert!(svc.javac_options.is_some());
}
