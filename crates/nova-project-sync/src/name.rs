use nova_bsp_model::BuildTargetId;

/// Maps a build target to the name its module is stored under.
///
/// Implementations must be pure: the same id always yields the same name. Any
/// `Fn(&BuildTargetId) -> String` closure is a resolver.
pub trait ModuleNameResolver: Send + Sync {
    fn resolve(&self, id: &BuildTargetId) -> String;
}

/// Uses the target URI verbatim (`//app:lib` -> `//app:lib`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultModuleNameResolver;

impl ModuleNameResolver for DefaultModuleNameResolver {
    fn resolve(&self, id: &BuildTargetId) -> String {
        id.uri.clone()
    }
}

impl<F> ModuleNameResolver for F
where
    F: Fn(&BuildTargetId) -> String + Send + Sync,
{
    fn resolve(&self, id: &BuildTargetId) -> String {
        self(id)
    }
}
