/// Config for an environment builder
/// ## Fields
/// - `extensible`:
///   If `true`, the environment gets a meta tier for extensions (see [`crate::EnvironmentBuilder::meta`]).
///
///   Non-extensible environments reject meta declarations and have no [`crate::Services`].
/// - `unstable`:
///   Features that must be opted in explicitly.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub extensible: bool,
    pub unstable: UnstableFeatures,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extensible: true,
            unstable: UnstableFeatures::default(),
        }
    }
}

impl Config {
    #[inline]
    #[must_use]
    pub fn non_extensible() -> Self {
        Self {
            extensible: false,
            ..Self::default()
        }
    }
}

/// Opt-in switches for unstable APIs, all disabled by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnstableFeatures {
    /// Allows [`crate::EnvironmentBuilder::build_mutable`], the unsafe environment for tests.
    pub mutable_environment: bool,
}
