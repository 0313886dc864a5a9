use std::sync::Arc;
use tracing::{debug, error, info, info_span};

use crate::{
    any::{self, Instance},
    config::Config,
    context::Source as _,
    declaration::Declaration,
    environment::Environment,
    errors::{BuildErrorKind, ResolveErrorKind},
    registry::EnvironmentContext,
};

/// Capability of a meta component to observe the main declarations before the main environment exists.
///
/// [`DeclarationsProcessor::process`] receives identifiers, tags and capabilities only,
/// no main component can be resolved at that point.
pub trait DeclarationsProcessor: Send + Sync + 'static {
    fn process(&self, declarations: &[Declaration]);
}

pub(crate) type ProcessorCast = fn(&Instance) -> Option<Arc<dyn DeclarationsProcessor>>;

pub(crate) fn cast_processor<T: DeclarationsProcessor>(instance: &Instance) -> Option<Arc<dyn DeclarationsProcessor>> {
    any::downcast::<T>(instance).map(|processor| processor as Arc<dyn DeclarationsProcessor>)
}

/// Builds both tiers: the meta environment first, then every processor it declares observes the main declarations,
/// then the main declarations are frozen.
///
/// Returns the main context and the meta environment, `None` for non-extensible configs.
pub(crate) fn build_tiers(
    config: &Config,
    main: Vec<Declaration>,
    meta: Vec<Declaration>,
) -> Result<(EnvironmentContext, Option<Environment>), BuildErrorKind> {
    let span = info_span!("build", extensible = config.extensible);
    let _guard = span.enter();

    if !config.extensible {
        if !meta.is_empty() {
            let err = BuildErrorKind::NotExtensible;
            error!("{}", err);
            return Err(err);
        }

        let context = EnvironmentContext::build(main)?;
        info!(declarations = context.len(), "Environment built");
        return Ok((context, None));
    }

    let meta = Environment::new(EnvironmentContext::build(meta)?, None);
    debug!(declarations = meta.context().len(), "Meta environment built");

    for declaration in meta.context().declarations() {
        let Some(cast) = declaration.capabilities.processor else {
            continue;
        };

        let instance = meta.inner.lookup(&declaration.identifier, None)?.ok_or_else(|| {
            let err = ResolveErrorKind::ComponentNotFound {
                identifier: declaration.identifier.clone(),
            };
            error!("{}", err);
            err
        })?;
        let processor = cast(&instance).ok_or_else(|| {
            let err = ResolveErrorKind::Internal {
                message: format!("{} doesn't implement its declared processor capability", declaration.identifier),
            };
            error!("{}", err);
            err
        })?;

        debug!(processor = %declaration.identifier, "Processing declarations");
        processor.process(&main);
    }

    let context = EnvironmentContext::build(main)?;
    info!(declarations = context.len(), meta_declarations = meta.context().len(), "Environment built");

    Ok((context, Some(meta)))
}

#[cfg(test)]
mod tests {
    use super::{build_tiers, DeclarationsProcessor};
    use crate::{config::Config, declaration::Declaration, errors::BuildErrorKind, Identifier, Lookup as _};

    use parking_lot::Mutex;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Identifier>>,
    }

    impl DeclarationsProcessor for Recorder {
        fn process(&self, declarations: &[Declaration]) {
            self.seen.lock().extend(declarations.iter().map(|declaration| declaration.identifier().clone()));
        }
    }

    struct Database;
    struct Cache;

    #[test]
    #[traced_test]
    fn test_processor_sees_main_declarations() {
        let (context, meta) = build_tiers(
            &Config::default(),
            vec![
                Declaration::component(|_| Ok(Database)),
                Declaration::component(|_| Ok(Cache)),
            ],
            vec![Declaration::processor(|_| Ok(Recorder::default()))],
        )
        .unwrap();

        let meta = meta.unwrap();
        let recorder = meta.get::<Recorder>().unwrap();

        assert_eq!(*recorder.seen.lock(), [Identifier::of::<Database>(), Identifier::of::<Cache>()]);
        assert_eq!(context.len(), 2);
        assert!(!meta.context().contains(&Identifier::of::<Database>()));
    }

    #[test]
    #[traced_test]
    fn test_non_extensible_rejects_meta() {
        let result = build_tiers(
            &Config::non_extensible(),
            vec![],
            vec![Declaration::processor(|_| Ok(Recorder::default()))],
        );
        assert!(matches!(result, Err(BuildErrorKind::NotExtensible)));

        let (_, meta) = build_tiers(&Config::non_extensible(), vec![Declaration::component(|_| Ok(Database))], vec![]).unwrap();
        assert!(meta.is_none());
    }
}
