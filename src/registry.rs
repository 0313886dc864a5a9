use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::{debug, error};

use crate::{
    context::Context,
    declaration::{Declaration, Provider},
    errors::{BuildErrorKind, InstantiateErrorKind},
    extension::DeclarationsProcessor,
    lifecycle::Service,
    Identifier, Qualifier,
};

/// Frozen set of declarations of one environment, keyed by identifier.
///
/// Declarations keep their registration order, which is the order processors observe them in.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentContext {
    declarations: Vec<Declaration>,
    index: BTreeMap<Identifier, usize>,
}

impl EnvironmentContext {
    /// # Errors
    /// Returns [`BuildErrorKind::InvalidDeclaration`] if two declarations share an identifier
    /// or an alias targets its own identifier.
    pub fn build(declarations: impl IntoIterator<Item = Declaration>) -> Result<Self, BuildErrorKind> {
        let mut context = Self::default();
        for declaration in declarations {
            validate(&declaration)?;

            if context.index.contains_key(&declaration.identifier) {
                let err = BuildErrorKind::duplicate(declaration.identifier);
                error!("{}", err);
                return Err(err);
            }

            context.index.insert(declaration.identifier.clone(), context.declarations.len());
            context.declarations.push(declaration);
        }

        debug!(declarations = context.declarations.len(), "Environment context built");

        Ok(context)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, identifier: &Identifier) -> Option<&Declaration> {
        self.index.get(identifier).map(|index| &self.declarations[*index])
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.index.contains_key(identifier)
    }

    #[inline]
    #[must_use]
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    #[inline]
    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.declarations.iter().map(Declaration::identifier)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

pub(crate) fn validate(declaration: &Declaration) -> Result<(), BuildErrorKind> {
    if let Provider::Alias { target, .. } = &declaration.provider {
        if *target == declaration.identifier {
            let err = BuildErrorKind::InvalidDeclaration {
                identifier: declaration.identifier.clone(),
                reason: "alias targets its own identifier",
            };
            error!("{}", err);
            return Err(err);
        }
    }
    Ok(())
}

/// Anything declarations can be registered into. Registration fails fast on duplicate identifiers.
///
/// Every method except [`Declare::declare`] is sugar over it.
pub trait Declare {
    /// # Errors
    /// Returns [`BuildErrorKind::InvalidDeclaration`] if the identifier is already declared here
    /// or the declaration is malformed.
    fn declare(&mut self, declaration: Declaration) -> Result<&mut Self, BuildErrorKind>;

    #[allow(clippy::missing_errors_doc)]
    fn provide<T, F>(&mut self, factory: F) -> Result<&mut Self, BuildErrorKind>
    where
        T: Send + Sync + 'static,
        F: Fn(&Context<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        self.declare(Declaration::component(factory))
    }

    #[allow(clippy::missing_errors_doc)]
    fn provide_qualified<T, F>(&mut self, qualifier: impl Into<Qualifier>, factory: F) -> Result<&mut Self, BuildErrorKind>
    where
        T: Send + Sync + 'static,
        F: Fn(&Context<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        self.declare(Declaration::component(factory).qualified(qualifier))
    }

    #[allow(clippy::missing_errors_doc)]
    fn provide_arc<T, F>(&mut self, factory: F) -> Result<&mut Self, BuildErrorKind>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Context<'_>) -> Result<Arc<T>, InstantiateErrorKind> + Send + Sync + 'static,
    {
        self.declare(Declaration::component_arc(factory))
    }

    #[allow(clippy::missing_errors_doc)]
    fn provide_service<T, F>(&mut self, factory: F) -> Result<&mut Self, BuildErrorKind>
    where
        T: Service,
        F: Fn(&Context<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        self.declare(Declaration::service(factory))
    }

    #[allow(clippy::missing_errors_doc)]
    fn provide_processor<T, F>(&mut self, factory: F) -> Result<&mut Self, BuildErrorKind>
    where
        T: DeclarationsProcessor,
        F: Fn(&Context<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        self.declare(Declaration::processor(factory))
    }

    #[allow(clippy::missing_errors_doc)]
    fn provide_instance<T>(&mut self, value: T) -> Result<&mut Self, BuildErrorKind>
    where
        T: Send + Sync + 'static,
    {
        self.declare(Declaration::instance(value))
    }

    /// Declares `U` at the `alias` qualifier as an alias of the `T` declared at the `target` qualifier.
    #[allow(clippy::missing_errors_doc)]
    fn alias<U, T, C>(&mut self, target: impl Into<Qualifier>, alias: impl Into<Qualifier>, cast: C) -> Result<&mut Self, BuildErrorKind>
    where
        U: ?Sized + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        self.declare(Declaration::alias::<U, T, C>(target, cast).qualified(alias))
    }

    /// Registers every declaration of `module`, stopping at the first invalid one.
    #[allow(clippy::missing_errors_doc)]
    fn module(&mut self, module: Module) -> Result<&mut Self, BuildErrorKind> {
        debug!(module = %module.name, declarations = module.declarations.len(), "Registering module");

        for declaration in module.declarations {
            self.declare(declaration)?;
        }
        Ok(self)
    }
}

/// Named, reusable group of declarations.
///
/// Modules only group declarations, they don't namespace them: identifiers must stay unique
/// across every module registered into one environment.
#[derive(Debug, Clone)]
pub struct Module {
    name: Cow<'static, str>,
    declarations: Vec<Declaration>,
    identifiers: BTreeSet<Identifier>,
}

impl Module {
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            declarations: Vec::new(),
            identifiers: BTreeSet::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    #[inline]
    #[must_use]
    pub(crate) fn into_declarations(self) -> Vec<Declaration> {
        self.declarations
    }
}

impl Declare for Module {
    fn declare(&mut self, declaration: Declaration) -> Result<&mut Self, BuildErrorKind> {
        validate(&declaration)?;

        if !self.identifiers.insert(declaration.identifier.clone()) {
            let err = BuildErrorKind::duplicate(declaration.identifier);
            error!("{}", err);
            return Err(err);
        }

        debug!(identifier = %declaration.identifier, "Declared");

        self.declarations.push(declaration);
        Ok(self)
    }
}
