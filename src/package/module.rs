//! The export contract of a loadable unit.

use crate::package::Package;
use std::any::Any;
use std::fmt;

/// A loadable unit. Its export must be a [`Package`].
pub trait PackageModule: Send {
    fn module_name(&self) -> &str;

    /// The exported object, if any.
    fn export(self: Box<Self>) -> Option<Box<dyn Any + Send>>;
}

impl PackageModule for Package {
    fn module_name(&self) -> &str {
        self.name()
    }

    fn export(self: Box<Self>) -> Option<Box<dyn Any + Send>> {
        Some(self)
    }
}

/// A unit whose export is only known at runtime, e.g. one resolved from a plugin table.
pub struct DynamicModule {
    name: String,
    export: Option<Box<dyn Any + Send>>,
}

impl DynamicModule {
    pub fn new(name: impl Into<String>, export: Option<Box<dyn Any + Send>>) -> Self {
        Self {
            name: name.into(),
            export,
        }
    }
}

impl PackageModule for DynamicModule {
    fn module_name(&self) -> &str {
        &self.name
    }

    fn export(self: Box<Self>) -> Option<Box<dyn Any + Send>> {
        self.export
    }
}

/// A package to load, optionally at an explicit mount path.
pub struct Mount {
    pub path: Option<String>,
    pub module: Box<dyn PackageModule>,
}

impl Mount {
    pub fn new(path: impl Into<String>, module: impl PackageModule + 'static) -> Self {
        Self {
            path: Some(path.into()),
            module: Box::new(module),
        }
    }

    /// Mounted at the package's own path, or the default derived from its config and name.
    pub fn unmounted(module: impl PackageModule + 'static) -> Self {
        Self {
            path: None,
            module: Box::new(module),
        }
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("path", &self.path)
            .field("module", &self.module.module_name())
            .finish()
    }
}
