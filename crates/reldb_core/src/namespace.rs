//! The expression namespace.
//!
//! A namespace maps identifiers to values and callables visible inside
//! user-authored predicate and update expressions. Each database owns its
//! namespace, seeded from a process-wide default registry at open time,
//! so registrations in one database never leak into another. Domain-type
//! constructors (`CID`, `SID`, ...) live here: the codec consults them
//! when re-validating loaded values, and the evaluator when a predicate
//! calls one.

use crate::algebra::{is_identifier, AttrType, AttrValue};
use crate::error::{Error, Result};
use crate::expr::ExprError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Validation hook for a domain type.
type CheckFn = dyn Fn(&AttrValue) -> std::result::Result<(), String> + Send + Sync;

/// Callable registered under a bare name.
type NativeFn = dyn Fn(&[AttrValue]) -> std::result::Result<AttrValue, String> + Send + Sync;

/// A registered domain type: a named wrapper over a base attribute type,
/// with an optional validation hook.
#[derive(Clone)]
pub struct DomainDef {
    base: AttrType,
    check: Option<Arc<CheckFn>>,
}

impl DomainDef {
    /// The base type this domain wraps.
    #[must_use]
    pub fn base(&self) -> &AttrType {
        &self.base
    }
}

impl fmt::Debug for DomainDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainDef")
            .field("base", &self.base)
            .field("checked", &self.check.is_some())
            .finish()
    }
}

/// An expression namespace: identifier to value, domain constructor or
/// function.
#[derive(Clone, Default)]
pub struct Namespace {
    values: BTreeMap<String, AttrValue>,
    domains: BTreeMap<String, DomainDef>,
    functions: BTreeMap<String, Arc<NativeFn>>,
}

impl Namespace {
    /// Creates an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plain value under `name`.
    pub fn register_value(&mut self, name: impl Into<String>, value: AttrValue) -> Result<()> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(Error::name_invalid(&name, "not an identifier"));
        }
        self.values.insert(name, value);
        Ok(())
    }

    /// Registers a domain type over `base` with no validation hook.
    pub fn register_domain(&mut self, name: impl Into<String>, base: AttrType) -> Result<()> {
        self.register_def(name.into(), DomainDef { base, check: None })
    }

    /// Registers a domain type over `base` with a validation hook run on
    /// every construction.
    pub fn register_domain_with<F>(
        &mut self,
        name: impl Into<String>,
        base: AttrType,
        check: F,
    ) -> Result<()>
    where
        F: Fn(&AttrValue) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.register_def(
            name.into(),
            DomainDef {
                base,
                check: Some(Arc::new(check)),
            },
        )
    }

    fn register_def(&mut self, name: String, def: DomainDef) -> Result<()> {
        if !is_identifier(&name) {
            return Err(Error::name_invalid(&name, "not an identifier"));
        }
        self.domains.insert(name, def);
        Ok(())
    }

    /// Registers a callable under `name`.
    pub fn register_function<F>(&mut self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(&[AttrValue]) -> std::result::Result<AttrValue, String> + Send + Sync + 'static,
    {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(Error::name_invalid(&name, "not an identifier"));
        }
        self.functions.insert(name, Arc::new(f));
        Ok(())
    }

    /// Looks up a registered value.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    /// Looks up a registered domain type.
    #[must_use]
    pub fn domain(&self, name: &str) -> Option<&DomainDef> {
        self.domains.get(name)
    }

    /// Checks whether `name` resolves to a constructor or function.
    #[must_use]
    pub fn is_callable(&self, name: &str) -> bool {
        self.domains.contains_key(name) || self.functions.contains_key(name)
    }

    /// Invokes the constructor or function registered under `name`.
    pub(crate) fn call(
        &self,
        name: &str,
        args: &[AttrValue],
    ) -> std::result::Result<AttrValue, ExprError> {
        if self.domains.contains_key(name) {
            if args.len() != 1 {
                return Err(ExprError::eval(format!(
                    "{name}() takes exactly one argument, got {}",
                    args.len()
                )));
            }
            return self.wrap_domain(name, args[0].clone());
        }
        if let Some(function) = self.functions.get(name) {
            return function(args).map_err(ExprError::eval);
        }
        Err(ExprError::eval(format!("unknown callable '{name}'")))
    }

    /// Wraps `inner` into the domain type `name`, validating against the
    /// registration when one exists.
    ///
    /// Unregistered domain names wrap without validation, so relations
    /// can be loaded before their client registers every type.
    pub(crate) fn wrap_domain(
        &self,
        name: &str,
        inner: AttrValue,
    ) -> std::result::Result<AttrValue, ExprError> {
        // Re-wrapping a value already of this domain is a no-op.
        if inner.attr_type() == AttrType::Domain(name.to_string()) {
            return Ok(inner);
        }
        if let Some(def) = self.domains.get(name) {
            if inner.attr_type() != def.base {
                return Err(ExprError::eval(format!(
                    "{name}() expects {}, got {}",
                    def.base,
                    inner.attr_type()
                )));
            }
            if let Some(check) = &def.check {
                check(&inner).map_err(|reason| {
                    ExprError::eval(format!("invalid {name} value {inner}: {reason}"))
                })?;
            }
        }
        Ok(AttrValue::domain(name, inner))
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("domains", &self.domains.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The process-wide default registry.
///
/// New databases copy this namespace at open time. Register domain types
/// here when they must survive a close/reopen cycle within the process.
pub fn default_registry() -> &'static RwLock<Namespace> {
    static REGISTRY: OnceLock<RwLock<Namespace>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Namespace::new()))
}
