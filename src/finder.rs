//! Concurrent handler discovery across packages.
//!
//! The finder loads every package matched by the search patterns in one
//! batch, fans the per-package analysis out across a bounded worker pool,
//! and folds each worker's buffers into a shared index keyed by qualified
//! handler name. Only the merge itself runs under the lock; the analysis
//! stays outside the critical section, so contention is limited to short
//! sections regardless of pool width.

use crate::extractor::enums::{self, EnumMap};
use crate::extractor::{ContractParser, Handler, Model, ParseOptions};
use crate::matcher::{registry_from_index, ModelRegistry, Route, RouteMatch, RouteMatcher};
use crate::scanner::{usable_packages, PackageScanner, SearchPattern};
use crate::typing::TypeIndex;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

const DEFAULT_CONCURRENCY: usize = 5;

/// Options for one discovery run.
#[derive(Debug, Clone)]
pub struct FinderOptions {
    /// Worker-pool width for per-package analysis
    pub concurrency: usize,
    pub parse: ParseOptions,
}

impl Default for FinderOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            parse: ParseOptions::default(),
        }
    }
}

/// Serializable view of everything a scan discovered.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub handlers: BTreeMap<String, Handler>,
    pub enums: EnumMap,
    pub models: Vec<Model>,
}

/// Discovers handlers under a project root and keeps the merged index.
///
/// # Example
///
/// ```no_run
/// use contract_from_source::finder::{FinderOptions, HandlerFinder};
/// use contract_from_source::scanner::SearchPattern;
/// use std::path::PathBuf;
///
/// let mut finder = HandlerFinder::new(PathBuf::from("./my-service")).unwrap();
/// finder
///     .find(&[SearchPattern::parse("internal/api/...")], &FinderOptions::default())
///     .unwrap();
/// println!("Discovered {} handlers", finder.handlers().len());
/// ```
pub struct HandlerFinder {
    parser: ContractParser,
    root: PathBuf,
    handlers: HashMap<String, Handler>,
    enums: EnumMap,
    models: Vec<Model>,
    registry: ModelRegistry,
}

impl HandlerFinder {
    /// Creates a finder for the given project root.
    ///
    /// # Errors
    ///
    /// Fails when the symbol resolvers cannot load their reference
    /// namespaces; discovery cannot run without them.
    pub fn new(root: PathBuf) -> crate::error::Result<Self> {
        Ok(Self {
            parser: ContractParser::new()?,
            root,
            handlers: HashMap::new(),
            enums: EnumMap::new(),
            models: Vec::new(),
            registry: ModelRegistry::new(),
        })
    }

    /// Loads all packages matched by the patterns and analyzes them on the
    /// worker pool, merging into the shared index.
    ///
    /// Packages that reported load errors are logged and skipped; their
    /// absence shrinks the result but never fails the scan. An index
    /// collision is resolved last-write-wins with a warning naming both
    /// the discarded and the retained source package.
    pub fn find(&mut self, patterns: &[SearchPattern], opts: &FinderOptions) -> Result<()> {
        let scanner = PackageScanner::new(self.root.clone());
        let loaded = scanner.load(patterns)?;
        let packages = usable_packages(loaded);
        info!("Analyzing {} packages", packages.len());

        let index = TypeIndex::new(&packages);
        self.registry.extend(registry_from_index(&index));

        let concurrency = if opts.concurrency == 0 {
            DEFAULT_CONCURRENCY
        } else {
            opts.concurrency
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .build()
            .context("build analysis worker pool")?;

        let handlers = Mutex::new(std::mem::take(&mut self.handlers));
        let enums = Mutex::new(std::mem::take(&mut self.enums));
        let models = Mutex::new(std::mem::take(&mut self.models));
        let parser = &self.parser;
        let index = &index;
        let parse_opts = &opts.parse;

        pool.install(|| {
            packages.par_iter().for_each(|pkg| {
                let result = parser.parse_package(pkg, index, parse_opts);
                debug!(
                    "analyzed package {}: {} handlers",
                    pkg.import_path,
                    result.handlers.len()
                );

                let mut guard = handlers.lock().expect("handler merge lock poisoned");
                for handler in result.handlers {
                    let key = handler.qualified_name();
                    let retained_pkg = handler.package_path.clone();
                    if let Some(discarded) = guard.insert(key.clone(), handler) {
                        warn!(
                            "handler {} already found in {}, replaced by the one from {}; use unique names for your handlers",
                            key, discarded.package_path, retained_pkg
                        );
                    }
                }
                drop(guard);

                enums::combine(
                    &mut enums.lock().expect("enum merge lock poisoned"),
                    result.enums,
                );
                models
                    .lock()
                    .expect("model merge lock poisoned")
                    .extend(result.additional_models);
            });
        });

        self.handlers = handlers.into_inner().expect("handler merge lock poisoned");
        self.enums = enums.into_inner().expect("enum merge lock poisoned");
        self.models = models.into_inner().expect("model merge lock poisoned");

        info!("Discovery finished: {} handlers", self.handlers.len());
        Ok(())
    }

    /// Discovered handlers keyed by qualified name.
    pub fn handlers(&self) -> &HashMap<String, Handler> {
        &self.handlers
    }

    /// Enumerations harvested during discovery.
    pub fn enums(&self) -> &EnumMap {
        &self.enums
    }

    /// Model inventory harvested during discovery.
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Model shapes of every scanned struct, for struct-tag parameter
    /// resolution during route matching.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Serializable scan report with a deterministic handler order.
    pub fn report(&self) -> ScanReport {
        ScanReport {
            handlers: self
                .handlers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            enums: self.enums.clone(),
            models: self.models.clone(),
        }
    }

    /// Matches live routes against the discovered index.
    pub fn match_routes(&self, routes: &[Route]) -> Vec<RouteMatch> {
        RouteMatcher::new(&self.handlers, &self.registry).match_routes(routes)
    }
}
